//! Backend result codes and their translation into [`HwError`]

use serde::{Deserialize, Serialize};

use crate::HwError;

macro_rules! backend_status {
    ($($variant:ident = $code:literal => $name:literal, $desc:literal;)+) => {
        /// Result code returned by the acceleration backend
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum BackendStatus {
            $($variant,)+
        }

        impl BackendStatus {
            /// Every status code, in numeric order
            pub const ALL: &'static [BackendStatus] = &[$(BackendStatus::$variant,)+];

            /// Numeric code as reported by the backend
            pub fn code(self) -> i32 {
                match self {
                    $(BackendStatus::$variant => $code,)+
                }
            }

            /// Look up a status from its numeric code
            pub fn from_code(code: i32) -> Option<Self> {
                match code {
                    $($code => Some(BackendStatus::$variant),)+
                    _ => None,
                }
            }

            /// Symbolic name of the status
            pub fn name(self) -> &'static str {
                match self {
                    $(BackendStatus::$variant => $name,)+
                }
            }

            /// Short human-readable description
            pub fn description(self) -> &'static str {
                match self {
                    $(BackendStatus::$variant => $desc,)+
                }
            }
        }
    };
}

backend_status! {
    Ok = 0 => "OK", "success";
    Fail = 1 => "FAIL", "generic failure";
    Unexpected = 2 => "UNEXPECTED", "unexpected failure";
    AccessDenied = 3 => "ACCESS_DENIED", "access denied";
    InvalidArg = 4 => "INVALID_ARG", "invalid argument";
    OutOfRange = 5 => "OUT_OF_RANGE", "value out of range";
    OutOfMemory = 6 => "OUT_OF_MEMORY", "out of memory";
    InvalidPointer = 7 => "INVALID_POINTER", "invalid pointer";
    NoInterface = 8 => "NO_INTERFACE", "interface not available";
    NotImplemented = 9 => "NOT_IMPLEMENTED", "not implemented";
    NotSupported = 10 => "NOT_SUPPORTED", "not supported";
    NotFound = 11 => "NOT_FOUND", "not found";
    AlreadyInitialized = 12 => "ALREADY_INITIALIZED", "already initialized";
    NotInitialized = 13 => "NOT_INITIALIZED", "not initialized";
    InvalidFormat = 14 => "INVALID_FORMAT", "invalid data format";
    WrongState = 15 => "WRONG_STATE", "wrong state";
    FileNotOpen = 16 => "FILE_NOT_OPEN", "cannot open file";
    NoDevice = 17 => "NO_DEVICE", "no device";
    DirectxFailed = 18 => "DIRECTX_FAILED", "graphics API call failed";
    OpenclFailed = 19 => "OPENCL_FAILED", "compute API call failed";
    GlxFailed = 20 => "GLX_FAILED", "failed to use GLX";
    XvFailed = 21 => "XV_FAILED", "failed to use Xv extension";
    AlsaFailed = 22 => "ALSA_FAILED", "failed to use ALSA";
    Eof = 23 => "EOF", "end of stream";
    Repeat = 24 => "REPEAT", "no output available yet";
    InputFull = 25 => "INPUT_FULL", "input queue is full";
    ResolutionChanged = 26 => "RESOLUTION_CHANGED", "resolution changed, reinitialization required";
    ResolutionUpdated = 27 => "RESOLUTION_UPDATED", "resolution updated in adaptive mode";
    InvalidDataType = 28 => "INVALID_DATA_TYPE", "invalid data type";
    InvalidResolution = 29 => "INVALID_RESOLUTION", "invalid resolution";
    CodecNotSupported = 30 => "CODEC_NOT_SUPPORTED", "codec not supported";
    SurfaceFormatNotSupported = 31 => "SURFACE_FORMAT_NOT_SUPPORTED", "surface format not supported";
    SurfaceMustBeShared = 32 => "SURFACE_MUST_BE_SHARED", "surface must be shared";
    DecoderNotPresent = 33 => "DECODER_NOT_PRESENT", "failed to create the decoder";
    DecoderSurfaceAllocationFailed = 34 => "DECODER_SURFACE_ALLOCATION_FAILED", "failed to allocate a decode surface";
    DecoderNoFreeSurfaces = 35 => "DECODER_NO_FREE_SURFACES", "no free decode surfaces";
    EncoderNotPresent = 36 => "ENCODER_NOT_PRESENT", "failed to create the encoder";
    DemError = 37 => "DEM_ERROR", "display encode module error";
    DemPropertyReadonly = 38 => "DEM_PROPERTY_READONLY", "display encode module property is read-only";
    DemRemoteDisplayCreateFailed = 39 => "DEM_REMOTE_DISPLAY_CREATE_FAILED", "failed to create remote display";
    DemStartEncodingFailed = 40 => "DEM_START_ENCODING_FAILED", "failed to start display encoding";
    DemQueryOutputFailed = 41 => "DEM_QUERY_OUTPUT_FAILED", "failed to query display encode output";
    TanClippingWasRequired = 42 => "TAN_CLIPPING_WAS_REQUIRED", "result was clipped to the output range";
    TanUnsupportedVersion = 43 => "TAN_UNSUPPORTED_VERSION", "unsupported version requested";
    NeedMoreInput = 44 => "NEED_MORE_INPUT", "input accepted, more input required for output";
}

impl BackendStatus {
    /// Name for a raw code, `"Unknown"` when the code is not recognised
    pub fn name_of(code: i32) -> &'static str {
        Self::from_code(code).map(Self::name).unwrap_or("Unknown")
    }

    /// Flow-control signals that tell the caller to retry the same stage
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            BackendStatus::Repeat | BackendStatus::InputFull | BackendStatus::NeedMoreInput
        )
    }

    /// Translate a failed status into the error taxonomy
    pub fn into_error(self, context: impl Into<String>) -> HwError {
        let context = context.into();
        match self {
            BackendStatus::NoDevice => HwError::DeviceUnavailable(context),
            BackendStatus::DirectxFailed | BackendStatus::OpenclFailed => {
                HwError::DeviceLost(format!("{}: {}", context, self.name()))
            }
            // Geometry changes carry no frame position here; the pipeline
            // driver rewrites this with the frame it was processing.
            BackendStatus::ResolutionChanged => HwError::StreamGeometryChanged { frame: 0 },
            BackendStatus::CodecNotSupported
            | BackendStatus::SurfaceFormatNotSupported
            | BackendStatus::InvalidResolution => {
                HwError::UnsupportedConfiguration(format!("{}: {}", context, self.description()))
            }
            status => HwError::backend(status, context),
        }
    }
}

impl std::fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_dense_and_round_trip() {
        for (index, status) in BackendStatus::ALL.iter().enumerate() {
            assert_eq!(status.code(), index as i32);
            assert_eq!(BackendStatus::from_code(status.code()), Some(*status));
        }
    }

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<&str> = BackendStatus::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), BackendStatus::ALL.len());
        assert!(BackendStatus::ALL.iter().all(|s| !s.description().is_empty()));
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(BackendStatus::name_of(-1), "Unknown");
        assert_eq!(BackendStatus::name_of(1000), "Unknown");
        assert_eq!(BackendStatus::name_of(25), "INPUT_FULL");
    }

    #[test]
    fn test_transient_classification() {
        let transient: Vec<_> = BackendStatus::ALL
            .iter()
            .filter(|s| s.is_transient())
            .collect();
        assert_eq!(transient.len(), 3);
        assert!(!BackendStatus::Eof.is_transient());
        assert!(!BackendStatus::ResolutionChanged.is_transient());
    }

    #[test]
    fn test_into_error_mapping() {
        assert!(matches!(
            BackendStatus::NoDevice.into_error("x"),
            HwError::DeviceUnavailable(_)
        ));
        assert!(matches!(
            BackendStatus::DirectxFailed.into_error("InitDX11"),
            HwError::DeviceLost(_)
        ));
        assert!(matches!(
            BackendStatus::ResolutionChanged.into_error("SubmitInput"),
            HwError::StreamGeometryChanged { .. }
        ));
        assert!(matches!(
            BackendStatus::CodecNotSupported.into_error("CreateComponent"),
            HwError::UnsupportedConfiguration(_)
        ));
        let err = BackendStatus::Fail.into_error("CreateContext");
        assert_eq!(err.status(), Some(BackendStatus::Fail));
    }
}
