//! Error types for device acquisition and encoding

use thiserror::Error;

use crate::{BackendStatus, PipelineState};

/// Resource domain a context can bind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindDomain {
    Graphics,
    Compute,
}

impl std::fmt::Display for BindDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindDomain::Graphics => write!(f, "graphics"),
            BindDomain::Compute => write!(f, "compute"),
        }
    }
}

/// Hardware encode error
#[derive(Debug, Error)]
pub enum HwError {
    /// No matching adapter, platform or device
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Interop binding failed after a device was found
    #[error("Device lost: {0}")]
    DeviceLost(String),

    #[error("Context already has a {0} device bound")]
    AlreadyBound(BindDomain),

    /// Requested parameters exceed the queried capability ceilings
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Backend failure ({status}): {context}")]
    BackendFailure {
        status: BackendStatus,
        context: String,
    },

    #[error("Stream geometry changed at frame {frame}")]
    StreamGeometryChanged { frame: u64 },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: PipelineState,
        to: PipelineState,
    },

    #[error("Invalid parameter {key}: {reason}")]
    InvalidParameter { key: String, reason: String },

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HwError {
    /// Wrap an opaque backend status with a description of the failed call
    pub fn backend(status: BackendStatus, context: impl Into<String>) -> Self {
        HwError::BackendFailure {
            status,
            context: context.into(),
        }
    }

    /// Backend status carried by this error, if any
    pub fn status(&self) -> Option<BackendStatus> {
        match self {
            HwError::BackendFailure { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for hardware encode operations
pub type HwResult<T> = Result<T, HwError>;
