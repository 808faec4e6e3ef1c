//! Codec capability descriptors and the memoized catalog

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use shared_types::{
    AccelerationType, Codec, CodecTables, Direction, EncodeParameters, HwError, HwResult,
    MemoryType, SurfaceFormat, NOMINAL_HEIGHT, NOMINAL_WIDTH,
};
use tracing::{debug, warn};

use crate::{AccelBackend, AccelerationContext, ComponentTable, ContextId};

/// Input or output side of a codec component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoCapability {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    /// Required vertical alignment in lines
    pub vert_align: u32,
    pub interlace: bool,
    /// Supported formats; `true` marks the native one
    pub formats: Vec<(SurfaceFormat, bool)>,
    /// Supported memory types; `true` marks the native one
    pub memory: Vec<(MemoryType, bool)>,
}

impl IoCapability {
    pub fn supports_format(&self, format: SurfaceFormat) -> bool {
        self.formats.iter().any(|(f, _)| *f == format)
    }

    pub fn supports_memory(&self, memory: MemoryType) -> bool {
        self.memory.iter().any(|(m, _)| *m == memory)
    }

    pub fn supports_size(&self, width: u32, height: u32) -> bool {
        (self.min_width..=self.max_width).contains(&width)
            && (self.min_height..=self.max_height).contains(&height)
    }
}

/// What one codec component can do on the bound device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub accel: AccelerationType,
    pub max_profile: u32,
    pub max_level: u32,
    /// Bits per second
    pub max_bitrate: u64,
    pub min_ref_frames: u32,
    pub max_ref_frames: u32,
    pub max_streams: u32,
    /// H.264 encode only
    pub bframes: Option<bool>,
    /// H.264 encode only
    pub hw_instances: Option<u32>,
    pub input: Option<IoCapability>,
    pub output: Option<IoCapability>,
}

impl CapabilityDescriptor {
    /// Check `params` against these capabilities
    pub fn validate(
        &self,
        params: &EncodeParameters,
        tables: &CodecTables,
    ) -> HwResult<()> {
        let codec = params.codec;
        if self.accel == AccelerationType::NotSupported {
            return Err(unsupported(format!("{} encode is not accelerated", codec)));
        }

        let input = self
            .input
            .as_ref()
            .ok_or_else(|| unsupported(format!("{} encoder reports no input caps", codec)))?;
        if !input.supports_size(params.width, params.height) {
            return Err(unsupported(format!(
                "{}x{} outside {}-{} x {}-{}",
                params.width,
                params.height,
                input.min_width,
                input.max_width,
                input.min_height,
                input.max_height
            )));
        }
        if !input.supports_format(params.input_format) {
            return Err(unsupported(format!(
                "input format {} not supported",
                params.input_format.name()
            )));
        }
        if !input.supports_memory(params.input_memory) {
            return Err(unsupported(format!(
                "input memory {} not supported",
                params.input_memory.name()
            )));
        }
        if params.interlace.is_interlaced() && !input.interlace {
            return Err(unsupported("interlaced input not supported"));
        }

        let requested = tables.profile_rank(codec, params.profile);
        let ceiling = tables.profile_rank(codec, self.max_profile);
        match (requested, ceiling) {
            (Some(r), Some(c)) if r <= c => {}
            _ => {
                return Err(unsupported(format!(
                    "profile {} exceeds maximum {}",
                    tables.profile_name(codec, params.profile),
                    tables.profile_name(codec, self.max_profile)
                )));
            }
        }
        if params.level != 0 && params.level > self.max_level {
            return Err(unsupported(format!(
                "level {} exceeds maximum {}",
                tables.level_name(codec, params.level),
                tables.level_name(codec, self.max_level)
            )));
        }

        let target = u64::from(params.bitrate_kbps) * 1000;
        if target > self.max_bitrate {
            return Err(unsupported(format!(
                "bitrate {} kbps exceeds maximum {} kbps",
                params.bitrate_kbps,
                self.max_bitrate / 1000
            )));
        }
        if params.rate_control.uses_peak_bitrate()
            && u64::from(params.max_bitrate_kbps) * 1000 > self.max_bitrate
        {
            return Err(unsupported(format!(
                "peak bitrate {} kbps exceeds maximum {} kbps",
                params.max_bitrate_kbps,
                self.max_bitrate / 1000
            )));
        }

        if params.bframes > 0 && self.bframes == Some(false) {
            return Err(unsupported("B-frames not supported"));
        }
        Ok(())
    }
}

fn unsupported(reason: impl Into<String>) -> HwError {
    HwError::UnsupportedConfiguration(reason.into())
}

type CapsCache = RwLock<HashMap<Codec, Option<Arc<CapabilityDescriptor>>>>;

/// Per-codec capabilities of one acceleration context
///
/// Each (codec, direction) is probed at most once; failures are cached as
/// absent so they are not retried.
pub struct CapabilityCatalog {
    backend: Arc<dyn AccelBackend>,
    context: ContextId,
    components: ComponentTable,
    encode: CapsCache,
    decode: CapsCache,
}

impl CapabilityCatalog {
    pub fn new(backend: Arc<dyn AccelBackend>, context: ContextId) -> Self {
        Self {
            backend,
            context,
            components: ComponentTable::new(),
            encode: RwLock::new(HashMap::new()),
            decode: RwLock::new(HashMap::new()),
        }
    }

    pub fn for_context(context: &AccelerationContext) -> HwResult<Self> {
        Ok(Self::new(context.backend().clone(), context.id()?))
    }

    pub fn components(&self) -> &ComponentTable {
        &self.components
    }

    /// Encoder capabilities for `codec`
    ///
    /// The probe creates the component, initializes it with nominal NV12
    /// input (some components report nothing useful before init), reads the
    /// caps and terminates it.
    pub fn encode_caps(&self, codec: Codec) -> Option<Arc<CapabilityDescriptor>> {
        self.cached(&self.encode, codec, Direction::Encode)
    }

    /// Decoder capabilities for `codec`; queried without init
    pub fn decode_caps(&self, codec: Codec) -> Option<Arc<CapabilityDescriptor>> {
        self.cached(&self.decode, codec, Direction::Decode)
    }

    pub fn caps(&self, codec: Codec, direction: Direction) -> Option<Arc<CapabilityDescriptor>> {
        match direction {
            Direction::Encode => self.encode_caps(codec),
            Direction::Decode => self.decode_caps(codec),
        }
    }

    /// Every codec with a component, encoders first
    pub fn all_caps(&self) -> Vec<(Codec, Direction, Option<Arc<CapabilityDescriptor>>)> {
        [Direction::Encode, Direction::Decode]
            .into_iter()
            .flat_map(|direction| {
                self.components
                    .codecs(direction)
                    .into_iter()
                    .map(move |codec| (codec, direction))
            })
            .map(|(codec, direction)| (codec, direction, self.caps(codec, direction)))
            .collect()
    }

    /// Check `params` against the encoder caps of its codec
    pub fn validate(
        &self,
        params: &EncodeParameters,
        tables: &CodecTables,
    ) -> HwResult<Arc<CapabilityDescriptor>> {
        let caps = self.encode_caps(params.codec).ok_or_else(|| {
            unsupported(format!("{} encoder unavailable on this device", params.codec))
        })?;
        caps.validate(params, tables)?;
        Ok(caps)
    }

    fn cached(
        &self,
        cache: &CapsCache,
        codec: Codec,
        direction: Direction,
    ) -> Option<Arc<CapabilityDescriptor>> {
        if let Some(entry) = cache.read().get(&codec) {
            return entry.clone();
        }

        // Holding the write lock across the probe keeps it single-shot
        let mut cache = cache.write();
        cache
            .entry(codec)
            .or_insert_with(|| match self.probe(codec, direction) {
                Ok(caps) => Some(Arc::new(caps)),
                Err(e) => {
                    warn!(%codec, ?direction, error = %e, "Capability query failed");
                    None
                }
            })
            .clone()
    }

    fn probe(&self, codec: Codec, direction: Direction) -> HwResult<CapabilityDescriptor> {
        let id = self
            .components
            .component_id(codec, direction)
            .ok_or_else(|| unsupported(format!("no {:?} component for {}", direction, codec)))?;

        let mut component = self
            .backend
            .create_component(self.context, id)
            .map_err(|s| s.into_error(format!("CreateComponent({})", id)))?;

        let caps = match direction {
            Direction::Encode => component
                .init(SurfaceFormat::Nv12, NOMINAL_WIDTH, NOMINAL_HEIGHT)
                .and_then(|_| component.caps()),
            Direction::Decode => component.caps(),
        };
        if let Err(status) = component.terminate() {
            warn!(%codec, %status, "Probe component terminate failed");
        }

        let caps = caps.map_err(|s| s.into_error(format!("GetCaps({})", id)))?;
        debug!(%codec, ?direction, accel = %caps.accel, "Capabilities probed");
        Ok(caps)
    }
}

impl std::fmt::Debug for CapabilityCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityCatalog")
            .field("context", &self.context)
            .field("encode_cached", &self.encode.read().len())
            .field("decode_cached", &self.decode.read().len())
            .finish()
    }
}
