//! Acceleration backend trait abstraction

use bytes::Bytes;
use device::{DeviceHandle, RawHandle};
use shared_types::{BackendStatus, EncodeParameters, PicStruct, SurfaceFormat};

use crate::CapabilityDescriptor;

/// Result of a raw backend call
pub type BackendResult<T> = Result<T, BackendStatus>;

/// Backend execution context identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

/// Raw frame handed to the encoder
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Pixel data
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: SurfaceFormat,
    /// Presentation timestamp in stream time units
    pub pts: i64,
    pub pic_struct: PicStruct,
    /// Submission sequence, assigned by the pipeline driver
    pub sequence: u64,
}

/// Encoded bitstream packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    pub data: Bytes,
    pub pts: i64,
    /// Submission sequence of the frame this packet encodes
    pub sequence: u64,
    pub keyframe: bool,
}

/// Outcome of `Component::submit_input`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Frame taken
    Accepted,
    /// Queue full; resubmit the same frame after pulling output
    InputFull,
    /// Frame taken but more input is needed before output appears
    NeedMoreInput,
}

/// Outcome of `Component::query_output`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputStatus {
    Packet(EncodedPacket),
    /// Nothing ready yet
    Repeat,
    /// Drained; no more output will follow
    Eof,
}

/// Acceleration backend (the hardware SDK)
pub trait AccelBackend: Send + Sync {
    /// Create a new execution context
    fn create_context(&self) -> BackendResult<ContextId>;

    /// Attach a graphics device to the context
    fn init_graphics(&self, context: ContextId, device: &DeviceHandle) -> BackendResult<()>;

    /// Attach a compute command queue to the context
    fn init_compute(&self, context: ContextId, queue: RawHandle) -> BackendResult<()>;

    /// Instantiate a codec component by its backend identifier
    fn create_component(
        &self,
        context: ContextId,
        component_id: &str,
    ) -> BackendResult<Box<dyn Component>>;

    /// Release the context
    fn release_context(&self, context: ContextId) -> BackendResult<()>;
}

/// Codec component created inside a context
pub trait Component: Send {
    /// Push encoder parameters; must precede `init`
    fn set_params(&mut self, params: &EncodeParameters) -> BackendResult<()>;

    /// Initialize for the given input format and size
    fn init(&mut self, format: SurfaceFormat, width: u32, height: u32) -> BackendResult<()>;

    /// Query the component's capabilities
    fn caps(&self) -> BackendResult<CapabilityDescriptor>;

    /// Submit one frame
    fn submit_input(&mut self, frame: &RawFrame) -> BackendResult<SubmitStatus>;

    /// Poll for the next completed packet
    fn query_output(&mut self) -> BackendResult<OutputStatus>;

    /// Signal end of input and flush buffered frames
    fn drain(&mut self) -> BackendResult<()>;

    /// Release the component
    fn terminate(&mut self) -> BackendResult<()>;
}
