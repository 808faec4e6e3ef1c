//! Driver and runtime trait abstractions

use shared_types::{GraphicsApi, HwResult};

use crate::DeviceHandle;

/// Opaque native handle (device pointer, queue, context)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub u64);

/// Size of the off-screen surface used to obtain a device context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl Default for SurfaceSize {
    fn default() -> Self {
        Self {
            width: shared_types::NOMINAL_WIDTH,
            height: shared_types::NOMINAL_HEIGHT,
        }
    }
}

/// Platform graphics driver
pub trait GraphicsDriver: Send + Sync {
    /// Number of adapters exposed through `api`
    fn adapter_count(&self, api: GraphicsApi) -> HwResult<u32>;

    /// Create a device on adapter `ordinal` with an off-screen surface
    fn open_device(
        &self,
        api: GraphicsApi,
        ordinal: u32,
        surface: SurfaceSize,
        windowless: bool,
    ) -> HwResult<RawHandle>;

    /// Display name of adapter `ordinal` as reported by the driver
    fn adapter_name(&self, api: GraphicsApi, ordinal: u32) -> HwResult<String>;

    /// Release a device returned by `open_device`
    fn close_device(&self, api: GraphicsApi, device: RawHandle) -> HwResult<()>;
}

/// Compute platform as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub handle: RawHandle,
    pub name: String,
    pub vendor: String,
}

/// Compute device as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeDeviceInfo {
    pub handle: RawHandle,
    pub name: String,
    pub compute_units: u32,
    pub max_clock_mhz: u32,
}

impl ComputeDeviceInfo {
    /// One-line device summary
    pub fn info_string(&self) -> String {
        format!(
            "{} ({} CU @ {} MHz)",
            self.name, self.compute_units, self.max_clock_mhz
        )
    }
}

/// General-purpose compute runtime
pub trait ComputeRuntime: Send + Sync {
    /// Platforms whose vendor string contains `vendor`, in runtime order
    fn platforms(&self, vendor: &str) -> HwResult<Vec<Platform>>;

    /// GPU devices of `platform`; with `interop` set, only devices that can
    /// share resources with that graphics device
    fn devices(
        &self,
        platform: &Platform,
        interop: Option<&DeviceHandle>,
    ) -> HwResult<Vec<ComputeDeviceInfo>>;

    /// Create a compute context and command queue on `device`
    fn create_queue(
        &self,
        platform: &Platform,
        device: &ComputeDeviceInfo,
        interop: Option<&DeviceHandle>,
    ) -> HwResult<RawHandle>;

    /// Release a queue returned by `create_queue` along with its context
    fn release_queue(&self, queue: RawHandle) -> HwResult<()>;
}
