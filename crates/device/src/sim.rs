//! Simulated graphics driver and compute runtime
//!
//! Used on machines without the hardware and by tests. Both keep a ledger
//! of every call so callers can check acquisition and release counts.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use shared_types::{BackendStatus, GraphicsApi, HwError, HwResult};

use crate::{
    ComputeDeviceInfo, ComputeRuntime, DeviceHandle, GraphicsDriver, Platform, RawHandle,
    SurfaceSize,
};

#[derive(Debug, Default)]
struct GraphicsLedger {
    opens: HashMap<GraphicsApi, usize>,
    closes: usize,
    live: HashSet<RawHandle>,
    last_surface: Option<SurfaceSize>,
}

/// Graphics driver exposing a fixed adapter list on both APIs
pub struct SimGraphicsDriver {
    adapters: Vec<String>,
    failing: HashSet<GraphicsApi>,
    next_handle: AtomicU64,
    ledger: Mutex<GraphicsLedger>,
}

impl SimGraphicsDriver {
    pub fn new<S: Into<String>>(adapters: impl IntoIterator<Item = S>) -> Self {
        Self {
            adapters: adapters.into_iter().map(Into::into).collect(),
            failing: HashSet::new(),
            next_handle: AtomicU64::new(0x1000),
            ledger: Mutex::new(GraphicsLedger::default()),
        }
    }

    /// Make every `open_device` call on `api` fail
    pub fn fail_api(mut self, api: GraphicsApi) -> Self {
        self.failing.insert(api);
        self
    }

    pub fn open_count(&self) -> usize {
        self.ledger.lock().opens.values().sum()
    }

    pub fn open_count_for(&self, api: GraphicsApi) -> usize {
        self.ledger.lock().opens.get(&api).copied().unwrap_or(0)
    }

    pub fn close_count(&self) -> usize {
        self.ledger.lock().closes
    }

    pub fn live_devices(&self) -> usize {
        self.ledger.lock().live.len()
    }

    pub fn last_surface(&self) -> Option<SurfaceSize> {
        self.ledger.lock().last_surface
    }
}

impl GraphicsDriver for SimGraphicsDriver {
    fn adapter_count(&self, _api: GraphicsApi) -> HwResult<u32> {
        Ok(self.adapters.len() as u32)
    }

    fn open_device(
        &self,
        api: GraphicsApi,
        _ordinal: u32,
        surface: SurfaceSize,
        _windowless: bool,
    ) -> HwResult<RawHandle> {
        if self.failing.contains(&api) {
            return Err(HwError::backend(
                BackendStatus::DirectxFailed,
                format!("{} device creation", api),
            ));
        }
        let handle = RawHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut ledger = self.ledger.lock();
        *ledger.opens.entry(api).or_default() += 1;
        ledger.live.insert(handle);
        ledger.last_surface = Some(surface);
        Ok(handle)
    }

    fn adapter_name(&self, _api: GraphicsApi, ordinal: u32) -> HwResult<String> {
        self.adapters
            .get(ordinal as usize)
            .cloned()
            .ok_or_else(|| HwError::DeviceUnavailable(format!("adapter #{}", ordinal)))
    }

    fn close_device(&self, api: GraphicsApi, device: RawHandle) -> HwResult<()> {
        let mut ledger = self.ledger.lock();
        if !ledger.live.remove(&device) {
            return Err(HwError::backend(
                BackendStatus::InvalidPointer,
                format!("{} device {:#x} is not open", api, device.0),
            ));
        }
        ledger.closes += 1;
        Ok(())
    }
}

struct SimPlatform {
    platform: Platform,
    devices: Vec<(ComputeDeviceInfo, bool)>,
}

#[derive(Debug, Default)]
struct ComputeLedger {
    platform_queries: usize,
    queues_created: usize,
    live: HashSet<RawHandle>,
    last_interop: Option<GraphicsApi>,
}

/// Compute runtime with one platform of GPU devices
pub struct SimComputeRuntime {
    platforms: Vec<SimPlatform>,
    fail_queue: bool,
    next_handle: AtomicU64,
    ledger: Mutex<ComputeLedger>,
}

impl SimComputeRuntime {
    /// One platform from `vendor` with the given devices, all interop-capable
    pub fn new<S: Into<String>>(vendor: &str, devices: impl IntoIterator<Item = S>) -> Self {
        let next_handle = AtomicU64::new(0x2000);
        let platform = Platform {
            handle: RawHandle(next_handle.fetch_add(1, Ordering::Relaxed)),
            name: format!("{} Accelerated Parallel Processing", vendor),
            vendor: format!("{} Inc.", vendor),
        };
        let devices = devices
            .into_iter()
            .map(|name| {
                let info = ComputeDeviceInfo {
                    handle: RawHandle(next_handle.fetch_add(1, Ordering::Relaxed)),
                    name: name.into(),
                    compute_units: 48,
                    max_clock_mhz: 2500,
                };
                (info, true)
            })
            .collect();
        Self {
            platforms: vec![SimPlatform { platform, devices }],
            fail_queue: false,
            next_handle,
            ledger: Mutex::new(ComputeLedger::default()),
        }
    }

    pub fn without_platforms() -> Self {
        Self {
            platforms: Vec::new(),
            fail_queue: false,
            next_handle: AtomicU64::new(0x2000),
            ledger: Mutex::new(ComputeLedger::default()),
        }
    }

    /// Mark device `index` as (in)compatible with graphics interop
    pub fn interop_capable(mut self, index: usize, capable: bool) -> Self {
        if let Some(platform) = self.platforms.first_mut() {
            if let Some(device) = platform.devices.get_mut(index) {
                device.1 = capable;
            }
        }
        self
    }

    /// Make queue creation fail
    pub fn fail_queue_creation(mut self) -> Self {
        self.fail_queue = true;
        self
    }

    pub fn platform_queries(&self) -> usize {
        self.ledger.lock().platform_queries
    }

    pub fn queues_created(&self) -> usize {
        self.ledger.lock().queues_created
    }

    pub fn live_queues(&self) -> usize {
        self.ledger.lock().live.len()
    }

    /// Graphics API the most recent queue was created for
    pub fn last_interop(&self) -> Option<GraphicsApi> {
        self.ledger.lock().last_interop
    }
}

impl ComputeRuntime for SimComputeRuntime {
    fn platforms(&self, vendor: &str) -> HwResult<Vec<Platform>> {
        self.ledger.lock().platform_queries += 1;
        let vendor = vendor.to_ascii_lowercase();
        Ok(self
            .platforms
            .iter()
            .filter(|p| p.platform.vendor.to_ascii_lowercase().contains(&vendor))
            .map(|p| p.platform.clone())
            .collect())
    }

    fn devices(
        &self,
        platform: &Platform,
        interop: Option<&DeviceHandle>,
    ) -> HwResult<Vec<ComputeDeviceInfo>> {
        let sim = self
            .platforms
            .iter()
            .find(|p| p.platform.handle == platform.handle)
            .ok_or_else(|| HwError::backend(BackendStatus::NotFound, "unknown platform"))?;
        Ok(sim
            .devices
            .iter()
            .filter(|(_, capable)| interop.is_none() || *capable)
            .map(|(info, _)| info.clone())
            .collect())
    }

    fn create_queue(
        &self,
        _platform: &Platform,
        _device: &ComputeDeviceInfo,
        interop: Option<&DeviceHandle>,
    ) -> HwResult<RawHandle> {
        if self.fail_queue {
            return Err(HwError::backend(
                BackendStatus::OpenclFailed,
                "compute context creation",
            ));
        }
        let queue = RawHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut ledger = self.ledger.lock();
        ledger.queues_created += 1;
        ledger.live.insert(queue);
        ledger.last_interop = interop.map(|g| g.api);
        Ok(queue)
    }

    fn release_queue(&self, queue: RawHandle) -> HwResult<()> {
        if self.ledger.lock().live.remove(&queue) {
            Ok(())
        } else {
            Err(HwError::backend(
                BackendStatus::InvalidPointer,
                format!("queue {:#x} is not live", queue.0),
            ))
        }
    }
}
