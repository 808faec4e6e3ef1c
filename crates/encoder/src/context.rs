//! Acceleration context and the device binding plan

use std::sync::Arc;

use device::{
    ComputeDevice, ComputeDeviceAdapter, ComputeRuntime, DeviceHandle, GraphicsDeviceAdapter,
    GraphicsDriver, RawHandle,
};
use shared_types::{
    BackendStatus, BindDomain, DeviceConfig, GraphicsApi, HwError, HwResult, InteropMode,
};
use tracing::{debug, info, warn};

use crate::{AccelBackend, ContextId};

/// How the compute device is selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeSelection {
    /// First device that can share surfaces with this graphics API
    InteropWith(GraphicsApi),
    /// Device at the configured ordinal, no interop filter
    ByOrdinal,
}

/// One step of the binding sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStep {
    Graphics(GraphicsApi),
    Compute(ComputeSelection),
}

/// Ordered device binding sequence derived from the interop mode
///
/// Exactly one graphics API is bound per plan. Compute-only mode still binds
/// the modern graphics device and picks the compute device by ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindPlan {
    mode: InteropMode,
    steps: Vec<BindStep>,
}

impl BindPlan {
    pub fn for_mode(mode: InteropMode) -> Self {
        let steps = match mode.interop_api() {
            Some(api) => vec![
                BindStep::Graphics(api),
                BindStep::Compute(ComputeSelection::InteropWith(api)),
            ],
            None => vec![
                BindStep::Graphics(GraphicsApi::Modern),
                BindStep::Compute(ComputeSelection::ByOrdinal),
            ],
        };
        Self { mode, steps }
    }

    pub fn from_config(device: &DeviceConfig) -> HwResult<Self> {
        Ok(Self::for_mode(device.interop_mode()?))
    }

    pub fn mode(&self) -> InteropMode {
        self.mode
    }

    pub fn steps(&self) -> &[BindStep] {
        &self.steps
    }

    /// Graphics APIs this plan opens, in order
    pub fn graphics_apis(&self) -> impl Iterator<Item = GraphicsApi> + '_ {
        self.steps.iter().filter_map(|step| match step {
            BindStep::Graphics(api) => Some(*api),
            BindStep::Compute(_) => None,
        })
    }
}

/// Devices opened for one pipeline, in acquisition order
pub struct DeviceSet {
    graphics: Vec<GraphicsDeviceAdapter>,
    compute: ComputeDeviceAdapter,
}

impl DeviceSet {
    /// Open every device `plan` names
    ///
    /// A graphics failure aborts with `DeviceLost`. Devices opened before a
    /// failure are released when the partial set drops.
    pub fn acquire(
        driver: Arc<dyn GraphicsDriver>,
        runtime: Arc<dyn ComputeRuntime>,
        plan: &BindPlan,
        config: &DeviceConfig,
    ) -> HwResult<Self> {
        let mut set = Self {
            graphics: Vec::new(),
            compute: ComputeDeviceAdapter::new(runtime),
        };

        for step in plan.steps() {
            match *step {
                BindStep::Graphics(api) => {
                    let mut adapter = GraphicsDeviceAdapter::new(driver.clone(), api);
                    adapter
                        .init(config.ordinal, config.windowless)
                        .map_err(|e| HwError::DeviceLost(format!("{} init failed: {}", api, e)))?;
                    set.graphics.push(adapter);
                }
                BindStep::Compute(selection) => {
                    let graphics = match selection {
                        ComputeSelection::InteropWith(api) => Some(
                            set.graphics_handle(api)
                                .cloned()
                                .ok_or_else(|| {
                                    HwError::DeviceUnavailable(format!(
                                        "no {} device to interoperate with",
                                        api
                                    ))
                                })?,
                        ),
                        ComputeSelection::ByOrdinal => None,
                    };
                    set.compute
                        .acquire(&config.vendor, graphics.as_ref(), config.ordinal)?;
                }
            }
        }

        info!(device = %set.device_name(), mode = ?plan.mode(), "Devices acquired");
        Ok(set)
    }

    pub fn graphics_handle(&self, api: GraphicsApi) -> Option<&DeviceHandle> {
        self.graphics
            .iter()
            .find(|g| g.api() == api)
            .and_then(|g| g.handle())
    }

    pub fn compute(&self) -> Option<&ComputeDevice> {
        self.compute.device()
    }

    /// Human-readable name of the bound device
    ///
    /// The modern graphics adapter name when one is open, otherwise any
    /// graphics adapter, otherwise the compute device info string.
    pub fn device_name(&self) -> String {
        if let Some(handle) = self
            .graphics_handle(GraphicsApi::Modern)
            .or_else(|| self.graphics.iter().find_map(|g| g.handle()))
        {
            return handle.name.clone();
        }
        self.compute
            .device()
            .map(|d| d.info.info_string())
            .unwrap_or_else(|| "no device".to_string())
    }

    /// Release compute first, then graphics in reverse acquisition order
    ///
    /// Every release is attempted; errors are returned, not propagated.
    pub fn release(&mut self) -> Vec<HwError> {
        let mut errors = Vec::new();
        if let Err(e) = self.compute.release() {
            errors.push(e);
        }
        while let Some(mut adapter) = self.graphics.pop() {
            if let Err(e) = adapter.terminate() {
                errors.push(e);
            }
        }
        errors
    }
}

impl Drop for DeviceSet {
    fn drop(&mut self) {
        for e in self.release() {
            warn!(error = %e, "Device release failed on drop");
        }
    }
}

impl std::fmt::Debug for DeviceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSet")
            .field("graphics", &self.graphics)
            .field("compute", &self.compute.device())
            .finish()
    }
}

/// Backend execution context with at most one graphics and one compute
/// device attached
pub struct AccelerationContext {
    backend: Arc<dyn AccelBackend>,
    id: Option<ContextId>,
    graphics: Option<GraphicsApi>,
    compute: Option<RawHandle>,
}

impl AccelerationContext {
    pub fn create(backend: Arc<dyn AccelBackend>) -> HwResult<Self> {
        let id = backend
            .create_context()
            .map_err(|s| s.into_error("CreateContext"))?;
        debug!(context = id.0, "Acceleration context created");
        Ok(Self {
            backend,
            id: Some(id),
            graphics: None,
            compute: None,
        })
    }

    pub fn id(&self) -> HwResult<ContextId> {
        self.id.ok_or_else(|| {
            HwError::DeviceUnavailable("acceleration context already released".to_string())
        })
    }

    pub fn backend(&self) -> &Arc<dyn AccelBackend> {
        &self.backend
    }

    pub fn bind_graphics(&mut self, device: &DeviceHandle) -> HwResult<()> {
        if self.graphics.is_some() {
            return Err(HwError::AlreadyBound(BindDomain::Graphics));
        }
        let id = self.id()?;
        self.backend
            .init_graphics(id, device)
            .map_err(|s| bind_lost(s, format!("Init{}", device.api.name())))?;
        self.graphics = Some(device.api);
        info!(context = id.0, api = %device.api, "Graphics device bound to context");
        Ok(())
    }

    pub fn bind_compute(&mut self, device: &ComputeDevice) -> HwResult<()> {
        if self.compute.is_some() {
            return Err(HwError::AlreadyBound(BindDomain::Compute));
        }
        let id = self.id()?;
        self.backend
            .init_compute(id, device.queue)
            .map_err(|s| bind_lost(s, "InitOpenCL"))?;
        self.compute = Some(device.queue);
        info!(context = id.0, device = %device.info.name, "Compute device bound to context");
        Ok(())
    }

    /// Attach the devices of `set` in `plan` order
    pub fn bind(&mut self, plan: &BindPlan, set: &DeviceSet) -> HwResult<()> {
        for step in plan.steps() {
            match *step {
                BindStep::Graphics(api) => {
                    let handle = set.graphics_handle(api).ok_or_else(|| {
                        HwError::DeviceUnavailable(format!("{} device not acquired", api))
                    })?;
                    self.bind_graphics(handle)?;
                }
                BindStep::Compute(_) => {
                    let device = set.compute().ok_or_else(|| {
                        HwError::DeviceUnavailable("compute device not acquired".to_string())
                    })?;
                    self.bind_compute(device)?;
                }
            }
        }
        Ok(())
    }

    pub fn graphics_api(&self) -> Option<GraphicsApi> {
        self.graphics
    }

    pub fn has_compute(&self) -> bool {
        self.compute.is_some()
    }

    /// Release the context. Safe to call repeatedly.
    pub fn release(&mut self) -> HwResult<()> {
        let Some(id) = self.id.take() else {
            return Ok(());
        };
        self.graphics = None;
        self.compute = None;
        debug!(context = id.0, "Releasing acceleration context");
        self.backend
            .release_context(id)
            .map_err(|s| s.into_error("Terminate"))
    }
}

/// A device that opened but could not be attached to the context is lost,
/// whatever status the backend gave
fn bind_lost(status: BackendStatus, step: impl Into<String>) -> HwError {
    HwError::DeviceLost(format!("{}: {}", step.into(), status.name()))
}

impl Drop for AccelerationContext {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "Context release failed on drop");
        }
    }
}

impl std::fmt::Debug for AccelerationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccelerationContext")
            .field("id", &self.id)
            .field("graphics", &self.graphics)
            .field("compute", &self.compute)
            .finish()
    }
}
