//! Compute device adapter

use std::sync::Arc;

use shared_types::{BindDomain, GraphicsApi, HwError, HwResult};
use tracing::{debug, info, warn};

use crate::{ComputeDeviceInfo, ComputeRuntime, DeviceHandle, Platform, RawHandle};

/// A compute device with its context and command queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeDevice {
    pub platform: Platform,
    pub info: ComputeDeviceInfo,
    /// Command queue, valid until the adapter releases it
    pub queue: RawHandle,
    /// Graphics API the device was bound to for interop
    pub interop: Option<GraphicsApi>,
}

/// Enumerates compute platforms and owns at most one bound device
pub struct ComputeDeviceAdapter {
    runtime: Arc<dyn ComputeRuntime>,
    device: Option<ComputeDevice>,
}

impl ComputeDeviceAdapter {
    pub fn new(runtime: Arc<dyn ComputeRuntime>) -> Self {
        Self {
            runtime,
            device: None,
        }
    }

    /// Platforms matching `vendor`, in runtime order. Each call is a fresh
    /// enumeration.
    pub fn enumerate_platforms(&self, vendor: &str) -> HwResult<std::vec::IntoIter<Platform>> {
        let platforms = self.runtime.platforms(vendor)?;
        debug!(vendor, count = platforms.len(), "Enumerated compute platforms");
        Ok(platforms.into_iter())
    }

    /// Bind a device of `platform`
    ///
    /// With a graphics device the first interop-compatible device wins and
    /// `ordinal` is ignored; without one, `ordinal` indexes the full list.
    pub fn bind_device(
        &mut self,
        platform: &Platform,
        graphics: Option<&DeviceHandle>,
        ordinal: u32,
    ) -> HwResult<&ComputeDevice> {
        if self.device.is_some() {
            return Err(HwError::AlreadyBound(BindDomain::Compute));
        }

        let devices = self.runtime.devices(platform, graphics).map_err(|e| {
            HwError::DeviceUnavailable(format!("{}: device query failed: {}", platform.name, e))
        })?;
        if devices.is_empty() {
            return Err(HwError::DeviceUnavailable(match graphics {
                Some(g) => format!("{}: no device compatible with {}", platform.name, g.api),
                None => format!("{}: no GPU devices", platform.name),
            }));
        }

        let index = if graphics.is_some() { 0 } else { ordinal as usize };
        let info = devices.get(index).cloned().ok_or_else(|| {
            HwError::DeviceUnavailable(format!(
                "{}: device #{} out of range ({} devices)",
                platform.name,
                ordinal,
                devices.len()
            ))
        })?;

        let queue = self.runtime.create_queue(platform, &info, graphics)?;

        info!(
            platform = %platform.name,
            device = %info.name,
            interop = ?graphics.map(|g| g.api),
            "Compute device bound"
        );

        Ok(self.device.insert(ComputeDevice {
            platform: platform.clone(),
            info,
            queue,
            interop: graphics.map(|g| g.api),
        }))
    }

    /// Bind a device on the first platform matching `vendor`
    pub fn acquire(
        &mut self,
        vendor: &str,
        graphics: Option<&DeviceHandle>,
        ordinal: u32,
    ) -> HwResult<&ComputeDevice> {
        let platform = self.enumerate_platforms(vendor)?.next().ok_or_else(|| {
            HwError::DeviceUnavailable(format!("no compute platform for vendor '{}'", vendor))
        })?;
        self.bind_device(&platform, graphics, ordinal)
    }

    pub fn device(&self) -> Option<&ComputeDevice> {
        self.device.as_ref()
    }

    /// Release the queue and context. Safe to call repeatedly.
    pub fn release(&mut self) -> HwResult<()> {
        let Some(device) = self.device.take() else {
            return Ok(());
        };
        debug!(device = %device.info.name, "Releasing compute device");
        self.runtime.release_queue(device.queue)
    }
}

impl Drop for ComputeDeviceAdapter {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release compute device: {}", e);
        }
    }
}

impl std::fmt::Debug for ComputeDeviceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeDeviceAdapter")
            .field("device", &self.device)
            .finish()
    }
}
