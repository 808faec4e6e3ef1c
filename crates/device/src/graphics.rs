//! Graphics device adapter (legacy and modern graphics API)

use std::sync::Arc;

use shared_types::{BindDomain, GraphicsApi, HwError, HwResult};
use tracing::{debug, info, warn};

use crate::{GraphicsDriver, RawHandle, SurfaceSize, VendorSuffixes};

/// An opened graphics device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Adapter ordinal
    pub ordinal: u32,
    /// API the device was created through
    pub api: GraphicsApi,
    /// Native device handle
    pub raw: RawHandle,
    /// Normalized adapter name
    pub name: String,
}

/// Owns at most one graphics device for one graphics API
pub struct GraphicsDeviceAdapter {
    driver: Arc<dyn GraphicsDriver>,
    api: GraphicsApi,
    surface: SurfaceSize,
    names: VendorSuffixes,
    handle: Option<DeviceHandle>,
}

impl GraphicsDeviceAdapter {
    pub fn new(driver: Arc<dyn GraphicsDriver>, api: GraphicsApi) -> Self {
        Self {
            driver,
            api,
            surface: SurfaceSize::default(),
            names: VendorSuffixes::new(),
            handle: None,
        }
    }

    /// Open the device on adapter `ordinal`
    ///
    /// The off-screen surface exists only to obtain a device context and is
    /// never presented.
    pub fn init(&mut self, ordinal: u32, windowless: bool) -> HwResult<DeviceHandle> {
        if self.handle.is_some() {
            return Err(HwError::AlreadyBound(BindDomain::Graphics));
        }

        let count = self
            .driver
            .adapter_count(self.api)
            .map_err(|e| self.unavailable(ordinal, e))?;
        if ordinal >= count {
            return Err(HwError::DeviceUnavailable(format!(
                "{} adapter #{} out of range ({} adapters)",
                self.api, ordinal, count
            )));
        }

        let raw = self
            .driver
            .open_device(self.api, ordinal, self.surface, windowless)
            .map_err(|e| self.unavailable(ordinal, e))?;

        let name = match self.driver.adapter_name(self.api, ordinal) {
            Ok(name) => self.names.normalize(&name),
            Err(e) => {
                debug!(api = %self.api, ordinal, "Adapter name query failed: {}", e);
                format!("device #{}", ordinal)
            }
        };

        info!(api = %self.api, ordinal, name = %name, "Graphics device opened");

        let handle = DeviceHandle {
            ordinal,
            api: self.api,
            raw,
            name,
        };
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    pub fn api(&self) -> GraphicsApi {
        self.api
    }

    pub fn handle(&self) -> Option<&DeviceHandle> {
        self.handle.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    /// Release the device. Safe to call repeatedly or before `init`.
    pub fn terminate(&mut self) -> HwResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        debug!(api = %self.api, ordinal = handle.ordinal, "Releasing graphics device");
        self.driver.close_device(self.api, handle.raw)
    }

    fn unavailable(&self, ordinal: u32, err: HwError) -> HwError {
        HwError::DeviceUnavailable(format!("{} adapter #{}: {}", self.api, ordinal, err))
    }
}

impl Drop for GraphicsDeviceAdapter {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!(api = %self.api, "Failed to release graphics device: {}", e);
        }
    }
}

impl std::fmt::Debug for GraphicsDeviceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDeviceAdapter")
            .field("api", &self.api)
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimGraphicsDriver;

    fn driver() -> Arc<SimGraphicsDriver> {
        Arc::new(SimGraphicsDriver::new([
            "AMD Radeon(TM) RX 7900 XTX Series",
            "AMD Radeon(TM) Graphics",
            "AMD Radeon(TM) RX 6600",
        ]))
    }

    #[test]
    fn test_init_succeeds_for_every_valid_ordinal() {
        let driver = driver();
        for api in [GraphicsApi::Legacy, GraphicsApi::Modern] {
            for ordinal in 0..3 {
                let mut adapter = GraphicsDeviceAdapter::new(driver.clone(), api);
                let handle = adapter.init(ordinal, true).unwrap();
                assert_eq!(handle.ordinal, ordinal);
                assert_eq!(handle.api, api);
                assert!(adapter.is_valid());
            }
        }
        assert_eq!(driver.open_count(), 6);
        assert_eq!(driver.close_count(), 6);
    }

    #[test]
    fn test_name_is_normalized() {
        let mut adapter = GraphicsDeviceAdapter::new(driver(), GraphicsApi::Modern);
        let handle = adapter.init(0, true).unwrap();
        assert_eq!(handle.name, "AMD Radeon RX 7900 XTX");
    }

    #[test]
    fn test_out_of_range_ordinal() {
        let mut adapter = GraphicsDeviceAdapter::new(driver(), GraphicsApi::Modern);
        assert!(matches!(
            adapter.init(3, true),
            Err(HwError::DeviceUnavailable(_))
        ));
        assert!(!adapter.is_valid());
    }

    #[test]
    fn test_driver_rejection_is_unavailable() {
        let driver = Arc::new(SimGraphicsDriver::new(["GPU"]).fail_api(GraphicsApi::Legacy));
        let mut adapter = GraphicsDeviceAdapter::new(driver, GraphicsApi::Legacy);
        assert!(matches!(
            adapter.init(0, true),
            Err(HwError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let driver = driver();
        let mut adapter = GraphicsDeviceAdapter::new(driver.clone(), GraphicsApi::Modern);
        adapter.terminate().unwrap();

        adapter.init(1, true).unwrap();
        adapter.terminate().unwrap();
        adapter.terminate().unwrap();
        drop(adapter);

        assert_eq!(driver.close_count(), 1);
        assert_eq!(driver.live_devices(), 0);
    }

    #[test]
    fn test_double_init_rejected() {
        let mut adapter = GraphicsDeviceAdapter::new(driver(), GraphicsApi::Modern);
        adapter.init(0, true).unwrap();
        assert!(matches!(
            adapter.init(0, true),
            Err(HwError::AlreadyBound(BindDomain::Graphics))
        ));
    }
}
