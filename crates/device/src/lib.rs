//! GPU Devices - graphics and compute device acquisition
//!
//! Provides adapters over the platform graphics driver and compute runtime:
//! - Graphics devices (legacy and modern graphics API) for surface interop
//! - Compute devices, optionally filtered for interop with a graphics device
//! - A simulated driver/runtime pair for machines without the hardware

mod compute;
mod graphics;
mod naming;
pub mod sim;
mod traits;

pub use compute::*;
pub use graphics::*;
pub use naming::*;
pub use traits::*;
