//! Hardware Encoder - acceleration context and codec capabilities
//!
//! Provides abstraction over the hardware acceleration backend:
//! - Backend/component traits (context creation, submit/query primitives)
//! - Acceleration context binding graphics and compute devices
//! - Memoized per-codec capability catalog and its text report
//! - A simulated backend for machines without the hardware

mod caps;
mod components;
mod context;
mod report;
pub mod sim;
mod traits;

pub use caps::*;
pub use components::*;
pub use context::*;
pub use report::*;
pub use traits::*;
