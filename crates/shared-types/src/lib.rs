//! Shared Types for the VCE encode pipeline
//!
//! This crate contains the codec enums, encode parameters, configuration
//! surface, pipeline state and error taxonomy shared by the device, encoder
//! and pipeline crates.

mod codec;
mod config;
mod error;
mod params;
mod state;
mod status;

pub use codec::*;
pub use config::*;
pub use error::*;
pub use params::*;
pub use state::*;
pub use status::*;

/// Width of the nominal surface used for capability probes and off-screen
/// device contexts
pub const NOMINAL_WIDTH: u32 = 1280;

/// Height of the nominal surface used for capability probes and off-screen
/// device contexts
pub const NOMINAL_HEIGHT: u32 = 720;
