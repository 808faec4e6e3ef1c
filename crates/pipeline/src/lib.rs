//! Encode pipeline driver
//!
//! Binds devices, validates parameters against the device's capabilities,
//! then pumps frames from a source through the encoder into a sink.

mod driver;
mod io;
mod stats;

pub use driver::*;
pub use io::*;
pub use stats::*;
