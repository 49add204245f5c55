// Command line parser
pub mod command_line;
// Error kinds shared by the whole crate
pub mod error;
// Anchors, positions and distance metrics
pub mod geometry;
// RSSI <-> distance conversion (log-distance path loss)
pub mod path_loss;
// Multilateration of the device position from per-anchor distances
pub mod optimization;
// Measurement feed helpers
pub mod measurement;
// Owned context tying the model and the solver together
pub mod session;

pub mod configuration;

pub use error::{LocError, Result};
