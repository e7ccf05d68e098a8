//! oscbuzz: control core for a network-addressable multi-channel actuator
//!
//! The device receives OSC messages over UDP, drives a fixed bank of output
//! channels from them, and keeps a liveness session with a single controller
//! so that outputs always fall back to idle when the controller goes quiet.
//!
//! - [`protocol`]: OSC codec, address dispatch and the session state machine
//! - [`device`]: channel bank, heartbeat/discovery emitter and the control loop
//! - [`network`]: tokio UDP front end driving the control loop

pub mod core;
pub mod device;
pub mod network;
pub mod protocol;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Config, Error, Result};
pub use crate::device::Device;
pub use crate::network::DeviceServer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
