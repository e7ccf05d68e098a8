//! Core types and constants for the actuator firmware
//!
//! This module contains the error taxonomy and the boot-time configuration
//! shared by the protocol, device and network layers.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{ChannelError, Error, ProtocolError, Result};
pub use self::types::{AddressMap, Config, DeviceId, Level};

/// Default UDP port the device listens on
pub const DEFAULT_PORT: u16 = 8888;

/// Controllers listen one port above the port they send from
pub const DEFAULT_REPLY_PORT_OFFSET: u16 = 1;

/// Highest drive level a channel accepts
pub const MAX_LEVEL: u8 = u8::MAX;

/// Default number of output channels
pub const DEFAULT_CHANNEL_COUNT: usize = 2;

/// Upper bound on configurable channels
pub const MAX_CHANNELS: usize = 64;

/// Maximum datagram size in bytes
pub const MAX_PACKET_SIZE: usize = 1536;
