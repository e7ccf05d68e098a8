//! Protocol implementation module
//!
//! This module defines the OSC message model, its binary encoding,
//! address dispatch and the single-peer session state machine.

pub mod codec;
pub mod dispatch;
pub mod message;
pub mod state;

pub use self::codec::{decode, encode, MessageCodec};
pub use self::dispatch::{DispatchTable, Handler};
pub use self::message::{Argument, DiscoveryAck, Heartbeat, Message};
pub use self::state::{InboundOutcome, Session, SessionConfig, SessionInfo, SessionState};
