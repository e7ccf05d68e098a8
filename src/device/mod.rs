//! Device control loop
//!
//! [`Device`] owns every piece of mutable firmware state: the channel bank,
//! the session, the dispatch table and the emitter. It is driven from one
//! thread through three calls:
//!
//! 1. [`Device::feed_datagram`] for each inbound packet
//! 2. [`Device::tick`] once per loop iteration (heartbeat, then liveness)
//! 3. [`Device::step`], which does both in the required order
//!
//! Every handler runs to completion inside `feed_datagram`, so the liveness
//! check in `tick` never observes a half-applied motor command.
//!
//! # Examples
//!
//! ```
//! use oscbuzz::core::Config;
//! use oscbuzz::device::{Device, NullDriver};
//! use oscbuzz::protocol::{encode, Message};
//! use std::time::{Duration, Instant};
//!
//! let (tx, _rx) = tokio::sync::mpsc::channel(8);
//! let mut device = Device::new(Config::default(), NullDriver, tx).unwrap();
//!
//! let t0 = Instant::now();
//! let packet = encode(&Message::new("/m").arg(100).arg(50));
//! device.step(Some((&packet[..], "10.0.0.2:9000".parse().unwrap())), t0);
//! assert_eq!(device.channels().level(0).unwrap().value(), 100);
//!
//! device.tick(t0 + Duration::from_millis(1300));
//! assert!(device.channels().all_idle());
//! ```

mod channels;
mod emitter;

pub use self::channels::{ChannelBank, OutputDriver, NullDriver};
pub use self::emitter::{Emitter, Telemetry, TelemetryProvider};

#[cfg(test)]
pub(crate) use self::channels::test_driver;

use std::net::SocketAddr;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::core::{ChannelError, Config, Error, ProtocolError, Result};
use crate::protocol::{self, DispatchTable, Message, Session, SessionConfig};

/// Counters for everything the loop absorbed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Datagrams fed to the device
    pub received: u64,
    /// Datagrams that failed to decode
    pub malformed: u64,
    /// Messages that hit a registered handler
    pub dispatched: u64,
    /// Well-formed messages on unknown addresses
    pub unhandled: u64,
    /// Motor command values that could not be applied
    pub dropped_values: u64,
    /// Discovery acknowledgements queued
    pub acks_sent: u64,
    /// Heartbeats queued
    pub heartbeats_sent: u64,
    /// Outbound messages that could not be queued or addressed
    pub send_failures: u64,
    /// Liveness timeouts that idled the outputs
    pub timeouts: u64,
}

/// State the dispatch handlers are allowed to touch
#[derive(Debug)]
pub struct Actuation {
    channels: ChannelBank,
    discovery_requested: bool,
    dropped_values: u64,
}

impl Actuation {
    /// The channel bank
    pub fn channels(&self) -> &ChannelBank {
        &self.channels
    }

    /// Mutable channel bank, for handlers that drive outputs
    pub fn channels_mut(&mut self) -> &mut ChannelBank {
        &mut self.channels
    }
}

/// Applies one motor command: argument `i` drives channel `i`.
///
/// Values past the last channel and non-numeric values are dropped one by
/// one; the rest of the message still applies.
pub fn apply_motor_command(message: &Message, ctx: &mut Actuation) {
    for (index, argument) in message.arguments.iter().enumerate() {
        let Some(raw) = argument.as_int() else {
            debug!(index, ?argument, "Ignoring non-numeric motor value");
            ctx.dropped_values += 1;
            continue;
        };
        match ctx.channels.set_channel(index, raw) {
            Ok(level) => trace!(index, level = level.value(), "Channel set"),
            Err(ChannelError::OutOfRange { index, count }) => {
                debug!(index, count, "Ignoring motor value beyond configured channels");
                ctx.dropped_values += 1;
            }
        }
    }
}

fn note_discovery(_: &Message, ctx: &mut Actuation) {
    ctx.discovery_requested = true;
}

/// The firmware core: one owned context for all device state
pub struct Device {
    config: Config,
    table: DispatchTable<Actuation>,
    actuation: Actuation,
    session: Session,
    emitter: Emitter,
    stats: DeviceStats,
}

impl Device {
    /// Boots a device now; see [`Device::booted_at`]
    pub fn new(
        config: Config,
        driver: impl OutputDriver + 'static,
        outbound: mpsc::Sender<(Message, SocketAddr)>,
    ) -> Result<Self> {
        Self::booted_at(config, driver, outbound, Instant::now())
    }

    /// Boots a device whose uptime counts from `boot`.
    ///
    /// Validates the config, idles every output and registers the motor and
    /// discovery handlers.
    pub fn booted_at(
        config: Config,
        driver: impl OutputDriver + 'static,
        outbound: mpsc::Sender<(Message, SocketAddr)>,
        boot: Instant,
    ) -> Result<Self> {
        config.validate()?;

        let mut table: DispatchTable<Actuation> = DispatchTable::new();
        table.register(config.addresses.actuation.clone(), apply_motor_command);
        table.register(config.addresses.discover.clone(), note_discovery);

        let actuation = Actuation {
            channels: ChannelBank::new(config.channel_count, driver),
            discovery_requested: false,
            dropped_values: 0,
        };

        let session = Session::new(SessionConfig::from(&config));
        let emitter = Emitter::new(&config, boot, outbound);

        debug!(
            device_id = %config.device_id,
            channels = config.channel_count,
            timeout_ms = config.liveness_timeout.as_millis() as u64,
            "Device booted"
        );

        Ok(Device {
            config,
            table,
            actuation,
            session,
            emitter,
            stats: DeviceStats::default(),
        })
    }

    /// Boot configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Output channels
    pub fn channels(&self) -> &ChannelBank {
        &self.actuation.channels
    }

    /// Controller session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Loop counters
    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            dropped_values: self.actuation.dropped_values,
            ..self.stats.clone()
        }
    }

    /// Replaces the heartbeat telemetry source
    pub fn set_telemetry_provider(&mut self, provider: impl TelemetryProvider + 'static) {
        self.emitter.set_telemetry_provider(provider);
    }

    /// Registers an extra handler. Handlers may only touch actuation state;
    /// the session is updated for every message regardless.
    ///
    /// The actuation and discovery addresses are reserved. Returns `true` if
    /// an earlier extra handler was replaced.
    pub fn register(
        &mut self,
        address: impl Into<String>,
        handler: impl protocol::Handler<Actuation> + 'static,
    ) -> Result<bool> {
        let address = address.into();
        let reserved = &self.config.addresses;
        if address == reserved.actuation || address == reserved.discover {
            return Err(Error::config(format!("address {} is reserved", address)));
        }
        Ok(self.table.register(address, handler))
    }

    /// Decodes and handles one datagram from `source`.
    ///
    /// A malformed datagram is dropped without touching any state.
    pub fn feed_datagram(
        &mut self,
        datagram: &[u8],
        source: SocketAddr,
        now: Instant,
    ) -> std::result::Result<(), ProtocolError> {
        self.stats.received += 1;

        let message = match protocol::decode(datagram) {
            Ok(message) => message,
            Err(e) => {
                self.stats.malformed += 1;
                warn!(%source, len = datagram.len(), error = %e, "Dropping malformed datagram");
                return Err(e);
            }
        };
        debug!(%source, %message, "Received");

        self.actuation.discovery_requested = false;
        if self.table.dispatch(&message, &mut self.actuation) {
            self.stats.dispatched += 1;
        } else {
            self.stats.unhandled += 1;
            debug!(address = %message.address, "No handler for address");
        }
        let is_discovery = std::mem::take(&mut self.actuation.discovery_requested);

        let outcome = self.session.on_inbound(source, is_discovery, now);
        if outcome.connected {
            self.actuation.channels.set_link_indicator(true);
        }
        if outcome.ack_due {
            self.send_discovery_ack();
        }
        Ok(())
    }

    /// Runs the periodic part of the loop: heartbeat if due, then the
    /// liveness check. Returns `true` when this call idled the outputs.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.session.heartbeat_due(now) {
            self.send_heartbeat(now);
        }

        if self.session.check_liveness(now) {
            self.idle_outputs();
            self.actuation.channels.set_link_indicator(false);
            self.stats.timeouts += 1;
            warn!(
                timeout_ms = self.config.liveness_timeout.as_millis() as u64,
                "Controller silent, outputs idled"
            );
            return true;
        }
        false
    }

    /// One full loop iteration: at most one datagram, then [`Device::tick`]
    pub fn step(&mut self, datagram: Option<(&[u8], SocketAddr)>, now: Instant) -> bool {
        if let Some((bytes, source)) = datagram {
            // Already logged and counted
            let _ = self.feed_datagram(bytes, source, now);
        }
        self.tick(now)
    }

    /// Drives every output to idle immediately
    pub fn idle_outputs(&mut self) {
        self.actuation.channels.idle_all();
    }

    fn send_discovery_ack(&mut self) {
        let Some(target) = self.session.reply_addr() else {
            self.stats.send_failures += 1;
            warn!(peer = ?self.session.peer(), "No valid reply port for discovery ack");
            return;
        };
        match self.emitter.discovery_ack(target) {
            Ok(()) => {
                self.session.acknowledge_discovery();
                self.stats.acks_sent += 1;
                debug!(%target, "Discovery acknowledged");
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!(error = %e, "Discovery ack not sent");
            }
        }
    }

    fn send_heartbeat(&mut self, now: Instant) {
        // The schedule advances even if the send fails
        self.session.record_heartbeat(now);

        let Some(target) = self.session.reply_addr() else {
            self.stats.send_failures += 1;
            warn!(peer = ?self.session.peer(), "No valid reply port for heartbeat");
            return;
        };
        match self.emitter.heartbeat(target, now) {
            Ok(()) => {
                self.stats.heartbeats_sent += 1;
                trace!(%target, "Heartbeat queued");
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!(error = %e, "Heartbeat not sent");
            }
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("device_id", &self.config.device_id)
            .field("channels", &self.actuation.channels)
            .field("session", &self.session)
            .field("table", &self.table)
            .finish()
    }
}
