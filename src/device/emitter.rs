//! Outbound discovery acknowledgements and heartbeats
//!
//! The emitter never performs I/O. Messages are queued with `try_send` on the
//! outbound channel so a full or closed queue can never stall the control
//! loop; the caller decides what a failed send means.

use std::net::SocketAddr;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::core::{Config, DeviceId, Error, Result};
use crate::protocol::{DiscoveryAck, Heartbeat, Message};

/// Device-side readings reported in heartbeats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Telemetry {
    /// Supply voltage proxy (millivolts on boards that can measure it)
    pub supply: i32,
    /// Link signal quality (RSSI in dBm on Wi-Fi boards)
    pub signal: i32,
}

/// Source of heartbeat telemetry
pub trait TelemetryProvider: Send {
    /// Takes a fresh reading
    fn sample(&mut self) -> Telemetry;
}

impl<F> TelemetryProvider for F
where
    F: FnMut() -> Telemetry + Send,
{
    fn sample(&mut self) -> Telemetry {
        self()
    }
}

/// Builds and queues the device's outbound messages
pub struct Emitter {
    device_id: DeviceId,
    channel_count: usize,
    ack_address: String,
    heartbeat_address: String,
    boot: Instant,
    telemetry: Box<dyn TelemetryProvider>,
    outbound: mpsc::Sender<(Message, SocketAddr)>,
}

impl Emitter {
    /// Creates an emitter reporting zero telemetry until a provider is set
    pub fn new(config: &Config, boot: Instant, outbound: mpsc::Sender<(Message, SocketAddr)>) -> Self {
        Emitter {
            device_id: config.device_id.clone(),
            channel_count: config.channel_count,
            ack_address: config.addresses.discovery_ack.clone(),
            heartbeat_address: config.addresses.heartbeat.clone(),
            boot,
            telemetry: Box::new(Telemetry::default),
            outbound,
        }
    }

    /// Replaces the telemetry source
    pub fn set_telemetry_provider(&mut self, provider: impl TelemetryProvider + 'static) {
        self.telemetry = Box::new(provider);
    }

    /// Whole seconds since boot
    pub fn uptime_secs(&self, now: Instant) -> u64 {
        crate::util::uptime_secs(self.boot, now)
    }

    /// Queues a discovery acknowledgement for `target`
    pub fn discovery_ack(&self, target: SocketAddr) -> Result<()> {
        let ack = DiscoveryAck {
            device_id: self.device_id.clone(),
            channel_count: self.channel_count,
        };
        self.send(ack.to_message(&self.ack_address), target)
    }

    /// Samples telemetry and queues a heartbeat for `target`
    pub fn heartbeat(&mut self, target: SocketAddr, now: Instant) -> Result<()> {
        let Telemetry { supply, signal } = self.telemetry.sample();
        let heartbeat = Heartbeat {
            device_id: self.device_id.clone(),
            uptime_secs: self.uptime_secs(now),
            supply,
            signal,
        };
        self.send(heartbeat.to_message(&self.heartbeat_address), target)
    }

    fn send(&self, message: Message, target: SocketAddr) -> Result<()> {
        self.outbound
            .try_send((message, target))
            .map_err(|e| Error::network(format!("Failed to queue message for {}: {}", target, e)))
    }
}
