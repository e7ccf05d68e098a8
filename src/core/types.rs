use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// Drive level of a single output channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Level(pub u8);

impl Level {
    /// The idle level every channel returns to on timeout
    pub const IDLE: Level = Level(0);

    /// Clamps a raw protocol value into `[0, MAX_LEVEL]`
    pub fn clamped(raw: i64) -> Self {
        Level(raw.clamp(0, i64::from(super::MAX_LEVEL)) as u8)
    }

    /// Returns the raw duty value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Returns whether this level drives the output at all
    pub fn is_idle(&self) -> bool {
        self.0 == 0
    }
}

/// Stable hardware-derived device identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates an identity from an arbitrary string
    pub fn new(id: impl Into<String>) -> Self {
        DeviceId(id.into())
    }

    /// Formats a MAC address the way the wire protocol expects (`AA:BB:..`)
    pub fn from_mac(mac: [u8; 6]) -> Self {
        let id = mac
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":");
        DeviceId(id)
    }

    /// Returns the identity string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        DeviceId::from_mac([0; 6])
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// OSC addresses the device listens on and sends to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressMap {
    /// Inbound motor command carrying one integer level per channel
    pub actuation: String,
    /// Inbound discovery probe
    pub discover: String,
    /// Outbound reply to a discovery probe
    pub discovery_ack: String,
    /// Outbound periodic status message
    pub heartbeat: String,
}

impl Default for AddressMap {
    fn default() -> Self {
        AddressMap {
            actuation: "/m".to_string(),
            discover: "/patpatpat/discover".to_string(),
            discovery_ack: "/patpatpat/noticeme/senpai".to_string(),
            heartbeat: "/patpatpat/heartbeat".to_string(),
        }
    }
}

impl AddressMap {
    fn validate(&self) -> Result<()> {
        let all = [
            ("actuation", &self.actuation),
            ("discover", &self.discover),
            ("discovery_ack", &self.discovery_ack),
            ("heartbeat", &self.heartbeat),
        ];

        let mut seen = HashSet::new();
        for (name, address) in all {
            if !address.starts_with('/') || address.contains('\0') {
                return Err(Error::config(format!(
                    "{} address must start with '/': {:?}",
                    name, address
                )));
            }
            if !seen.insert(address.as_str()) {
                return Err(Error::config(format!("duplicate address {:?}", address)));
            }
        }
        Ok(())
    }
}

/// Device configuration, fixed at boot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity reported in acknowledgements and heartbeats
    pub device_id: DeviceId,
    /// Number of output channels
    pub channel_count: usize,
    /// Local address to bind to
    pub listen_addr: SocketAddr,
    /// Replies go to the sender's source port plus this offset
    pub reply_port_offset: u16,
    /// Maximum controller silence before outputs are idled
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub liveness_timeout: Duration,
    /// Heartbeat period while connected
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub heartbeat_interval: Duration,
    /// Upper bound on the time between two liveness checks in the server loop
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub poll_interval: Duration,
    /// Capacity of the outbound message queue
    pub outbound_queue: usize,
    /// Protocol addresses
    pub addresses: AddressMap,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_id: DeviceId::default(),
            channel_count: super::DEFAULT_CHANNEL_COUNT,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], super::DEFAULT_PORT)),
            reply_port_offset: super::DEFAULT_REPLY_PORT_OFFSET,
            liveness_timeout: Duration::from_millis(600),
            heartbeat_interval: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            outbound_queue: 32,
            addresses: AddressMap::default(),
        }
    }
}

impl Config {
    /// Checks the configuration for values the device cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.channel_count == 0 || self.channel_count > super::MAX_CHANNELS {
            return Err(Error::config(format!(
                "channel_count must be within 1..={}, got {}",
                super::MAX_CHANNELS,
                self.channel_count
            )));
        }
        if self.liveness_timeout.is_zero() {
            return Err(Error::config("liveness_timeout must be non-zero"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::config("heartbeat_interval must be non-zero"));
        }
        if self.poll_interval.is_zero() || self.poll_interval >= self.liveness_timeout {
            return Err(Error::config(
                "poll_interval must be non-zero and shorter than liveness_timeout",
            ));
        }
        if self.outbound_queue == 0 {
            return Err(Error::config("outbound_queue must be non-zero"));
        }
        self.addresses.validate()
    }

    /// Parses and validates a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_clamping() {
        assert_eq!(Level::clamped(-20), Level(0));
        assert_eq!(Level::clamped(100), Level(100));
        assert_eq!(Level::clamped(4000), Level(super::super::MAX_LEVEL));
        assert!(Level::IDLE.is_idle());
    }

    #[test]
    fn test_device_id_from_mac() {
        let id = DeviceId::from_mac([0xAA, 0x0b, 0x01, 0xff, 0x10, 0x00]);
        assert_eq!(id.as_str(), "AA:0B:01:FF:10:00");
        assert_eq!(DeviceId::default().to_string(), "00:00:00:00:00:00");
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr.port(), 8888);
        assert_eq!(config.reply_port_offset, 1);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json(
            r#"{"channel_count": 4, "liveness_timeout": 800, "addresses": {"actuation": "/motors"}}"#,
        )
        .unwrap();
        assert_eq!(config.channel_count, 4);
        assert_eq!(config.liveness_timeout, Duration::from_millis(800));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.addresses.actuation, "/motors");
        assert_eq!(config.addresses.heartbeat, "/patpatpat/heartbeat");
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let mut config = Config::default();
        config.channel_count = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.poll_interval = config.liveness_timeout;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.addresses.heartbeat = config.addresses.actuation.clone();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.addresses.discover = "discover".to_string();
        assert!(config.validate().is_err());

        assert!(Config::from_json("{not json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        std::fs::write(
            &path,
            r#"{"device_id": "AA:BB:CC:00:11:22", "channel_count": 3, "heartbeat_interval": 250}"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.device_id.as_str(), "AA:BB:CC:00:11:22");
        assert_eq!(config.channel_count, 3);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(250));

        assert!(matches!(Config::load(dir.path().join("missing.json")), Err(Error::Io(_))));

        std::fs::write(&path, r#"{"channel_count": 0}"#).unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config {
            device_id: DeviceId::new("dev-1"),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back = Config::from_json(&json).unwrap();
        assert_eq!(back.device_id, config.device_id);
        assert_eq!(back.liveness_timeout, config.liveness_timeout);
        assert_eq!(back.addresses, config.addresses);
    }
}
