use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::core::Config;

/// Connection state of the single controller session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No live controller; outputs are idle
    Disconnected,
    /// A controller has spoken within the liveness window
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => f.write_str("Disconnected"),
            SessionState::Connected => f.write_str("Connected"),
        }
    }
}

/// Session timing configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum silence before the session lapses
    pub liveness_timeout: Duration,
    /// Heartbeat period while connected
    pub heartbeat_interval: Duration,
    /// Replies go to the peer's source port plus this offset
    pub reply_port_offset: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig::from(&Config::default())
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        SessionConfig {
            liveness_timeout: config.liveness_timeout,
            heartbeat_interval: config.heartbeat_interval,
            reply_port_offset: config.reply_port_offset,
        }
    }
}

/// What an inbound message did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundOutcome {
    /// The message moved the session from Disconnected to Connected
    pub connected: bool,
    /// The reply target differs from the previous packet's source
    pub peer_changed: bool,
    /// A discovery acknowledgement should be sent
    pub ack_due: bool,
}

/// Information about the current session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Current state
    pub state: SessionState,
    /// Source of the most recent valid packet
    pub peer: Option<SocketAddr>,
    /// Time since the most recent valid packet
    pub since_activity: Option<Duration>,
    /// Whether discovery has been acknowledged in this session
    pub discovery_acknowledged: bool,
}

/// Single-peer session state machine.
///
/// Driven by [`Session::on_inbound`] for every well-formed message and by
/// [`Session::check_liveness`] once per loop iteration. All time comes in as
/// an explicit `now`.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    peer: Option<SocketAddr>,
    last_activity: Option<Instant>,
    last_heartbeat: Option<Instant>,
    discovery_acknowledged: bool,
    config: SessionConfig,
}

impl Session {
    /// Creates a session in `Disconnected`
    pub fn new(config: SessionConfig) -> Self {
        Session {
            state: SessionState::Disconnected,
            peer: None,
            last_activity: None,
            last_heartbeat: None,
            discovery_acknowledged: false,
            config,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns whether a controller is bound
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Source address of the most recent valid packet
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Returns whether discovery was acknowledged in this session
    pub fn discovery_acknowledged(&self) -> bool {
        self.discovery_acknowledged
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Address replies are sent to: the peer's source port plus the offset.
    /// `None` before any peer is known or if the port would overflow.
    pub fn reply_addr(&self) -> Option<SocketAddr> {
        let peer = self.peer?;
        let port = peer.port().checked_add(self.config.reply_port_offset)?;
        Some(SocketAddr::new(peer.ip(), port))
    }

    /// Records a well-formed inbound message from `source`
    pub fn on_inbound(&mut self, source: SocketAddr, is_discovery: bool, now: Instant) -> InboundOutcome {
        let peer_changed = self.peer != Some(source);
        if peer_changed {
            debug!(previous = ?self.peer, %source, "Rebinding session peer");
        }
        self.peer = Some(source);
        self.last_activity = Some(now);

        let connected = self.state == SessionState::Disconnected;
        if connected {
            self.state = SessionState::Connected;
            if is_discovery {
                self.discovery_acknowledged = false;
            }
            info!(%source, "Session connected");
        }

        InboundOutcome {
            connected,
            peer_changed,
            ack_due: is_discovery && !self.discovery_acknowledged,
        }
    }

    /// Marks the discovery acknowledgement as sent for this session
    pub fn acknowledge_discovery(&mut self) {
        self.discovery_acknowledged = true;
    }

    /// Applies the liveness timeout. Returns `true` exactly on the
    /// Connected to Disconnected edge, when outputs must be idled.
    pub fn check_liveness(&mut self, now: Instant) -> bool {
        if self.state != SessionState::Connected {
            return false;
        }

        let silence = match self.last_activity {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::MAX,
        };
        if silence <= self.config.liveness_timeout {
            return false;
        }

        self.state = SessionState::Disconnected;
        self.discovery_acknowledged = false;
        self.last_heartbeat = None;
        info!(
            silence_ms = silence.as_millis() as u64,
            peer = ?self.peer,
            "Session timed out"
        );
        true
    }

    /// Returns whether a heartbeat should go out at `now`
    pub fn heartbeat_due(&self, now: Instant) -> bool {
        if self.state != SessionState::Connected {
            return false;
        }
        match self.last_heartbeat {
            Some(last) => now.saturating_duration_since(last) >= self.config.heartbeat_interval,
            None => true,
        }
    }

    /// Records that a heartbeat was emitted at `now`
    pub fn record_heartbeat(&mut self, now: Instant) {
        self.last_heartbeat = Some(now);
    }

    /// Gets information about the current session
    pub fn info(&self, now: Instant) -> SessionInfo {
        SessionInfo {
            state: self.state,
            peer: self.peer,
            since_activity: self
                .last_activity
                .map(|last| now.saturating_duration_since(last)),
            discovery_acknowledged: self.discovery_acknowledged,
        }
    }
}
