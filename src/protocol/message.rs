use std::fmt;

use crate::core::DeviceId;

/// A single typed OSC argument
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// 32-bit big-endian integer (`i`)
    Int(i32),
    /// 32-bit big-endian IEEE-754 float (`f`)
    Float(f32),
    /// NUL-terminated, 4-byte padded string (`s`)
    Str(String),
}

impl Argument {
    /// The OSC type tag character for this argument
    pub fn type_tag(&self) -> char {
        match self {
            Argument::Int(_) => 'i',
            Argument::Float(_) => 'f',
            Argument::Str(_) => 's',
        }
    }

    /// Numeric view used by the motor command: floats truncate toward zero
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Argument::Int(v) => Some(i64::from(*v)),
            Argument::Float(v) if v.is_finite() => Some(v.trunc() as i64),
            _ => None,
        }
    }

    /// String view
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Argument::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for Argument {
    fn from(v: i32) -> Self {
        Argument::Int(v)
    }
}

impl From<f32> for Argument {
    fn from(v: f32) -> Self {
        Argument::Float(v)
    }
}

impl From<&str> for Argument {
    fn from(v: &str) -> Self {
        Argument::Str(v.to_string())
    }
}

impl From<String> for Argument {
    fn from(v: String) -> Self {
        Argument::Str(v)
    }
}

/// A decoded protocol message: an address plus its ordered arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Hierarchical address, always starting with `/`
    pub address: String,
    /// Ordered typed arguments
    pub arguments: Vec<Argument>,
}

impl Message {
    /// Creates a message with no arguments
    pub fn new(address: impl Into<String>) -> Self {
        Message {
            address: address.into(),
            arguments: Vec::new(),
        }
    }

    /// Creates a message with the given arguments
    pub fn with_args(address: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Message {
            address: address.into(),
            arguments,
        }
    }

    /// Appends an argument, builder style
    pub fn arg(mut self, argument: impl Into<Argument>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    /// The `,iis`-style type tag string for the current arguments
    pub fn type_tags(&self) -> String {
        std::iter::once(',')
            .chain(self.arguments.iter().map(Argument::type_tag))
            .collect()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        for arg in &self.arguments {
            match arg {
                Argument::Int(v) => write!(f, " {}", v)?,
                Argument::Float(v) => write!(f, " {}", v)?,
                Argument::Str(s) => write!(f, " {:?}", s)?,
            }
        }
        Ok(())
    }
}

/// Reply to a discovery probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryAck {
    /// Responder's identity
    pub device_id: DeviceId,
    /// Number of output channels the responder drives
    pub channel_count: usize,
}

impl DiscoveryAck {
    /// Builds the wire message for this acknowledgement
    pub fn to_message(&self, address: &str) -> Message {
        Message::new(address)
            .arg(self.device_id.as_str())
            .arg(saturating_i32(self.channel_count as u64))
    }
}

/// Periodic status report sent to the bound controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    /// Sender's identity
    pub device_id: DeviceId,
    /// Whole seconds since boot
    pub uptime_secs: u64,
    /// Supply voltage proxy
    pub supply: i32,
    /// Link signal quality
    pub signal: i32,
}

impl Heartbeat {
    /// Builds the wire message for this heartbeat
    pub fn to_message(&self, address: &str) -> Message {
        Message::new(address)
            .arg(self.device_id.as_str())
            .arg(saturating_i32(self.uptime_secs))
            .arg(self.supply)
            .arg(self.signal)
    }
}

fn saturating_i32(v: u64) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}
