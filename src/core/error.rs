use std::io;
use thiserror::Error;

/// Decode failures for inbound datagrams
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed message: {reason}")]
    Malformed {
        /// What the decoder tripped over
        reason: String,
    },
}

impl ProtocolError {
    /// Creates a new malformed-message error
    pub fn malformed(reason: impl Into<String>) -> Self {
        ProtocolError::Malformed { reason: reason.into() }
    }
}

/// Channel bank failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel {index} out of range (device has {count} channels)")]
    OutOfRange {
        /// Requested channel index
        index: usize,
        /// Configured channel count
        count: usize,
    },
}

/// Custom error types for the actuator core
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new malformed-protocol error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::Protocol(ProtocolError::malformed(reason))
    }

    /// Creates a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::config("channel_count must be positive");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(
            err.to_string(),
            "Configuration error: channel_count must be positive"
        );
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));

        let err: Error = ChannelError::OutOfRange { index: 4, count: 2 }.into();
        assert_eq!(
            err.to_string(),
            "Channel error: Channel 4 out of range (device has 2 channels)"
        );
    }

    #[test]
    fn test_malformed_display() {
        let err = ProtocolError::malformed("truncated address");
        assert_eq!(err.to_string(), "Malformed message: truncated address");
    }
}
