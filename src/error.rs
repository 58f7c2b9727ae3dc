//! Error types for the ublox-at library.

use thiserror::Error;

/// The main error type for modem operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The modem answered with an error terminator or an unparsable reply.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// No terminating pattern arrived before the deadline.
    #[error("command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The channel is not in the connected state.
    #[error("not connected")]
    NotConnected,

    /// Every channel slot is held by a connected channel.
    #[error("no free channel slot")]
    SlotExhausted,

    /// The modem assigned a socket id the channel table cannot hold.
    #[error("socket id {0} is outside the channel table")]
    InvalidHandle(u8),
}

impl Error {
    /// Builds a protocol error from anything printable.
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Builds a timeout error from a duration.
    pub(crate) fn timeout(timeout: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Result type alias for modem operations.
pub type Result<T> = std::result::Result<T, Error>;
