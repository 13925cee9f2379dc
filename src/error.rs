//! Error types for the tick relay
//!
//! Each component gets its own error enum so callers can tell a transient
//! network hiccup apart from a malformed frame or a startup failure. Only
//! [`GatewayError::Bind`] and [`RelayError::Bind`] are meant to abort a
//! process; everything else is recoverable at the component boundary.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors produced while framing or parsing payloads
#[derive(Debug, Error)]
pub enum FrameError {
    /// Underlying transport failed while reading or writing frames
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame grew past the configured limit without a delimiter
    #[error("frame exceeds {limit} bytes without a delimiter")]
    FrameTooLong { limit: usize },

    /// Outgoing payload contains the reserved delimiter byte
    #[error("payload contains the reserved delimiter byte {delimiter:?}")]
    DelimiterInPayload { delimiter: char },

    /// Payload is not valid UTF-8 text
    #[error("payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Payload is text but not a record we understand
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// JSON payload failed to (de)serialize
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FrameError {
    /// Returns true if the stream can keep going after this error
    ///
    /// Parse failures only affect a single frame. Transport failures and
    /// oversized frames leave the byte stream in an unknown state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidUtf8(_) | FrameError::Malformed(_) | FrameError::Json(_)
        )
    }
}

/// Errors returned by the price store
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    /// Store tracks a closed instrument set and this one is not in it
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    /// Prices must be finite and non-negative
    #[error("invalid price for {instrument}: {price}")]
    InvalidPrice { instrument: String, price: f64 },
}

/// Errors raised while establishing an outbound connection
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The retry budget ran out
    #[error("gave up connecting to {addr} after {attempts} attempts: {source}")]
    RetriesExhausted {
        addr: String,
        attempts: u64,
        #[source]
        source: io::Error,
    },

    /// A non-transient failure (bad address, permission denied, ...)
    #[error("failed to connect to {addr}: {source}")]
    Fatal {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Shutdown was requested while still trying to connect
    #[error("connect to {0} cancelled")]
    Cancelled(String),
}

impl ConnectError {
    /// Returns true if the io error kind is worth retrying
    pub fn is_transient(kind: io::ErrorKind) -> bool {
        matches!(
            kind,
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::TimedOut
                | io::ErrorKind::Interrupted
        )
    }
}

/// Errors raised by the tick broadcaster
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The listening endpoint could not be bound (startup abort)
    #[error("failed to bind tick gateway on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// `start` was called on a broadcaster that is already running or stopped
    #[error("tick broadcaster already started")]
    AlreadyStarted,

    /// Tick could not be encoded into a frame
    #[error("failed to encode tick: {0}")]
    Frame(#[from] FrameError),
}

/// Errors raised by the tick consumer
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),
}

/// Errors raised by the order relay server or client
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listening endpoint could not be bound (startup abort)
    #[error("failed to bind order relay on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Server closed the connection before confirming
    #[error("order relay closed the connection")]
    PeerClosed,

    /// No confirmation arrived within the read timeout
    #[error("no confirmation within {0:?}")]
    ConfirmationTimeout(Duration),

    /// `start` was called twice
    #[error("order relay already started")]
    AlreadyStarted,
}

impl RelayError {
    /// Returns true if the client connection should be considered dead
    pub fn is_connection_lost(&self) -> bool {
        match self {
            RelayError::PeerClosed | RelayError::ConfirmationTimeout(_) => true,
            RelayError::Frame(e) => !e.is_recoverable(),
            _ => false,
        }
    }
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::UnknownInstrument("TSLA".to_string());
        assert_eq!(err.to_string(), "unknown instrument: TSLA");

        let err = RelayError::ConfirmationTimeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "no confirmation within 250ms");
    }

    #[test]
    fn test_frame_error_categories() {
        assert!(FrameError::Malformed("bad".to_string()).is_recoverable());
        assert!(!FrameError::FrameTooLong { limit: 8 }.is_recoverable());
        assert!(!FrameError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_recoverable());
    }

    #[test]
    fn test_transient_connect_kinds() {
        assert!(ConnectError::is_transient(io::ErrorKind::ConnectionRefused));
        assert!(ConnectError::is_transient(io::ErrorKind::ConnectionReset));
        assert!(!ConnectError::is_transient(io::ErrorKind::PermissionDenied));
    }

    #[test]
    fn test_connection_lost() {
        assert!(RelayError::PeerClosed.is_connection_lost());
        assert!(!RelayError::Frame(FrameError::Malformed("x".to_string())).is_connection_lost());
    }
}
