//! Error types for fixwire.

use thiserror::Error;

/// Main error type for all fixwire operations.
#[derive(Debug, Error)]
pub enum FixwireError {
    /// I/O error during stream operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport factory could not establish a stream in time.
    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    /// A completed read returned zero bytes: the peer closed the connection.
    #[error("connection reset by peer")]
    ConnectionReset,

    /// The stream was closed while an operation was pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation requires an established stream.
    #[error("not connected")]
    NotConnected,

    /// `connect()` was called with a stream already bound.
    #[error("already connected")]
    AlreadyConnected,

    /// The inbound byte stream violates the framing grammar.
    #[error("garbled message stream: {0}")]
    Garbled(String),

    /// Endpoint string could not be parsed as `host:port`.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Outbound queue stayed full past the configured deadline.
    #[error("backpressure timeout")]
    BackpressureTimeout,
}

/// Result type alias using FixwireError.
pub type Result<T> = std::result::Result<T, FixwireError>;
