//! Connection settings.
//!
//! [`ConnectionSettings`] bundles the timeouts and sizes governing one
//! connection attempt. Defaults match common initiator deployments; override
//! individual fields through [`ConnectionBuilder`](crate::ConnectionBuilder)
//! or by mutating the struct directly.

use std::time::Duration;

use crate::writer::WriterConfig;

/// Default time allowed for the transport factory to establish a stream.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bounded-wait window for a single read cycle.
pub const DEFAULT_READ_WAIT: Duration = Duration::from_millis(1000);

/// Default cap on how long `join()` waits for the worker to terminate.
pub const DEFAULT_JOIN_WAIT: Duration = Duration::from_secs(5);

/// Default size of the fixed, reusable read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;

/// Default upper bound on a single framed message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Settings for a single connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Time allowed for the transport factory to establish a stream.
    pub connect_timeout: Duration,
    /// How long one read cycle waits for data before yielding an idle tick.
    pub read_wait: Duration,
    /// Cap on how long `join()` waits for the worker task to terminate.
    pub join_wait: Duration,
    /// Size of the fixed, reusable read buffer.
    pub read_buffer_size: usize,
    /// Whether to set TCP_NODELAY on the socket.
    pub no_delay: bool,
    /// Upper bound on a single framed message.
    pub max_message_size: usize,
    /// Outbound writer task configuration.
    pub writer: WriterConfig,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_wait: DEFAULT_READ_WAIT,
            join_wait: DEFAULT_JOIN_WAIT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            no_delay: true,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            writer: WriterConfig::default(),
        }
    }
}
