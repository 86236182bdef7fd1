//! Session engine contract.
//!
//! The transport does not understand message semantics. It hands complete
//! units and idle ticks to a [`Session`] and receives `send`/`disconnect`
//! calls back through the [`Responder`] it registered during `connect()`.

use std::fmt;

use async_trait::async_trait;

use crate::framing::RawMessage;
use crate::responder::Responder;

/// Why the transport is escalating a disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// A completed read returned zero bytes: the peer closed the connection.
    Reset,
    /// Any other failure, with its description.
    Error(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Reset => write!(f, "connection reset by peer"),
            DisconnectReason::Error(description) => write!(f, "{}", description),
        }
    }
}

/// The protocol-level conversation consuming framed messages.
///
/// Implementations hold the session state machine (sequence numbers,
/// heartbeats, logon/logout). All callbacks are invoked from the
/// connection's worker task, one at a time, in stream order; outbound
/// traffic goes through the registered [`Responder`], which is safe to use
/// from any task or thread.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// The transport registered `responder` as this session's outbound path.
    ///
    /// Called once during `connect()`, before the read loop starts.
    fn set_responder(&self, responder: Responder);

    /// One complete message unit, in delivery order.
    async fn on_message(&self, message: RawMessage);

    /// A read cycle completed without data.
    ///
    /// The housekeeping hook: heartbeat checks, timer maintenance. Idle
    /// ticks are the normal quiet-connection path, not a failure.
    async fn on_idle(&self);

    /// The transport observed a failure and is shutting the connection down.
    ///
    /// Invoked at most once per connection, after which no further
    /// `on_message` or `on_idle` calls arrive. The stream is closed locally
    /// whether or not the implementation reacts.
    async fn on_disconnect(&self, reason: DisconnectReason);
}
