//! Outbound contract handed to the session.
//!
//! A [`Responder`] is a cheaply cloneable handle: `send` enqueues encoded
//! bytes onto the dedicated writer task, `disconnect` requests teardown.
//! Both are safe from any task or thread, at any time, including
//! concurrently with an in-flight read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::writer::{OutboundMessage, WriterHandle};

/// Handle through which the session sends bytes or requests disconnect.
#[derive(Clone)]
pub struct Responder {
    /// Queue into the writer task.
    writer: WriterHandle,
    /// Connection-wide cancellation signal.
    shutdown: CancellationToken,
    /// Monotonic flag: false until disconnect is requested, then true.
    disconnect_requested: Arc<AtomicBool>,
}

impl Responder {
    pub(crate) fn new(
        writer: WriterHandle,
        shutdown: CancellationToken,
        disconnect_requested: Arc<AtomicBool>,
    ) -> Self {
        Self {
            writer,
            shutdown,
            disconnect_requested,
        }
    }

    /// Queue an encoded message for writing.
    ///
    /// Writes never interleave: a single writer task owns the stream's write
    /// half and drains the queue in order, so concurrent senders cannot
    /// produce partial interleavings. Returns `false` once disconnect has
    /// been requested or the connection is down.
    pub async fn send(&self, payload: impl Into<Bytes>) -> bool {
        if self.disconnect_requested.load(Ordering::Acquire) {
            return false;
        }
        match self.writer.send(OutboundMessage::new(payload.into())).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("dropping outbound message: {}", e);
                false
            }
        }
    }

    /// Request disconnection. Idempotent; only the first call has effect.
    ///
    /// Cancelling the shutdown token completes any pending bounded-wait read
    /// and makes the writer task shut the stream down, so the worker
    /// observes closure promptly instead of waiting for its next timeout
    /// tick.
    pub fn disconnect(&self) {
        if !self.disconnect_requested.swap(true, Ordering::AcqRel) {
            tracing::debug!("disconnect requested");
            self.shutdown.cancel();
        }
    }

    /// Whether disconnect has been requested (locally or via escalation).
    #[inline]
    pub fn is_disconnect_requested(&self) -> bool {
        self.disconnect_requested.load(Ordering::Acquire)
    }
}
