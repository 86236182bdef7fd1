//! Dedicated writer task for outbound messages.
//!
//! All writes to the stream funnel through one task fed by an mpsc channel:
//!
//! ```text
//! Session  ─┐
//! Engine   ─┼─► mpsc::Sender<OutboundMessage> ─► Writer Task ─► Stream
//! Timers   ─┘
//! ```
//!
//! This enforces the single-writer discipline (no interleaved partial
//! writes, no lock contention) while the read loop keeps sole ownership of
//! the read half. The task also owns stream shutdown: when the connection's
//! cancellation token fires, the writer shuts the write half down - that is
//! what actually closes the stream for `disconnect()` and what lets a
//! pending read on the other side complete instead of hanging.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{FixwireError, Result};

/// Default maximum queued messages before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_MESSAGES: usize = 512;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 512;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between backpressure checks.
const CHECK_INTERVAL: Duration = Duration::from_micros(100);

/// Maximum messages drained per write batch.
const MAX_BATCH_SIZE: usize = 32;

/// A pre-encoded message queued for writing.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    bytes: Bytes,
}

impl OutboundMessage {
    /// Wrap encoded message bytes.
    #[inline]
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Encoded bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum queued messages before backpressure kicks in.
    pub max_pending_messages: usize,
    /// Channel capacity for the message queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_messages: DEFAULT_MAX_PENDING_MESSAGES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for queueing messages onto the writer task.
///
/// Cheaply cloneable; shared by the responder and anything else that needs
/// the outbound path.
#[derive(Clone)]
pub struct WriterHandle {
    /// Channel sender for messages.
    tx: mpsc::Sender<OutboundMessage>,
    /// Pending message count (for backpressure).
    pending: Arc<AtomicUsize>,
    /// Maximum pending messages.
    max_pending: usize,
    /// Backpressure timeout.
    timeout: Duration,
}

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<OutboundMessage>,
        pending: Arc<AtomicUsize>,
        max_pending: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            tx,
            pending,
            max_pending,
            timeout,
        }
    }

    /// Queue a message for writing.
    ///
    /// Waits out backpressure up to the configured timeout.
    pub async fn send(&self, message: OutboundMessage) -> Result<()> {
        let current = self.pending.load(Ordering::Acquire);
        if current >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        // Increment pending count BEFORE sending
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(message).await.map_err(|_| {
            // Decrement on failure
            self.pending.fetch_sub(1, Ordering::Release);
            FixwireError::ConnectionClosed
        })
    }

    /// Wait for backpressure to clear with timeout.
    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();

        loop {
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }

            if start.elapsed() > self.timeout {
                return Err(FixwireError::BackpressureTimeout);
            }

            tokio::time::sleep(CHECK_INTERVAL).await;
        }
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current pending message count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Try to queue a message without waiting for backpressure.
    ///
    /// Returns `Err(BackpressureTimeout)` immediately if at capacity.
    pub fn try_send(&self, message: OutboundMessage) -> Result<()> {
        let current = self.pending.load(Ordering::Acquire);
        if current >= self.max_pending {
            return Err(FixwireError::BackpressureTimeout);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(message).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => FixwireError::BackpressureTimeout,
                mpsc::error::TrySendError::Closed(_) => FixwireError::ConnectionClosed,
            }
        })
    }
}

/// Spawn the writer task owning `writer` (the stream's write half).
///
/// The task drains queued messages until the channel closes or `shutdown`
/// fires, then shuts the write half down. A write failure also cancels
/// `shutdown` so the read loop observes closure.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
    shutdown: CancellationToken,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(
        tx,
        pending.clone(),
        config.max_pending_messages,
        config.backpressure_timeout,
    );

    let task = tokio::spawn(writer_loop(rx, writer, pending, shutdown));

    (handle, task)
}

/// Spawn the writer task with default configuration and a private token.
pub fn spawn_writer_task_default<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default(), CancellationToken::new())
}

/// Main writer loop - drains queued messages onto the stream.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundMessage>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
    shutdown: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        // Wait for the first message, or for teardown.
        let first = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                // Disconnect requested: shut the write half down so the
                // peer sees EOF and our own pending read completes.
                let _ = writer.shutdown().await;
                return Ok(());
            }
            message = rx.recv() => match message {
                Some(message) => message,
                None => {
                    // All handles dropped: clean shutdown.
                    let _ = writer.shutdown().await;
                    return Ok(());
                }
            },
        };

        // Collect additional ready messages (non-blocking).
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::error!("write failed: {}", e);
            // The stream is unusable; make the read loop observe closure.
            shutdown.cancel();
            return Err(e);
        }
        pending.fetch_sub(batch_size, Ordering::Release);
    }
}

/// Write a batch of messages with a single flush.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundMessage]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for message in batch {
        writer.write_all(message.as_bytes()).await?;
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{duplex, AsyncReadExt};

    #[test]
    fn test_outbound_message_accessors() {
        let message = OutboundMessage::new(Bytes::from_static(b"8=FIX.4.2\x01"));
        assert_eq!(message.len(), 10);
        assert!(!message.is_empty());
        assert_eq!(message.as_bytes(), b"8=FIX.4.2\x01");
    }

    #[test]
    fn test_writer_config_default() {
        let config = WriterConfig::default();
        assert_eq!(config.max_pending_messages, DEFAULT_MAX_PENDING_MESSAGES);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.backpressure_timeout, DEFAULT_BACKPRESSURE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_writer_handle_send() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task_default(client);

        let message = OutboundMessage::new(Bytes::from_static(b"hello"));
        handle.send(message).await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task_default(client);

        for i in 0..10u8 {
            let message = OutboundMessage::new(Bytes::copy_from_slice(&[i]));
            handle.send(message).await.unwrap();
        }

        let mut buf = [0u8; 10];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[tokio::test]
    async fn test_pending_count_starts_empty() {
        let (client, _server) = duplex(4096);
        let (handle, _task) = spawn_writer_task_default(client);

        assert_eq!(handle.pending_count(), 0);
        assert!(!handle.is_backpressure_active());
    }

    #[tokio::test]
    async fn test_try_send_at_capacity() {
        let (tx, _rx) = mpsc::channel::<OutboundMessage>(10);
        let pending = Arc::new(AtomicUsize::new(100)); // At capacity

        let handle = WriterHandle::new(tx, pending, 100, Duration::from_secs(1));

        let message = OutboundMessage::new(Bytes::from_static(b"x"));
        let result = handle.try_send(message);
        assert!(matches!(result, Err(FixwireError::BackpressureTimeout)));
    }

    #[tokio::test]
    async fn test_send_backpressure_timeout() {
        let (tx, _rx) = mpsc::channel::<OutboundMessage>(10);
        let pending = Arc::new(AtomicUsize::new(100)); // At capacity, never drained

        let handle = WriterHandle::new(tx, pending, 100, Duration::from_millis(20));

        let start = Instant::now();
        let result = handle
            .send(OutboundMessage::new(Bytes::from_static(b"x")))
            .await;
        assert!(matches!(result, Err(FixwireError::BackpressureTimeout)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_write_batch_concatenates() {
        let mut buf = Cursor::new(Vec::new());
        let batch = vec![
            OutboundMessage::new(Bytes::from_static(b"one")),
            OutboundMessage::new(Bytes::from_static(b"two")),
        ];

        write_batch(&mut buf, &batch).await.unwrap();
        assert_eq!(buf.into_inner(), b"onetwo");
    }

    #[tokio::test]
    async fn test_shutdown_on_channel_close() {
        let (client, mut server) = duplex(4096);
        let (handle, task) = spawn_writer_task_default(client);

        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());

        // Write half was shut down: the peer reads EOF.
        let mut buf = [0u8; 8];
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_shuts_stream_down() {
        let (client, mut server) = duplex(4096);
        let shutdown = CancellationToken::new();
        let (_handle, task) = spawn_writer_task(client, WriterConfig::default(), shutdown.clone());

        shutdown.cancel();

        let result = task.await.unwrap();
        assert!(result.is_ok());

        let mut buf = [0u8; 8];
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_cancels_token() {
        let (client, server) = duplex(64);
        let shutdown = CancellationToken::new();
        let (handle, task) = spawn_writer_task(client, WriterConfig::default(), shutdown.clone());

        // Killing the peer makes the next write fail.
        drop(server);
        let _ = handle
            .send(OutboundMessage::new(Bytes::from_static(b"doomed")))
            .await;

        let result = task.await.unwrap();
        assert!(result.is_err());
        assert!(shutdown.is_cancelled());
    }
}
