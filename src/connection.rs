//! Connection controller and lifecycle.
//!
//! A [`Connection`] owns one stream and one worker task, one instance per
//! connection attempt:
//!
//! 1. `connect()` - obtain the stream from the factory, spawn the writer
//!    task, register the [`Responder`] with the session
//! 2. `start()` - spawn the worker task running the read loop
//! 3. `join()` - request disconnect and wait (bounded) for the worker
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fixwire::{Connection, Endpoint};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Arc::new(MySession::default());
//!     let mut connection = Connection::builder(Endpoint::new("127.0.0.1", 9880), session)
//!         .read_wait(std::time::Duration::from_millis(500))
//!         .build();
//!
//!     connection.connect().await?;
//!     connection.start()?;
//!     // ... the session drives traffic through its Responder ...
//!     connection.join().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::ReadHalf;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::ConnectionSettings;
use crate::error::{FixwireError, Result};
use crate::framing::MessageParser;
use crate::reader::StreamReader;
use crate::responder::Responder;
use crate::session::Session;
use crate::transport::{BoxedStream, Endpoint, StreamFactory, TcpStreamFactory};
use crate::writer::spawn_writer_task;

/// Lifecycle states of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No stream bound yet.
    Created,
    /// Stream bound; worker running or ready to run.
    Connected,
    /// Disconnect requested; worker winding down.
    Disconnecting,
    /// Stream closed and worker exited (or abandoned after the join wait).
    Closed,
}

/// Builder for configuring a connection attempt.
///
/// Use the fluent API to adjust settings or substitute the stream factory,
/// then call `build()`.
pub struct ConnectionBuilder {
    endpoint: Endpoint,
    session: Arc<dyn Session>,
    settings: ConnectionSettings,
    factory: Arc<dyn StreamFactory>,
}

impl ConnectionBuilder {
    fn new(endpoint: Endpoint, session: Arc<dyn Session>) -> Self {
        Self {
            endpoint,
            session,
            settings: ConnectionSettings::default(),
            factory: Arc::new(TcpStreamFactory),
        }
    }

    /// Replace the whole settings block.
    pub fn settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Time allowed for the factory to establish the stream.
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.settings.connect_timeout = connect_timeout;
        self
    }

    /// Bounded-wait window for a single read cycle.
    pub fn read_wait(mut self, read_wait: Duration) -> Self {
        self.settings.read_wait = read_wait;
        self
    }

    /// Cap on how long `join()` waits for the worker to terminate.
    pub fn join_wait(mut self, join_wait: Duration) -> Self {
        self.settings.join_wait = join_wait;
        self
    }

    /// Size of the fixed read buffer.
    pub fn read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.settings.read_buffer_size = read_buffer_size;
        self
    }

    /// Upper bound on a single framed message.
    pub fn max_message_size(mut self, max_message_size: usize) -> Self {
        self.settings.max_message_size = max_message_size;
        self
    }

    /// Substitute the stream factory (e.g. to add transport security).
    pub fn factory(mut self, factory: Arc<dyn StreamFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Build the connection controller.
    pub fn build(self) -> Connection {
        Connection {
            endpoint: self.endpoint,
            settings: self.settings,
            session: self.session,
            factory: self.factory,
            shutdown: CancellationToken::new(),
            disconnect_requested: Arc::new(AtomicBool::new(false)),
            read_half: None,
            responder: None,
            worker: None,
        }
    }
}

/// Controller owning one connection to the counterparty.
///
/// Instances are not reused across attempts: create a fresh one per attempt.
pub struct Connection {
    endpoint: Endpoint,
    settings: ConnectionSettings,
    session: Arc<dyn Session>,
    factory: Arc<dyn StreamFactory>,
    /// Connection-wide cancellation signal shared with reader and writer.
    shutdown: CancellationToken,
    /// Monotonic disconnect flag shared with the responder.
    disconnect_requested: Arc<AtomicBool>,
    /// Read half parked between `connect()` and `start()`.
    read_half: Option<ReadHalf<BoxedStream>>,
    responder: Option<Responder>,
    worker: Option<JoinHandle<()>>,
}

impl Connection {
    /// Start building a connection to `endpoint` serving `session`.
    pub fn builder(endpoint: Endpoint, session: Arc<dyn Session>) -> ConnectionBuilder {
        ConnectionBuilder::new(endpoint, session)
    }

    /// Create a connection with the given settings and the plain TCP factory.
    pub fn new(
        endpoint: Endpoint,
        settings: ConnectionSettings,
        session: Arc<dyn Session>,
    ) -> Self {
        Self::builder(endpoint, session).settings(settings).build()
    }

    /// Establish the stream and register with the session.
    ///
    /// The stream is bound exactly once; a second call fails with
    /// [`FixwireError::AlreadyConnected`]. A factory failure propagates;
    /// retry policy belongs to the caller.
    pub async fn connect(&mut self) -> Result<()> {
        if self.responder.is_some() {
            return Err(FixwireError::AlreadyConnected);
        }

        let stream = self.factory.connect(&self.endpoint, &self.settings).await?;
        let (read_half, write_half) = tokio::io::split(stream);

        let (writer, _writer_task) = spawn_writer_task(
            write_half,
            self.settings.writer.clone(),
            self.shutdown.clone(),
        );
        let responder = Responder::new(
            writer,
            self.shutdown.clone(),
            self.disconnect_requested.clone(),
        );
        self.session.set_responder(responder.clone());

        self.read_half = Some(read_half);
        self.responder = Some(responder);
        tracing::debug!(endpoint = %self.endpoint, "connected");
        Ok(())
    }

    /// Spawn the worker task running the read loop.
    ///
    /// Fails with [`FixwireError::NotConnected`] before `connect()` (or if
    /// called a second time).
    pub fn start(&mut self) -> Result<()> {
        let read_half = self.read_half.take().ok_or(FixwireError::NotConnected)?;
        let responder = self.responder.clone().ok_or(FixwireError::NotConnected)?;

        // A fresh instance starts clear; tolerate a stale flag anyway.
        self.disconnect_requested.store(false, Ordering::Release);

        let reader = StreamReader::new(
            read_half,
            MessageParser::with_max_message_size(self.settings.max_message_size),
            self.session.clone(),
            responder,
            self.shutdown.clone(),
            self.settings.read_wait,
            self.settings.read_buffer_size,
        );
        self.worker = Some(tokio::spawn(reader.run()));
        tracing::debug!("worker started");
        Ok(())
    }

    /// Request disconnect and wait for the worker, bounded by `join_wait`.
    ///
    /// If the worker does not terminate in time its handle is abandoned and
    /// the call returns anyway - it never blocks the caller indefinitely.
    /// No-op when no worker is running; safe to call repeatedly.
    pub async fn join(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };
        self.disconnect();
        match timeout(self.settings.join_wait, &mut worker).await {
            Ok(Ok(())) => tracing::debug!("worker joined"),
            Ok(Err(e)) => tracing::error!("worker task failed: {}", e),
            Err(_) => tracing::warn!(
                wait = ?self.settings.join_wait,
                "worker did not terminate in time; abandoning"
            ),
        }
    }

    /// Send encoded bytes to the counterparty.
    ///
    /// Delegates to [`Responder::send`]; `false` before `connect()` or after
    /// disconnect.
    pub async fn send(&self, payload: impl Into<Bytes>) -> bool {
        match &self.responder {
            Some(responder) => responder.send(payload).await,
            None => false,
        }
    }

    /// Request disconnection; idempotent and safe from any context.
    ///
    /// Delegates to [`Responder::disconnect`] once a stream is bound; before
    /// that there is nothing to close and only the flag is recorded.
    pub fn disconnect(&self) {
        match &self.responder {
            Some(responder) => responder.disconnect(),
            None => {
                self.disconnect_requested.store(true, Ordering::Release);
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        if self.responder.is_none() {
            return ConnectionState::Created;
        }
        if !self.disconnect_requested.load(Ordering::Acquire) {
            return ConnectionState::Connected;
        }
        match &self.worker {
            Some(worker) if !worker.is_finished() => ConnectionState::Disconnecting,
            _ => ConnectionState::Closed,
        }
    }

    /// The responder handle, once connected.
    pub fn responder(&self) -> Option<Responder> {
        self.responder.clone()
    }

    /// The configured endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The settings for this attempt.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }
}
