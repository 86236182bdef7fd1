//! Stream read loop.
//!
//! One worker task per connection runs [`StreamReader::run`]: a cycle of
//! bounded-wait reads, framing, and in-order dispatch to the session. Each
//! wait is capped by `read_wait` and raced against the connection's
//! cancellation token, so the loop observes disconnect requests promptly
//! while staying off the CPU between ticks.
//!
//! # Error classification
//!
//! - window elapsed with no data: idle tick, loop continues
//! - completed read of zero bytes: peer reset, escalate, loop ends
//! - closed while locally requested: expected, clean exit, no escalation
//! - closed unexpectedly, I/O failure, garbled stream: escalate, loop ends
//!
//! Idle timeouts never surface. Every other failure produces exactly one
//! `on_disconnect` escalation followed by a local disconnect, so the worker
//! always reaches a deterministic closed state - it never crashes silently
//! and never leaves the stream open.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::{FixwireError, Result};
use crate::framing::MessageParser;
use crate::responder::Responder;
use crate::session::{DisconnectReason, Session};

/// Read-loop state: the stream's read half, the fixed read buffer, and the
/// accumulating parser.
pub(crate) struct StreamReader<R> {
    reader: R,
    /// Fixed, reusable read buffer.
    buf: Vec<u8>,
    parser: MessageParser,
    session: Arc<dyn Session>,
    responder: Responder,
    shutdown: CancellationToken,
    read_wait: Duration,
}

impl<R: AsyncRead + Unpin> StreamReader<R> {
    pub(crate) fn new(
        reader: R,
        parser: MessageParser,
        session: Arc<dyn Session>,
        responder: Responder,
        shutdown: CancellationToken,
        read_wait: Duration,
        buffer_size: usize,
    ) -> Self {
        Self {
            reader,
            buf: vec![0u8; buffer_size],
            parser,
            session,
            responder,
            shutdown,
            read_wait,
        }
    }

    /// Drive read cycles until the loop ends, then close locally.
    pub(crate) async fn run(mut self) {
        while self.read_once().await {}
        // Whatever ended the loop, leave nothing open behind us.
        self.responder.disconnect();
        tracing::debug!("read loop terminated");
    }

    /// One loop iteration. Returns whether the loop should continue.
    pub(crate) async fn read_once(&mut self) -> bool {
        match self.cycle().await {
            Ok(()) => true,
            Err(FixwireError::ConnectionClosed) if self.responder.is_disconnect_requested() => {
                // Locally requested closure observed; the expected way out.
                false
            }
            Err(e) => {
                self.escalate(e).await;
                false
            }
        }
    }

    /// Read, frame, dispatch.
    async fn cycle(&mut self) -> Result<()> {
        match self.read_some().await? {
            0 => self.session.on_idle().await,
            n => {
                tracing::trace!(bytes = n, "received");
                self.parser.feed(&self.buf[..n]);
            }
        }
        while let Some(message) = self.parser.extract_next()? {
            self.session.on_message(message).await;
        }
        Ok(())
    }

    /// Bounded-wait read against the fixed buffer.
    ///
    /// Returns the byte count of a completed read, or `0` when the window
    /// elapsed with nothing available - the normal idle path. `read` is
    /// cancellation-safe, so abandoning the wait consumes no data and the
    /// next call picks up where this one left off; buffered partial frames
    /// are untouched either way.
    ///
    /// A completed read of zero bytes means the peer closed the connection
    /// and fails with [`FixwireError::ConnectionReset`]. Cancellation of the
    /// shutdown token fails with [`FixwireError::ConnectionClosed`]. An
    /// OS-level timeout surfacing as an I/O error is folded into the idle
    /// path; any other I/O failure propagates.
    async fn read_some(&mut self) -> Result<usize> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(FixwireError::ConnectionClosed),
            outcome = timeout(self.read_wait, self.reader.read(&mut self.buf)) => match outcome {
                Err(_elapsed) => Ok(0),
                Ok(Ok(0)) => Err(FixwireError::ConnectionReset),
                Ok(Ok(n)) => Ok(n),
                Ok(Err(e)) if is_platform_timeout(&e) => Ok(0),
                Ok(Err(e)) => Err(FixwireError::Io(e)),
            },
        }
    }

    /// Exactly one session-level disconnect per failed connection.
    async fn escalate(&self, error: FixwireError) {
        let reason = match error {
            FixwireError::ConnectionReset => DisconnectReason::Reset,
            other => DisconnectReason::Error(other.to_string()),
        };
        tracing::debug!(%reason, "escalating disconnect");
        self.session.on_disconnect(reason).await;
        // Close locally whether or not the session reacted.
        self.responder.disconnect();
    }
}

/// An OS read timeout wrapped in a generic I/O error is the idle path, not
/// a failure.
fn is_platform_timeout(error: &io::Error) -> bool {
    if matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    ) {
        return true;
    }
    error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<io::Error>())
        .is_some_and(is_platform_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{spawn_writer_task, WriterConfig};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    const TEST_READ_WAIT: Duration = Duration::from_millis(20);

    /// Scripted read source: pops one event per poll.
    enum Event {
        Data(Vec<u8>),
        Error(io::Error),
        Eof,
    }

    struct ScriptedStream {
        events: VecDeque<Event>,
    }

    impl ScriptedStream {
        fn new(events: Vec<Event>) -> Self {
            Self {
                events: events.into(),
            }
        }
    }

    impl AsyncRead for ScriptedStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.events.pop_front() {
                Some(Event::Data(data)) => {
                    buf.put_slice(&data);
                    Poll::Ready(Ok(()))
                }
                Some(Event::Error(e)) => Poll::Ready(Err(e)),
                Some(Event::Eof) => Poll::Ready(Ok(())),
                // Script exhausted: hang until the bounded wait expires.
                None => Poll::Pending,
            }
        }
    }

    #[derive(Default)]
    struct RecordingSession {
        messages: Mutex<Vec<String>>,
        idles: AtomicUsize,
        disconnects: Mutex<Vec<DisconnectReason>>,
    }

    #[async_trait]
    impl Session for RecordingSession {
        fn set_responder(&self, _responder: Responder) {}

        async fn on_message(&self, message: crate::framing::RawMessage) {
            self.messages.lock().unwrap().push(message.to_string());
        }

        async fn on_idle(&self) {
            self.idles.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_disconnect(&self, reason: DisconnectReason) {
            self.disconnects.lock().unwrap().push(reason);
        }
    }

    fn wire(text: &str) -> Vec<u8> {
        text.replace('|', "\x01").into_bytes()
    }

    fn make_reader(
        events: Vec<Event>,
    ) -> (StreamReader<ScriptedStream>, Arc<RecordingSession>, CancellationToken) {
        let session = Arc::new(RecordingSession::default());
        let shutdown = CancellationToken::new();
        let (sink, _sink_peer) = tokio::io::duplex(4096);
        let (writer, _task) = spawn_writer_task(sink, WriterConfig::default(), shutdown.clone());
        let responder = Responder::new(
            writer,
            shutdown.clone(),
            Arc::new(AtomicBool::new(false)),
        );
        let reader = StreamReader::new(
            ScriptedStream::new(events),
            MessageParser::new(),
            session.clone() as Arc<dyn Session>,
            responder,
            shutdown.clone(),
            TEST_READ_WAIT,
            512,
        );
        (reader, session, shutdown)
    }

    #[tokio::test]
    async fn test_idle_tick_when_window_elapses() {
        let (mut reader, session, _shutdown) = make_reader(vec![]);

        assert!(reader.read_once().await);

        assert_eq!(session.idles.load(Ordering::SeqCst), 1);
        assert!(session.messages.lock().unwrap().is_empty());
        assert!(session.disconnects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_message_dispatched() {
        let (mut reader, session, _shutdown) =
            make_reader(vec![Event::Data(wire("8=FIX.4.2|9=5|35=0|10=161|"))]);

        assert!(reader.read_once().await);

        assert_eq!(
            *session.messages.lock().unwrap(),
            vec!["8=FIX.4.2|9=5|35=0|10=161|"]
        );
    }

    #[tokio::test]
    async fn test_split_message_survives_idle_tick() {
        // First cycle buffers a partial frame, second cycle is an idle tick,
        // third completes the message. Nothing is discarded in between.
        let (mut reader, session, _shutdown) = make_reader(vec![
            Event::Data(wire("8=FIX.4.2|9=5|10=00")),
            Event::Error(io::Error::from(io::ErrorKind::TimedOut)),
            Event::Data(wire("0|")),
        ]);

        assert!(reader.read_once().await);
        assert!(session.messages.lock().unwrap().is_empty());

        assert!(reader.read_once().await);
        assert!(session.messages.lock().unwrap().is_empty());
        assert_eq!(session.idles.load(Ordering::SeqCst), 1);

        assert!(reader.read_once().await);
        assert_eq!(
            *session.messages.lock().unwrap(),
            vec!["8=FIX.4.2|9=5|10=000|"]
        );
    }

    #[tokio::test]
    async fn test_multiple_messages_in_one_read() {
        let (mut reader, session, _shutdown) = make_reader(vec![Event::Data(wire(
            "8=FIX.4.2|9=5|35=0|10=161|8=FIX.4.2|9=5|35=1|10=162|",
        ))]);

        assert!(reader.read_once().await);

        let messages = session.messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("35=0"));
        assert!(messages[1].contains("35=1"));
    }

    #[tokio::test]
    async fn test_zero_byte_read_escalates_reset_once() {
        let (mut reader, session, _shutdown) = make_reader(vec![
            Event::Data(wire("8=FIX.4.2|9=5|35=0|10=161|")),
            Event::Eof,
        ]);

        assert!(reader.read_once().await);
        assert!(!reader.read_once().await);

        assert_eq!(
            *session.disconnects.lock().unwrap(),
            vec![DisconnectReason::Reset]
        );
        // The failure also closed the connection locally.
        assert!(reader.responder.is_disconnect_requested());
    }

    #[tokio::test]
    async fn test_nested_platform_timeout_is_idle() {
        let nested = io::Error::new(
            io::ErrorKind::Other,
            io::Error::from(io::ErrorKind::TimedOut),
        );
        let (mut reader, session, _shutdown) = make_reader(vec![Event::Error(nested)]);

        assert!(reader.read_once().await);

        assert_eq!(session.idles.load(Ordering::SeqCst), 1);
        assert!(session.disconnects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hard_io_error_escalates_once() {
        let (mut reader, session, _shutdown) = make_reader(vec![Event::Error(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "aborted",
        ))]);

        assert!(!reader.read_once().await);

        let disconnects = session.disconnects.lock().unwrap();
        assert_eq!(disconnects.len(), 1);
        assert!(matches!(disconnects[0], DisconnectReason::Error(_)));
    }

    #[tokio::test]
    async fn test_garbled_stream_escalates() {
        let (mut reader, session, _shutdown) =
            make_reader(vec![Event::Data(wire("8=FIX.4.2|9=bogus|"))]);

        assert!(!reader.read_once().await);

        let disconnects = session.disconnects.lock().unwrap();
        assert_eq!(disconnects.len(), 1);
        assert!(matches!(disconnects[0], DisconnectReason::Error(_)));
    }

    #[tokio::test]
    async fn test_requested_closure_exits_without_escalation() {
        let (mut reader, session, _shutdown) = make_reader(vec![]);

        reader.responder.disconnect();
        assert!(!reader.read_once().await);

        assert!(session.disconnects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_closure_escalates_as_error() {
        let (mut reader, session, shutdown) = make_reader(vec![]);

        // Token cancelled without a disconnect request: not the local path.
        shutdown.cancel();
        assert!(!reader.read_once().await);

        let disconnects = session.disconnects.lock().unwrap();
        assert_eq!(disconnects.len(), 1);
        assert!(matches!(disconnects[0], DisconnectReason::Error(_)));
    }

    #[tokio::test]
    async fn test_run_reaches_closed_state() {
        let (reader, session, _shutdown) = make_reader(vec![
            Event::Data(wire("8=FIX.4.2|9=0|10=000|")),
            Event::Eof,
        ]);
        let responder = reader.responder.clone();

        reader.run().await;

        assert_eq!(session.messages.lock().unwrap().len(), 1);
        assert_eq!(session.disconnects.lock().unwrap().len(), 1);
        assert!(responder.is_disconnect_requested());
    }

    #[test]
    fn test_is_platform_timeout_classification() {
        assert!(is_platform_timeout(&io::Error::from(
            io::ErrorKind::TimedOut
        )));
        assert!(is_platform_timeout(&io::Error::from(
            io::ErrorKind::WouldBlock
        )));
        assert!(is_platform_timeout(&io::Error::new(
            io::ErrorKind::Other,
            io::Error::from(io::ErrorKind::TimedOut),
        )));
        assert!(!is_platform_timeout(&io::Error::from(
            io::ErrorKind::BrokenPipe
        )));
        assert!(!is_platform_timeout(&io::Error::new(
            io::ErrorKind::Other,
            "no inner error",
        )));
    }
}
