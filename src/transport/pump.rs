//! Transport pump: one duplex connection, two independent directions.
//!
//! A [`Pump`] is the send side handed to the session; its [`PumpDriver`]
//! owns the receiving ends and, once started, runs:
//!
//! - a read loop that answers pings in place and hands every data message,
//!   in arrival order, to a single inbound callback
//! - a write loop that drains the bounded outbound queue in FIFO order
//! - a supervisor that waits for either loop to end, stops the other one,
//!   and then fires the close callback exactly once
//!
//! # Failure Model
//!
//! | Event | Effect |
//! |-------|--------|
//! | Inbound callback panics | Logged, read loop continues |
//! | Read error / remote close | Both loops stop, close callback fires |
//! | Write error | Both loops stop, close callback fires |
//! | Close requested | Pending write abandoned, close handshake bounded, callback fires |
//! | Queue full | `send` fails with [`Error::SendQueueFull`] |
//! | `send` after teardown | [`Error::ConnectionClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::panic::{self, AssertUnwindSafe};
use std::result::Result as StdResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result, panic_message};
use crate::protocol::Encoding;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on the close handshake once teardown is requested.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Types
// ============================================================================

/// Inbound data callback.
///
/// Called once per text or binary message, never concurrently.
pub type MessageCallback = Arc<dyn Fn(Encoding, &[u8]) + Send + Sync>;

/// Teardown callback, fired once after both loops have stopped.
pub type CloseCallback = Box<dyn FnOnce() + Send>;

// ============================================================================
// Pump
// ============================================================================

/// Send side of a transport pump.
///
/// Sending never waits on network I/O; messages are queued for the write
/// loop. Dropping the `Pump` closes the connection.
pub struct Pump {
    /// Outbound queue.
    outbound_tx: mpsc::Sender<Message>,
    /// Explicit close request (taken on first use).
    close_tx: Mutex<Option<oneshot::Sender<()>>>,
    /// Set once both loops have stopped.
    closed: Arc<AtomicBool>,
    /// Outbound queue capacity.
    capacity: usize,
}

impl Pump {
    /// Creates a pump and its not-yet-started driver.
    ///
    /// `capacity` bounds the outbound queue and must be non-zero.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, PumpDriver) {
        let capacity = capacity.max(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (close_tx, close_rx) = oneshot::channel();
        let closed = Arc::new(AtomicBool::new(false));

        let driver = PumpDriver {
            outbound_rx,
            control_tx: outbound_tx.clone(),
            close_rx,
            closed: Arc::clone(&closed),
        };

        let pump = Self {
            outbound_tx,
            close_tx: Mutex::new(Some(close_tx)),
            closed,
            capacity,
        };

        (pump, driver)
    }

    /// Queues a data message for transmission.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if a text message is not valid UTF-8
    /// - [`Error::SendQueueFull`] if the peer is not draining the queue
    /// - [`Error::ConnectionClosed`] if the connection is torn down
    pub fn send(&self, encoding: Encoding, bytes: Vec<u8>) -> Result<()> {
        let message = Self::message(encoding, bytes)?;
        self.reserve()?.send(message);
        Ok(())
    }

    /// Reserves one slot in the outbound queue.
    ///
    /// The slot is released if the returned [`SendSlot`] is dropped unused.
    ///
    /// # Errors
    ///
    /// - [`Error::SendQueueFull`] if the peer is not draining the queue
    /// - [`Error::ConnectionClosed`] if the connection is torn down
    pub fn reserve(&self) -> Result<SendSlot<'_>> {
        match self.outbound_tx.try_reserve() {
            Ok(permit) => Ok(SendSlot { permit }),
            Err(TrySendError::Full(())) => {
                warn!(capacity = self.capacity, "Send queue full");
                Err(Error::SendQueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(())) => Err(Error::ConnectionClosed),
        }
    }

    /// Builds the wire message for `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if a text message is not valid UTF-8.
    pub fn message(encoding: Encoding, bytes: Vec<u8>) -> Result<Message> {
        match encoding {
            Encoding::Text => {
                let text = String::from_utf8(bytes)
                    .map_err(|e| Error::protocol(format!("text message is not UTF-8: {e}")))?;
                Ok(Message::text(text))
            }
            Encoding::Binary => Ok(Message::binary(bytes)),
        }
    }

    /// Requests connection teardown.
    ///
    /// Queued messages not yet written are discarded. Idempotent.
    pub fn close(&self) {
        if let Some(tx) = self.close_tx.lock().take() {
            let _ = tx.send(());
            debug!("Close requested");
        }
    }

    /// Returns `true` once both loops have stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the number of queued outbound messages.
    #[inline]
    #[must_use]
    pub fn queued(&self) -> usize {
        self.capacity - self.outbound_tx.capacity()
    }
}

// ============================================================================
// SendSlot
// ============================================================================

/// A reserved outbound queue slot.
///
/// Sending through a slot cannot fail for lack of room.
pub struct SendSlot<'a> {
    permit: mpsc::Permit<'a, Message>,
}

impl SendSlot<'_> {
    /// Queues `message` in the reserved slot.
    pub fn send(self, message: Message) {
        self.permit.send(message);
    }
}

// ============================================================================
// PumpDriver
// ============================================================================

/// Receiving half of a pump, consumed by [`PumpDriver::start`].
pub struct PumpDriver {
    /// Outbound queue consumer.
    outbound_rx: mpsc::Receiver<Message>,
    /// Queue handle for control replies (pongs).
    control_tx: mpsc::Sender<Message>,
    /// Explicit close request.
    close_rx: oneshot::Receiver<()>,
    /// Shared with [`Pump`].
    closed: Arc<AtomicBool>,
}

impl PumpDriver {
    /// Spawns the read loop, write loop and supervisor.
    ///
    /// Returns the supervisor handle, which completes after `on_close`.
    pub fn start<W, R>(
        self,
        writer: W,
        reader: R,
        on_message: MessageCallback,
        on_close: CloseCallback,
    ) -> JoinHandle<()>
    where
        W: Sink<Message, Error = WsError> + Unpin + Send + 'static,
        R: Stream<Item = StdResult<Message, WsError>> + Unpin + Send + 'static,
    {
        let Self {
            outbound_rx,
            control_tx,
            close_rx,
            closed,
        } = self;

        tokio::spawn(async move {
            let mut read_task = tokio::spawn(read_loop(reader, control_tx, on_message));
            let mut write_task = tokio::spawn(write_loop(writer, outbound_rx, close_rx));

            // Whichever direction stops first takes the other one down.
            tokio::select! {
                _ = &mut read_task => {
                    write_task.abort();
                    let _ = write_task.await;
                }
                _ = &mut write_task => {
                    read_task.abort();
                    let _ = read_task.await;
                }
            }

            closed.store(true, Ordering::Release);

            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(on_close)) {
                error!(panic = %panic_message(panic.as_ref()), "Close callback panicked");
            }

            debug!("Transport pump terminated");
        })
    }
}

// ============================================================================
// Loops
// ============================================================================

/// Reads messages until the stream ends or fails.
async fn read_loop<R>(mut reader: R, control_tx: mpsc::Sender<Message>, on_message: MessageCallback)
where
    R: Stream<Item = StdResult<Message, WsError>> + Unpin,
{
    while let Some(message) = reader.next().await {
        match message {
            Ok(Message::Text(text)) => deliver(&on_message, Encoding::Text, text.as_bytes()),

            Ok(Message::Binary(data)) => deliver(&on_message, Encoding::Binary, &data),

            Ok(Message::Ping(payload)) => {
                if let Err(e) = control_tx.try_send(Message::Pong(payload)) {
                    warn!(error = %e, "Failed to queue pong");
                }
            }

            Ok(Message::Close(frame)) => {
                debug!(?frame, "Connection closed by remote");
                break;
            }

            // Pong and raw frames never reach the application
            Ok(Message::Pong(_) | Message::Frame(_)) => {}

            Err(e) => {
                error!(error = %e, "Read failed");
                break;
            }
        }
    }

    debug!("Read loop terminated");
}

/// Writes queued messages until closed or a write fails.
///
/// A close request interrupts a write the peer is not draining.
async fn write_loop<W>(
    mut writer: W,
    mut outbound_rx: mpsc::Receiver<Message>,
    mut close_rx: oneshot::Receiver<()>,
) where
    W: Sink<Message, Error = WsError> + Unpin,
{
    'write: loop {
        tokio::select! {
            biased;

            // Fires on request and when the Pump is dropped
            _ = &mut close_rx => break 'write,

            message = outbound_rx.recv() => {
                let Some(message) = message else {
                    break 'write;
                };

                tokio::select! {
                    biased;

                    _ = &mut close_rx => {
                        debug!("Close requested during pending write");
                        break 'write;
                    }

                    result = writer.send(message) => {
                        if let Err(e) = result {
                            error!(error = %e, "Write failed");
                            debug!("Write loop terminated");
                            return;
                        }
                        trace!("Message written");
                    }
                }
            }
        }
    }

    if timeout(CLOSE_TIMEOUT, writer.close()).await.is_err() {
        warn!(timeout_ms = CLOSE_TIMEOUT.as_millis() as u64, "Close handshake timed out");
    }

    debug!("Write loop terminated");
}

/// Runs the inbound callback behind a fault boundary.
fn deliver(on_message: &MessageCallback, encoding: Encoding, bytes: &[u8]) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| on_message(encoding, bytes))) {
        error!(panic = %panic_message(panic.as_ref()), "Inbound callback panicked");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::duplex;

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn collecting_callback() -> (MessageCallback, mpsc::UnboundedReceiver<(Encoding, Vec<u8>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: MessageCallback = Arc::new(move |encoding: Encoding, bytes: &[u8]| {
            let _ = tx.send((encoding, bytes.to_vec()));
        });
        (callback, rx)
    }

    fn close_signal() -> (CloseCallback, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Box::new(move || {
                let _ = tx.send(());
            }),
            rx,
        )
    }

    #[tokio::test]
    async fn test_inbound_delivered_in_order() {
        let (writer, reader, peer) = duplex();
        let (pump, driver) = Pump::new(8);
        let (on_message, mut received) = collecting_callback();
        let (on_close, _closed) = close_signal();
        driver.start(writer, reader, on_message, on_close);

        peer.send(Message::text("one"));
        peer.send(Message::binary(vec![2_u8]));
        peer.send(Message::text("three"));

        let first = timeout(WAIT, received.recv()).await.expect("first").expect("open");
        let second = timeout(WAIT, received.recv()).await.expect("second").expect("open");
        let third = timeout(WAIT, received.recv()).await.expect("third").expect("open");

        assert_eq!(first, (Encoding::Text, b"one".to_vec()));
        assert_eq!(second, (Encoding::Binary, vec![2]));
        assert_eq!(third, (Encoding::Text, b"three".to_vec()));
        assert!(!pump.is_closed());
    }

    #[tokio::test]
    async fn test_ping_answered_not_surfaced() {
        let (writer, reader, mut peer) = duplex();
        let (_pump, driver) = Pump::new(8);
        let (on_message, mut received) = collecting_callback();
        let (on_close, _closed) = close_signal();
        driver.start(writer, reader, on_message, on_close);

        peer.send(Message::Ping(b"hi".to_vec().into()));
        peer.send(Message::text("data"));

        let reply = timeout(WAIT, peer.recv()).await.expect("pong").expect("open");
        assert!(matches!(reply, Message::Pong(ref payload) if &payload[..] == b"hi"));

        let (_, bytes) = timeout(WAIT, received.recv()).await.expect("data").expect("open");
        assert_eq!(bytes, b"data");
        assert!(received.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_outbound_fifo() {
        let (writer, reader, mut peer) = duplex();
        let (pump, driver) = Pump::new(16);
        let (on_message, _received) = collecting_callback();
        let (on_close, _closed) = close_signal();
        driver.start(writer, reader, on_message, on_close);

        for i in 0..10 {
            pump.send(Encoding::Text, i.to_string().into_bytes()).expect("send");
        }

        for i in 0..10 {
            let message = timeout(WAIT, peer.recv()).await.expect("message").expect("open");
            assert_eq!(message, Message::text(i.to_string()));
        }
    }

    #[tokio::test]
    async fn test_callback_panic_does_not_stop_reader() {
        let (writer, reader, peer) = duplex();
        let (_pump, driver) = Pump::new(8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let on_message: MessageCallback = Arc::new(move |_: Encoding, bytes: &[u8]| {
            if bytes == b"boom" {
                panic!("handler exploded");
            }
            let _ = tx.send(bytes.to_vec());
        });
        let (on_close, _closed) = close_signal();
        driver.start(writer, reader, on_message, on_close);

        peer.send(Message::text("boom"));
        peer.send(Message::text("after"));

        let bytes = timeout(WAIT, rx.recv()).await.expect("after").expect("open");
        assert_eq!(bytes, b"after");
    }

    #[tokio::test]
    async fn test_remote_hangup_fires_close_once() {
        let (writer, reader, peer) = duplex();
        let (pump, driver) = Pump::new(8);
        let (on_message, _received) = collecting_callback();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let on_close: CloseCallback = Box::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        let supervisor = driver.start(writer, reader, on_message, on_close);

        peer.hang_up();
        timeout(WAIT, supervisor).await.expect("supervisor").expect("join");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(pump.is_closed());
        assert!(matches!(
            pump.send(Encoding::Text, b"late".to_vec()),
            Err(Error::ConnectionClosed)
        ));

        // Idempotent after teardown
        pump.close();
        pump.close();
    }

    #[tokio::test]
    async fn test_remote_close_message_tears_down() {
        let (writer, reader, peer) = duplex();
        let (pump, driver) = Pump::new(8);
        let (on_message, _received) = collecting_callback();
        let (on_close, closed) = close_signal();
        driver.start(writer, reader, on_message, on_close);

        peer.send(Message::Close(None));
        timeout(WAIT, closed).await.expect("closed").expect("signal");
        assert!(pump.is_closed());
    }

    #[tokio::test]
    async fn test_explicit_close() {
        let (writer, reader, _peer) = duplex();
        let (pump, driver) = Pump::new(8);
        let (on_message, _received) = collecting_callback();
        let (on_close, closed) = close_signal();
        driver.start(writer, reader, on_message, on_close);

        pump.close();
        timeout(WAIT, closed).await.expect("closed").expect("signal");
        assert!(pump.is_closed());
    }

    #[tokio::test]
    async fn test_explicit_close_interrupts_stalled_write() {
        // Peer never drains: every write and the close handshake hang
        let writer = Box::pin(futures_util::sink::unfold((), |(), _: Message| async {
            std::future::pending::<StdResult<(), WsError>>().await
        }));
        let reader = futures_util::stream::pending::<StdResult<Message, WsError>>();
        let (pump, driver) = Pump::new(8);
        let (on_message, _received) = collecting_callback();
        let (on_close, closed) = close_signal();
        let supervisor = driver.start(writer, reader, on_message, on_close);

        pump.send(Encoding::Text, b"stuck".to_vec()).expect("queued");
        tokio::time::sleep(Duration::from_millis(50)).await;

        pump.close();
        timeout(WAIT, closed).await.expect("closed").expect("signal");
        timeout(WAIT, supervisor).await.expect("supervisor").expect("join");
        assert!(pump.is_closed());
    }

    #[tokio::test]
    async fn test_write_failure_tears_down() {
        let (writer, reader, peer) = duplex();
        let (pump, driver) = Pump::new(8);
        let (on_message, _received) = collecting_callback();
        let (on_close, closed) = close_signal();
        driver.start(writer, reader, on_message, on_close);

        // Peer stops reading; the next write fails
        let _inbound = peer.stop_reading();
        pump.send(Encoding::Text, b"lost".to_vec()).expect("queued");

        timeout(WAIT, closed).await.expect("closed").expect("signal");
        assert!(pump.is_closed());
    }

    #[test]
    fn test_queue_full() {
        let (pump, _driver) = Pump::new(2);

        pump.send(Encoding::Binary, vec![1]).expect("first");
        pump.send(Encoding::Binary, vec![2]).expect("second");
        assert_eq!(pump.queued(), 2);

        let err = pump.send(Encoding::Binary, vec![3]).err().expect("full");
        assert!(matches!(err, Error::SendQueueFull { capacity: 2 }));
    }

    #[test]
    fn test_reserved_slot_counts_against_capacity() {
        let (pump, _driver) = Pump::new(1);

        let slot = pump.reserve().expect("slot");
        let err = pump.send(Encoding::Binary, vec![1]).err().expect("full");
        assert!(matches!(err, Error::SendQueueFull { capacity: 1 }));

        slot.send(Message::binary(vec![2_u8]));
        assert_eq!(pump.queued(), 1);

        // An unused slot is handed back
        let (pump, _driver) = Pump::new(1);
        drop(pump.reserve().expect("slot"));
        pump.send(Encoding::Binary, vec![3]).expect("released");
    }

    #[test]
    fn test_text_must_be_utf8() {
        let (pump, _driver) = Pump::new(2);
        let err = pump.send(Encoding::Text, vec![0xff, 0xfe]).err().expect("invalid");
        assert!(matches!(err, Error::Protocol { .. }));
        assert_eq!(pump.queued(), 0);
    }
}
