//! Per-peer session: frame routing and the request/response call contract.
//!
//! A [`Session`] ties one transport [`Pump`] to one [`CorrelationTable`].
//! Inbound bytes are decoded and classified:
//!
//! | Class | Routed to |
//! |-------|-----------|
//! | Event | Registered handler, on its own task |
//! | Response | Correlation table, by `echo` |
//! | Request / Unknown | Dropped with a warning |
//!
//! Outbound, [`Session::call`] stamps a fresh token on the request, queues
//! it on the pump and suspends only the calling task until the matching
//! response, a timeout, an eviction or teardown.

// ============================================================================
// Imports
// ============================================================================

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::error::{CloseReason, Error, Result};
use crate::identifiers::{BotId, Echo};
use crate::protocol::{ApiRequest, Codec, Encoding, Frame, FrameClass};
use crate::transport::Pump;

use super::correlation::CorrelationTable;
use super::handlers::{Handlers, spawn_guarded};

// ============================================================================
// SessionStats
// ============================================================================

/// Snapshot of a session's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Inbound messages that failed to decode.
    pub decode_errors: u64,
    /// Inbound frames with an unrecognized or unexpected discriminant.
    pub unknown_frames: u64,
    /// Responses with no pending request.
    pub unmatched_responses: u64,
    /// Events handed to a handler.
    pub events_dispatched: u64,
    /// Handler tasks that panicked.
    pub handler_panics: u64,
}

/// Live counters behind [`SessionStats`].
#[derive(Debug, Default)]
struct Counters {
    decode_errors: AtomicU64,
    unknown_frames: AtomicU64,
    unmatched_responses: AtomicU64,
    events_dispatched: AtomicU64,
    handler_panics: AtomicU64,
}

impl Counters {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SessionStats {
        SessionStats {
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            unknown_frames: self.unknown_frames.load(Ordering::Relaxed),
            unmatched_responses: self.unmatched_responses.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// One live peer connection.
///
/// Sessions are created by [`Registry::connect`](super::Registry::connect)
/// and shared as `Arc<Session>`. All methods take `&self` and are safe to
/// call from any task.
pub struct Session {
    /// Peer identifier announced at handshake.
    bot_id: BotId,
    /// Send side of the transport.
    pump: Pump,
    /// Requests awaiting a response.
    pending: CorrelationTable,
    /// Shared dispatch table.
    handlers: Arc<Handlers>,
    /// Frame codec.
    codec: Arc<dyn Codec>,
    /// Tuning.
    config: SessionConfig,
    /// First close reason recorded.
    close_reason: OnceLock<CloseReason>,
    /// Inbound counters.
    counters: Counters,
}

impl Session {
    /// Creates a session over `pump`. The pump driver is started by the caller.
    pub(crate) fn new(
        bot_id: BotId,
        pump: Pump,
        config: SessionConfig,
        pending_capacity: NonZeroUsize,
        handlers: Arc<Handlers>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            bot_id,
            pump,
            pending: CorrelationTable::new(pending_capacity),
            handlers,
            codec,
            config,
            close_reason: OnceLock::new(),
            counters: Counters::default(),
        }
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl Session {
    /// Returns the peer identifier.
    #[inline]
    #[must_use]
    pub fn bot_id(&self) -> BotId {
        self.bot_id
    }

    /// Returns the number of requests awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns a snapshot of the inbound counters.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    /// Returns the configuration this session runs with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns why the session closed, if it has.
    #[inline]
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get().copied()
    }

    /// Returns `true` once the session no longer accepts calls.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close_reason.get().is_some() || self.pending.is_closed() || self.pump.is_closed()
    }
}

// ============================================================================
// Calls
// ============================================================================

impl Session {
    /// Sends `request` and waits for its response with the configured deadline.
    ///
    /// The returned frame may carry `ok = false`; typed wrappers turn that
    /// into [`Error::Remote`].
    ///
    /// A queue slot is reserved before the request is registered, so a
    /// request that never leaves cannot evict another pending call. A
    /// registered request can still evict the oldest one at capacity.
    ///
    /// # Errors
    ///
    /// - [`Error::Send`] if the request could not be encoded or queued
    /// - [`Error::RequestTimeout`] if no response arrived in time
    /// - [`Error::Evicted`] if capacity pressure failed the request
    /// - [`Error::SessionClosed`] if the session closed first
    pub async fn call(&self, request: Frame) -> Result<Frame> {
        self.call_with_timeout(request, self.config.call_timeout).await
    }

    /// Like [`call`](Self::call) with an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn call_with_timeout(&self, mut request: Frame, deadline: Duration) -> Result<Frame> {
        request.echo = Echo::next();
        request.bot_id = self.bot_id;
        request.ok = true;

        let echo = request.echo.clone();
        let encoding = self.config.encoding;

        // A request that cannot be queued fails here, before it takes a
        // correlation entry and possibly evicts a live call
        let prepared = self
            .codec
            .encode(&request, encoding)
            .and_then(|bytes| Pump::message(encoding, bytes))
            .and_then(|message| Ok((message, self.pump.reserve()?)));

        let (message, slot) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(bot_id = %self.bot_id, echo = %echo, error = %e, "Request not sent");
                return Err(Error::send(echo, e));
            }
        };

        let pending = self.pending.register(echo.clone())?;

        trace!(
            bot_id = %self.bot_id,
            echo = %echo,
            frame_type = ?request.frame_type,
            "Sending request"
        );
        slot.send(message);

        self.pending.wait(pending, deadline).await
    }

    /// Sends a typed request and decodes its typed response.
    ///
    /// # Errors
    ///
    /// Everything [`call`](Self::call) returns, plus:
    /// - [`Error::Remote`] if the peer answered with `ok = false`
    /// - [`Error::Protocol`] if the response has the wrong type or shape
    pub async fn request<R: ApiRequest>(&self, request: &R) -> Result<R::Response> {
        let frame = Frame::request(R::REQUEST, request)?;
        let response = self.call(frame).await?;
        response.expect_payload(R::RESPONSE)
    }
}

// ============================================================================
// Inbound
// ============================================================================

impl Session {
    /// Decodes and routes one inbound payload.
    ///
    /// Never fails: malformed, unknown and unmatched frames are logged,
    /// counted and dropped.
    pub(crate) fn on_raw_message(self: &Arc<Self>, encoding: Encoding, bytes: &[u8]) {
        let frame = match self.codec.decode(encoding, bytes) {
            Ok(frame) => frame,
            Err(e) => {
                Counters::bump(&self.counters.decode_errors);
                warn!(bot_id = %self.bot_id, len = bytes.len(), error = %e, "Dropping undecodable message");
                return;
            }
        };

        match frame.class() {
            FrameClass::Event => self.dispatch(frame),

            FrameClass::Response => {
                let echo = frame.echo.clone();
                if self.pending.resolve(&echo, frame) {
                    trace!(bot_id = %self.bot_id, echo = %echo, "Response matched");
                } else {
                    Counters::bump(&self.counters.unmatched_responses);
                    warn!(bot_id = %self.bot_id, echo = %echo, "Response has no pending request");
                }
            }

            FrameClass::Request | FrameClass::Unknown => {
                Counters::bump(&self.counters.unknown_frames);
                let e = Error::UnknownFrameType {
                    frame_type: frame.frame_type,
                };
                warn!(bot_id = %self.bot_id, error = %e, "Dropping frame");
            }
        }
    }

    /// Runs the handler for an event frame on its own guarded task.
    fn dispatch(self: &Arc<Self>, frame: Frame) {
        let kind = frame.frame_type;
        let Some(handler) = self.handlers.event(kind).cloned() else {
            trace!(bot_id = %self.bot_id, ?kind, "No handler for event");
            return;
        };

        Counters::bump(&self.counters.events_dispatched);

        let session = Arc::clone(self);
        let counted = Arc::clone(self);
        spawn_guarded(
            self.bot_id,
            "event",
            async move { handler(session, frame).await },
            move || counted.record_handler_panic(),
        );
    }

    /// Counts a handler task that panicked.
    pub(crate) fn record_handler_panic(&self) {
        Counters::bump(&self.counters.handler_panics);
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

impl Session {
    /// Closes the session.
    ///
    /// Pending calls fail with [`CloseReason::Closed`]; the transport is
    /// torn down and the disconnect hook fires once it has stopped.
    pub fn close(&self) {
        self.close_with(CloseReason::Closed);
    }

    /// Closes the session, failing pending calls with `reason`.
    ///
    /// Only the first reason is kept.
    pub(crate) fn close_with(&self, reason: CloseReason) {
        if self.close_reason.set(reason).is_ok() {
            info!(bot_id = %self.bot_id, %reason, "Closing session");
        }

        let reason = self.close_reason().unwrap_or(reason);
        self.pending.fail_all(reason);
        self.pump.close();
    }

    /// Fails everything still pending once the transport has stopped.
    pub(crate) fn teardown(&self) {
        let reason = self.close_reason().unwrap_or(CloseReason::Disconnected);
        let failed = self.pending.fail_all(reason);
        debug!(bot_id = %self.bot_id, failed, %reason, "Session torn down");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FrameType, SendGroupMsgReq};
    use crate::session::{Handlers, Registry};
    use crate::testing::{connect, registry};

    use std::sync::atomic::AtomicUsize;

    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};
    use tokio_test::{assert_err, assert_ok};
    use tokio_tungstenite::tungstenite::Message;

    const WAIT: Duration = Duration::from_secs(5);

    fn quick_config() -> SessionConfig {
        SessionConfig::new().with_call_timeout(Duration::from_millis(100))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(WAIT, async {
            while !condition() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition within deadline");
    }

    fn group_request() -> Frame {
        Frame::new(FrameType::SendGroupMsgReq, json!({ "group_id": 1, "message": [] }))
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let registry = registry(SessionConfig::new(), Handlers::new());
        let (session, mut peer) = connect(&registry, 10001);

        let caller = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.call(group_request()).await })
        };

        let request = peer.recv_request().await;
        assert_eq!(request.bot_id, BotId::new(10001));
        assert!(request.ok);
        assert!(!request.echo.is_empty());

        peer.send_frame(&Frame::reply_to(
            &request,
            FrameType::SendGroupMsgResp,
            json!({ "message_id": 99 }),
        ));

        let response = caller.await.expect("join").expect("response");
        assert_eq!(response.echo, request.echo);
        assert_eq!(response.data["message_id"], 99);
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_typed_request() {
        let registry = registry(SessionConfig::new(), Handlers::new());
        let (session, mut peer) = connect(&registry, 1);

        let caller = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .request(&SendGroupMsgReq {
                        group_id: 5,
                        message: Vec::new(),
                        auto_escape: false,
                    })
                    .await
            })
        };

        let request = peer.recv_request().await;
        assert_eq!(request.frame_type, FrameType::SendGroupMsgReq);
        assert_eq!(request.data["group_id"], 5);

        peer.send_frame(&Frame::reply_to(
            &request,
            FrameType::SendGroupMsgResp,
            json!({ "message_id": 7 }),
        ));

        let response = caller.await.expect("join").expect("typed response");
        assert_eq!(response.message_id, 7);
    }

    #[tokio::test]
    async fn test_typed_request_rejected_by_peer() {
        let registry = registry(SessionConfig::new(), Handlers::new());
        let (session, mut peer) = connect(&registry, 1);

        let caller = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.get_login_info().await })
        };

        let request = peer.recv_request().await;
        let mut reply = Frame::reply_to(&request, FrameType::GetLoginInfoResp, json!({}));
        reply.ok = false;
        peer.send_frame(&reply);

        let err = caller.await.expect("join").err().expect("remote error");
        assert!(matches!(err, Error::Remote { .. }));
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_entry() {
        let registry = registry(quick_config(), Handlers::new());
        let (session, mut peer) = connect(&registry, 1);

        let err = assert_err!(session.call(group_request()).await);
        assert!(err.is_timeout());
        assert_eq!(session.pending_count(), 0);

        // The late response is discarded as unmatched
        let request = peer.recv_request().await;
        peer.send_frame(&Frame::reply_to(&request, FrameType::SendGroupMsgResp, json!({})));
        wait_until(|| session.stats().unmatched_responses == 1).await;
    }

    #[tokio::test]
    async fn test_eviction_fails_oldest_call() {
        let config = SessionConfig::new().with_max_pending(1);
        let registry = registry(config, Handlers::new());
        let (session, mut peer) = connect(&registry, 1);

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.call(group_request()).await })
        };
        let _first_request = peer.recv_request().await;

        let second = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.call(group_request()).await })
        };
        let second_request = peer.recv_request().await;

        let err = first.await.expect("join").err().expect("evicted");
        assert!(matches!(err, Error::Evicted { .. }));

        peer.send_frame(&Frame::reply_to(
            &second_request,
            FrameType::SendGroupMsgResp,
            json!({ "message_id": 2 }),
        ));
        let response = assert_ok!(second.await.expect("join"));
        assert_eq!(response.data["message_id"], 2);
    }

    #[tokio::test]
    async fn test_full_send_queue_does_not_evict_pending_call() {
        use futures_util::{sink, stream};
        use tokio_tungstenite::tungstenite::Error as WsError;

        let config = SessionConfig::new()
            .with_max_pending(2)
            .with_send_queue_capacity(1);
        let registry = registry(config, Handlers::new());

        // Peer never drains: the first write hangs, the second fills the queue
        let writer = Box::pin(sink::unfold((), |(), _: Message| async {
            std::future::pending::<std::result::Result<(), WsError>>().await
        }));
        let reader = stream::pending::<std::result::Result<Message, WsError>>();
        let session = registry.connect(BotId::new(1), writer, reader);

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.call(group_request()).await })
        };
        wait_until(|| session.pending_count() == 1).await;
        sleep(Duration::from_millis(50)).await;

        let second = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.call(group_request()).await })
        };
        wait_until(|| session.pending_count() == 2).await;

        let err = assert_err!(session.call(group_request()).await);
        assert!(err.is_send_error());
        assert!(matches!(
            err,
            Error::Send { ref source, .. } if matches!(**source, Error::SendQueueFull { capacity: 1 })
        ));
        assert_eq!(session.pending_count(), 2);
        assert!(!first.is_finished());
        assert!(!second.is_finished());

        session.close();
        assert!(first.await.expect("join").is_err());
        assert!(second.await.expect("join").is_err());
    }

    #[tokio::test]
    async fn test_call_after_transport_loss_fails() {
        let registry = registry(SessionConfig::new(), Handlers::new());
        let (session, peer) = connect(&registry, 1);

        // The pong write fails once the peer stops reading
        peer.send(Message::Ping(Vec::new().into()));
        let _inbound = peer.stop_reading();
        wait_until(|| session.is_closed()).await;

        let err = assert_err!(session.call(group_request()).await);
        assert!(err.is_teardown() || err.is_send_error());
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_close_fails_pending_calls() {
        let registry = registry(SessionConfig::new(), Handlers::new());
        let (session, mut peer) = connect(&registry, 1);

        let caller = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.call(group_request()).await })
        };
        let _request = peer.recv_request().await;

        session.close();

        let err = caller.await.expect("join").err().expect("closed");
        assert!(matches!(
            err,
            Error::SessionClosed {
                reason: CloseReason::Closed
            }
        ));
        assert_eq!(session.close_reason(), Some(CloseReason::Closed));

        let err = assert_err!(session.call(group_request()).await);
        assert!(err.is_teardown());
    }

    #[tokio::test]
    async fn test_malformed_bytes_counted_not_fatal() {
        let registry = registry(SessionConfig::new(), Handlers::new());
        let (session, mut peer) = connect(&registry, 1);

        peer.send(Message::binary(vec![0x00, 0xff, 0x13]));
        wait_until(|| session.stats().decode_errors == 1).await;

        // The connection still serves calls
        let caller = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.call(group_request()).await })
        };
        let request = peer.recv_request().await;
        peer.send_frame(&Frame::reply_to(&request, FrameType::SendGroupMsgResp, json!({})));
        assert_ok!(caller.await.expect("join"));
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_unknown_and_request_frames_dropped() {
        let registry = registry(SessionConfig::new(), Handlers::new());
        let (session, peer) = connect(&registry, 1);

        peer.send(Message::text(r#"{ "frame_type": "brand_new_kind" }"#));
        peer.send_frame(&Frame::new(FrameType::DeleteMsgReq, json!({})));

        wait_until(|| session.stats().unknown_frames == 2).await;
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_event_dispatched_to_handler() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handlers = Handlers::new().on_group_message(move |session, event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((session.bot_id(), event.group_id, event.raw_message));
            }
        });
        let registry = registry(SessionConfig::new(), handlers);
        let (_session, peer) = connect(&registry, 7);

        peer.send_frame(&Frame::new(
            FrameType::GroupMessageEvent,
            json!({ "group_id": 123, "raw_message": "hello" }),
        ));

        let (bot_id, group_id, text) = timeout(WAIT, rx.recv()).await.expect("event").expect("open");
        assert_eq!(bot_id, BotId::new(7));
        assert_eq!(group_id, 123);
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_handler_panic_does_not_stop_later_frames() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let handlers = Handlers::new()
            .on_event(FrameType::FriendAddNoticeEvent, |_, _| async {
                panic!("handler exploded");
            })
            .on_event(FrameType::GroupRecallNoticeEvent, move |_, _| {
                let seen = Arc::clone(&seen_clone);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            });
        let registry = registry(SessionConfig::new(), handlers);
        let (session, peer) = connect(&registry, 1);

        peer.send_frame(&Frame::new(FrameType::FriendAddNoticeEvent, json!({})));
        peer.send_frame(&Frame::new(FrameType::GroupRecallNoticeEvent, json!({})));

        wait_until(|| seen.load(Ordering::SeqCst) == 1).await;
        wait_until(|| session.stats().handler_panics == 1).await;
        assert_eq!(session.stats().events_dispatched, 2);
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_event_without_handler_is_noop() {
        let registry: Arc<Registry> = registry(SessionConfig::new(), Handlers::new());
        let (session, peer) = connect(&registry, 1);

        peer.send_frame(&Frame::new(FrameType::GroupBanNoticeEvent, json!({})));
        peer.send(Message::text("not json"));

        wait_until(|| session.stats().decode_errors == 1).await;
        assert_eq!(session.stats().events_dispatched, 0);
    }
}
