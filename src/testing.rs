//! In-memory duplex transport for unit tests.
//!
//! [`duplex`] returns the local sink/stream pair a pump consumes and a
//! [`Peer`] that plays the remote side.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, Stream, sink, stream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::identifiers::BotId;
use crate::protocol::{Frame, FrameClass};
use crate::session::{Handlers, Registry};
use crate::{Session, SessionConfig};

pub(crate) type BoxSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
pub(crate) type BoxStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

const WAIT: Duration = Duration::from_secs(5);

/// Remote end of an in-memory connection.
pub(crate) struct Peer {
    inbound: mpsc::UnboundedSender<Result<Message, WsError>>,
    outbound: mpsc::UnboundedReceiver<Message>,
}

/// Creates a connected sink/stream pair and its remote peer.
pub(crate) fn duplex() -> (BoxSink, BoxStream, Peer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let writer = sink::unfold(outbound_tx, |tx: mpsc::UnboundedSender<Message>, message| async move {
        tx.send(message).map_err(|_| WsError::ConnectionClosed)?;
        Ok::<_, WsError>(tx)
    });

    let reader = stream::unfold(inbound_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    let peer = Peer {
        inbound: inbound_tx,
        outbound: outbound_rx,
    };

    (Box::pin(writer), Box::pin(reader), peer)
}

impl Peer {
    /// Delivers a message to the local side.
    pub(crate) fn send(&self, message: Message) {
        let _ = self.inbound.send(Ok(message));
    }

    /// Delivers a frame as JSON text.
    pub(crate) fn send_frame(&self, frame: &Frame) {
        let json = serde_json::to_string(frame).expect("serialize frame");
        self.send(Message::text(json));
    }

    /// Next message written by the local side.
    pub(crate) async fn recv(&mut self) -> Option<Message> {
        self.outbound.recv().await
    }

    /// Next request frame written by the local side.
    pub(crate) async fn recv_request(&mut self) -> Frame {
        loop {
            let message = timeout(WAIT, self.recv())
                .await
                .expect("request within deadline")
                .expect("connection open");

            let bytes = match message {
                Message::Text(text) => text.as_bytes().to_vec(),
                Message::Binary(data) => data.to_vec(),
                _ => continue,
            };

            let frame: Frame = serde_json::from_slice(&bytes).expect("decode request");
            assert_eq!(frame.class(), FrameClass::Request);
            return frame;
        }
    }

    /// Closes both directions.
    pub(crate) fn hang_up(self) {
        drop(self);
    }

    /// Stops reading; returns the inbound sender so the read side stays open.
    pub(crate) fn stop_reading(self) -> mpsc::UnboundedSender<Result<Message, WsError>> {
        self.inbound
    }
}

/// Connects an in-memory peer to `registry`.
pub(crate) fn connect(registry: &Arc<Registry>, bot_id: i64) -> (Arc<Session>, Peer) {
    let (writer, reader, peer) = duplex();
    let session = registry.connect(BotId::new(bot_id), writer, reader);
    (session, peer)
}

/// Registry with `config` and `handlers`.
pub(crate) fn registry(config: SessionConfig, handlers: Handlers) -> Arc<Registry> {
    Registry::new(config, handlers).expect("valid config")
}
