//! Session registry: live sessions keyed by peer identifier.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               Registry                  │
//! │  ┌─────────────────────────────────┐    │
//! │  │ BotId=10001 → Session           │    │
//! │  │ BotId=10002 → Session           │    │
//! │  └─────────────────────────────────┘    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The map is mutated only by connect and disconnect. A second connection
//! announcing the same identifier replaces the first; the replaced session
//! fails its pending calls with [`CloseReason::Replaced`] and a stale
//! disconnect from it never removes the newer entry.

// ============================================================================
// Imports
// ============================================================================

use std::num::NonZeroUsize;
use std::result::Result as StdResult;
use std::sync::Arc;

use futures_util::{Sink, Stream};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{CloseReason, Error, Result};
use crate::identifiers::BotId;
use crate::protocol::{Codec, Encoding, JsonCodec};
use crate::transport::{CloseCallback, MessageCallback, Pump};

use super::Session;
use super::handlers::{Handlers, LifecycleHandler, spawn_guarded};

// ============================================================================
// Registry
// ============================================================================

/// Process-wide map from peer identifier to live [`Session`].
///
/// Owned explicitly by whatever accepts connections, typically a
/// [`Server`](crate::Server).
pub struct Registry {
    /// Live sessions.
    sessions: RwLock<FxHashMap<BotId, Arc<Session>>>,
    /// Dispatch table shared by every session.
    handlers: Arc<Handlers>,
    /// Codec shared by every session.
    codec: Arc<dyn Codec>,
    /// Per-session tuning.
    config: SessionConfig,
    /// Validated `config.max_pending`.
    pending_capacity: NonZeroUsize,
}

// ============================================================================
// Registry - Constructor
// ============================================================================

impl Registry {
    /// Creates a registry using the JSON codec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn new(config: SessionConfig, handlers: Handlers) -> Result<Arc<Self>> {
        Self::with_codec(config, handlers, Arc::new(JsonCodec))
    }

    /// Creates a registry with a custom codec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn with_codec(
        config: SessionConfig,
        handlers: Handlers,
        codec: Arc<dyn Codec>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let pending_capacity = config.pending_capacity()?;

        Ok(Arc::new(Self {
            sessions: RwLock::new(FxHashMap::default()),
            handlers: Arc::new(handlers),
            codec,
            config,
            pending_capacity,
        }))
    }
}

// ============================================================================
// Registry - Public API
// ============================================================================

impl Registry {
    /// Returns the live session for `bot_id`.
    #[inline]
    #[must_use]
    pub fn lookup(&self, bot_id: BotId) -> Option<Arc<Session>> {
        self.sessions.read().get(&bot_id).cloned()
    }

    /// Returns the live session for `bot_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BotNotFound`] if no session is registered.
    pub fn session(&self, bot_id: BotId) -> Result<Arc<Session>> {
        self.lookup(bot_id).ok_or_else(|| Error::bot_not_found(bot_id))
    }

    /// Returns the identifiers of all live sessions.
    #[must_use]
    pub fn bots(&self) -> Vec<BotId> {
        self.sessions.read().keys().copied().collect()
    }

    /// Returns the number of live sessions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if no session is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Returns the configuration given to new sessions.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

// ============================================================================
// Registry - Lifecycle
// ============================================================================

impl Registry {
    /// Registers a session for `bot_id` over an established duplex stream.
    ///
    /// Any prior session for the same identifier is replaced: its pending
    /// calls fail with [`CloseReason::Replaced`] and its transport is closed.
    /// The connect hook fires with the new session.
    pub fn connect<W, R>(self: &Arc<Self>, bot_id: BotId, writer: W, reader: R) -> Arc<Session>
    where
        W: Sink<Message, Error = WsError> + Unpin + Send + 'static,
        R: Stream<Item = StdResult<Message, WsError>> + Unpin + Send + 'static,
    {
        let (pump, driver) = Pump::new(self.config.send_queue_capacity);
        let session = Arc::new(Session::new(
            bot_id,
            pump,
            self.config.clone(),
            self.pending_capacity,
            Arc::clone(&self.handlers),
            Arc::clone(&self.codec),
        ));

        let replaced = self
            .sessions
            .write()
            .insert(bot_id, Arc::clone(&session));

        if let Some(old) = replaced {
            warn!(bot_id = %bot_id, "Replacing existing session");
            old.close_with(CloseReason::Replaced);
        }

        info!(bot_id = %bot_id, "Bot connected");
        self.notify(self.handlers.connect_hook(), &session, "connect");

        let inbound = Arc::clone(&session);
        let on_message: MessageCallback = Arc::new(move |encoding: Encoding, bytes: &[u8]| {
            inbound.on_raw_message(encoding, bytes);
        });

        let registry = Arc::downgrade(self);
        let closing = Arc::clone(&session);
        let on_close: CloseCallback = Box::new(move || match registry.upgrade() {
            Some(registry) => registry.on_disconnect(&closing),
            None => closing.teardown(),
        });

        driver.start(writer, reader, on_message, on_close);

        session
    }

    /// Handles a session whose transport has stopped.
    ///
    /// The entry is removed only if it still belongs to `session`.
    pub(crate) fn on_disconnect(&self, session: &Arc<Session>) {
        let bot_id = session.bot_id();

        let removed = {
            let mut sessions = self.sessions.write();
            let owned = sessions
                .get(&bot_id)
                .is_some_and(|current| Arc::ptr_eq(current, session));
            if owned {
                sessions.remove(&bot_id);
            }
            owned
        };

        session.teardown();

        if removed {
            info!(bot_id = %bot_id, "Bot disconnected");
        } else {
            debug!(bot_id = %bot_id, "Stale disconnect ignored");
        }

        self.notify(self.handlers.disconnect_hook(), session, "disconnect");
    }

    /// Closes every session and empties the registry.
    pub fn shutdown(&self) {
        info!("Registry shutting down");

        let sessions: Vec<_> = {
            let mut map = self.sessions.write();
            map.drain().map(|(_, session)| session).collect()
        };

        for session in sessions {
            session.close_with(CloseReason::Shutdown);
            debug!(bot_id = %session.bot_id(), "Session closed during shutdown");
        }

        info!("Registry shutdown complete");
    }

    /// Fires a lifecycle hook on its own guarded task.
    fn notify(&self, hook: Option<&LifecycleHandler>, session: &Arc<Session>, label: &'static str) {
        let Some(hook) = hook.cloned() else {
            return;
        };

        let target = Arc::clone(session);
        let counted = Arc::clone(session);
        spawn_guarded(
            session.bot_id(),
            label,
            async move { hook(target).await },
            move || counted.record_handler_panic(),
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
