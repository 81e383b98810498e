//! Application callbacks and the fault boundary they run behind.
//!
//! [`Handlers`] holds one optional slot per event kind plus connect and
//! disconnect hooks. It is built once and shared by every session of a
//! [`Registry`](super::Registry).
//!
//! Every callback runs on its own task wrapped in `catch_unwind`, so a
//! slow handler never stalls the read loop and a panicking one is logged
//! and counted without affecting the connection.
//!
//! # Example
//!
//! ```ignore
//! use botwire::{Handlers, MessageChain};
//!
//! let handlers = Handlers::new()
//!     .on_connect(|session| async move {
//!         tracing::info!(bot_id = %session.bot_id(), "Bot online");
//!     })
//!     .on_group_message(|session, event| async move {
//!         let reply = MessageChain::new().text(event.raw_message);
//!         let _ = session.send_group_msg(event.group_id, reply, false).await;
//!     });
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::error::panic_message;
use crate::identifiers::BotId;
use crate::protocol::{Frame, FrameType, GroupMessageEvent, PrivateMessageEvent};

use super::Session;

// ============================================================================
// Types
// ============================================================================

/// Handler for one event kind.
pub type EventHandler = Arc<dyn Fn(Arc<Session>, Frame) -> BoxFuture<'static, ()> + Send + Sync>;

/// Connect or disconnect hook.
pub type LifecycleHandler = Arc<dyn Fn(Arc<Session>) -> BoxFuture<'static, ()> + Send + Sync>;

// ============================================================================
// Handlers
// ============================================================================

/// Dispatch table for events and lifecycle notifications.
///
/// Unset slots are no-ops.
#[derive(Clone, Default)]
pub struct Handlers {
    on_connect: Option<LifecycleHandler>,
    on_disconnect: Option<LifecycleHandler>,
    events: FxHashMap<FrameType, EventHandler>,
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Handlers {
    /// Creates an empty dispatch table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hook fired after a session is registered.
    #[must_use]
    pub fn on_connect<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Arc<Session>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_connect = Some(Arc::new(move |session: Arc<Session>| handler(session).boxed()));
        self
    }

    /// Sets the hook fired once a session's transport has closed.
    #[must_use]
    pub fn on_disconnect<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Arc<Session>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_disconnect = Some(Arc::new(move |session: Arc<Session>| handler(session).boxed()));
        self
    }

    /// Sets the raw handler for event kind `kind`, replacing any previous one.
    ///
    /// Non-event kinds are never dispatched; registering one is ignored with
    /// a warning.
    #[must_use]
    pub fn on_event<F, Fut>(mut self, kind: FrameType, handler: F) -> Self
    where
        F: Fn(Arc<Session>, Frame) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !kind.is_event() {
            warn!(?kind, "Ignoring handler for non-event frame type");
            return self;
        }

        self.events.insert(
            kind,
            Arc::new(move |session: Arc<Session>, frame: Frame| handler(session, frame).boxed()),
        );
        self
    }

    /// Sets the handler for private messages.
    #[must_use]
    pub fn on_private_message<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Arc<Session>, PrivateMessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_typed(FrameType::PrivateMessageEvent, handler)
    }

    /// Sets the handler for group messages.
    #[must_use]
    pub fn on_group_message<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Arc<Session>, GroupMessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_typed(FrameType::GroupMessageEvent, handler)
    }

    /// Registers a handler that receives the decoded payload.
    ///
    /// Payloads that fail to decode are logged and skipped.
    fn on_typed<T, F, Fut>(self, kind: FrameType, handler: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(Arc<Session>, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_event(kind, move |session: Arc<Session>, frame: Frame| {
            let call = frame.payload::<T>().map(|event| handler(session, event));
            async move {
                match call {
                    Ok(fut) => fut.await,
                    Err(e) => warn!(?kind, error = %e, "Dropping event with malformed payload"),
                }
            }
        })
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl Handlers {
    /// Returns the handler registered for `kind`.
    #[inline]
    #[must_use]
    pub fn event(&self, kind: FrameType) -> Option<&EventHandler> {
        self.events.get(&kind)
    }

    /// Returns the connect hook.
    #[inline]
    #[must_use]
    pub fn connect_hook(&self) -> Option<&LifecycleHandler> {
        self.on_connect.as_ref()
    }

    /// Returns the disconnect hook.
    #[inline]
    #[must_use]
    pub fn disconnect_hook(&self) -> Option<&LifecycleHandler> {
        self.on_disconnect.as_ref()
    }
}

// ============================================================================
// Fault Boundary
// ============================================================================

/// Spawns `task` behind a panic boundary.
///
/// A panic is logged with `label` and reported through `on_panic`; it never
/// propagates to the spawner.
pub(crate) fn spawn_guarded<F, P>(
    bot_id: BotId,
    label: &'static str,
    task: F,
    on_panic: P,
) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
    P: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
            error!(
                bot_id = %bot_id,
                handler = label,
                panic = %panic_message(panic.as_ref()),
                "Handler panicked"
            );
            on_panic();
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
