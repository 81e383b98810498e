//! Correlation table: matching responses to the requests that caused them.
//!
//! The table is a capacity-bounded LRU keyed by [`Echo`]. Entries are never
//! promoted after insertion, so the least-recently-used entry is always the
//! oldest pending request.
//!
//! # Failure Modes
//!
//! | Cause | Waiter sees |
//! |-------|-------------|
//! | Capacity exceeded on insert | [`Error::Evicted`] (oldest entry) |
//! | Deadline elapsed | [`Error::RequestTimeout`] |
//! | [`CorrelationTable::fail_all`] | [`Error::SessionClosed`] |
//!
//! Eviction trades a possible failure of a legitimate slow request under
//! heavy concurrent load for bounded memory when the peer never answers.

// ============================================================================
// Imports
// ============================================================================

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{CloseReason, Error, Result};
use crate::identifiers::Echo;
use crate::protocol::Frame;

// ============================================================================
// Types
// ============================================================================

/// Single-resolution result slot for one pending request.
type Resolver = oneshot::Sender<Result<Frame>>;

/// Table state guarded by one lock.
struct TableState {
    /// Pending entries, oldest first.
    entries: LruCache<Echo, Resolver>,
    /// Set by `fail_all`; rejects further registrations.
    closed: Option<CloseReason>,
}

// ============================================================================
// PendingCall
// ============================================================================

/// Wait handle returned by [`CorrelationTable::register`].
#[derive(Debug)]
pub struct PendingCall {
    /// Token the response must echo.
    echo: Echo,
    /// Resolution slot.
    receiver: oneshot::Receiver<Result<Frame>>,
}

impl PendingCall {
    /// Returns the correlation token.
    #[inline]
    #[must_use]
    pub fn echo(&self) -> &Echo {
        &self.echo
    }
}

// ============================================================================
// CorrelationTable
// ============================================================================

/// Requests awaiting a response, keyed by correlation token.
///
/// Every entry is resolved exactly once: by its response, by eviction, by
/// timeout, or by [`fail_all`](Self::fail_all).
pub struct CorrelationTable {
    state: Mutex<TableState>,
}

impl CorrelationTable {
    /// Creates a table holding at most `capacity` pending entries.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            state: Mutex::new(TableState {
                entries: LruCache::new(capacity),
                closed: None,
            }),
        }
    }

    /// Adds a pending entry for `echo`.
    ///
    /// When the table is full the oldest entry is evicted and failed with
    /// [`Error::Evicted`] before the new one is admitted.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateEcho`] if `echo` is already pending
    /// - [`Error::SessionClosed`] if the table has been failed
    pub fn register(&self, echo: Echo) -> Result<PendingCall> {
        let (tx, receiver) = oneshot::channel();
        let mut state = self.state.lock();

        if let Some(reason) = state.closed {
            return Err(Error::session_closed(reason));
        }
        if state.entries.contains(&echo) {
            return Err(Error::DuplicateEcho { echo });
        }

        // Outcomes are delivered under the lock so a waiter that fails to
        // cancel always finds its result already sent
        if let Some((old_echo, old_tx)) = state.entries.push(echo.clone(), tx) {
            warn!(echo = %old_echo, "Pending request evicted");
            let _ = old_tx.send(Err(Error::evicted(old_echo)));
        }
        drop(state);

        trace!(echo = %echo, "Pending request registered");
        Ok(PendingCall { echo, receiver })
    }

    /// Resolves the entry for `echo` with `frame`.
    ///
    /// Returns `false` when nothing is pending under `echo` (a late or
    /// duplicate response, or the table was failed).
    pub fn resolve(&self, echo: &Echo, frame: Frame) -> bool {
        let mut state = self.state.lock();
        let Some(tx) = state.entries.pop(echo) else {
            return false;
        };

        if tx.send(Ok(frame)).is_err() {
            debug!(echo = %echo, "Waiter gone before resolution");
        }
        true
    }

    /// Removes the entry for `echo` without resolving it.
    ///
    /// Returns `true` if an entry was removed.
    pub fn cancel(&self, echo: &Echo) -> bool {
        self.state.lock().entries.pop(echo).is_some()
    }

    /// Waits for `pending` to resolve or `deadline` to elapse.
    ///
    /// Suspends only the calling task. On timeout the entry is removed.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestTimeout`] if no response arrived in time
    /// - [`Error::Evicted`] if capacity pressure failed the entry
    /// - [`Error::SessionClosed`] if the table was failed
    /// - [`Error::ConnectionClosed`] if the table was dropped
    pub async fn wait(&self, pending: PendingCall, deadline: Duration) -> Result<Frame> {
        let PendingCall { echo, mut receiver } = pending;

        match timeout(deadline, &mut receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                if self.cancel(&echo) {
                    debug!(echo = %echo, "Pending request timed out");
                    return Err(Error::request_timeout(echo, deadline.as_millis() as u64));
                }

                // Settled between the deadline and the removal; the outcome
                // is already in the slot
                match receiver.try_recv() {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Error::request_timeout(echo, deadline.as_millis() as u64)),
                }
            }
        }
    }

    /// Fails every pending entry and rejects further registrations.
    ///
    /// Returns the number of entries failed. Only the first call has an
    /// effect; a `resolve` racing it either wins before or sees no entry.
    pub fn fail_all(&self, reason: CloseReason) -> usize {
        let mut state = self.state.lock();
        if state.closed.is_some() {
            return 0;
        }
        state.closed = Some(reason);

        let mut count = 0;
        while let Some((_, tx)) = state.entries.pop_lru() {
            let _ = tx.send(Err(Error::session_closed(reason)));
            count += 1;
        }
        drop(state);

        if count > 0 {
            debug!(count, %reason, "Failed pending requests");
        }
        count
    }

    /// Returns the number of pending entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns `true` if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the capacity bound.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.lock().entries.cap().get()
    }

    /// Returns `true` if `echo` is pending.
    #[inline]
    #[must_use]
    pub fn contains(&self, echo: &Echo) -> bool {
        self.state.lock().entries.contains(echo)
    }

    /// Returns `true` once [`fail_all`](Self::fail_all) has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================
