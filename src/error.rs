//! Error types for botwire.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use botwire::{MessageChain, Result, Session};
//!
//! async fn greet(session: &Session, group_id: i64) -> Result<()> {
//!     let chain = MessageChain::new().text("hello");
//!     session.send_group_msg(group_id, chain, false).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Handshake`], [`Error::ConnectionClosed`] |
//! | Inbound | [`Error::Decode`], [`Error::UnknownFrameType`] |
//! | Call | [`Error::Send`], [`Error::SendQueueFull`], [`Error::RequestTimeout`], [`Error::Evicted`], [`Error::SessionClosed`], [`Error::DuplicateEcho`] |
//! | Payload | [`Error::Protocol`], [`Error::Remote`] |
//! | Lookup | [`Error::BotNotFound`] |
//! | External | [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::{BotId, Echo};
use crate::protocol::FrameType;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// CloseReason
// ============================================================================

/// Why a session stopped accepting calls.
///
/// Carried by [`Error::SessionClosed`] so callers can tell a dropped peer
/// from a replaced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// The peer closed the connection or the transport failed.
    Disconnected,
    /// A newer connection announced the same bot ID.
    Replaced,
    /// The registry was shut down.
    Shutdown,
    /// The session was closed locally.
    Closed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Disconnected => "disconnected",
            Self::Replaced => "replaced by a newer connection",
            Self::Shutdown => "registry shut down",
            Self::Closed => "closed locally",
        };
        f.write_str(text)
    }
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when session configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket upgrade rejected.
    ///
    /// Returned when the peer does not announce a usable bot ID.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    /// Connection already torn down.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Inbound Errors
    // ========================================================================
    /// Inbound bytes could not be decoded into a frame.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    /// Frame discriminant not recognized.
    #[error("Unknown frame type: {frame_type:?}")]
    UnknownFrameType {
        /// The unrecognized discriminant.
        frame_type: FrameType,
    },

    // ========================================================================
    // Call Errors
    // ========================================================================
    /// Request never left the session.
    ///
    /// Serialization or transport failure before the request was written.
    #[error("Failed to send request {echo}: {source}")]
    Send {
        /// Correlation token of the failed request.
        echo: Echo,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Outbound queue is full.
    ///
    /// The peer is not draining fast enough.
    #[error("Send queue full ({capacity} messages)")]
    SendQueueFull {
        /// Queue capacity.
        capacity: usize,
    },

    /// No response within the call deadline.
    #[error("Request {echo} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Correlation token of the request that timed out.
        echo: Echo,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Pending call pre-empted by capacity pressure.
    #[error("Request {echo} evicted: too many pending requests")]
    Evicted {
        /// Correlation token of the evicted request.
        echo: Echo,
    },

    /// Session closed while the call was outstanding.
    #[error("Session closed: {reason}")]
    SessionClosed {
        /// Why the session closed.
        reason: CloseReason,
    },

    /// Correlation token already pending.
    #[error("Request {echo} is already pending")]
    DuplicateEcho {
        /// The duplicated token.
        echo: Echo,
    },

    // ========================================================================
    // Payload Errors
    // ========================================================================
    /// Protocol violation or unexpected response shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Peer answered with `ok = false`.
    #[error("Peer rejected {frame_type:?} request {echo}")]
    Remote {
        /// Response discriminant.
        frame_type: FrameType,
        /// Correlation token.
        echo: Echo,
    },

    // ========================================================================
    // Lookup Errors
    // ========================================================================
    /// No live session for the bot.
    #[error("Bot not found: {bot_id}")]
    BotNotFound {
        /// The missing bot ID.
        bot_id: BotId,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Wraps a failure that kept a request from leaving the session.
    #[inline]
    pub fn send(echo: Echo, source: Error) -> Self {
        Self::Send {
            echo,
            source: Box::new(source),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(echo: Echo, timeout_ms: u64) -> Self {
        Self::RequestTimeout { echo, timeout_ms }
    }

    /// Creates an eviction error.
    #[inline]
    pub fn evicted(echo: Echo) -> Self {
        Self::Evicted { echo }
    }

    /// Creates a session closed error.
    #[inline]
    pub fn session_closed(reason: CloseReason) -> Self {
        Self::SessionClosed { reason }
    }

    /// Creates a bot not found error.
    #[inline]
    pub fn bot_not_found(bot_id: BotId) -> Self {
        Self::BotNotFound { bot_id }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Returns `true` if the request failed before leaving the session.
    #[inline]
    #[must_use]
    pub fn is_send_error(&self) -> bool {
        matches!(self, Self::Send { .. } | Self::SendQueueFull { .. })
    }

    /// Returns `true` if the call failed because its session went away.
    #[inline]
    #[must_use]
    pub fn is_teardown(&self) -> bool {
        matches!(self, Self::SessionClosed { .. } | Self::ConnectionClosed)
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout { .. } | Self::Evicted { .. } | Self::SendQueueFull { .. }
        )
    }
}

// ============================================================================
// Panic Payloads
// ============================================================================

/// Renders a caught panic payload for logging.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
