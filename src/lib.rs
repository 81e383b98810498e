//! botwire - Session layer for frame-multiplexed bot protocols.
//!
//! Each connected bot holds one WebSocket connection carrying two kinds of
//! traffic interleaved on the same stream: unsolicited events pushed by the
//! bot, and request/response pairs initiated locally and correlated by an
//! `echo` token.
//!
//! # Architecture
//!
//! - **Transport**: one [`Pump`](transport::Pump) per connection runs an
//!   independent read loop and write loop
//! - **Correlation**: a bounded table matches each response to the request
//!   that caused it
//! - **Session**: decodes frames, routes events to [`Handlers`] and
//!   responses to waiting callers
//! - **Registry**: live sessions by [`BotId`], with connect and disconnect
//!   notifications
//!
//! Key design principles:
//!
//! - A call suspends only its own task, never the read or write loop
//! - Malformed input and handler panics never take a connection down
//! - Teardown fails every pending call exactly once
//!
//! # Quick Start
//!
//! ```no_run
//! use std::net::SocketAddr;
//!
//! use botwire::{Handlers, MessageChain, Registry, Result, Server, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let handlers = Handlers::new().on_group_message(|session, event| async move {
//!         let reply = MessageChain::new().at(event.user_id).text(" pong");
//!         if let Err(e) = session.send_group_msg(event.group_id, reply, false).await {
//!             tracing::warn!(error = %e, "Reply failed");
//!         }
//!     });
//!
//!     let registry = Registry::new(SessionConfig::from_env(), handlers)?;
//!     let addr: SocketAddr = "127.0.0.1:8081".parse().expect("valid address");
//!     let server = Server::bind(addr, registry).await?;
//!     println!("Listening on {}", server.ws_url());
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Session tuning |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Bot identifiers and correlation tokens |
//! | [`protocol`] | Frames, codec and typed payloads |
//! | [`session`] | Sessions, correlation and registry |
//! | [`transport`] | WebSocket pump and listener |

// ============================================================================
// Modules
// ============================================================================

/// Session configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Bot identifiers and correlation tokens.
pub mod identifiers;

/// Protocol frame and payload types.
pub mod protocol;

/// Sessions, correlation table and registry.
///
/// - [`Session`] - One live bot connection
/// - [`Registry`] - Live sessions by bot id
/// - [`Handlers`] - Event and lifecycle callbacks
pub mod session;

/// WebSocket transport layer.
pub mod transport;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::SessionConfig;

// Error types
pub use error::{CloseReason, Error, Result};

// Identifier types
pub use identifiers::{BotId, Echo};

// Protocol types
pub use protocol::{
    Codec, Encoding, Frame, FrameClass, FrameType, GroupMessageEvent, JsonCodec, MessageChain,
    MessageSegment, PrivateMessageEvent,
};

// Session types
pub use session::{Handlers, Registry, Session, SessionStats};

// Transport types
pub use transport::Server;
