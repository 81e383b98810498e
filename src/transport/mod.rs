//! WebSocket transport layer.
//!
//! This module moves bytes between the local sessions and the connected
//! bots. It knows nothing about frames.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Session (Rust) │                              │  Bot            │
//! │                 │         WebSocket            │                 │
//! │  Pump           │◄────────────────────────────►│  WebSocket      │
//! │  read + write   │   x-self-id: <bot id>        │  Client         │
//! │                 │                              │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Server::bind` - Bind the listener and start accepting
//! 2. Bot connects and announces its id in the upgrade request
//! 3. `Registry::connect` - Start a `Pump` over the split stream
//! 4. `Pump` - Read loop and write loop run independently
//! 5. Either loop stops - Close callback fires once
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `pump` | Read loop, write loop and teardown |
//! | `server` | Listener and upgrade handshake |

// ============================================================================
// Submodules
// ============================================================================

/// Duplex connection pump.
pub mod pump;

/// WebSocket listener for bots.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use pump::{CloseCallback, MessageCallback, Pump, PumpDriver, SendSlot};
pub use server::{SELF_ID_HEADER, Server};
