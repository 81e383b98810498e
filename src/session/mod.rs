//! Sessions, correlation and the registry.
//!
//! # Data Flow
//!
//! ```text
//! bytes ─► Pump ─► Session::on_raw_message ─► classify ─┬─► Handlers (event)
//!                                                       └─► CorrelationTable (response)
//!
//! Session::call ─► encode ─► Pump::send ─► write loop ─► wire
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `correlation` | Pending requests keyed by token |
//! | `core` | [`Session`] routing and call contract |
//! | `api` | Typed peer actions |
//! | `handlers` | Dispatch table and fault boundary |
//! | `registry` | Live sessions by peer identifier |

// ============================================================================
// Submodules
// ============================================================================

/// Typed peer actions on [`Session`].
mod api;

/// Pending request table.
pub mod correlation;

/// Session routing and call contract.
mod core;

/// Event and lifecycle handlers.
pub mod handlers;

/// Session registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{Session, SessionStats};
pub use correlation::{CorrelationTable, PendingCall};
pub use handlers::{EventHandler, Handlers, LifecycleHandler};
pub use registry::Registry;
