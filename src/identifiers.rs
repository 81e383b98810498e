//! Type-safe identifiers for peers and requests.
//!
//! Newtype wrappers keep bot IDs and correlation tokens from being mixed
//! with plain integers and strings.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Process-wide correlation token counter.
static NEXT_ECHO: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// BotId
// ============================================================================

/// Identifier a peer announces when it connects.
///
/// Stable across reconnects; at most one session per `BotId` is live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotId(i64);

impl BotId {
    /// Creates a bot ID from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BotId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<i64> for BotId {
    #[inline]
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Echo
// ============================================================================

/// Correlation token linking a request to its response.
///
/// The peer echoes it back verbatim, so it travels as an opaque string.
/// Tokens from [`Echo::next`] are unique for the life of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Echo(String);

impl Echo {
    /// Generates a fresh token.
    #[must_use]
    pub fn next() -> Self {
        let id = NEXT_ECHO.fetch_add(1, Ordering::Relaxed);
        Self(id.to_string())
    }

    /// Returns the token as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty token carried by events.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Echo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Echo {
    #[inline]
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Echo {
    #[inline]
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Tests
// ============================================================================
