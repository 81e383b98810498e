//! Session configuration.
//!
//! Every session created by a [`Registry`](crate::Registry) shares one
//! [`SessionConfig`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use botwire::SessionConfig;
//!
//! let config = SessionConfig::new()
//!     .with_call_timeout(Duration::from_secs(10))
//!     .with_max_pending(64);
//!
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `BOTWIRE_CALL_TIMEOUT_SECS` | `call_timeout` |
//! | `BOTWIRE_MAX_PENDING` | `max_pending` |
//! | `BOTWIRE_SEND_QUEUE` | `send_queue_capacity` |

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};
use crate::protocol::Encoding;

// ============================================================================
// Constants
// ============================================================================

/// Default deadline for one request/response round trip.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Default bound on pending requests per session.
pub const DEFAULT_MAX_PENDING: usize = 128;

/// Default outbound queue capacity per session.
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 100;

// ============================================================================
// SessionConfig
// ============================================================================

/// Per-session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline applied by `Session::call`.
    pub call_timeout: Duration,

    /// Pending requests kept before the oldest is evicted.
    pub max_pending: usize,

    /// Outbound messages buffered before sends fail.
    pub send_queue_capacity: usize,

    /// Encoding used for outbound frames.
    pub encoding: Encoding,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl SessionConfig {
    /// Creates a configuration with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            encoding: Encoding::Text,
        }
    }

    /// Creates a configuration from defaults overlaid with environment variables.
    ///
    /// Unparseable or zero values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::new();

        if let Some(secs) = env_u64("BOTWIRE_CALL_TIMEOUT_SECS") {
            config.call_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = env_u64("BOTWIRE_MAX_PENDING") {
            config.max_pending = max as usize;
        }
        if let Some(capacity) = env_u64("BOTWIRE_SEND_QUEUE") {
            config.send_queue_capacity = capacity as usize;
        }

        config
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionConfig {
    /// Sets the call deadline.
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the pending request bound.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max: usize) -> Self {
        self.max_pending = max;
        self
    }

    /// Sets the outbound queue capacity.
    #[inline]
    #[must_use]
    pub fn with_send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity;
        self
    }

    /// Sets the outbound encoding.
    #[inline]
    #[must_use]
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionConfig {
    /// Checks that every bound is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a capacity or the call deadline is zero.
    pub fn validate(&self) -> Result<()> {
        self.pending_capacity()?;

        if self.send_queue_capacity == 0 {
            return Err(Error::config("send_queue_capacity must be greater than 0"));
        }
        if self.call_timeout.is_zero() {
            return Err(Error::config("call_timeout must be greater than 0"));
        }

        Ok(())
    }

    /// Returns `max_pending` as a non-zero capacity.
    pub(crate) fn pending_capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.max_pending)
            .ok_or_else(|| Error::config("max_pending must be greater than 0"))
    }
}

/// Reads a positive integer from the environment.
fn env_u64(key: &str) -> Option<u64> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!(key, value = %raw, "Ignoring invalid environment override");
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.call_timeout.as_secs(), 120);
        assert_eq!(config.max_pending, 128);
        assert_eq!(config.send_queue_capacity, 100);
        assert_eq!(config.encoding, Encoding::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = SessionConfig::new()
            .with_call_timeout(Duration::from_millis(250))
            .with_max_pending(2)
            .with_send_queue_capacity(8)
            .with_encoding(Encoding::Binary);

        assert_eq!(config.call_timeout, Duration::from_millis(250));
        assert_eq!(config.max_pending, 2);
        assert_eq!(config.send_queue_capacity, 8);
        assert_eq!(config.encoding, Encoding::Binary);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let err = SessionConfig::new().with_max_pending(0).validate();
        assert!(matches!(err, Err(Error::Config { .. })));

        let err = SessionConfig::new().with_send_queue_capacity(0).validate();
        assert!(matches!(err, Err(Error::Config { .. })));

        let err = SessionConfig::new()
            .with_call_timeout(Duration::ZERO)
            .validate();
        assert!(matches!(err, Err(Error::Config { .. })));
    }

    #[test]
    fn test_env_u64_missing() {
        assert_eq!(env_u64("BOTWIRE_TEST_SURELY_UNSET_VARIABLE"), None);
    }
}
