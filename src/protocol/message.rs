//! Message content segments.
//!
//! A chat message is a list of [`MessageSegment`]s. [`MessageChain`] builds
//! one fluently:
//!
//! ```
//! use botwire::MessageChain;
//!
//! let chain = MessageChain::new().text("hello ").at(10001).face(14);
//! assert_eq!(chain.len(), 3);
//! ```

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// MessageSegment
// ============================================================================

/// One typed piece of a chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSegment {
    /// Segment type (`text`, `face`, `image`, `at`, ...).
    #[serde(rename = "type")]
    pub kind: String,

    /// Segment attributes.
    #[serde(default)]
    pub data: FxHashMap<String, String>,
}

impl MessageSegment {
    /// Creates a segment with a single attribute.
    #[must_use]
    pub fn new(kind: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut data = FxHashMap::default();
        data.insert(key.into(), value.into());
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Returns an attribute value.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

// ============================================================================
// MessageChain
// ============================================================================

/// Fluent builder for message content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageChain {
    segments: Vec<MessageSegment>,
}

impl MessageChain {
    /// Creates an empty chain.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends plain text.
    #[must_use]
    pub fn text(self, text: impl Into<String>) -> Self {
        self.push(MessageSegment::new("text", "text", text))
    }

    /// Appends a built-in face by ID.
    #[must_use]
    pub fn face(self, id: i32) -> Self {
        self.push(MessageSegment::new("face", "id", id.to_string()))
    }

    /// Appends an image by URL.
    #[must_use]
    pub fn image(self, url: impl Into<String>) -> Self {
        self.push(MessageSegment::new("image", "url", url))
    }

    /// Appends a mention of `user_id`.
    #[must_use]
    pub fn at(self, user_id: i64) -> Self {
        self.push(MessageSegment::new("at", "qq", user_id.to_string()))
    }

    /// Appends an arbitrary segment.
    #[inline]
    #[must_use]
    pub fn push(mut self, segment: MessageSegment) -> Self {
        self.segments.push(segment);
        self
    }

    /// Number of segments.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if no segment was added.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the segments.
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[MessageSegment] {
        &self.segments
    }
}

impl From<MessageChain> for Vec<MessageSegment> {
    #[inline]
    fn from(chain: MessageChain) -> Self {
        chain.segments
    }
}

// ============================================================================
// Tests
// ============================================================================
