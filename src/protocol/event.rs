//! Event payload types.
//!
//! Events are pushed by the peer without a request. Only the message events
//! get typed payloads; the notices and requests are delivered as raw
//! [`Frame`](super::Frame) data.
//!
//! # Format
//!
//! ```json
//! {
//!   "frame_type": "group_message_event",
//!   "data": {
//!     "time": 1700000000,
//!     "self_id": 10001,
//!     "group_id": 123,
//!     "user_id": 456,
//!     "raw_message": "hello",
//!     "message": [{ "type": "text", "data": { "text": "hello" } }]
//!   }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use super::MessageSegment;

// ============================================================================
// Sender
// ============================================================================

/// Author of a message event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sender {
    /// Account ID.
    pub user_id: i64,
    /// Nickname.
    pub nickname: String,
    /// Group card (group messages only).
    pub card: String,
    /// Group role (group messages only).
    pub role: String,
}

// ============================================================================
// PrivateMessageEvent
// ============================================================================

/// A private chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivateMessageEvent {
    /// Unix timestamp.
    pub time: i64,
    /// Receiving bot account.
    pub self_id: i64,
    /// Sub type (`friend`, `group`, `other`).
    pub sub_type: String,
    /// Message ID.
    pub message_id: i32,
    /// Sender account.
    pub user_id: i64,
    /// Structured content.
    pub message: Vec<MessageSegment>,
    /// Content as plain text.
    pub raw_message: String,
    /// Font ID.
    pub font: i32,
    /// Sender details.
    pub sender: Sender,
}

// ============================================================================
// GroupMessageEvent
// ============================================================================

/// A group chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupMessageEvent {
    /// Unix timestamp.
    pub time: i64,
    /// Receiving bot account.
    pub self_id: i64,
    /// Sub type (`normal`, `anonymous`, `notice`).
    pub sub_type: String,
    /// Message ID.
    pub message_id: i32,
    /// Group the message was posted in.
    pub group_id: i64,
    /// Sender account.
    pub user_id: i64,
    /// Structured content.
    pub message: Vec<MessageSegment>,
    /// Content as plain text.
    pub raw_message: String,
    /// Font ID.
    pub font: i32,
    /// Sender details.
    pub sender: Sender,
}

// ============================================================================
// Tests
// ============================================================================
