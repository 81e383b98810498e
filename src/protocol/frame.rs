//! The frame envelope and its discriminant.
//!
//! Every message on the wire is one [`Frame`]. Its [`FrameType`] decides
//! whether the session treats it as an event, a request or a response.
//!
//! # Format
//!
//! ```json
//! {
//!   "bot_id": 10001,
//!   "frame_type": "send_group_msg_resp",
//!   "echo": "42",
//!   "ok": true,
//!   "data": { "message_id": 7 }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::{BotId, Echo};

// ============================================================================
// Encoding
// ============================================================================

/// Payload encoding hint carried by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// UTF-8 text message.
    #[default]
    Text,
    /// Binary message.
    Binary,
}

// ============================================================================
// FrameClass
// ============================================================================

/// How the session routes a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Unsolicited event pushed by the peer.
    Event,
    /// Request issued by the local side.
    Request,
    /// Response echoing a request's token.
    Response,
    /// Discriminant not recognized.
    Unknown,
}

// ============================================================================
// FrameType
// ============================================================================

/// Frame discriminant.
///
/// Unrecognized values decode to [`FrameType::Unknown`] rather than failing,
/// so the session can log and drop them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    // Events
    /// Private chat message received.
    PrivateMessageEvent,
    /// Group chat message received.
    GroupMessageEvent,
    /// File uploaded to a group.
    GroupUploadNoticeEvent,
    /// Group admin set or unset.
    GroupAdminNoticeEvent,
    /// Member left or was kicked.
    GroupDecreaseNoticeEvent,
    /// Member joined.
    GroupIncreaseNoticeEvent,
    /// Member muted or unmuted.
    GroupBanNoticeEvent,
    /// New friend added.
    FriendAddNoticeEvent,
    /// Group message recalled.
    GroupRecallNoticeEvent,
    /// Private message recalled.
    FriendRecallNoticeEvent,
    /// Friend request received.
    FriendRequestEvent,
    /// Group join request received.
    GroupRequestEvent,

    // Requests
    /// Send a private message.
    SendPrivateMsgReq,
    /// Send a group message.
    SendGroupMsgReq,
    /// Recall a message.
    DeleteMsgReq,
    /// Query the bot's own account.
    GetLoginInfoReq,
    /// Kick a group member.
    SetGroupKickReq,
    /// Mute a group member.
    SetGroupBanReq,

    // Responses
    /// Response to [`FrameType::SendPrivateMsgReq`].
    SendPrivateMsgResp,
    /// Response to [`FrameType::SendGroupMsgReq`].
    SendGroupMsgResp,
    /// Response to [`FrameType::DeleteMsgReq`].
    DeleteMsgResp,
    /// Response to [`FrameType::GetLoginInfoReq`].
    GetLoginInfoResp,
    /// Response to [`FrameType::SetGroupKickReq`].
    SetGroupKickResp,
    /// Response to [`FrameType::SetGroupBanReq`].
    SetGroupBanResp,

    /// Anything else.
    #[serde(other)]
    Unknown,
}

impl FrameType {
    /// Classifies the discriminant.
    #[must_use]
    pub const fn class(self) -> FrameClass {
        match self {
            Self::PrivateMessageEvent
            | Self::GroupMessageEvent
            | Self::GroupUploadNoticeEvent
            | Self::GroupAdminNoticeEvent
            | Self::GroupDecreaseNoticeEvent
            | Self::GroupIncreaseNoticeEvent
            | Self::GroupBanNoticeEvent
            | Self::FriendAddNoticeEvent
            | Self::GroupRecallNoticeEvent
            | Self::FriendRecallNoticeEvent
            | Self::FriendRequestEvent
            | Self::GroupRequestEvent => FrameClass::Event,

            Self::SendPrivateMsgReq
            | Self::SendGroupMsgReq
            | Self::DeleteMsgReq
            | Self::GetLoginInfoReq
            | Self::SetGroupKickReq
            | Self::SetGroupBanReq => FrameClass::Request,

            Self::SendPrivateMsgResp
            | Self::SendGroupMsgResp
            | Self::DeleteMsgResp
            | Self::GetLoginInfoResp
            | Self::SetGroupKickResp
            | Self::SetGroupBanResp => FrameClass::Response,

            Self::Unknown => FrameClass::Unknown,
        }
    }

    /// Returns `true` for event discriminants.
    #[inline]
    #[must_use]
    pub const fn is_event(self) -> bool {
        matches!(self.class(), FrameClass::Event)
    }
}

// ============================================================================
// Frame
// ============================================================================

/// One decoded protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Peer the frame belongs to.
    #[serde(default)]
    pub bot_id: BotId,

    /// Discriminant.
    pub frame_type: FrameType,

    /// Correlation token (empty on events).
    #[serde(default, skip_serializing_if = "Echo::is_empty")]
    pub echo: Echo,

    /// Success flag.
    #[serde(default)]
    pub ok: bool,

    /// Kind-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    /// Creates a frame with an empty token.
    #[inline]
    #[must_use]
    pub fn new(frame_type: FrameType, data: Value) -> Self {
        Self {
            bot_id: BotId::default(),
            frame_type,
            echo: Echo::default(),
            ok: true,
            data,
        }
    }

    /// Creates a request frame from a serializable payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the payload cannot be serialized.
    pub fn request<T: Serialize>(frame_type: FrameType, payload: &T) -> Result<Self> {
        Ok(Self::new(frame_type, serde_json::to_value(payload)?))
    }

    /// Creates a response to `request` carrying `data`.
    #[must_use]
    pub fn reply_to(request: &Self, frame_type: FrameType, data: Value) -> Self {
        Self {
            bot_id: request.bot_id,
            frame_type,
            echo: request.echo.clone(),
            ok: true,
            data,
        }
    }

    /// Returns the routing class of this frame.
    #[inline]
    #[must_use]
    pub const fn class(&self) -> FrameClass {
        self.frame_type.class()
    }

    /// Deserializes the payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the payload does not have the
    /// expected shape.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        // A missing payload reads as an empty object.
        let empty = Value::Object(Map::new());
        let data = if self.data.is_null() { &empty } else { &self.data };

        T::deserialize(data).map_err(|e| {
            Error::protocol(format!(
                "invalid {:?} payload: {e}",
                self.frame_type
            ))
        })
    }

    /// Checks the discriminant and success flag, then deserializes the payload.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the frame is not `expected` or the payload is malformed
    /// - [`Error::Remote`] if the peer set `ok = false`
    pub fn expect_payload<T: DeserializeOwned>(&self, expected: FrameType) -> Result<T> {
        if self.frame_type != expected {
            return Err(Error::protocol(format!(
                "expected {expected:?}, got {:?}",
                self.frame_type
            )));
        }
        if !self.ok {
            return Err(Error::Remote {
                frame_type: self.frame_type,
                echo: self.echo.clone(),
            });
        }
        self.payload()
    }
}

// ============================================================================
// Tests
// ============================================================================
