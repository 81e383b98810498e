//! Request and response payload types.
//!
//! Each request payload implements [`ApiRequest`], which fixes the request
//! discriminant, the expected response discriminant and the response
//! payload type. `Session::request` uses this to turn a generic
//! request/response round trip into a typed one.
//!
//! | Request | Response |
//! |---------|----------|
//! | [`SendPrivateMsgReq`] | [`SendPrivateMsgResp`] |
//! | [`SendGroupMsgReq`] | [`SendGroupMsgResp`] |
//! | [`DeleteMsgReq`] | [`DeleteMsgResp`] |
//! | [`GetLoginInfoReq`] | [`GetLoginInfoResp`] |
//! | [`SetGroupKickReq`] | [`SetGroupKickResp`] |
//! | [`SetGroupBanReq`] | [`SetGroupBanResp`] |

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{FrameType, MessageSegment};

// ============================================================================
// ApiRequest
// ============================================================================

/// A request payload with a known response.
pub trait ApiRequest: Serialize {
    /// Discriminant of the request frame.
    const REQUEST: FrameType;

    /// Discriminant the matching response must carry.
    const RESPONSE: FrameType;

    /// Response payload.
    type Response: DeserializeOwned;
}

macro_rules! api_request {
    ($req:ty => $resp:ty, $req_type:ident, $resp_type:ident) => {
        impl ApiRequest for $req {
            const REQUEST: FrameType = FrameType::$req_type;
            const RESPONSE: FrameType = FrameType::$resp_type;
            type Response = $resp;
        }
    };
}

// ============================================================================
// Messages
// ============================================================================

/// Send a private message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPrivateMsgReq {
    /// Recipient.
    pub user_id: i64,
    /// Content.
    pub message: Vec<MessageSegment>,
    /// Send CQ codes as plain text.
    pub auto_escape: bool,
}

/// Result of [`SendPrivateMsgReq`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendPrivateMsgResp {
    /// ID of the sent message.
    pub message_id: i32,
}

/// Send a group message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendGroupMsgReq {
    /// Target group.
    pub group_id: i64,
    /// Content.
    pub message: Vec<MessageSegment>,
    /// Send CQ codes as plain text.
    pub auto_escape: bool,
}

/// Result of [`SendGroupMsgReq`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendGroupMsgResp {
    /// ID of the sent message.
    pub message_id: i32,
}

/// Recall a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMsgReq {
    /// Message to recall.
    pub message_id: i32,
}

/// Result of [`DeleteMsgReq`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMsgResp {}

// ============================================================================
// Account
// ============================================================================

/// Query the bot's own account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetLoginInfoReq {}

/// Result of [`GetLoginInfoReq`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetLoginInfoResp {
    /// Bot account.
    pub user_id: i64,
    /// Bot nickname.
    pub nickname: String,
}

// ============================================================================
// Group Administration
// ============================================================================

/// Kick a group member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetGroupKickReq {
    /// Group.
    pub group_id: i64,
    /// Member to kick.
    pub user_id: i64,
    /// Refuse future join requests from this member.
    pub reject_add_request: bool,
}

/// Result of [`SetGroupKickReq`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetGroupKickResp {}

/// Mute a group member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetGroupBanReq {
    /// Group.
    pub group_id: i64,
    /// Member to mute.
    pub user_id: i64,
    /// Mute duration in seconds (0 lifts the mute).
    pub duration: i64,
}

/// Result of [`SetGroupBanReq`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetGroupBanResp {}

api_request!(SendPrivateMsgReq => SendPrivateMsgResp, SendPrivateMsgReq, SendPrivateMsgResp);
api_request!(SendGroupMsgReq => SendGroupMsgResp, SendGroupMsgReq, SendGroupMsgResp);
api_request!(DeleteMsgReq => DeleteMsgResp, DeleteMsgReq, DeleteMsgResp);
api_request!(GetLoginInfoReq => GetLoginInfoResp, GetLoginInfoReq, GetLoginInfoResp);
api_request!(SetGroupKickReq => SetGroupKickResp, SetGroupKickReq, SetGroupKickResp);
api_request!(SetGroupBanReq => SetGroupBanResp, SetGroupBanReq, SetGroupBanResp);

// ============================================================================
// Tests
// ============================================================================
