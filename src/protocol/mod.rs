//! Protocol message types.
//!
//! This module defines the frame envelope and the payloads carried inside
//! it. The session core only relies on [`Frame`], [`FrameType::class`] and
//! the [`Codec`] seam; everything else is typed convenience.
//!
//! # Protocol Overview
//!
//! | Frame Class | Direction | Purpose |
//! |-------------|-----------|---------|
//! | Event | Peer → Local | Unsolicited notification |
//! | Request | Local → Peer | Action carrying a fresh `echo` token |
//! | Response | Peer → Local | Answer echoing the request's token |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Envelope, discriminant, encoding hint |
//! | `codec` | Bytes ↔ frame conversion |
//! | `event` | Typed event payloads |
//! | `api` | Typed request/response payloads |
//! | `message` | Message segments and builder |

// ============================================================================
// Submodules
// ============================================================================

/// Request and response payloads.
pub mod api;

/// Frame encoding and decoding.
pub mod codec;

/// Event payloads.
pub mod event;

/// Frame envelope.
pub mod frame;

/// Message segments.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use api::{
    ApiRequest, DeleteMsgReq, DeleteMsgResp, GetLoginInfoReq, GetLoginInfoResp, SendGroupMsgReq,
    SendGroupMsgResp, SendPrivateMsgReq, SendPrivateMsgResp, SetGroupBanReq, SetGroupBanResp,
    SetGroupKickReq, SetGroupKickResp,
};
pub use codec::{Codec, JsonCodec};
pub use event::{GroupMessageEvent, PrivateMessageEvent, Sender};
pub use frame::{Encoding, Frame, FrameClass, FrameType};
pub use message::{MessageChain, MessageSegment};
