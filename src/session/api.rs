//! Typed peer actions.
//!
//! Each method builds a request payload, goes through
//! [`Session::request`] and returns the decoded response payload.

// ============================================================================
// Imports
// ============================================================================

use tracing::debug;

use crate::error::Result;
use crate::protocol::{
    DeleteMsgReq, GetLoginInfoReq, GetLoginInfoResp, MessageChain, SendGroupMsgReq,
    SendPrivateMsgReq, SetGroupBanReq, SetGroupKickReq,
};

use super::Session;

// ============================================================================
// Messages
// ============================================================================

impl Session {
    /// Sends a private message and returns its message ID.
    ///
    /// # Errors
    ///
    /// Any error from [`Session::request`].
    pub async fn send_private_msg(
        &self,
        user_id: i64,
        message: MessageChain,
        auto_escape: bool,
    ) -> Result<i32> {
        debug!(bot_id = %self.bot_id(), user_id, segments = message.len(), "Sending private message");

        let response = self
            .request(&SendPrivateMsgReq {
                user_id,
                message: message.into(),
                auto_escape,
            })
            .await?;

        Ok(response.message_id)
    }

    /// Sends a group message and returns its message ID.
    ///
    /// # Errors
    ///
    /// Any error from [`Session::request`].
    pub async fn send_group_msg(
        &self,
        group_id: i64,
        message: MessageChain,
        auto_escape: bool,
    ) -> Result<i32> {
        debug!(bot_id = %self.bot_id(), group_id, segments = message.len(), "Sending group message");

        let response = self
            .request(&SendGroupMsgReq {
                group_id,
                message: message.into(),
                auto_escape,
            })
            .await?;

        Ok(response.message_id)
    }

    /// Recalls a message.
    ///
    /// # Errors
    ///
    /// Any error from [`Session::request`].
    pub async fn delete_msg(&self, message_id: i32) -> Result<()> {
        self.request(&DeleteMsgReq { message_id }).await?;
        Ok(())
    }
}

// ============================================================================
// Account
// ============================================================================

impl Session {
    /// Returns the bot's own account and nickname.
    ///
    /// # Errors
    ///
    /// Any error from [`Session::request`].
    pub async fn get_login_info(&self) -> Result<GetLoginInfoResp> {
        self.request(&GetLoginInfoReq {}).await
    }
}

// ============================================================================
// Group Administration
// ============================================================================

impl Session {
    /// Removes a member from a group.
    ///
    /// # Errors
    ///
    /// Any error from [`Session::request`].
    pub async fn set_group_kick(
        &self,
        group_id: i64,
        user_id: i64,
        reject_add_request: bool,
    ) -> Result<()> {
        self.request(&SetGroupKickReq {
            group_id,
            user_id,
            reject_add_request,
        })
        .await?;
        Ok(())
    }

    /// Mutes a member for `duration` seconds; zero lifts the mute.
    ///
    /// # Errors
    ///
    /// Any error from [`Session::request`].
    pub async fn set_group_ban(&self, group_id: i64, user_id: i64, duration: i64) -> Result<()> {
        self.request(&SetGroupBanReq {
            group_id,
            user_id,
            duration,
        })
        .await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
