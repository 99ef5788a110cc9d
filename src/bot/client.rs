//! Protocol client seam.
//!
//! Everything the dispatch core needs from the chat platform goes through
//! [`ChatClient`]. The production implementation lives in `telegram.rs`.

use async_trait::async_trait;

use crate::error::ProtocolError;
use crate::permissions::Rights;

/// The bot's own identity, fetched once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: u64,
    pub username: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

/// A user's standing in one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMemberRecord {
    pub user_id: u64,
    /// Display name, when the platform reported one.
    pub name: Option<String>,
    pub status: MemberStatus,
    pub rights: Rights,
}

impl ChatMemberRecord {
    pub fn owner(user_id: u64) -> Self {
        Self {
            user_id,
            name: None,
            status: MemberStatus::Owner,
            rights: Rights::all(),
        }
    }

    pub fn administrator(user_id: u64, rights: Rights) -> Self {
        Self {
            user_id,
            name: None,
            status: MemberStatus::Administrator,
            rights,
        }
    }

    pub fn member(user_id: u64) -> Self {
        Self {
            user_id,
            name: None,
            status: MemberStatus::Member,
            rights: Rights::NONE,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.status, MemberStatus::Owner | MemberStatus::Administrator)
    }

    /// Rights only count while the member is an administrator.
    pub fn holds(&self, rights: Rights) -> bool {
        match self.status {
            MemberStatus::Owner => true,
            MemberStatus::Administrator => self.rights.contains(rights),
            _ => rights.is_empty(),
        }
    }
}

/// A file to upload.
#[derive(Debug, Clone)]
pub struct OutgoingDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
}

/// Operations the bot performs against the chat platform.
///
/// Message bodies are HTML.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn me(&self) -> Result<BotIdentity, ProtocolError>;

    /// Send a message, returning its id.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<i32, ProtocolError>;

    async fn edit_message(&self, chat_id: i64, message_id: i32, text: &str)
    -> Result<(), ProtocolError>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), ProtocolError>;

    /// Delete several messages at once. The platform caps one call at 100 ids.
    async fn delete_messages(&self, chat_id: i64, message_ids: &[i32]) -> Result<(), ProtocolError>;

    async fn pin_message(&self, chat_id: i64, message_id: i32, notify: bool)
    -> Result<(), ProtocolError>;

    /// Unpin `message_id`, or the most recent pin when `None`.
    async fn unpin_message(&self, chat_id: i64, message_id: Option<i32>)
    -> Result<(), ProtocolError>;

    async fn unpin_all(&self, chat_id: i64) -> Result<(), ProtocolError>;

    async fn send_document(
        &self,
        chat_id: i64,
        document: OutgoingDocument,
        reply_to: Option<i32>,
    ) -> Result<(), ProtocolError>;

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ProtocolError>;

    async fn answer_callback(&self, query_id: &str, text: Option<&str>)
    -> Result<(), ProtocolError>;

    async fn get_chat_member(
        &self,
        chat_id: i64,
        user_id: u64,
    ) -> Result<ChatMemberRecord, ProtocolError>;

    async fn get_chat_administrators(
        &self,
        chat_id: i64,
    ) -> Result<Vec<ChatMemberRecord>, ProtocolError>;

    async fn ban_member(&self, chat_id: i64, user_id: u64) -> Result<(), ProtocolError>;

    async fn unban_member(&self, chat_id: i64, user_id: u64) -> Result<(), ProtocolError>;

    /// Grant exactly `rights`. An empty set demotes to a plain member.
    async fn promote_member(&self, chat_id: i64, user_id: u64, rights: Rights)
    -> Result<(), ProtocolError>;

    async fn export_invite_link(&self, chat_id: i64) -> Result<String, ProtocolError>;

    async fn leave_chat(&self, chat_id: i64) -> Result<(), ProtocolError>;
}
