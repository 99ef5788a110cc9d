//! Teloxide-backed [`ChatClient`].

use async_trait::async_trait;
use teloxide::adaptors::Throttle;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatMember, ChatMemberKind, InputFile, MessageId, ParseMode, ReplyParameters};
use teloxide::RequestError;

use super::client::{BotIdentity, ChatClient, ChatMemberRecord, MemberStatus, OutgoingDocument};
use crate::error::ProtocolError;
use crate::permissions::Rights;

/// Bot type with Throttle adaptor for automatic rate limiting.
pub type ThrottledBot = Throttle<Bot>;

#[derive(Clone)]
pub struct TelegramClient {
    bot: ThrottledBot,
}

impl TelegramClient {
    pub fn new(bot: ThrottledBot) -> Self {
        Self { bot }
    }
}

/// Map a teloxide failure onto the protocol taxonomy.
fn classify(err: RequestError) -> ProtocolError {
    if let RequestError::RetryAfter(wait) = err {
        return ProtocolError::RateLimited(wait.duration());
    }

    let text = err.to_string();
    let lower = text.to_lowercase();
    if lower.contains("user_not_participant")
        || lower.contains("user not found")
        || lower.contains("participant_id_invalid")
    {
        ProtocolError::NotParticipant
    } else if lower.contains("chat_admin_required")
        || lower.contains("not enough rights")
        || lower.contains("not an administrator")
    {
        ProtocolError::AdminRequired
    } else if lower.contains("chat not found") {
        ProtocolError::ChatNotFound
    } else {
        ProtocolError::Other(text)
    }
}

fn member_record(member: &ChatMember) -> ChatMemberRecord {
    let user_id = member.user.id.0;
    let record = match &member.kind {
        ChatMemberKind::Owner(_) => ChatMemberRecord::owner(user_id),
        ChatMemberKind::Administrator(admin) => ChatMemberRecord::administrator(
            user_id,
            Rights::from_flags(
                admin.can_change_info,
                admin.can_delete_messages,
                admin.can_restrict_members,
                admin.can_invite_users,
                admin.can_pin_messages,
                admin.can_promote_members,
            ),
        ),
        kind => {
            let status = if kind.is_banned() {
                MemberStatus::Banned
            } else if kind.is_left() {
                MemberStatus::Left
            } else if kind.is_restricted() {
                MemberStatus::Restricted
            } else {
                MemberStatus::Member
            };
            ChatMemberRecord {
                user_id,
                name: None,
                status,
                rights: Rights::NONE,
            }
        }
    };
    record.named(member.user.full_name())
}

#[async_trait]
impl ChatClient for TelegramClient {
    async fn me(&self) -> Result<BotIdentity, ProtocolError> {
        let me = self.bot.get_me().await.map_err(classify)?;
        Ok(BotIdentity {
            id: me.user.id.0,
            username: me.username().to_string(),
            name: me.user.first_name.clone(),
        })
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<i32, ProtocolError> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(id)));
        }
        let sent = request.await.map_err(classify)?;
        Ok(sent.id.0)
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
    ) -> Result<(), ProtocolError> {
        self.bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), ProtocolError> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete_messages(&self, chat_id: i64, message_ids: &[i32]) -> Result<(), ProtocolError> {
        for chunk in message_ids.chunks(100) {
            self.bot
                .delete_messages(ChatId(chat_id), chunk.iter().copied().map(MessageId))
                .await
                .map_err(classify)?;
        }
        Ok(())
    }

    async fn pin_message(&self, chat_id: i64, message_id: i32, notify: bool) -> Result<(), ProtocolError> {
        self.bot
            .pin_chat_message(ChatId(chat_id), MessageId(message_id))
            .disable_notification(!notify)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn unpin_message(&self, chat_id: i64, message_id: Option<i32>) -> Result<(), ProtocolError> {
        let mut request = self.bot.unpin_chat_message(ChatId(chat_id));
        if let Some(id) = message_id {
            request = request.message_id(MessageId(id));
        }
        request.await.map_err(classify)?;
        Ok(())
    }

    async fn unpin_all(&self, chat_id: i64) -> Result<(), ProtocolError> {
        self.bot
            .unpin_all_chat_messages(ChatId(chat_id))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        document: OutgoingDocument,
        reply_to: Option<i32>,
    ) -> Result<(), ProtocolError> {
        let file = InputFile::memory(document.bytes).file_name(document.file_name);
        let mut request = self
            .bot
            .send_document(ChatId(chat_id), file)
            .parse_mode(ParseMode::Html);
        if let Some(caption) = document.caption {
            request = request.caption(caption);
        }
        if let Some(id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(id)));
        }
        request.await.map_err(classify)?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ProtocolError> {
        let file = self
            .bot
            .get_file(file_id.to_string())
            .await
            .map_err(classify)?;
        let mut buffer = Vec::new();
        self.bot
            .inner()
            .download_file(&file.path, &mut buffer)
            .await
            .map_err(|e| ProtocolError::Other(e.to_string()))?;
        Ok(buffer)
    }

    async fn answer_callback(&self, query_id: &str, text: Option<&str>) -> Result<(), ProtocolError> {
        let mut request = self.bot.answer_callback_query(query_id.to_string());
        if let Some(text) = text {
            request = request.text(text);
        }
        request.await.map_err(classify)?;
        Ok(())
    }

    async fn get_chat_member(
        &self,
        chat_id: i64,
        user_id: u64,
    ) -> Result<ChatMemberRecord, ProtocolError> {
        let member = self
            .bot
            .get_chat_member(ChatId(chat_id), UserId(user_id))
            .await
            .map_err(classify)?;
        Ok(member_record(&member))
    }

    async fn get_chat_administrators(
        &self,
        chat_id: i64,
    ) -> Result<Vec<ChatMemberRecord>, ProtocolError> {
        let admins = self
            .bot
            .get_chat_administrators(ChatId(chat_id))
            .await
            .map_err(classify)?;
        Ok(admins.iter().map(member_record).collect())
    }

    async fn ban_member(&self, chat_id: i64, user_id: u64) -> Result<(), ProtocolError> {
        self.bot
            .ban_chat_member(ChatId(chat_id), UserId(user_id))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn unban_member(&self, chat_id: i64, user_id: u64) -> Result<(), ProtocolError> {
        self.bot
            .unban_chat_member(ChatId(chat_id), UserId(user_id))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn promote_member(&self, chat_id: i64, user_id: u64, rights: Rights) -> Result<(), ProtocolError> {
        self.bot
            .promote_chat_member(ChatId(chat_id), UserId(user_id))
            .can_change_info(rights.contains(Rights::CHANGE_INFO))
            .can_delete_messages(rights.contains(Rights::DELETE_MESSAGES))
            .can_restrict_members(rights.contains(Rights::RESTRICT_MEMBERS))
            .can_invite_users(rights.contains(Rights::INVITE_USERS))
            .can_pin_messages(rights.contains(Rights::PIN_MESSAGES))
            .can_promote_members(rights.contains(Rights::PROMOTE_MEMBERS))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn export_invite_link(&self, chat_id: i64) -> Result<String, ProtocolError> {
        self.bot
            .export_chat_invite_link(ChatId(chat_id))
            .await
            .map_err(classify)
    }

    async fn leave_chat(&self, chat_id: i64) -> Result<(), ProtocolError> {
        self.bot.leave_chat(ChatId(chat_id)).await.map_err(classify)?;
        Ok(())
    }
}
