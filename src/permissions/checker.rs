//! Permission resolver with admin-list caching.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::bot::{ChatClient, ChatMemberRecord};
use crate::cache::{CacheConfig, CacheRegistry, TypedCache};
use crate::error::ProtocolError;
use crate::i18n::I18n;

use super::{Rank, Rights, StaffRoster};

/// Answers "may this user do X in this chat" questions.
///
/// Staff are resolved locally; everything else is fetched from the protocol.
/// Admin lists are cached briefly, member records are always fetched live.
#[derive(Clone)]
pub struct PermissionResolver {
    client: Arc<dyn ChatClient>,
    staff: Arc<StaffRoster>,
    i18n: Arc<I18n>,
    bot_id: u64,
    admins: TypedCache<i64, Arc<Vec<ChatMemberRecord>>>,
}

impl PermissionResolver {
    pub fn new(
        client: Arc<dyn ChatClient>,
        staff: Arc<StaffRoster>,
        i18n: Arc<I18n>,
        bot_id: u64,
        caches: &CacheRegistry,
    ) -> Self {
        Self {
            client,
            staff,
            i18n,
            bot_id,
            admins: caches.get_or_create("admin_lists", CacheConfig::admin_lists()),
        }
    }

    pub fn staff(&self) -> &StaffRoster {
        &self.staff
    }

    pub fn rank_of(&self, user_id: u64) -> Option<Rank> {
        self.staff.rank_of(user_id)
    }

    /// Administrators of a chat, cache-first.
    pub async fn admin_list(&self, chat_id: i64) -> Result<Arc<Vec<ChatMemberRecord>>, ProtocolError> {
        if let Some(cached) = self.admins.get(&chat_id) {
            debug!("Admin list cache hit for chat {}", chat_id);
            return Ok(cached);
        }
        let admins = Arc::new(self.client.get_chat_administrators(chat_id).await?);
        self.admins.insert(chat_id, Arc::clone(&admins));
        Ok(admins)
    }

    /// Staff, or listed as an administrator of the group.
    ///
    /// `is_group` is false for private chats, which never have admins.
    pub async fn is_admin(&self, chat_id: i64, is_group: bool, user_id: u64) -> Result<bool, ProtocolError> {
        if !is_group {
            return Ok(false);
        }
        if self.staff.is_staff(user_id) {
            return Ok(true);
        }
        let admins = self.admin_list(chat_id).await?;
        Ok(admins.iter().any(|a| a.user_id == user_id && a.is_admin()))
    }

    /// Whether the bot administers the chat.
    ///
    /// When it does not, a "not an admin" notice is sent to the chat once
    /// for this check, replying to `reply_to` if given.
    pub async fn is_bot_admin(&self, chat_id: i64, reply_to: Option<i32>) -> Result<bool, ProtocolError> {
        let me = self.client.get_chat_member(chat_id, self.bot_id).await?;
        if me.is_admin() {
            return Ok(true);
        }

        let notice = self.i18n.text(chat_id, "not-admin", &[]).await;
        if let Err(e) = self.client.send_message(chat_id, &notice, reply_to).await {
            warn!("Failed to send not-admin notice to {}: {}", chat_id, e);
        }
        Ok(false)
    }

    /// Both the user and the bot must hold every requested right.
    ///
    /// Staff satisfy the user side of restrict and promote without holding
    /// them. Fetch failures are returned, not folded into `false`.
    pub async fn has_bits(&self, chat_id: i64, user_id: u64, bits: Rights) -> Result<bool, ProtocolError> {
        if bits.is_empty() {
            return Ok(true);
        }

        let bot = self.client.get_chat_member(chat_id, self.bot_id).await?;
        if !bot.holds(bits) {
            debug!("Bot lacks {} in chat {}", bits.difference(bot.rights), chat_id);
            return Ok(false);
        }

        let user_side = if self.staff.is_staff(user_id) {
            bits.difference(Rights::STAFF_OVERRIDABLE)
        } else {
            bits
        };
        if user_side.is_empty() {
            return Ok(true);
        }

        let user = self.client.get_chat_member(chat_id, user_id).await?;
        Ok(user.holds(user_side))
    }

    /// Drop the cached admin list, e.g. after a migration.
    pub fn invalidate(&self, chat_id: i64) {
        self.admins.invalidate(&chat_id);
        debug!("Invalidated admin list for chat {}", chat_id);
    }
}
