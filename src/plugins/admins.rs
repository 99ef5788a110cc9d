//! Everyday group administration: pins, promotions, message cleanup and
//! the admin list.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::bot::{AppState, ChatMemberRecord, MemberStatus};
use crate::dispatcher::{Binder, CommandSpec, Context, Propagation};
use crate::error::ConfigError;
use crate::filters::IsGroupChat;
use crate::permissions::Rights;
use crate::utils::{html_escape, mention, resolve_target};

use super::Plugin;

pub const NAME: &str = "Admins";

/// Arguments to `/pin` that notify members.
const LOUD: [&str; 3] = ["notify", "loud", "violence"];

/// How long the purge summary stays up.
const PURGE_NOTICE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Promotion {
    Promote,
    Demote,
}

pub struct Admins;

impl Admins {
    pub fn build(_state: &AppState) -> Arc<dyn Plugin> {
        Arc::new(Self)
    }

    async fn pin(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let (Some(chat_id), Some(message)) = (ctx.chat_id(), ctx.message()) else {
            return Ok(Propagation::Continue);
        };
        let Some(reply) = &message.reply_to else {
            ctx.reply("error-reply-to-message", &[]).await?;
            return Ok(Propagation::Continue);
        };

        let notify = ctx
            .args()
            .first()
            .is_some_and(|arg| LOUD.contains(&arg.to_lowercase().as_str()));
        if let Err(e) = ctx.state.client.pin_message(chat_id, reply.message_id, notify).await {
            ctx.reply("admin-failed", &[&html_escape(&e.to_string())]).await?;
        }
        Ok(Propagation::Continue)
    }

    async fn unpin(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let (Some(chat_id), Some(message)) = (ctx.chat_id(), ctx.message()) else {
            return Ok(Propagation::Continue);
        };

        let client = &ctx.state.client;
        let result = if ctx.args().first().is_some_and(|arg| arg == "all") {
            client.unpin_all(chat_id).await
        } else {
            let target = message.reply_to.as_ref().map(|r| r.message_id);
            client.unpin_message(chat_id, target).await
        };
        if let Err(e) = result {
            ctx.reply("admin-failed", &[&html_escape(&e.to_string())]).await?;
        }
        Ok(Propagation::Continue)
    }

    async fn promote(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        self.set_rights(ctx, Promotion::Promote).await
    }

    async fn demote(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        self.set_rights(ctx, Promotion::Demote).await
    }

    /// Promotions copy the bot's own rights, so nobody is granted more
    /// than the bot could grant.
    async fn set_rights(&self, ctx: Context, kind: Promotion) -> Result<Propagation> {
        let (Some(chat_id), Some(message)) = (ctx.chat_id(), ctx.message()) else {
            return Ok(Propagation::Continue);
        };
        let Some(target) = resolve_target(&ctx.state, message, ctx.args()).await else {
            ctx.reply("restrict-no-target", &[]).await?;
            return Ok(Propagation::Continue);
        };

        if Some(target.user_id) == ctx.sender_id() {
            let key = match kind {
                Promotion::Promote => "promote-self",
                Promotion::Demote => "demote-self",
            };
            ctx.reply(key, &[]).await?;
            return Ok(Propagation::Continue);
        }
        if target.user_id == ctx.state.me.id {
            ctx.reply("error-its-myself", &[]).await?;
            return Ok(Propagation::Continue);
        }

        let client = &ctx.state.client;
        let rights = match kind {
            Promotion::Promote => client.get_chat_member(chat_id, ctx.state.me.id).await?.rights,
            Promotion::Demote => Rights::NONE,
        };
        if let Err(e) = client.promote_member(chat_id, target.user_id, rights).await {
            ctx.reply("admin-failed", &[&html_escape(&e.to_string())]).await?;
            return Ok(Propagation::Continue);
        }
        ctx.state.permissions.invalidate(chat_id);

        info!("{:?} user {} in chat {} with [{}]", kind, target.user_id, chat_id, rights);
        let key = match kind {
            Promotion::Promote => "promote-done",
            Promotion::Demote => "demote-done",
        };
        ctx.reply(key, &[&mention(target.user_id, &target.name)]).await?;
        Ok(Propagation::Continue)
    }

    async fn delete(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let (Some(chat_id), Some(message)) = (ctx.chat_id(), ctx.message()) else {
            return Ok(Propagation::Continue);
        };
        let Some(reply) = &message.reply_to else {
            ctx.reply("error-reply-to-message", &[]).await?;
            return Ok(Propagation::Continue);
        };

        ctx.state
            .client
            .delete_messages(chat_id, &[reply.message_id, message.message_id])
            .await?;
        Ok(Propagation::Continue)
    }

    /// Delete everything from the replied message up to the command.
    async fn purge(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let (Some(chat_id), Some(message)) = (ctx.chat_id(), ctx.message()) else {
            return Ok(Propagation::Continue);
        };
        let Some(reply) = &message.reply_to else {
            ctx.reply("error-reply-to-message", &[]).await?;
            return Ok(Propagation::Continue);
        };

        let started = Instant::now();
        let ids: Vec<i32> = (reply.message_id..message.message_id).collect();
        let client = &ctx.state.client;
        if let Err(e) = client.delete_messages(chat_id, &ids).await {
            ctx.reply("admin-failed", &[&html_escape(&e.to_string())]).await?;
            return Ok(Propagation::Continue);
        }
        client.delete_message(chat_id, message.message_id).await?;

        let text = ctx
            .text(
                "purge-done",
                &[&ids.len().to_string(), &started.elapsed().as_secs().to_string()],
            )
            .await;
        // The command message is gone, so the summary cannot reply to it.
        let notice = client.send_message(chat_id, &ctx.state.redact(&text), None).await?;
        info!("Purged {} messages in chat {}", ids.len(), chat_id);

        let client = Arc::clone(client);
        tokio::spawn(async move {
            tokio::time::sleep(PURGE_NOTICE_TTL).await;
            if let Err(e) = client.delete_message(chat_id, notice).await {
                warn!("Failed to remove purge notice in {}: {}", chat_id, e);
            }
        });
        Ok(Propagation::Continue)
    }

    async fn admin_list(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let Some(message) = ctx.message() else {
            return Ok(Propagation::Continue);
        };
        let chat = &message.chat;
        let admins = ctx.state.permissions.admin_list(chat.id).await?;

        let mut sorted: Vec<&ChatMemberRecord> = admins.iter().filter(|a| a.is_admin()).collect();
        sorted.sort_by_key(|a| (a.status != MemberStatus::Owner, a.user_id));
        let listing: String = sorted
            .iter()
            .map(|admin| {
                let name = admin
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("User {}", admin.user_id));
                format!("\n• {}", mention(admin.user_id, &name))
            })
            .collect();

        let title = chat.title.clone().unwrap_or_else(|| chat.id.to_string());
        ctx.reply("admin-list", &[&html_escape(&title), &listing]).await?;
        Ok(Propagation::Continue)
    }

    async fn invite_link(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let Some(message) = ctx.message() else {
            return Ok(Propagation::Continue);
        };
        let chat = &message.chat;
        match ctx.state.client.export_invite_link(chat.id).await {
            Ok(link) => {
                let title = chat.title.clone().unwrap_or_else(|| chat.id.to_string());
                ctx.reply("invite-link", &[&html_escape(&title), &html_escape(&link)])
                    .await?;
            }
            Err(e) => {
                ctx.reply("admin-failed", &[&html_escape(&e.to_string())]).await?;
            }
        }
        Ok(Propagation::Continue)
    }
}

#[async_trait]
impl Plugin for Admins {
    fn name(&self) -> &'static str {
        NAME
    }

    fn register(self: Arc<Self>, binder: &mut Binder) -> Result<(), ConfigError> {
        binder.command(CommandSpec::new(["pin"]).can_pin(), &self, Self::pin)?;
        binder.command(CommandSpec::new(["unpin"]).can_pin(), &self, Self::unpin)?;
        binder.command(CommandSpec::new(["promote"]).can_promote(), &self, Self::promote)?;
        binder.command(CommandSpec::new(["demote"]).can_promote(), &self, Self::demote)?;
        binder.command(CommandSpec::new(["del"]).can_delete(), &self, Self::delete)?;
        binder.command(CommandSpec::new(["purge", "prune"]).can_delete(), &self, Self::purge)?;
        binder.command(
            CommandSpec::new(["adminlist", "admins"]).filter(Arc::new(IsGroupChat)),
            &self,
            Self::admin_list,
        )?;
        binder.command(CommandSpec::new(["invitelink"]).can_invite(), &self, Self::invite_link)?;
        Ok(())
    }
}
