//! Ban, kick and unban.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::bot::AppState;
use crate::dispatcher::{Binder, CommandSpec, Context, Propagation};
use crate::error::ConfigError;
use crate::utils::{html_escape, mention, resolve_target, Target};

use super::Plugin;

pub const NAME: &str = "Restriction";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Ban,
    Kick,
    Unban,
}

impl Action {
    fn done_key(self) -> &'static str {
        match self {
            Self::Ban => "ban-done",
            Self::Kick => "kick-done",
            Self::Unban => "unban-done",
        }
    }
}

pub struct Restriction;

impl Restriction {
    pub fn build(_state: &AppState) -> Arc<dyn Plugin> {
        Arc::new(Self)
    }

    async fn ban(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        self.apply(ctx, Action::Ban).await
    }

    async fn kick(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        self.apply(ctx, Action::Kick).await
    }

    async fn unban(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        self.apply(ctx, Action::Unban).await
    }

    /// Staff, chat admins and the bot itself are never restricted.
    async fn is_protected(&self, ctx: &Context, chat_id: i64, user_id: u64) -> Result<bool> {
        if user_id == ctx.state.me.id || ctx.state.staff.is_staff(user_id) {
            return Ok(true);
        }
        let admins = ctx.state.permissions.admin_list(chat_id).await?;
        Ok(admins.iter().any(|a| a.user_id == user_id))
    }

    async fn apply(&self, ctx: Context, action: Action) -> Result<Propagation> {
        let (Some(chat_id), Some(message)) = (ctx.chat_id(), ctx.message()) else {
            return Ok(Propagation::Continue);
        };

        let Some(Target {
            user_id,
            name,
            reason,
        }) = resolve_target(&ctx.state, message, ctx.args()).await
        else {
            ctx.reply("restrict-no-target", &[]).await?;
            return Ok(Propagation::Continue);
        };

        if action != Action::Unban && self.is_protected(&ctx, chat_id, user_id).await? {
            ctx.reply("restrict-protected", &[]).await?;
            return Ok(Propagation::Continue);
        }

        let client = &ctx.state.client;
        let result = match action {
            Action::Ban => client.ban_member(chat_id, user_id).await,
            Action::Kick => match client.ban_member(chat_id, user_id).await {
                Ok(()) => client.unban_member(chat_id, user_id).await,
                Err(e) => Err(e),
            },
            Action::Unban => client.unban_member(chat_id, user_id).await,
        };
        if let Err(e) = result {
            ctx.reply("restrict-failed", &[&html_escape(&e.to_string())]).await?;
            return Ok(Propagation::Continue);
        }

        info!("{:?} user {} in chat {}", action, user_id, chat_id);
        let mut text = ctx.text(action.done_key(), &[&mention(user_id, &name)]).await;
        if let Some(reason) = reason {
            text.push('\n');
            text.push_str(&ctx.text("restrict-reason", &[&html_escape(&reason)]).await);
        }
        ctx.reply_text(&text).await?;
        Ok(Propagation::Continue)
    }
}

#[async_trait]
impl Plugin for Restriction {
    fn name(&self) -> &'static str {
        NAME
    }

    fn register(self: Arc<Self>, binder: &mut Binder) -> Result<(), ConfigError> {
        binder.command(CommandSpec::new(["ban"]).can_restrict(), &self, Self::ban)?;
        binder.command(CommandSpec::new(["kick"]).can_restrict(), &self, Self::kick)?;
        binder.command(CommandSpec::new(["unban"]).can_restrict(), &self, Self::unban)?;
        Ok(())
    }
}
