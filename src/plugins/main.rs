//! Core commands and chat migration.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::bot::AppState;
use crate::dispatcher::{Binder, CommandSpec, Context, Propagation};
use crate::error::ConfigError;
use crate::filters::{Filter, FilterContext};
use crate::utils::{format_uptime, html_escape};

use super::Plugin;

pub const NAME: &str = "Main";

pub struct Main;

impl Main {
    pub fn build(_state: &AppState) -> Arc<dyn Plugin> {
        Arc::new(Self)
    }

    fn in_private(ctx: &Context) -> bool {
        ctx.update.chat().is_some_and(|c| !c.kind.is_group())
    }

    async fn start(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        if Self::in_private(&ctx) {
            let name = html_escape(&ctx.state.me.name);
            ctx.reply("start-pm", &[&name]).await?;
        } else {
            ctx.reply("start-chat", &[]).await?;
        }
        Ok(Propagation::Continue)
    }

    async fn help(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        if Self::in_private(&ctx) {
            let name = html_escape(&ctx.state.me.name);
            ctx.reply("help-pm", &[&name]).await?;
        } else {
            ctx.reply("help-chat", &[]).await?;
        }
        Ok(Propagation::Continue)
    }

    async fn ping(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let uptime = format_uptime(ctx.state.uptime().as_secs());
        ctx.reply("ping", &[&uptime]).await?;
        Ok(Propagation::Continue)
    }

    /// Service message a supergroup receives after being upgraded.
    async fn on_migrate(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let (Some(new_chat), Some(old_chat)) = (
            ctx.chat_id(),
            ctx.message().and_then(|m| m.migrate_from_chat_id),
        ) else {
            return Ok(Propagation::Continue);
        };

        info!("Chat {} migrated to {}", old_chat, new_chat);
        let result = ctx.registry.migrate_chat(old_chat, new_chat).await;
        for chat in [old_chat, new_chat] {
            ctx.state.permissions.invalidate(chat);
            ctx.state.i18n.forget(chat);
        }
        result?;
        Ok(Propagation::Continue)
    }
}

struct IsMigration;

#[async_trait]
impl Filter for IsMigration {
    fn name(&self) -> &str {
        "IsMigration"
    }

    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<bool> {
        Ok(ctx
            .update
            .message()
            .is_some_and(|m| m.migrate_from_chat_id.is_some()))
    }
}

#[async_trait]
impl Plugin for Main {
    fn name(&self) -> &'static str {
        NAME
    }

    fn register(self: Arc<Self>, binder: &mut Binder) -> Result<(), ConfigError> {
        binder.command(CommandSpec::new(["start"]), &self, Self::start)?;
        binder.command(CommandSpec::new(["help"]), &self, Self::help)?;
        binder.command(CommandSpec::new(["ping"]), &self, Self::ping)?;
        binder.message(1, Some(Arc::new(IsMigration)), "migrate", &self, Self::on_migrate);
        Ok(())
    }
}
