//! Group rules.
//!
//! Stored in the `RULES` collection as `{chat_id, rules}`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use tracing::info;

use crate::bot::AppState;
use crate::database::ChatState;
use crate::dispatcher::{Binder, CommandSpec, Context, Propagation};
use crate::error::ConfigError;
use crate::filters::IsGroupChat;
use crate::utils::html_escape;

use super::{ChatBackup, ChatMigrate, Plugin};

pub const NAME: &str = "Rules";
const COLLECTION: &str = "RULES";

pub struct Rules {
    state: ChatState,
}

impl Rules {
    pub fn build(state: &AppState) -> Arc<dyn Plugin> {
        Arc::new(Self {
            state: state.chat_state(COLLECTION),
        })
    }

    async fn show(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let Some(chat_id) = ctx.chat_id() else {
            return Ok(Propagation::Continue);
        };

        let rules = self
            .state
            .get(chat_id)
            .await?
            .and_then(|d| d.get_str("rules").ok().map(str::to_owned))
            .filter(|r| !r.trim().is_empty());

        match rules {
            Some(rules) => {
                let title = ctx
                    .update
                    .chat()
                    .and_then(|c| c.title.clone())
                    .unwrap_or_default();
                ctx.reply("rules-text", &[&html_escape(&title), &rules]).await?;
            }
            None => ctx.reply("rules-none", &[]).await?,
        }
        Ok(Propagation::Continue)
    }

    async fn set(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let Some(chat_id) = ctx.chat_id() else {
            return Ok(Propagation::Continue);
        };
        let text = ctx.scratch.input.trim();
        if text.is_empty() {
            ctx.reply("rules-missing-text", &[]).await?;
            return Ok(Propagation::Continue);
        }

        self.state.set(chat_id, doc! { "rules": text }).await?;
        info!("Rules updated in chat {}", chat_id);
        ctx.reply("rules-set", &[]).await?;
        Ok(Propagation::Continue)
    }

    async fn clear(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let Some(chat_id) = ctx.chat_id() else {
            return Ok(Propagation::Continue);
        };
        self.state.delete(chat_id).await?;
        ctx.reply("rules-cleared", &[]).await?;
        Ok(Propagation::Continue)
    }
}

#[async_trait]
impl Plugin for Rules {
    fn name(&self) -> &'static str {
        NAME
    }

    fn register(self: Arc<Self>, binder: &mut Binder) -> Result<(), ConfigError> {
        binder.command(
            CommandSpec::new(["rules"]).filter(Arc::new(IsGroupChat)),
            &self,
            Self::show,
        )?;
        binder.command(
            CommandSpec::new(["setrules"]).admin_only().can_change_info(),
            &self,
            Self::set,
        )?;
        binder.command(
            CommandSpec::new(["clearrules"]).admin_only().can_change_info(),
            &self,
            Self::clear,
        )?;
        Ok(())
    }

    fn as_migrate(&self) -> Option<&dyn ChatMigrate> {
        Some(self)
    }

    fn as_backup(&self) -> Option<&dyn ChatBackup> {
        Some(self)
    }
}

#[async_trait]
impl ChatMigrate for Rules {
    async fn migrate_chat(&self, old_chat: i64, new_chat: i64) -> Result<()> {
        self.state.migrate(old_chat, new_chat).await
    }
}

#[async_trait]
impl ChatBackup for Rules {
    async fn export_chat(&self, chat_id: i64) -> Result<Option<Bson>> {
        Ok(self.state.export(chat_id).await?.map(Bson::Document))
    }

    async fn import_chat(&self, chat_id: i64, data: Document) -> Result<()> {
        self.state.import(chat_id, data).await
    }
}
