//! Chat backup and restore.
//!
//! A backup is every plugin's exported data for the chat, as relaxed
//! extended JSON: `{"chat_id": .., "<Plugin>": {..}, ..}`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::{Bson, Document};
use tracing::info;

use crate::bot::{AppState, OutgoingDocument};
use crate::database::CHAT_KEY;
use crate::dispatcher::{Binder, CommandSpec, Context, Propagation};
use crate::error::{BackupError, ConfigError};
use crate::utils::html_escape;

use super::Plugin;

pub const NAME: &str = "Backups";

pub struct Backups;

impl Backups {
    pub fn build(_state: &AppState) -> Arc<dyn Plugin> {
        Arc::new(Self)
    }

    async fn backup(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let (Some(chat), Some(message)) = (ctx.update.chat(), ctx.message()) else {
            return Ok(Propagation::Continue);
        };
        let chat_id = chat.id;
        let chat_name = chat.title.clone().unwrap_or_else(|| chat_id.to_string());

        let progress = ctx.text("backup-progress", &[]).await;
        let progress_id = ctx.state.reply(message, &progress).await?;

        let backup = ctx.registry.backup_chat(chat_id).await?;
        let saved: Vec<String> = backup
            .keys()
            .filter(|k| k.as_str() != CHAT_KEY)
            .cloned()
            .collect();
        if saved.is_empty() {
            let text = ctx.text("backup-null", &[]).await;
            ctx.state.client.edit_message(chat_id, progress_id, &text).await?;
            return Ok(Propagation::Continue);
        }

        let bytes = ctx
            .state
            .pool
            .run(move || serde_json::to_vec_pretty(&Bson::Document(backup).into_relaxed_extjson()))
            .await??;

        let date = Utc::now().format("%H:%M - %d/%b/%Y").to_string();
        let listing: String = saved
            .iter()
            .map(|name| format!("\n× <code>{}</code>", name))
            .collect();
        let caption = ctx
            .text(
                "backup-doc",
                &[&html_escape(&chat_name), &chat_id.to_string(), &date, &listing],
            )
            .await;

        ctx.state
            .client
            .send_document(
                chat_id,
                OutgoingDocument {
                    file_name: format!("{}-backup.json", chat_name),
                    bytes,
                    caption: Some(caption),
                },
                Some(message.message_id),
            )
            .await?;
        ctx.state.client.delete_message(chat_id, progress_id).await?;

        info!("Backed up chat {} ({})", chat_id, saved.join(", "));
        ctx.state
            .channel_log(&format!(
                "<b>Backed up</b>\nChat: <code>{}</code>\nChat ID: <code>{}</code>\nTime: <code>{}</code>\nData:{}",
                html_escape(&chat_name),
                chat_id,
                date,
                listing
            ))
            .await;
        Ok(Propagation::Continue)
    }

    async fn restore(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let (Some(chat), Some(message)) = (ctx.update.chat(), ctx.message()) else {
            return Ok(Propagation::Continue);
        };
        let chat_id = chat.id;

        let Some(file) = message.reply_to.as_ref().and_then(|r| r.document.as_ref()) else {
            ctx.reply("no-backup-file", &[]).await?;
            return Ok(Propagation::Continue);
        };

        let progress = ctx.text("restore-progress", &[]).await;
        let progress_id = ctx.state.reply(message, &progress).await?;
        let edit = |key: &'static str| {
            let ctx = &ctx;
            async move {
                let text = ctx.text(key, &[]).await;
                ctx.state.client.edit_message(chat_id, progress_id, &text).await
            }
        };

        let raw = ctx.state.client.download_file(&file.file_id).await?;
        let parsed = ctx.state.pool.run(move || parse_backup(&raw)).await?;
        let backup = match parsed {
            Ok(backup) => backup,
            Err(BackupError::Malformed(_)) | Err(BackupError::MissingChatId) => {
                edit("invalid-backup-file").await?;
                return Ok(Propagation::Continue);
            }
            Err(e) => return Err(e.into()),
        };

        if backup.keys().all(|k| k == CHAT_KEY) {
            edit("backup-data-null").await?;
            return Ok(Propagation::Continue);
        }

        match ctx.registry.restore_chat(chat_id, &backup).await {
            Ok(restored) => info!("Restored {} sections into chat {}", restored, chat_id),
            Err(e) if matches!(e.downcast_ref::<BackupError>(), Some(BackupError::ChatMismatch { .. })) => {
                edit("backup-id-invalid").await?;
                return Ok(Propagation::Continue);
            }
            Err(e) => return Err(e),
        }

        edit("backup-done").await?;
        ctx.state
            .channel_log(&format!(
                "<b>Restored</b>\nChat: <code>{}</code>\nChat ID: <code>{}</code>",
                html_escape(chat.title.as_deref().unwrap_or_default()),
                chat_id
            ))
            .await;
        Ok(Propagation::Continue)
    }
}

/// Decode a backup file into a document carrying a `chat_id`.
fn parse_backup(raw: &[u8]) -> Result<Document, BackupError> {
    let value: serde_json::Value = serde_json::from_slice(raw)?;
    let document = match Bson::try_from(value) {
        Ok(Bson::Document(document)) => document,
        _ => return Err(BackupError::MissingChatId),
    };
    if !document.contains_key(CHAT_KEY) {
        return Err(BackupError::MissingChatId);
    }
    Ok(document)
}

#[async_trait]
impl Plugin for Backups {
    fn name(&self) -> &'static str {
        NAME
    }

    fn register(self: Arc<Self>, binder: &mut Binder) -> Result<(), ConfigError> {
        binder.command(CommandSpec::new(["backup"]).admin_only(), &self, Self::backup)?;
        binder.command(CommandSpec::new(["restore"]).admin_only(), &self, Self::restore)?;
        Ok(())
    }
}
