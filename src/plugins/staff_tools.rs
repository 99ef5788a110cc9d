//! Commands reserved for bot staff: broadcast, chat listing, leaving chats
//! and managing the sudo list.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use tracing::{info, warn};

use crate::bot::{AppState, OutgoingDocument};
use crate::database::{DocumentStore, CHAT_KEY};
use crate::dispatcher::{Binder, CommandSpec, Context, Propagation};
use crate::error::ConfigError;
use crate::permissions::{Rank, STAFF_COLLECTION};
use crate::utils::{html_escape, mention, resolve_target};

use super::users::CHATS_COLLECTION;
use super::Plugin;

pub const NAME: &str = "StaffTools";

/// Messages sent before pausing a broadcast for a second.
const BROADCAST_BURST: usize = 25;

pub struct StaffTools {
    store: Arc<dyn DocumentStore>,
}

impl StaffTools {
    pub fn build(state: &AppState) -> Arc<dyn Plugin> {
        Arc::new(Self {
            store: Arc::clone(&state.store),
        })
    }

    async fn known_chats(&self) -> Result<Vec<(i64, String)>> {
        let chats = self.store.find_many(CHATS_COLLECTION, doc! {}).await?;
        Ok(chats.iter().filter_map(chat_entry).collect())
    }

    async fn broadcast(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let Some(message) = ctx.message() else {
            return Ok(Propagation::Continue);
        };
        let text = ctx.scratch.input.trim();
        if text.is_empty() {
            ctx.reply("broadcast-missing-text", &[]).await?;
            return Ok(Propagation::Continue);
        }

        let progress = ctx.text("broadcast-progress", &[]).await;
        let progress_id = ctx.state.reply(message, &progress).await?;

        let (mut sent, mut failed) = (0usize, 0usize);
        for (chat_id, _) in self.known_chats().await? {
            match ctx.state.client.send_message(chat_id, text, None).await {
                Ok(_) => {
                    sent += 1;
                    if sent % BROADCAST_BURST == 0 {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
                Err(e) => {
                    warn!("Broadcast to {} failed: {}", chat_id, e);
                    failed += 1;
                }
            }
        }

        info!("Broadcast finished: {} sent, {} failed", sent, failed);
        let report = ctx
            .text("broadcast-done", &[&sent.to_string(), &failed.to_string()])
            .await;
        ctx.state
            .client
            .edit_message(message.chat.id, progress_id, &report)
            .await?;
        Ok(Propagation::Continue)
    }

    async fn chatlist(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let Some(message) = ctx.message() else {
            return Ok(Propagation::Continue);
        };
        let chats = self.known_chats().await?;
        if chats.is_empty() {
            ctx.reply("chatlist-empty", &[]).await?;
            return Ok(Propagation::Continue);
        }

        let listing: String = chats
            .iter()
            .map(|(id, name)| format!("{} | {}\n", name, id))
            .collect();
        let caption = ctx.text("chatlist-caption", &[&chats.len().to_string()]).await;
        ctx.state
            .client
            .send_document(
                message.chat.id,
                OutgoingDocument {
                    file_name: "chatlist.txt".to_string(),
                    bytes: listing.into_bytes(),
                    caption: Some(caption),
                },
                Some(message.message_id),
            )
            .await?;
        Ok(Propagation::Continue)
    }

    async fn leave(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let Some(chat_id) = ctx.args().first().and_then(|a| a.parse::<i64>().ok()) else {
            ctx.reply("leave-missing-id", &[]).await?;
            return Ok(Propagation::Continue);
        };

        match ctx.state.client.leave_chat(chat_id).await {
            Ok(()) => {
                info!("Left chat {} on staff request", chat_id);
                ctx.reply("leave-done", &[&chat_id.to_string()]).await?;
                ctx.state
                    .channel_log(&format!("<b>Left chat</b>\nChat ID: <code>{}</code>", chat_id))
                    .await;
            }
            Err(e) => {
                ctx.reply("leave-failed", &[&html_escape(&e.to_string())]).await?;
            }
        }
        Ok(Propagation::Continue)
    }

    async fn add_sudo(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let Some(message) = ctx.message() else {
            return Ok(Propagation::Continue);
        };
        let Some(target) = resolve_target(&ctx.state, message, ctx.args()).await else {
            ctx.reply("restrict-no-target", &[]).await?;
            return Ok(Propagation::Continue);
        };
        let who = mention(target.user_id, &target.name);

        if matches!(
            ctx.state.staff.rank_of(target.user_id),
            Some(Rank::Sudo | Rank::Owner)
        ) {
            ctx.reply("sudo-unchanged", &[&who]).await?;
            return Ok(Propagation::Continue);
        }
        // The roster only changes once the store has accepted the rank.
        self.store
            .update_one(
                STAFF_COLLECTION,
                doc! { "_id": target.user_id as i64 },
                doc! { "$set": { "rank": Rank::Sudo.as_str() } },
                true,
            )
            .await?;
        ctx.state.staff.insert(target.user_id, Rank::Sudo);

        info!("User {} promoted to sudo", target.user_id);
        ctx.reply("sudo-added", &[&who]).await?;
        Ok(Propagation::Continue)
    }

    async fn remove_sudo(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let Some(message) = ctx.message() else {
            return Ok(Propagation::Continue);
        };
        let Some(target) = resolve_target(&ctx.state, message, ctx.args()).await else {
            ctx.reply("restrict-no-target", &[]).await?;
            return Ok(Propagation::Continue);
        };
        let who = mention(target.user_id, &target.name);

        // Only sudo users are demoted here; devs are managed through the store.
        if ctx.state.staff.rank_of(target.user_id) != Some(Rank::Sudo) {
            ctx.reply("sudo-unchanged", &[&who]).await?;
            return Ok(Propagation::Continue);
        }
        self.store
            .delete_many(STAFF_COLLECTION, doc! { "_id": target.user_id as i64 })
            .await?;
        ctx.state.staff.remove(target.user_id);

        info!("User {} is no longer sudo", target.user_id);
        ctx.reply("sudo-removed", &[&who]).await?;
        Ok(Propagation::Continue)
    }

    async fn staff(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let listing: String = ctx
            .state
            .staff
            .list()
            .iter()
            .map(|(user, rank)| format!("\n• <code>{}</code> ({})", user, rank))
            .collect();
        ctx.reply("staff-list", &[&listing]).await?;
        Ok(Propagation::Continue)
    }
}

/// `(chat_id, chat_name)` of a `CHATS` document. Ids stored as Int32 are widened.
fn chat_entry(document: &Document) -> Option<(i64, String)> {
    let id = document
        .get_i64(CHAT_KEY)
        .ok()
        .or_else(|| document.get_i32(CHAT_KEY).ok().map(i64::from))?;
    let name = document
        .get_str("chat_name")
        .map(str::to_owned)
        .unwrap_or_else(|_| id.to_string());
    Some((id, name))
}

#[async_trait]
impl Plugin for StaffTools {
    fn name(&self) -> &'static str {
        NAME
    }

    fn register(self: Arc<Self>, binder: &mut Binder) -> Result<(), ConfigError> {
        binder.command(CommandSpec::new(["broadcast"]).staff_only(), &self, Self::broadcast)?;
        binder.command(CommandSpec::new(["chatlist"]).staff_only(), &self, Self::chatlist)?;
        binder.command(
            CommandSpec::new(["leave", "leavechat", "leavegroup"]).staff_only(),
            &self,
            Self::leave,
        )?;
        binder.command(CommandSpec::new(["addsudo"]).staff_rank("owner"), &self, Self::add_sudo)?;
        binder.command(CommandSpec::new(["rmsudo"]).staff_rank("owner"), &self, Self::remove_sudo)?;
        binder.command(CommandSpec::new(["staff"]).staff_only(), &self, Self::staff)?;
        Ok(())
    }
}
