//! Tracks which users and chats the bot has seen.
//!
//! - `USERS`: `{_id: user, username, name, chats: [chat_id]}`
//! - `CHATS`: `{chat_id, chat_name, member: [user]}`

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::doc;
use tracing::debug;

use crate::bot::AppState;
use crate::database::{ChatState, DocumentStore};
use crate::dispatcher::{Binder, Context, Propagation};
use crate::error::ConfigError;
use crate::filters::IsGroupChat;

use super::{ChatMigrate, Plugin};

pub const NAME: &str = "Users";
pub const USERS_COLLECTION: &str = "USERS";
pub const CHATS_COLLECTION: &str = "CHATS";

pub struct Users {
    store: Arc<dyn DocumentStore>,
    chats: ChatState,
}

impl Users {
    pub fn build(state: &AppState) -> Arc<dyn Plugin> {
        Arc::new(Self {
            store: Arc::clone(&state.store),
            chats: state.chat_state(CHATS_COLLECTION),
        })
    }

    async fn track(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let (Some(chat), Some(sender)) = (ctx.update.chat(), ctx.update.sender()) else {
            return Ok(Propagation::Continue);
        };
        if sender.is_bot {
            return Ok(Propagation::Continue);
        }
        let user_id = sender.id as i64;

        let mut profile = doc! { "name": &sender.first_name };
        if let Some(username) = &sender.username {
            profile.insert("username", username.to_lowercase());
        }
        self.store
            .update_one(
                USERS_COLLECTION,
                doc! { "_id": user_id },
                doc! { "$set": profile, "$addToSet": { "chats": chat.id } },
                true,
            )
            .await?;

        let _guard = self.chats.lock().await;
        if let Some(title) = &chat.title {
            self.chats.set(chat.id, doc! { "chat_name": title }).await?;
        }
        self.chats.add_to_set(chat.id, "member", user_id).await?;
        debug!("Tracked user {} in chat {}", user_id, chat.id);
        Ok(Propagation::Continue)
    }
}

#[async_trait]
impl Plugin for Users {
    fn name(&self) -> &'static str {
        NAME
    }

    fn register(self: Arc<Self>, binder: &mut Binder) -> Result<(), ConfigError> {
        binder.message(4, Some(Arc::new(IsGroupChat)), "track", &self, Self::track);
        Ok(())
    }

    fn as_migrate(&self) -> Option<&dyn ChatMigrate> {
        Some(self)
    }
}

#[async_trait]
impl ChatMigrate for Users {
    async fn migrate_chat(&self, old_chat: i64, new_chat: i64) -> Result<()> {
        self.chats.migrate(old_chat, new_chat).await?;
        self.store
            .update_many(
                USERS_COLLECTION,
                doc! { "chats": old_chat },
                doc! { "$addToSet": { "chats": new_chat } },
            )
            .await?;
        self.store
            .update_many(
                USERS_COLLECTION,
                doc! { "chats": old_chat },
                doc! { "$pull": { "chats": old_chat } },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::{Bson, Document};

    use super::*;
    use crate::bot::update::fixtures::*;
    use crate::bot::Update;
    use crate::database::CHAT_KEY;
    use crate::dispatcher::Dispatcher;
    use crate::plugins::PluginRegistry;
    use crate::testing::{app_state, StubClient};

    fn chats_of(user: &Document) -> Vec<i64> {
        user.get_array("chats")
            .unwrap()
            .iter()
            .filter_map(Bson::as_i64)
            .collect()
    }

    #[tokio::test]
    async fn test_tracks_group_members_only() {
        let (state, store) = app_state(Arc::new(StubClient::new()));
        let registry = Arc::new(PluginRegistry::new(state.clone()));
        registry.load(Users::build(&state)).await.unwrap();
        let dispatcher = Dispatcher::new(registry.clone());

        dispatcher.dispatch(group_text(-1, 5, "hello")).await;
        dispatcher.dispatch(group_text(-1, 5, "again")).await;
        dispatcher.dispatch(group_text(-2, 5, "/start")).await;
        dispatcher
            .dispatch(Update::from_message(message(private(6), 6, "hi")))
            .await;

        let users = store.snapshot(USERS_COLLECTION);
        assert_eq!(users.len(), 1);
        assert_eq!(chats_of(&users[0]), vec![-1, -2]);

        let chats = store.snapshot(CHATS_COLLECTION);
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].get_str("chat_name").unwrap(), "group -1");

        registry.migrate_chat(-1, -100).await.unwrap();
        let users = store.snapshot(USERS_COLLECTION);
        assert_eq!(chats_of(&users[0]), vec![-2, -100]);
        assert!(store
            .snapshot(CHATS_COLLECTION)
            .iter()
            .all(|c| c.get_i64(CHAT_KEY).unwrap() != -1));
    }
}
