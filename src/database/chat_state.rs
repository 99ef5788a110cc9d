//! Chat-scoped state facade.
//!
//! Each plugin that keeps per-chat settings owns one [`ChatState`]: one
//! collection keyed by `chat_id` plus the plugin's own lock. Single
//! operations are atomic at the document level; compound read-modify-write
//! sequences must hold [`ChatState::lock`] for their whole duration.
//!
//! `migrate` and `import` take the lock themselves, so callers must not hold
//! it when invoking them.

use std::sync::Arc;

use anyhow::Result;
use mongodb::bson::{doc, Bson, Document};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::store::DocumentStore;

/// Key every chat-scoped document carries.
pub const CHAT_KEY: &str = "chat_id";

#[derive(Clone)]
pub struct ChatState {
    store: Arc<dyn DocumentStore>,
    collection: Arc<str>,
    lock: Arc<Mutex<()>>,
}

impl ChatState {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<Arc<str>>) -> Self {
        Self {
            store,
            collection: collection.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Serialize a compound operation against other writers of this plugin.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    pub async fn get(&self, chat_id: i64) -> Result<Option<Document>> {
        self.store
            .find_one(&self.collection, doc! { CHAT_KEY: chat_id })
            .await
    }

    /// `$set` the given fields, creating the document if needed.
    pub async fn set(&self, chat_id: i64, fields: Document) -> Result<()> {
        self.store
            .update_one(
                &self.collection,
                doc! { CHAT_KEY: chat_id },
                doc! { "$set": fields },
                true,
            )
            .await?;
        Ok(())
    }

    pub async fn unset(&self, chat_id: i64, fields: &[&str]) -> Result<()> {
        let spec: Document = fields.iter().map(|f| (f.to_string(), Bson::String(String::new()))).collect();
        self.store
            .update_one(&self.collection, doc! { CHAT_KEY: chat_id }, doc! { "$unset": spec }, false)
            .await?;
        Ok(())
    }

    pub async fn push(&self, chat_id: i64, field: &str, value: impl Into<Bson>) -> Result<()> {
        self.apply(chat_id, "$push", field, value.into(), true).await
    }

    pub async fn add_to_set(&self, chat_id: i64, field: &str, value: impl Into<Bson>) -> Result<()> {
        self.apply(chat_id, "$addToSet", field, value.into(), true).await
    }

    pub async fn pull(&self, chat_id: i64, field: &str, value: impl Into<Bson>) -> Result<()> {
        self.apply(chat_id, "$pull", field, value.into(), false).await
    }

    async fn apply(&self, chat_id: i64, operator: &str, field: &str, value: Bson, upsert: bool) -> Result<()> {
        let mut spec = Document::new();
        spec.insert(field, value);
        let mut update = Document::new();
        update.insert(operator, spec);
        self.store
            .update_one(&self.collection, doc! { CHAT_KEY: chat_id }, update, upsert)
            .await?;
        Ok(())
    }

    /// Remove the chat's document. Returns whether one existed.
    pub async fn delete(&self, chat_id: i64) -> Result<bool> {
        let deleted = self
            .store
            .delete_many(&self.collection, doc! { CHAT_KEY: chat_id })
            .await?;
        Ok(deleted > 0)
    }

    /// Move the chat's document from `old` to `new`.
    ///
    /// If `new` already has a document, the old fields are merged into it.
    /// No document keyed by `old` remains afterwards.
    pub async fn migrate(&self, old: i64, new: i64) -> Result<()> {
        let _guard = self.lock.lock().await;

        let existing = self.store.count(&self.collection, doc! { CHAT_KEY: new }).await?;
        if existing == 0 {
            self.store
                .update_one(
                    &self.collection,
                    doc! { CHAT_KEY: old },
                    doc! { "$set": { CHAT_KEY: new } },
                    false,
                )
                .await?;
        } else if let Some(document) = self.get(old).await? {
            let fields = strip_envelope(document);
            if !fields.is_empty() {
                self.store
                    .update_one(
                        &self.collection,
                        doc! { CHAT_KEY: new },
                        doc! { "$set": fields },
                        true,
                    )
                    .await?;
            }
        }

        self.store
            .delete_many(&self.collection, doc! { CHAT_KEY: old })
            .await?;
        debug!("Migrated {} from {} to {}", self.collection, old, new);
        Ok(())
    }

    /// The chat's data without storage keys, or `None` if there is none.
    pub async fn export(&self, chat_id: i64) -> Result<Option<Document>> {
        Ok(self
            .get(chat_id)
            .await?
            .map(strip_envelope)
            .filter(|fields| !fields.is_empty()))
    }

    /// Merge previously exported data into the chat's document.
    pub async fn import(&self, chat_id: i64, data: Document) -> Result<()> {
        let fields = strip_envelope(data);
        if fields.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        self.set(chat_id, fields).await
    }
}

/// Drop `_id` and `chat_id`, which belong to the storage layout, not the data.
pub fn strip_envelope(mut document: Document) -> Document {
    document.remove("_id");
    document.remove(CHAT_KEY);
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;

    fn state() -> (Arc<MemoryStore>, ChatState) {
        let store = Arc::new(MemoryStore::new());
        let state = ChatState::new(store.clone(), "RULES");
        (store, state)
    }

    #[tokio::test]
    async fn test_set_then_export_strips_envelope() {
        let (_, state) = state();
        state.set(-1, doc! { "rules": "no spam", "private": true }).await.unwrap();

        let exported = state.export(-1).await.unwrap().unwrap();
        assert_eq!(exported, doc! { "rules": "no spam", "private": true });
        assert!(state.export(-2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_migrate_leaves_nothing_behind() {
        let (store, state) = state();
        state.set(-1, doc! { "rules": "old rules" }).await.unwrap();

        state.migrate(-1, -1001).await.unwrap();

        assert!(state.get(-1).await.unwrap().is_none());
        let moved = state.get(-1001).await.unwrap().unwrap();
        assert_eq!(moved.get_str("rules").unwrap(), "old rules");
        assert_eq!(store.snapshot("RULES").len(), 1);
    }

    #[tokio::test]
    async fn test_migrate_merges_into_existing_target() {
        let (store, state) = state();
        state.set(-1, doc! { "rules": "old rules" }).await.unwrap();
        state.set(-1001, doc! { "private": true }).await.unwrap();

        state.migrate(-1, -1001).await.unwrap();

        let docs = store.snapshot("RULES");
        assert_eq!(docs.len(), 1);
        assert_eq!(
            state.export(-1001).await.unwrap().unwrap(),
            doc! { "private": true, "rules": "old rules" }
        );
    }

    #[tokio::test]
    async fn test_import_ignores_foreign_envelope() {
        let (_, state) = state();
        state
            .import(-5, doc! { "chat_id": -9_i64, "_id": 3, "rules": "imported" })
            .await
            .unwrap();

        let stored = state.get(-5).await.unwrap().unwrap();
        assert_eq!(stored.get_i64(CHAT_KEY).unwrap(), -5);
        assert!(state.get(-9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_operators() {
        let (_, state) = state();
        state.push(-1, "blocked", 10_i64).await.unwrap();
        state.add_to_set(-1, "blocked", 10_i64).await.unwrap();
        state.add_to_set(-1, "blocked", 11_i64).await.unwrap();
        state.pull(-1, "blocked", 10_i64).await.unwrap();
        state.unset(-1, &["missing"]).await.unwrap();

        let stored = state.get(-1).await.unwrap().unwrap();
        assert_eq!(stored.get_array("blocked").unwrap(), &vec![Bson::Int64(11)]);
        assert!(state.delete(-1).await.unwrap());
    }
}
