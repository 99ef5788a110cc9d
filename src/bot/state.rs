//! Shared runtime context handed to plugins, filters and handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use super::client::{BotIdentity, ChatClient};
use super::pool::WorkerPool;
use super::update::MessageUpdate;
use crate::cache::CacheRegistry;
use crate::database::{ChatState, DocumentStore};
use crate::error::ProtocolError;
use crate::i18n::I18n;
use crate::permissions::{PermissionResolver, StaffRoster};

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn ChatClient>,
    pub store: Arc<dyn DocumentStore>,
    pub me: Arc<BotIdentity>,
    pub staff: Arc<StaffRoster>,
    pub permissions: PermissionResolver,
    pub i18n: Arc<I18n>,
    pub caches: CacheRegistry,
    pub pool: WorkerPool,
    pub log_channel: Option<i64>,
    secrets: Arc<Vec<String>>,
    started: Instant,
}

impl AppState {
    pub fn new(
        client: Arc<dyn ChatClient>,
        store: Arc<dyn DocumentStore>,
        me: BotIdentity,
        staff: Arc<StaffRoster>,
        i18n: Arc<I18n>,
        caches: CacheRegistry,
        pool: WorkerPool,
    ) -> Self {
        let permissions = PermissionResolver::new(
            Arc::clone(&client),
            Arc::clone(&staff),
            Arc::clone(&i18n),
            me.id,
            &caches,
        );

        Self {
            client,
            store,
            me: Arc::new(me),
            staff,
            permissions,
            i18n,
            caches,
            pool,
            log_channel: None,
            secrets: Arc::new(Vec::new()),
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_log_channel(mut self, log_channel: Option<i64>) -> Self {
        self.log_channel = log_channel;
        self
    }

    #[must_use]
    pub fn with_secrets(mut self, secrets: Vec<String>) -> Self {
        self.secrets = Arc::new(secrets.into_iter().filter(|s| !s.is_empty()).collect());
        self
    }

    /// Chat-scoped storage over `collection`, with its own lock.
    pub fn chat_state(&self, collection: &str) -> ChatState {
        ChatState::new(Arc::clone(&self.store), collection)
    }

    /// Localized string for a chat.
    pub async fn text(&self, chat_id: i64, key: &str, args: &[&str]) -> String {
        self.i18n.text(chat_id, key, args).await
    }

    /// Reply to a message in its chat.
    pub async fn reply(&self, message: &MessageUpdate, text: &str) -> Result<i32, ProtocolError> {
        self.client
            .send_message(message.chat.id, &self.redact(text), Some(message.message_id))
            .await
    }

    /// Send to the log channel, if one is configured. Failures are only logged.
    pub async fn channel_log(&self, text: &str) {
        let Some(channel) = self.log_channel else {
            return;
        };
        if let Err(e) = self.client.send_message(channel, &self.redact(text), None).await {
            warn!("Failed to write to log channel {}: {}", channel, e);
        }
    }

    /// Mask credentials before text leaves the process.
    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), "[REDACTED]"))
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}
