//! Handler seam and the invocation context handed to it.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::bot::{AppState, MessageUpdate, Update};
use crate::filters::Scratch;
use crate::plugins::PluginRegistry;

/// What the dispatcher does after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// This group is done; move on to the next group.
    #[default]
    Continue,
    /// Skip every remaining candidate and group.
    Stop,
    /// Keep evaluating candidates of the same group.
    ForceContinue,
}

/// Everything a handler gets for one invocation.
pub struct Context {
    pub state: AppState,
    pub update: Arc<Update>,
    pub scratch: Scratch,
    pub registry: Arc<PluginRegistry>,
}

impl Context {
    pub fn message(&self) -> Option<&MessageUpdate> {
        self.update.message()
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.update.chat_id()
    }

    pub fn sender_id(&self) -> Option<u64> {
        self.update.sender().map(|s| s.id)
    }

    pub fn args(&self) -> &[String] {
        &self.scratch.args
    }

    /// Localized string for the update's chat.
    pub async fn text(&self, key: &str, args: &[&str]) -> String {
        match self.chat_id() {
            Some(chat_id) => self.state.text(chat_id, key, args).await,
            None => self.state.i18n.format(crate::i18n::DEFAULT_LANGUAGE, key, args),
        }
    }

    /// Reply with a localized string.
    pub async fn reply(&self, key: &str, args: &[&str]) -> Result<()> {
        let text = self.text(key, args).await;
        self.reply_text(&text).await
    }

    /// Reply to the triggering message, or post in the callback's chat.
    pub async fn reply_text(&self, text: &str) -> Result<()> {
        match self.update.as_ref() {
            Update::Command(message) | Update::GenericMessage(message) => {
                self.state.reply(message, text).await?;
            }
            Update::CallbackQuery(query) => {
                if let Some(chat) = &query.chat {
                    self.state
                        .client
                        .send_message(chat.id, &self.state.redact(text), None)
                        .await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: Context) -> Result<Propagation>;
}

/// A plugin method bound to the plugin instance it belongs to.
pub(crate) struct PluginHandler<P, F> {
    plugin: Arc<P>,
    f: F,
}

impl<P, F> PluginHandler<P, F> {
    pub(crate) fn new(plugin: Arc<P>, f: F) -> Self {
        Self { plugin, f }
    }
}

#[async_trait]
impl<P, F, Fut> Handler for PluginHandler<P, F>
where
    P: Send + Sync + 'static,
    F: Fn(Arc<P>, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Propagation>> + Send + 'static,
{
    async fn handle(&self, ctx: Context) -> Result<Propagation> {
        (self.f)(Arc::clone(&self.plugin), ctx).await
    }
}
