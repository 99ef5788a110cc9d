//! Loaded plugins, keyed by unique name.

use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use mongodb::bson::{doc, Bson, Document};
use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::bot::AppState;
use crate::database::CHAT_KEY;
use crate::dispatcher::{Binder, Router};
use crate::error::{BackupError, ConfigError};

use super::{Plugin, PluginFactory};

/// Owns the plugin instances and the routing table their handlers live in.
pub struct PluginRegistry {
    state: AppState,
    router: Router,
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            router: Router::new(),
            plugins: RwLock::new(Vec::new()),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.plugins.read().iter().any(|p| p.name() == name)
    }

    /// Loaded plugin names, in load order.
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.read().iter().map(|p| p.name()).collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins.read().clone()
    }

    /// Bind, run `on_load`, then publish the plugin and its handlers.
    ///
    /// A name collision or invalid binding leaves the registry unchanged.
    pub async fn load(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let name = plugin.name();
        if self.is_loaded(name) {
            return Err(ConfigError::DuplicatePlugin(name.to_string()).into());
        }

        let mut binder = Binder::new(name);
        Arc::clone(&plugin).register(&mut binder)?;
        plugin
            .on_load()
            .await
            .with_context(|| format!("plugin '{name}' failed to load"))?;

        {
            let mut plugins = self.plugins.write();
            if plugins.iter().any(|p| p.name() == name) {
                return Err(ConfigError::DuplicatePlugin(name.to_string()).into());
            }
            plugins.push(plugin);
        }

        let registrations = binder.finish();
        let count = registrations.len();
        self.router.insert(registrations);
        info!("Loaded plugin {} ({} handlers)", name, count);
        Ok(())
    }

    /// Load every enabled plugin. The first failure aborts.
    pub async fn load_all(&self, factories: &[PluginFactory]) -> Result<usize> {
        let mut loaded = 0;
        for factory in factories {
            if factory.disabled {
                info!("Skipping disabled plugin {}", factory.name);
                continue;
            }
            self.load((factory.build)(&self.state)).await?;
            loaded += 1;
        }
        info!("{} plugins loaded", loaded);
        Ok(loaded)
    }

    /// Remove a plugin and its handlers. Returns false if it was not loaded.
    pub async fn unload(&self, name: &str) -> Result<bool> {
        let plugin = {
            let mut plugins = self.plugins.write();
            match plugins.iter().position(|p| p.name() == name) {
                Some(idx) => plugins.remove(idx),
                None => return Ok(false),
            }
        };

        let removed = self.router.remove_owner(name);
        plugin
            .on_unload()
            .await
            .with_context(|| format!("plugin '{name}' failed to unload"))?;
        info!("Unloaded plugin {} ({} handlers)", name, removed);
        Ok(true)
    }

    /// Unload in reverse load order. Failures are logged.
    pub async fn unload_all(&self) {
        for name in self.names().into_iter().rev() {
            if let Err(e) = self.unload(name).await {
                error!("{:#}", e);
            }
        }
    }

    /// Move every plugin's data from `old_chat` to `new_chat`.
    ///
    /// All plugins are attempted; any failure is reported afterwards.
    pub async fn migrate_chat(&self, old_chat: i64, new_chat: i64) -> Result<()> {
        let mut failed = Vec::new();
        for plugin in self.snapshot() {
            let Some(hook) = plugin.as_migrate() else {
                continue;
            };
            if let Err(e) = hook.migrate_chat(old_chat, new_chat).await {
                error!(
                    plugin = plugin.name(),
                    "Migration {} -> {} failed: {:#}", old_chat, new_chat, e
                );
                failed.push(plugin.name());
            }
        }

        if !failed.is_empty() {
            bail!("migration {} -> {} failed for {:?}", old_chat, new_chat, failed);
        }
        info!("Migrated chat {} -> {}", old_chat, new_chat);
        Ok(())
    }

    /// Export `{chat_id, <plugin>: {...}, ...}`. Plugins with no data are left out.
    pub async fn backup_chat(&self, chat_id: i64) -> Result<Document> {
        let mut backup = doc! { CHAT_KEY: chat_id };
        for plugin in self.snapshot() {
            let Some(hook) = plugin.as_backup() else {
                continue;
            };
            match hook.export_chat(chat_id).await? {
                None => {}
                Some(Bson::Document(data)) if data.is_empty() => {}
                Some(Bson::Document(data)) => {
                    backup.insert(plugin.name(), data);
                }
                Some(_) => return Err(BackupError::NotADocument(plugin.name().to_string()).into()),
            }
        }
        Ok(backup)
    }

    /// Import a backup produced by [`backup_chat`](Self::backup_chat).
    ///
    /// The backup must belong to `chat_id`. Returns how many plugins imported data.
    pub async fn restore_chat(&self, chat_id: i64, backup: &Document) -> Result<usize> {
        let found = match backup.get(CHAT_KEY) {
            Some(Bson::Int64(id)) => *id,
            Some(Bson::Int32(id)) => i64::from(*id),
            _ => return Err(BackupError::MissingChatId.into()),
        };
        if found != chat_id {
            return Err(BackupError::ChatMismatch {
                expected: chat_id,
                found,
            }
            .into());
        }

        let mut restored = 0;
        for plugin in self.snapshot() {
            let Some(hook) = plugin.as_backup() else {
                continue;
            };
            match backup.get(plugin.name()) {
                None => {}
                Some(Bson::Document(data)) => {
                    hook.import_chat(chat_id, data.clone()).await?;
                    restored += 1;
                }
                Some(_) => {
                    warn!("Backup for chat {} has a malformed {} section", chat_id, plugin.name());
                    return Err(BackupError::NotADocument(plugin.name().to_string()).into());
                }
            }
        }
        info!("Restored {} plugin sections into chat {}", restored, chat_id);
        Ok(restored)
    }
}
