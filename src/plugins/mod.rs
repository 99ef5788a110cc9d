//! Plugin system.
//!
//! A plugin binds its handlers through [`Binder`] and opts into chat
//! migration and backup by returning itself from [`Plugin::as_migrate`] /
//! [`Plugin::as_backup`].
//!
//! Add new plugins by:
//! 1. Creating a new file in this directory
//! 2. Adding `mod your_plugin;` below
//! 3. Adding its factory to [`builtin`]

mod admins;
mod backups;
mod language;
mod main;
mod registry;
mod restriction;
mod rules;
mod staff_tools;
mod users;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::{Bson, Document};

use crate::bot::AppState;
use crate::dispatcher::Binder;
use crate::error::ConfigError;

pub use registry::PluginRegistry;
pub use users::USERS_COLLECTION;

#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Unique name. Also the plugin's key inside chat backups.
    fn name(&self) -> &'static str;

    fn register(self: Arc<Self>, binder: &mut Binder) -> Result<(), ConfigError>;

    async fn on_load(&self) -> Result<()> {
        Ok(())
    }

    async fn on_unload(&self) -> Result<()> {
        Ok(())
    }

    fn as_migrate(&self) -> Option<&dyn ChatMigrate> {
        None
    }

    fn as_backup(&self) -> Option<&dyn ChatBackup> {
        None
    }
}

/// Moves chat-scoped data when a group is upgraded and changes id.
#[async_trait]
pub trait ChatMigrate: Send + Sync {
    async fn migrate_chat(&self, old_chat: i64, new_chat: i64) -> Result<()>;
}

#[async_trait]
pub trait ChatBackup: Send + Sync {
    /// The plugin's data for a chat. Must be a document; `None` or an empty
    /// document means there is nothing to back up.
    async fn export_chat(&self, chat_id: i64) -> Result<Option<Bson>>;

    async fn import_chat(&self, chat_id: i64, data: Document) -> Result<()>;
}

/// A discovered plugin type.
pub struct PluginFactory {
    pub name: &'static str,
    pub disabled: bool,
    pub build: fn(&AppState) -> Arc<dyn Plugin>,
}

/// Plugins shipped with the bot, in load order.
pub fn builtin() -> Vec<PluginFactory> {
    vec![
        PluginFactory {
            name: main::NAME,
            disabled: false,
            build: main::Main::build,
        },
        PluginFactory {
            name: language::NAME,
            disabled: false,
            build: language::Language::build,
        },
        PluginFactory {
            name: rules::NAME,
            disabled: false,
            build: rules::Rules::build,
        },
        PluginFactory {
            name: restriction::NAME,
            disabled: false,
            build: restriction::Restriction::build,
        },
        PluginFactory {
            name: admins::NAME,
            disabled: false,
            build: admins::Admins::build,
        },
        PluginFactory {
            name: backups::NAME,
            disabled: false,
            build: backups::Backups::build,
        },
        PluginFactory {
            name: staff_tools::NAME,
            disabled: false,
            build: staff_tools::StaffTools::build,
        },
        PluginFactory {
            name: users::NAME,
            disabled: false,
            build: users::Users::build,
        },
    ]
}
