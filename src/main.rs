//! Warden - modular chat-moderation bot
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `error` - Typed error taxonomy
//! - `database` - Document store seam, MongoDB backend, chat-scoped state
//! - `cache` - Named TTL caches with Moka
//! - `permissions` - Admin rights, staff roster and the permission resolver
//! - `bot` - Protocol client seam, update model, runtime context, polling/webhook runtime
//! - `filters` - Composable handler predicates
//! - `dispatcher` - Routing table and grouped dispatch
//! - `plugins` - Plugin registry and built-in plugins
//! - `i18n` - Localized strings
//! - `utils` - Utility functions

mod bot;
mod cache;
mod config;
mod database;
mod dispatcher;
mod error;
mod filters;
mod i18n;
mod permissions;
mod plugins;
#[cfg(test)]
mod testing;
mod utils;

use std::sync::Arc;

use teloxide::adaptors::throttle::Limits;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bot::{AppState, BotIdentity, TelegramClient, WorkerPool};
use cache::CacheRegistry;
use config::Config;
use database::{Database, DocumentStore};
use i18n::I18n;
use permissions::StaffRoster;
use plugins::PluginRegistry;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warden=info,teloxide=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Warden...");

    let config = Config::from_env()?;
    info!("Bot mode: {:?}", config.bot_mode);

    // Throttle keeps us inside Telegram's global and per-chat send limits.
    let bot = Bot::new(&config.bot_token).throttle(Limits::default());
    let me = bot.get_me().await?;
    let me = BotIdentity {
        id: me.id.0,
        username: me.username().to_string(),
        name: me.first_name.clone(),
    };
    info!("Bot username: @{}", me.username);

    info!("Connecting to MongoDB...");
    let store: Arc<dyn DocumentStore> =
        Arc::new(Database::connect(&config.mongodb_uri, &config.mongodb_database).await?);

    let caches = CacheRegistry::new();
    let i18n = Arc::new(I18n::load(Arc::clone(&store), &caches)?);
    let staff = Arc::new(StaffRoster::load(config.owner_id, store.as_ref()).await?);

    let state = AppState::new(
        Arc::new(TelegramClient::new(bot.clone())),
        store,
        me,
        staff,
        i18n,
        caches,
        WorkerPool::new(config.workers),
    )
    .with_log_channel(config.log_channel)
    .with_secrets(config.secrets());

    let registry = Arc::new(PluginRegistry::new(state));
    let loaded = registry.load_all(&plugins::builtin()).await?;
    info!("Loaded {} plugins: {}", loaded, registry.names().join(", "));

    bot::run(&config, bot, registry).await
}
