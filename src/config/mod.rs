//! Configuration module.
//!
//! Loads configuration from environment variables (and `.env` via dotenvy).

use std::env;

use serde::Deserialize;

use crate::error::ConfigError;

/// How updates are received.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    #[default]
    Polling,
    Webhook,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // Telegram
    pub bot_token: String,
    pub bot_mode: BotMode,
    pub webhook_url: Option<String>,
    pub webhook_port: u16,
    pub webhook_secret: Option<String>,

    /// Staff owner. Always present in the staff roster.
    pub owner_id: u64,

    /// Chat that receives operational logs (startup, backups).
    pub log_channel: Option<i64>,

    // MongoDB
    pub mongodb_uri: String,
    pub mongodb_database: String,

    /// Size of the blocking worker pool.
    pub workers: usize,

    /// Optional third-party API key. Never echoed back to chats.
    pub sw_api: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let bot_mode = match get("BOT_MODE").map(|m| m.to_lowercase()).as_deref() {
            None | Some("polling") => BotMode::Polling,
            Some("webhook") => BotMode::Webhook,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "BOT_MODE",
                    reason: format!("expected polling or webhook, got {other:?}"),
                });
            }
        };

        let webhook_url = get("WEBHOOK_URL");
        if bot_mode == BotMode::Webhook && webhook_url.is_none() {
            return Err(ConfigError::Missing("WEBHOOK_URL"));
        }

        let owner_id = parse_number("OWNER_ID", &require("OWNER_ID")?)?;
        let log_channel = get("LOG_CHANNEL")
            .map(|raw| parse_number("LOG_CHANNEL", &raw))
            .transpose()?;
        let webhook_port = get("WEBHOOK_PORT")
            .map(|raw| parse_number("WEBHOOK_PORT", &raw))
            .transpose()?
            .unwrap_or(8443);
        let workers = get("WORKERS")
            .map(|raw| parse_number("WORKERS", &raw))
            .transpose()?
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            });

        Ok(Self {
            bot_token: require("BOT_TOKEN")?,
            bot_mode,
            webhook_url,
            webhook_port,
            webhook_secret: get("WEBHOOK_SECRET"),
            owner_id,
            log_channel,
            mongodb_uri: require("MONGODB_URI")?,
            mongodb_database: get("MONGODB_DATABASE").unwrap_or_else(|| "warden".to_string()),
            workers: workers.max(1),
            sw_api: get("SW_API"),
        })
    }

    /// Values that must never appear in chat output.
    pub fn secrets(&self) -> Vec<String> {
        let mut secrets = vec![self.bot_token.clone()];
        secrets.extend(self.sw_api.clone());
        secrets.extend(self.webhook_secret.clone());
        secrets
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
