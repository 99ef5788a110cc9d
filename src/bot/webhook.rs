//! Webhook mode.
//!
//! Uses teloxide's axum webhook support, which registers the webhook with
//! Telegram, serves incoming updates and deletes the webhook on shutdown.

use std::convert::Infallible;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use teloxide::update_listeners::webhooks::{self, Options};
use teloxide::update_listeners::UpdateListener;
use tracing::info;
use url::Url;

use super::telegram::ThrottledBot;
use crate::config::Config;
use crate::error::ConfigError;

/// Listener options from configuration. Listens on all interfaces.
pub fn options(config: &Config) -> Result<Options, ConfigError> {
    let raw = config
        .webhook_url
        .as_deref()
        .ok_or(ConfigError::Missing("WEBHOOK_URL"))?;
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        key: "WEBHOOK_URL",
        reason: e.to_string(),
    })?;

    let address = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    let mut options = Options::new(address, url);
    if let Some(secret) = &config.webhook_secret {
        options = options.secret_token(secret.clone());
    }
    Ok(options)
}

/// Register the webhook and start serving it.
pub async fn listener(config: &Config, bot: &ThrottledBot) -> Result<impl UpdateListener<Err = Infallible> + use<>> {
    let options = options(config)?;
    info!("Setting webhook URL: {}", options.url);
    info!("Listening on: {}", options.address);

    // Webhook setup only needs plain API access, not the throttled queue.
    let listener = webhooks::axum(bot.inner().clone(), options)
        .await
        .context("failed to set up webhook")?;
    Ok(listener)
}
