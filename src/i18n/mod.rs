//! Internationalization (i18n) module.
//!
//! String tables are embedded at compile time; the per-chat language choice
//! lives in the `LANGUAGE` collection and is cached.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use mongodb::bson::doc;
use tracing::{info, warn};

use crate::cache::{CacheConfig, CacheRegistry, TypedCache};
use crate::database::{ChatState, DocumentStore};

pub const LANGUAGE_COLLECTION: &str = "LANGUAGE";
pub const DEFAULT_LANGUAGE: &str = "en";

const EMBEDDED: [(&str, &str); 2] = [
    ("en", include_str!("en.json")),
    ("id", include_str!("id.json")),
];

/// Translation tables plus the chat-language lookup.
pub struct I18n {
    tables: BTreeMap<String, HashMap<String, String>>,
    state: ChatState,
    cache: TypedCache<i64, String>,
}

impl I18n {
    /// Parse the embedded tables. A table that fails to parse is fatal.
    pub fn load(store: Arc<dyn DocumentStore>, caches: &CacheRegistry) -> Result<Self> {
        let mut tables = BTreeMap::new();
        for (code, raw) in EMBEDDED {
            let table: HashMap<String, String> = serde_json::from_str(raw)
                .with_context(|| format!("language table '{code}' is not a flat string map"))?;
            tables.insert(code.to_string(), table);
        }
        info!("Loaded {} languages", tables.len());

        Ok(Self {
            tables,
            state: ChatState::new(store, LANGUAGE_COLLECTION),
            cache: caches.get_or_create("chat_language", CacheConfig::chat_language()),
        })
    }

    /// Language codes, sorted.
    pub fn languages(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn is_supported(&self, code: &str) -> bool {
        self.tables.contains_key(code)
    }

    /// Look up `key`, falling back to English and then to the key itself.
    pub fn get(&self, lang: &str, key: &str) -> String {
        self.tables
            .get(lang)
            .and_then(|t| t.get(key))
            .or_else(|| self.tables.get(DEFAULT_LANGUAGE).and_then(|t| t.get(key)))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Look up `key` and substitute `{}` placeholders in order.
    pub fn format(&self, lang: &str, key: &str, args: &[&str]) -> String {
        fill(&self.get(lang, key), args)
    }

    /// The chat's language. Store failures fall back to English.
    pub async fn chat_language(&self, chat_id: i64) -> String {
        if let Some(lang) = self.cache.get(&chat_id) {
            return lang;
        }
        let lang = match self.state.get(chat_id).await {
            Ok(Some(document)) => document
                .get_str("language")
                .ok()
                .filter(|code| self.is_supported(code))
                .unwrap_or(DEFAULT_LANGUAGE)
                .to_string(),
            Ok(None) => DEFAULT_LANGUAGE.to_string(),
            Err(e) => {
                warn!("Failed to read language for chat {}: {}", chat_id, e);
                return DEFAULT_LANGUAGE.to_string();
            }
        };
        self.cache.insert(chat_id, lang.clone());
        lang
    }

    pub async fn switch(&self, chat_id: i64, lang: &str) -> Result<()> {
        self.state.set(chat_id, doc! { "language": lang }).await?;
        self.cache.insert(chat_id, lang.to_string());
        Ok(())
    }

    /// Localized text for a chat.
    pub async fn text(&self, chat_id: i64, key: &str, args: &[&str]) -> String {
        let lang = self.chat_language(chat_id).await;
        self.format(&lang, key, args)
    }

    /// Chat-scoped storage for the language choice.
    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn forget(&self, chat_id: i64) {
        self.cache.invalidate(&chat_id);
    }
}

/// Replace each `{}` with the next argument. Extra placeholders stay as-is.
fn fill(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        match args.next() {
            Some(arg) => out.push_str(arg),
            None => out.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}
