//! Error taxonomy.
//!
//! Application code returns `anyhow::Result`; these typed errors are what
//! the dispatcher and startup path inspect with `downcast_ref` to decide
//! between aborting, warning, or replying to the chat.

use std::time::Duration;

use thiserror::Error;

/// Fatal, startup-time misconfiguration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("plugin '{0}' is already loaded")]
    DuplicatePlugin(String),

    #[error("unknown staff rank '{0}'")]
    UnknownRank(String),

    #[error("handler '{0}' declares both admin_only and staff_only")]
    ConflictingGate(String),

    #[error("invalid pattern for handler '{handler}': {source}")]
    Pattern {
        handler: String,
        #[source]
        source: regex::Error,
    },
}

/// Failure reported by the chat protocol.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("user is not a participant of the chat")]
    NotParticipant,

    #[error("chat admin rights required")]
    AdminRequired,

    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),

    #[error("chat not found")]
    ChatNotFound,

    #[error("{0}")]
    Other(String),
}

impl ProtocolError {
    /// Failures a handler or predicate should degrade on instead of failing.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// A backup payload that does not follow the name -> document contract.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("plugin '{0}' exported a value that is not a document")]
    NotADocument(String),

    #[error("backup belongs to chat {found}, not {expected}")]
    ChatMismatch { expected: i64, found: i64 },

    #[error("backup has no chat_id")]
    MissingChatId,

    #[error("backup is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("handler '{handler}' is owned by '{owner}', which is not loaded")]
    Unroutable { owner: String, handler: String },
}
