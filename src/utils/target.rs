//! Target resolution for user-directed commands.
//!
//! Resolution order:
//! 1. Reply message → the replied-to sender
//! 2. Numeric first argument → that user id
//! 3. `@username` first argument → lookup in the `USERS` collection

use mongodb::bson::doc;
use tracing::warn;

use crate::bot::{AppState, MessageUpdate};
use crate::plugins::USERS_COLLECTION;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub user_id: u64,
    pub name: String,
    /// Whatever text follows the target.
    pub reason: Option<String>,
}

pub async fn resolve_target(state: &AppState, message: &MessageUpdate, args: &[String]) -> Option<Target> {
    if let Some(sender) = message.reply_to.as_ref().and_then(|r| r.sender.as_ref()) {
        return Some(Target {
            user_id: sender.id,
            name: sender.first_name.clone(),
            reason: join_reason(args),
        });
    }

    let (first, rest) = args.split_first()?;
    if let Ok(user_id) = first.parse::<u64>() {
        return Some(Target {
            user_id,
            name: format!("User {}", user_id),
            reason: join_reason(rest),
        });
    }

    let username = first.strip_prefix('@')?;
    let found = state
        .store
        .find_one(USERS_COLLECTION, doc! { "username": username.to_lowercase() })
        .await;
    match found {
        Ok(Some(user)) => {
            let user_id = match user.get("_id") {
                Some(mongodb::bson::Bson::Int64(id)) => u64::try_from(*id).ok()?,
                Some(mongodb::bson::Bson::Int32(id)) => u64::try_from(*id).ok()?,
                _ => return None,
            };
            Some(Target {
                user_id,
                name: user.get_str("name").unwrap_or(username).to_string(),
                reason: join_reason(rest),
            })
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Failed to look up @{}: {:#}", username, e);
            None
        }
    }
}

fn join_reason(words: &[String]) -> Option<String> {
    let reason = words.join(" ");
    (!reason.trim().is_empty()).then_some(reason)
}
