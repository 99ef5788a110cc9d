//! Per-user command rate limiting.

use std::time::Duration;

use crate::cache::{CacheConfig, CacheRegistry, TypedCache};

pub const WINDOW: Duration = Duration::from_secs(10);
pub const MAX_COMMANDS: u32 = 3;

/// Counts invoked commands per user. Every hit rewrites the entry, so the
/// window restarts while a user keeps going.
#[derive(Clone)]
pub struct RateLimiter {
    hits: TypedCache<u64, u32>,
    max: u32,
}

impl RateLimiter {
    pub fn new(caches: &CacheRegistry) -> Self {
        Self {
            hits: caches.get_or_create("command_rate", CacheConfig::rate_window(WINDOW)),
            max: MAX_COMMANDS,
        }
    }

    pub fn is_limited(&self, user_id: u64) -> bool {
        self.hits.get(&user_id).is_some_and(|count| count >= self.max)
    }

    pub fn record(&self, user_id: u64) {
        self.hits
            .update(user_id, |count| count.unwrap_or(0).saturating_add(1));
    }
}
