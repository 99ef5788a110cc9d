//! Cache configuration.

use std::time::Duration;

/// Configuration for a cache instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_capacity: u64,

    /// Entries are evicted this long after their last write.
    pub ttl: Option<Duration>,

    /// Entries are evicted if not read or written within this duration.
    pub tti: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(300)),
            tti: None,
        }
    }
}

impl CacheConfig {
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            max_capacity,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.ttl = Some(duration);
        self
    }

    #[must_use]
    pub fn tti(mut self, duration: Duration) -> Self {
        self.tti = Some(duration);
        self
    }

    /// Admin lists change rarely but must not go stale for long.
    pub fn admin_lists() -> Self {
        Self::with_capacity(5_000).ttl(Duration::from_secs(30))
    }

    /// Chat language: read on almost every reply, written by `/lang` only.
    pub fn chat_language() -> Self {
        Self::with_capacity(20_000)
            .ttl(Duration::from_secs(600))
            .tti(Duration::from_secs(300))
    }

    /// Sliding window for per-user command counters.
    pub fn rate_window(window: Duration) -> Self {
        Self::with_capacity(50_000).ttl(window)
    }
}
