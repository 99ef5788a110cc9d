//! Cache registry - central management for named caches.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{CacheConfig, TypedCache};

/// Registry of named caches.
///
/// Subsystems ask for a cache by name; asking twice returns the same
/// underlying storage, so invalidation from one side is visible to the other.
#[derive(Clone, Default)]
pub struct CacheRegistry {
    caches: Arc<RwLock<HashMap<String, Box<dyn Any + Send + Sync>>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an existing cache or create it with `config`.
    ///
    /// A name already registered with different key/value types gets a fresh,
    /// unregistered cache and a warning instead of a panic.
    pub fn get_or_create<K, V>(&self, name: &str, config: CacheConfig) -> TypedCache<K, V>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        if let Some(entry) = self.caches.read().get(name) {
            if let Some(cache) = entry.downcast_ref::<TypedCache<K, V>>() {
                return cache.clone();
            }
            warn!(
                "Cache '{}' already registered with other types than {}",
                name,
                std::any::type_name::<TypedCache<K, V>>()
            );
            return TypedCache::new(name, config);
        }

        let mut caches = self.caches.write();
        // Another thread may have won the race between the two locks.
        if let Some(cache) = caches
            .get(name)
            .and_then(|entry| entry.downcast_ref::<TypedCache<K, V>>())
        {
            return cache.clone();
        }

        debug!("Creating cache: {}", name);
        let cache = TypedCache::new(name, config);
        caches.insert(name.to_string(), Box::new(cache.clone()));
        cache
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("cache_names", &self.caches.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_returns_shared_cache() {
        let registry = CacheRegistry::new();
        let a: TypedCache<i64, u32> = registry.get_or_create("counters", CacheConfig::default());
        let b: TypedCache<i64, u32> = registry.get_or_create("counters", CacheConfig::default());

        a.insert(7, 3);
        assert_eq!(b.get(&7), Some(3));
        assert_eq!(format!("{registry:?}"), r#"CacheRegistry { cache_names: ["counters"] }"#);
    }

    #[test]
    fn test_type_mismatch_does_not_panic() {
        let registry = CacheRegistry::new();
        let _: TypedCache<i64, u32> = registry.get_or_create("x", CacheConfig::default());
        let other: TypedCache<String, String> = registry.get_or_create("x", CacheConfig::default());

        other.insert("k".into(), "v".into());
        assert_eq!(other.get(&"k".to_string()).as_deref(), Some("v"));
    }
}
