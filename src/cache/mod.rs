//! Cache module - named Moka caches shared across the runtime.
//!
//! - `CacheRegistry` - central registry holding all named caches
//! - `TypedCache` - cheap-to-clone handle to one cache
//! - `CacheConfig` - capacity and expiry settings
//!
//! ```rust,ignore
//! let admins: TypedCache<i64, Vec<ChatMemberRecord>> =
//!     registry.get_or_create("admin_lists", CacheConfig::with_capacity(5_000));
//! admins.insert(chat_id, records);
//! ```

mod config;
mod registry;
mod typed;

pub use config::CacheConfig;
pub use registry::CacheRegistry;
pub use typed::TypedCache;
