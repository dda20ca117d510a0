//! Inkwell page cache
//!
//! Rendered index listings are kept in memory for a bounded time-to-live.
//! Reads inside the window return the stored bytes even when posts changed;
//! [`PageCache::flush_all`] drops every entry at once.
//!
//! ```toml
//! [cache]
//! enabled = true
//! index_ttl_seconds = 20
//! max_entries = 256
//! flush_on_write = false
//! ```

mod config;
mod keys;
mod lock;
mod middleware;
mod store;
mod trigger;

pub use config::CacheConfig;
pub use keys::{CacheKey, ViewerKey, hash_query};
pub use middleware::{CacheState, index_cache_layer};
pub use store::{CachedResponse, MemoryPageCache, PageCache};
pub use trigger::CacheTrigger;
