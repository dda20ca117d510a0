//! Cache storage.

use std::sync::RwLock;
use std::time::Duration;

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;
use tracing::debug;

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::{read_guard, write_guard};

/// Rendered response captured for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Cache of rendered pages.
///
/// Implementations must treat an entry as absent once its TTL has elapsed.
pub trait PageCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CachedResponse>;

    fn set(&self, key: CacheKey, value: CachedResponse, ttl: Duration);

    /// Drop every entry regardless of remaining lifetime.
    fn flush_all(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry {
    value: CachedResponse,
    expires_at: Instant,
}

/// In-process LRU page cache.
pub struct MemoryPageCache {
    entries: RwLock<LruCache<CacheKey, Entry>>,
}

impl MemoryPageCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.max_entries)),
        }
    }
}

impl PageCache for MemoryPageCache {
    fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        let mut entries = write_guard(&self.entries, "get");

        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                counter!("inkwell_page_cache_hit_total").increment(1);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
            counter!("inkwell_page_cache_expired_total").increment(1);
        }
        counter!("inkwell_page_cache_miss_total").increment(1);
        None
    }

    fn set(&self, key: CacheKey, value: CachedResponse, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };

        let evicted = write_guard(&self.entries, "set").push(key.clone(), entry);
        counter!("inkwell_page_cache_store_total").increment(1);

        // `push` also hands back the previous value when the key was already present.
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!("inkwell_page_cache_evict_total").increment(1);
            debug!(
                target = "inkwell::cache::store",
                key = ?evicted_key,
                "evicted least recently used page"
            );
        }
    }

    fn flush_all(&self) {
        let mut entries = write_guard(&self.entries, "flush_all");
        let dropped = entries.len();
        entries.clear();
        counter!("inkwell_page_cache_flush_total").increment(1);
        debug!(target = "inkwell::cache::store", dropped, "page cache flushed");
    }

    fn len(&self) -> usize {
        read_guard(&self.entries, "len").len()
    }
}
