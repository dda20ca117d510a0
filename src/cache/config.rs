//! Cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_INDEX_TTL_SECS: u64 = 20;
const DEFAULT_MAX_ENTRIES: usize = 256;
const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Serve and store cached index pages.
    pub enabled: bool,
    /// Lifetime of a stored index page.
    pub index_ttl: Duration,
    /// Upper bound on stored pages; least recently used entries are evicted first.
    pub max_entries: NonZeroUsize,
    /// Flush on every post create/edit/delete instead of waiting for the TTL.
    pub flush_on_write: bool,
    /// Responses with larger bodies are passed through uncached.
    pub body_limit_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            index_ttl: Duration::from_secs(DEFAULT_INDEX_TTL_SECS),
            max_entries: NonZeroUsize::new(DEFAULT_MAX_ENTRIES).unwrap_or(NonZeroUsize::MIN),
            flush_on_write: false,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            index_ttl: settings.index_ttl,
            max_entries: settings.max_entries,
            flush_on_write: settings.flush_on_write,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert!(!config.flush_on_write);
        assert_eq!(config.index_ttl, Duration::from_secs(20));
        assert_eq!(config.max_entries.get(), 256);
        assert_eq!(config.body_limit_bytes, 1024 * 1024);
    }
}
