//! Cache key definitions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Who a cached page was rendered for; signed-in chrome must not leak between users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewerKey {
    Anonymous,
    User(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Response {
        path: String,
        query_hash: u64,
        viewer: ViewerKey,
    },
}

impl CacheKey {
    pub fn response(path: &str, query: &str, viewer: ViewerKey) -> Self {
        Self::Response {
            path: path.to_string(),
            query_hash: hash_query(query),
            viewer,
        }
    }
}

/// Hash a raw query string.
pub fn hash_query(query: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    query.hash(&mut hasher);
    hasher.finish()
}
