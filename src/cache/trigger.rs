//! Flushes the page cache after post writes when configured to.

use std::sync::Arc;

use tracing::debug;

use super::store::PageCache;

#[derive(Clone)]
pub struct CacheTrigger {
    store: Arc<dyn PageCache>,
}

impl CacheTrigger {
    pub fn new(store: Arc<dyn PageCache>) -> Self {
        Self { store }
    }

    pub fn post_upserted(&self, post_id: i64) {
        debug!(post_id, event = "post_upserted", "flushing page cache");
        self.store.flush_all();
    }

    pub fn post_deleted(&self, post_id: i64) {
        debug!(post_id, event = "post_deleted", "flushing page cache");
        self.store.flush_all();
    }
}
