//! Key-value cache for derived package data.

use async_trait::async_trait;
use axum::body::Bytes;
use dashmap::DashMap;
use std::sync::Arc;

use crate::observability::metrics;

/// Opaque byte cache shared across requests.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    async fn get(&self, key: &str) -> Option<Bytes>;

    async fn put(&self, key: &str, value: Bytes);

    async fn remove(&self, key: &str);
}

/// A concurrent in-memory cache with a soft entry limit.
///
/// When full, inserting a new key clears the cache first; entries are cheap
/// to rebuild from the store.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    inner: Arc<DashMap<String, Bytes>>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[async_trait]
impl CacheProvider for MemoryCache {
    async fn get(&self, key: &str) -> Option<Bytes> {
        let hit = self.inner.get(key).map(|r| r.value().clone());
        metrics::record_cache_lookup(hit.is_some());
        hit
    }

    async fn put(&self, key: &str, value: Bytes) {
        if self.inner.len() >= self.max_entries && !self.inner.contains_key(key) {
            tracing::debug!(entries = self.inner.len(), "Cache full, clearing");
            self.inner.clear();
        }
        self.inner.insert(key.to_string(), value);
    }

    async fn remove(&self, key: &str) {
        self.inner.remove(key);
    }
}
