//! Query embedding cache
//!
//! Embedding a query is a network round trip to the provider; repeated
//! questions reuse the vector. Backed by moka with capacity and TTL bounds.

use moka::future::Cache;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mmlab_core::EmbeddingConfig;

/// Cache of query embeddings keyed by query text
#[derive(Clone)]
pub struct EmbeddingCache {
    cache: Cache<u64, Arc<Vec<f64>>>,
    stats: Arc<CacheStats>,
}

impl EmbeddingCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        )
    }

    /// Cached embedding for `text`, if present
    pub async fn get(&self, text: &str) -> Option<Arc<Vec<f64>>> {
        let result = self.cache.get(&hash_text(text)).await;

        if result.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub async fn put(&self, text: &str, embedding: Arc<Vec<f64>>) {
        self.cache.insert(hash_text(text), embedding).await;
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop every entry
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn report(&self) -> CacheReport {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheReport {
            hits,
            misses,
            writes: self.stats.writes.load(Ordering::Relaxed),
            entries: self.entry_count(),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub entries: u64,
    pub hit_rate: f64,
}

/// Query text is normalised for whitespace before hashing
fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    for word in text.split_whitespace() {
        word.hash(&mut hasher);
    }
    hasher.finish()
}
