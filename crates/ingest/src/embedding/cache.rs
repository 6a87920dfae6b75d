//! Embedding cache keyed by provider name + content hash.
//!
//! The trait seam exists so a distributed cache can replace the in-process
//! LRU without touching call sites. Concurrent lost updates are acceptable
//! (recomputing a duplicate embedding is not a correctness bug); a reader
//! can never observe a partially written entry.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use lru::LruCache;
use sha2::{Digest, Sha256};

/// Capability contract: `get`/`set`/`clear` keyed by [`cache_key`].
pub trait EmbeddingCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<f32>>;
    fn set(&self, key: &str, embedding: Vec<f32>);
    fn clear(&self);
}

/// Cache key: provider name + sha256 of the content.
pub fn cache_key(provider: &str, content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{provider}:{digest:x}")
}

/// In-process LRU implementation.
pub struct InMemoryEmbeddingCache {
    inner: Mutex<LruCache<String, Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryEmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

impl EmbeddingCache for InMemoryEmbeddingCache {
    fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut cache = self.inner.lock().unwrap();
        match cache.get(key) {
            Some(vec) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(vec.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn set(&self, key: &str, embedding: Vec<f32>) {
        self.inner.lock().unwrap().put(key.to_string(), embedding);
    }

    fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}
