//! Public id existence cache used to suppress cross-posted duplicates.
//!
//! Records are hints with a bounded lifetime, never the source of truth for
//! whether an entry exists.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

#[async_trait]
pub trait DuplicateCache: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Records `public_id`, and `public_id_alt` when given, as seen.
    async fn register(
        &self,
        public_id: &str,
        content: &str,
        public_id_alt: Option<&str>,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
struct CacheRecord {
    fingerprint: String,
    registered_at: Instant,
}

/// In-process LRU with TTL expiry.
pub struct MemoryDuplicateCache {
    cache: RwLock<LruCache<String, CacheRecord>>,
    ttl: Duration,
}

impl MemoryDuplicateCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// SHA-256 of the content last registered under `key`, if still live.
    pub fn fingerprint(&self, key: &str) -> Option<String> {
        let cache = self.cache.read().ok()?;
        cache
            .peek(key)
            .filter(|record| record.registered_at.elapsed() <= self.ttl)
            .map(|record| record.fingerprint.clone())
    }

    pub fn len(&self) -> usize {
        self.cache.read().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, key: &str, fingerprint: &str) -> Result<()> {
        let mut cache = self
            .cache
            .write()
            .map_err(|_| AppError::Cache("cache lock poisoned".to_string()))?;
        cache.put(
            key.to_string(),
            CacheRecord {
                fingerprint: fingerprint.to_string(),
                registered_at: Instant::now(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl DuplicateCache for MemoryDuplicateCache {
    async fn exists(&self, key: &str) -> Result<bool> {
        let live = {
            let cache = self
                .cache
                .read()
                .map_err(|_| AppError::Cache("cache lock poisoned".to_string()))?;
            cache
                .peek(key)
                .map(|record| record.registered_at.elapsed() <= self.ttl)
        };

        match live {
            Some(true) => Ok(true),
            Some(false) => {
                // Expired; drop it so the slot can be reused.
                if let Ok(mut cache) = self.cache.write() {
                    cache.pop(key);
                }
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn register(
        &self,
        public_id: &str,
        content: &str,
        public_id_alt: Option<&str>,
    ) -> Result<()> {
        let fingerprint = content_fingerprint(content);
        self.insert(public_id, &fingerprint)?;
        if let Some(alt) = public_id_alt {
            self.insert(alt, &fingerprint)?;
        }
        tracing::trace!(public_id, ?public_id_alt, "Registered public id");
        Ok(())
    }
}

fn content_fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
