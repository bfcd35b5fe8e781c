use sqlweave_types::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::cache::{Cache, CacheStats};
use crate::error::Result;
use crate::key::CacheKey;

/// Counts lookups and hits, logging the running hit ratio at debug level
pub struct LoggingCache {
    delegate: Box<dyn Cache>,
    requests: AtomicU64,
    hits: AtomicU64,
}

impl LoggingCache {
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self {
            delegate,
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }
}

impl Cache for LoggingCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: Value) {
        self.delegate.put(key, value);
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let value = self.delegate.get(key)?;
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            cache = %self.id(),
            hit_ratio = self.snapshot().hit_ratio(),
            "cache hit ratio"
        );
        Ok(value)
    }

    fn remove(&self, key: &CacheKey) -> Option<Value> {
        self.delegate.remove(key)
    }

    fn release(&self, key: &CacheKey) {
        self.delegate.release(key);
    }

    fn clear(&self) {
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn stats(&self) -> Option<CacheStats> {
        Some(self.snapshot())
    }
}
