//! The cache contract shared by every region implementation and decorator

use serde::Serialize;
use sqlweave_types::Value;

use crate::error::Result;
use crate::key::CacheKey;

/// A named key/value store
///
/// Implementations synchronise internally, so a region can be shared across
/// sessions behind an `Arc<dyn Cache>`. Decorators wrap another cache and
/// forward what they do not change.
pub trait Cache: Send + Sync {
    fn id(&self) -> &str;

    fn put(&self, key: CacheKey, value: Value);

    /// Fails only for decorators that wait (see `BlockingCache`)
    fn get(&self, key: &CacheKey) -> Result<Option<Value>>;

    /// Evict one entry, returning it
    fn remove(&self, key: &CacheKey) -> Option<Value>;

    /// Give up any claim the calling thread holds on `key` without storing a
    /// value. Only meaningful for single-flight caches; a no-op elsewhere.
    fn release(&self, _key: &CacheKey) {}

    fn clear(&self);

    fn size(&self) -> usize;

    /// Request/hit counters, when some layer records them
    fn stats(&self) -> Option<CacheStats> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub requests: u64,
    pub hits: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }
}
