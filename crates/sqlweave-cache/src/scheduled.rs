use sqlweave_types::Value;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::cache::{Cache, CacheStats};
use crate::error::Result;
use crate::key::CacheKey;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Clears the delegate once `interval` has passed since the last clear.
/// The check runs lazily on every operation; there is no timer thread.
pub struct ScheduledCache {
    delegate: Box<dyn Cache>,
    interval: Duration,
    last_clear: Mutex<Instant>,
}

impl ScheduledCache {
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self::with_interval(delegate, DEFAULT_FLUSH_INTERVAL)
    }

    pub fn with_interval(delegate: Box<dyn Cache>, interval: Duration) -> Self {
        Self {
            delegate,
            interval,
            last_clear: Mutex::new(Instant::now()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true when this call flushed the delegate
    fn clear_when_stale(&self) -> bool {
        let mut last = self.last_clear.lock().unwrap_or_else(PoisonError::into_inner);
        if last.elapsed() < self.interval {
            return false;
        }
        debug!(cache = %self.delegate.id(), interval = ?self.interval, "flush interval elapsed, clearing");
        self.delegate.clear();
        *last = Instant::now();
        true
    }
}

impl Cache for ScheduledCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: Value) {
        self.clear_when_stale();
        self.delegate.put(key, value);
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        if self.clear_when_stale() {
            return Ok(None);
        }
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Option<Value> {
        self.clear_when_stale();
        self.delegate.remove(key)
    }

    fn release(&self, key: &CacheKey) {
        self.delegate.release(key);
    }

    fn clear(&self) {
        let mut last = self.last_clear.lock().unwrap_or_else(PoisonError::into_inner);
        *last = Instant::now();
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.clear_when_stale();
        self.delegate.size()
    }

    fn stats(&self) -> Option<CacheStats> {
        self.delegate.stats()
    }
}
