//! Region configuration and decorator-chain assembly

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::blocking::BlockingCache;
use crate::cache::Cache;
use crate::error::{CacheError, Result};
use crate::logging::LoggingCache;
use crate::lru::{LruCache, DEFAULT_LRU_CAPACITY};
use crate::perpetual::PerpetualCache;
use crate::scheduled::ScheduledCache;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eviction {
    #[default]
    Lru,
    /// Unbounded
    None,
}

/// Settings for one cache region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub eviction: Eviction,
    /// LRU capacity
    pub size: usize,
    /// Flush the whole region this often
    pub flush_interval_ms: Option<u64>,
    /// Single-flight per key
    pub blocking: bool,
    /// Blocking wait bound; 0 waits forever
    pub lock_timeout_ms: u64,
    /// Hit-ratio logging and stats
    pub logging: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            eviction: Eviction::Lru,
            size: DEFAULT_LRU_CAPACITY,
            flush_interval_ms: None,
            blocking: false,
            lock_timeout_ms: 0,
            logging: true,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.eviction == Eviction::Lru && self.size == 0 {
            return Err(CacheError::InvalidConfig(
                "LRU size must be greater than zero".to_string(),
            ));
        }
        if self.flush_interval_ms == Some(0) {
            return Err(CacheError::InvalidConfig(
                "flush_interval_ms must be greater than zero".to_string(),
            ));
        }
        if !self.blocking && self.lock_timeout_ms > 0 {
            return Err(CacheError::InvalidConfig(
                "lock_timeout_ms requires blocking: true".to_string(),
            ));
        }
        Ok(())
    }

    /// Assemble the region: Perpetual, then LRU, Scheduled, Logging, and
    /// Blocking outermost so single-flight covers every layer
    pub fn build(&self, id: &str) -> Result<Arc<dyn Cache>> {
        self.validate()?;

        let mut cache: Box<dyn Cache> = Box::new(PerpetualCache::new(id));
        if self.eviction == Eviction::Lru {
            cache = Box::new(LruCache::with_capacity(cache, self.size));
        }
        if let Some(ms) = self.flush_interval_ms {
            cache = Box::new(ScheduledCache::with_interval(
                cache,
                Duration::from_millis(ms),
            ));
        }
        if self.logging {
            cache = Box::new(LoggingCache::new(cache));
        }
        if self.blocking {
            cache = Box::new(BlockingCache::with_timeout(
                cache,
                Duration::from_millis(self.lock_timeout_ms),
            ));
        }

        debug!(cache = %id, config = ?self, "built cache region");
        Ok(Arc::from(cache))
    }
}
