//! sqlweave-cache: cross-session result caching
//!
//! A region is a [`Cache`] built from a [`CacheConfig`]: a [`PerpetualCache`]
//! wrapped by decorators ([`LruCache`], [`ScheduledCache`], [`LoggingCache`],
//! [`BlockingCache`]). Sessions never write a region directly; they go
//! through a [`TransactionalCacheManager`], which stages writes per region in
//! a [`TransactionalCache`] until the unit of work commits.

mod blocking;
mod cache;
mod config;
mod error;
mod key;
mod logging;
mod lru;
mod manager;
mod perpetual;
mod scheduled;
mod transactional;

pub use blocking::BlockingCache;
pub use cache::{Cache, CacheStats};
pub use config::{CacheConfig, Eviction};
pub use error::{CacheError, Result};
pub use key::CacheKey;
pub use logging::LoggingCache;
pub use lru::{LruCache, DEFAULT_LRU_CAPACITY};
pub use manager::TransactionalCacheManager;
pub use perpetual::PerpetualCache;
pub use scheduled::{ScheduledCache, DEFAULT_FLUSH_INTERVAL};
pub use transactional::TransactionalCache;
