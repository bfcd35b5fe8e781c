//! Single-flight cache
//!
//! A `get` takes an exclusive per-key lock before asking the delegate. A hit
//! releases the lock straight away. A miss keeps it: the calling thread is
//! expected to compute the value and `put` it (or `release` the key), and
//! every other thread asking for the same key waits until then. Callers on
//! different keys never wait for each other.
//!
//! Lock entries are created on first use of a key and never removed, so the
//! lock map grows with the number of distinct keys ever requested.

use sqlweave_types::Value;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::cache::{Cache, CacheStats};
use crate::error::{CacheError, Result};
use crate::key::CacheKey;

#[derive(Default)]
struct KeyLock {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

pub struct BlockingCache {
    delegate: Box<dyn Cache>,
    /// Zero waits forever
    timeout: Duration,
    locks: Mutex<HashMap<CacheKey, Arc<KeyLock>>>,
}

impl BlockingCache {
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self::with_timeout(delegate, Duration::ZERO)
    }

    pub fn with_timeout(delegate: Box<dyn Cache>, timeout: Duration) -> Self {
        Self {
            delegate,
            timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn interrupted(&self, key: &CacheKey) -> CacheError {
        CacheError::LockInterrupted {
            cache: self.id().to_string(),
            key: key.to_string(),
        }
    }

    fn lock_for(&self, key: &CacheKey) -> Result<Arc<KeyLock>> {
        let mut locks = self.locks.lock().map_err(|_| self.interrupted(key))?;
        Ok(Arc::clone(locks.entry(key.clone()).or_default()))
    }

    fn acquire(&self, key: &CacheKey) -> Result<()> {
        let lock = self.lock_for(key)?;
        let me = thread::current().id();
        let deadline = (!self.timeout.is_zero()).then(|| Instant::now() + self.timeout);

        let mut owner = lock.owner.lock().map_err(|_| self.interrupted(key))?;
        loop {
            match *owner {
                None => {
                    *owner = Some(me);
                    trace!(cache = %self.id(), key = %key, "acquired key lock");
                    return Ok(());
                }
                // already ours: a second miss on the same key by the same caller
                Some(holder) if holder == me => return Ok(()),
                Some(_) => {}
            }

            debug!(cache = %self.id(), key = %key, "waiting for key lock");
            owner = match deadline {
                None => lock
                    .released
                    .wait(owner)
                    .map_err(|_| self.interrupted(key))?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(cache = %self.id(), key = %key, timeout = ?self.timeout, "timed out waiting for key lock");
                        return Err(CacheError::LockTimeout {
                            cache: self.id().to_string(),
                            key: key.to_string(),
                            timeout: self.timeout,
                        });
                    }
                    let (guard, _) = lock
                        .released
                        .wait_timeout(owner, deadline - now)
                        .map_err(|_| self.interrupted(key))?;
                    guard
                }
            };
        }
    }

    fn release_lock(&self, key: &CacheKey) {
        let lock = {
            let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            match locks.get(key) {
                Some(lock) => Arc::clone(lock),
                None => return,
            }
        };
        let mut owner = lock.owner.lock().unwrap_or_else(PoisonError::into_inner);
        if *owner == Some(thread::current().id()) {
            *owner = None;
            trace!(cache = %self.id(), key = %key, "released key lock");
            lock.released.notify_all();
        }
    }

    /// Whether the calling thread holds the lock for `key`
    pub fn holds_lock(&self, key: &CacheKey) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.get(key).map_or(false, |lock| {
            let owner = lock.owner.lock().unwrap_or_else(PoisonError::into_inner);
            *owner == Some(thread::current().id())
        })
    }
}

impl Cache for BlockingCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    /// Store and release the caller's lock on `key`
    fn put(&self, key: CacheKey, value: Value) {
        self.delegate.put(key.clone(), value);
        self.release_lock(&key);
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        self.acquire(key)?;
        match self.delegate.get(key) {
            Ok(Some(value)) => {
                self.release_lock(key);
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.release_lock(key);
                Err(e)
            }
        }
    }

    /// Evict the entry and release the caller's lock on `key`
    fn remove(&self, key: &CacheKey) -> Option<Value> {
        let removed = self.delegate.remove(key);
        self.release_lock(key);
        removed
    }

    fn release(&self, key: &CacheKey) {
        self.delegate.release(key);
        self.release_lock(key);
    }

    fn clear(&self) {
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn stats(&self) -> Option<CacheStats> {
        self.delegate.stats()
    }
}
