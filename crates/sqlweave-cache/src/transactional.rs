//! Per-transaction staging over a shared region
//!
//! Writes are buffered and reach the region only on commit, so other
//! sessions never see uncommitted results and a rollback leaves the region
//! exactly as it was. A `clear` or `remove` is deferred the same way.
//!
//! Keys that missed in the region are remembered: under a single-flight
//! region the miss left this thread holding the key's lock, which commit or
//! rollback must hand back.

use sqlweave_types::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::cache::Cache;
use crate::error::Result;
use crate::key::CacheKey;

pub struct TransactionalCache {
    delegate: Arc<dyn Cache>,
    clear_on_commit: bool,
    entries_to_add: HashMap<CacheKey, Value>,
    entries_to_remove: HashSet<CacheKey>,
    entries_missed: HashSet<CacheKey>,
}

impl TransactionalCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            clear_on_commit: false,
            entries_to_add: HashMap::new(),
            entries_to_remove: HashSet::new(),
            entries_missed: HashSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.delegate.id()
    }

    pub fn get(&mut self, key: &CacheKey) -> Result<Option<Value>> {
        if self.clear_on_commit {
            return Ok(None);
        }
        if let Some(staged) = self.entries_to_add.get(key) {
            return Ok(Some(staged.clone()));
        }
        if self.entries_to_remove.contains(key) {
            return Ok(None);
        }
        let value = self.delegate.get(key)?;
        if value.is_none() {
            self.entries_missed.insert(key.clone());
        }
        Ok(value)
    }

    pub fn put(&mut self, key: CacheKey, value: Value) {
        self.entries_to_remove.remove(&key);
        self.entries_to_add.insert(key, value);
    }

    /// Stage an eviction; the entry stays in the region until commit
    pub fn remove(&mut self, key: &CacheKey) {
        self.entries_to_add.remove(key);
        self.entries_to_remove.insert(key.clone());
    }

    pub fn clear(&mut self) {
        self.clear_on_commit = true;
        self.entries_to_add.clear();
        self.entries_to_remove.clear();
    }

    /// Whether commit would change the region
    pub fn has_pending_work(&self) -> bool {
        self.clear_on_commit
            || !self.entries_to_add.is_empty()
            || !self.entries_to_remove.is_empty()
            || !self.entries_missed.is_empty()
    }

    pub fn commit(&mut self) {
        if self.clear_on_commit {
            debug!(cache = %self.id(), "clearing region on commit");
            self.delegate.clear();
        }
        for key in self.entries_to_remove.drain() {
            self.delegate.remove(&key);
        }
        let staged = std::mem::take(&mut self.entries_to_add);
        debug!(cache = %self.id(), entries = staged.len(), "flushing staged entries");
        for key in self.entries_missed.drain() {
            if !staged.contains_key(&key) {
                self.delegate.release(&key);
            }
        }
        for (key, value) in staged {
            self.delegate.put(key, value);
        }
        self.reset();
    }

    pub fn rollback(&mut self) {
        for key in self.entries_missed.drain() {
            self.delegate.release(&key);
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.clear_on_commit = false;
        self.entries_to_add.clear();
        self.entries_to_remove.clear();
        self.entries_missed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocking::BlockingCache;
    use crate::perpetual::PerpetualCache;

    fn region() -> Arc<dyn Cache> {
        Arc::new(PerpetualCache::new("region"))
    }

    fn key(s: &str) -> CacheKey {
        CacheKey::from_parts([s])
    }

    #[test]
    fn test_put_is_local_until_commit() {
        let shared = region();
        let mut tx = TransactionalCache::new(Arc::clone(&shared));

        tx.put(key("k"), Value::from(1));
        assert_eq!(tx.get(&key("k")).unwrap(), Some(Value::from(1)));
        assert_eq!(shared.get(&key("k")).unwrap(), None);

        tx.commit();
        assert_eq!(shared.get(&key("k")).unwrap(), Some(Value::from(1)));
        assert!(!tx.has_pending_work());
    }

    #[test]
    fn test_rollback_leaves_region_untouched() {
        let shared = region();
        shared.put(key("a"), Value::from("before"));

        let mut tx = TransactionalCache::new(Arc::clone(&shared));
        tx.put(key("b"), Value::from(2));
        tx.clear();
        tx.rollback();

        assert_eq!(shared.size(), 1);
        assert_eq!(shared.get(&key("a")).unwrap(), Some(Value::from("before")));
    }

    #[test]
    fn test_clear_hides_region_and_applies_on_commit() {
        let shared = region();
        shared.put(key("a"), Value::from(1));

        let mut tx = TransactionalCache::new(Arc::clone(&shared));
        tx.clear();
        assert_eq!(tx.get(&key("a")).unwrap(), None);
        // not cleared yet
        assert_eq!(shared.size(), 1);

        tx.put(key("b"), Value::from(2));
        tx.commit();
        assert_eq!(shared.get(&key("a")).unwrap(), None);
        assert_eq!(shared.get(&key("b")).unwrap(), Some(Value::from(2)));
    }

    #[test]
    fn test_remove_hides_region_entry_until_commit() {
        let shared = region();
        shared.put(key("a"), Value::from(1));
        shared.put(key("b"), Value::from(2));

        let mut tx = TransactionalCache::new(Arc::clone(&shared));
        tx.remove(&key("a"));
        assert_eq!(tx.get(&key("a")).unwrap(), None);
        assert!(tx.has_pending_work());
        assert_eq!(shared.size(), 2);

        // a later put wins over the staged removal
        tx.remove(&key("b"));
        tx.put(key("b"), Value::from(3));
        assert_eq!(tx.get(&key("b")).unwrap(), Some(Value::from(3)));

        tx.commit();
        assert_eq!(shared.get(&key("a")).unwrap(), None);
        assert_eq!(shared.get(&key("b")).unwrap(), Some(Value::from(3)));
    }

    #[test]
    fn test_rollback_discards_staged_removal() {
        let shared = region();
        shared.put(key("a"), Value::from(1));

        let mut tx = TransactionalCache::new(Arc::clone(&shared));
        tx.remove(&key("a"));
        tx.rollback();
        assert!(!tx.has_pending_work());
        assert_eq!(shared.get(&key("a")).unwrap(), Some(Value::from(1)));
    }

    #[test]
    fn test_commit_twice_is_noop() {
        let shared = region();
        let mut tx = TransactionalCache::new(Arc::clone(&shared));
        tx.put(key("k"), Value::from(1));
        tx.commit();
        shared.remove(&key("k"));
        tx.commit();
        assert_eq!(shared.size(), 0);
    }

    #[test]
    fn test_misses_release_single_flight_locks() {
        let blocking = Arc::new(BlockingCache::new(Box::new(PerpetualCache::new("b"))));
        let shared: Arc<dyn Cache> = blocking.clone();

        let mut tx = TransactionalCache::new(Arc::clone(&shared));
        assert_eq!(tx.get(&key("miss")).unwrap(), None);
        assert!(blocking.holds_lock(&key("miss")));
        tx.rollback();
        assert!(!blocking.holds_lock(&key("miss")));

        assert_eq!(tx.get(&key("miss")).unwrap(), None);
        assert_eq!(tx.get(&key("other")).unwrap(), None);
        tx.put(key("miss"), Value::from(1));
        tx.commit();
        assert!(!blocking.holds_lock(&key("miss")));
        assert!(!blocking.holds_lock(&key("other")));
        // an unstaged miss is released, not stored
        assert_eq!(shared.size(), 1);
    }
}
