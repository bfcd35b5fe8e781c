use sqlweave_types::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::cache::Cache;
use crate::error::Result;
use crate::key::CacheKey;
use crate::transactional::TransactionalCache;

/// One [`TransactionalCache`] per region touched in a unit of work, keyed by
/// region id and created on first access
#[derive(Default)]
pub struct TransactionalCacheManager {
    caches: HashMap<String, TransactionalCache>,
}

impl TransactionalCacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn staging(&mut self, cache: &Arc<dyn Cache>) -> &mut TransactionalCache {
        self.caches
            .entry(cache.id().to_string())
            .or_insert_with(|| TransactionalCache::new(Arc::clone(cache)))
    }

    pub fn get_object(&mut self, cache: &Arc<dyn Cache>, key: &CacheKey) -> Result<Option<Value>> {
        self.staging(cache).get(key)
    }

    pub fn put_object(&mut self, cache: &Arc<dyn Cache>, key: CacheKey, value: Value) {
        self.staging(cache).put(key, value);
    }

    pub fn remove_object(&mut self, cache: &Arc<dyn Cache>, key: &CacheKey) {
        self.staging(cache).remove(key);
    }

    pub fn clear(&mut self, cache: &Arc<dyn Cache>) {
        self.staging(cache).clear();
    }

    /// Regions touched since the last commit or rollback
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    pub fn commit(&mut self) {
        debug!(regions = self.caches.len(), "committing transactional caches");
        for (_, mut cache) in self.caches.drain() {
            cache.commit();
        }
    }

    pub fn rollback(&mut self) {
        debug!(regions = self.caches.len(), "rolling back transactional caches");
        for (_, mut cache) in self.caches.drain() {
            cache.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perpetual::PerpetualCache;

    fn region(id: &str) -> Arc<dyn Cache> {
        Arc::new(PerpetualCache::new(id))
    }

    #[test]
    fn test_commit_fans_out() {
        let users = region("users");
        let orders = region("orders");
        let mut tcm = TransactionalCacheManager::new();
        let k = CacheKey::from_parts(["k"]);

        tcm.put_object(&users, k.clone(), Value::from(1));
        tcm.put_object(&orders, k.clone(), Value::from(2));
        assert_eq!(tcm.len(), 2);
        assert_eq!(users.size(), 0);

        tcm.commit();
        assert!(tcm.is_empty());
        assert_eq!(users.get(&k).unwrap(), Some(Value::from(1)));
        assert_eq!(orders.get(&k).unwrap(), Some(Value::from(2)));
    }

    #[test]
    fn test_rollback_fans_out() {
        let users = region("users");
        let orders = region("orders");
        orders.put(CacheKey::from_parts(["old"]), Value::Null);
        let mut tcm = TransactionalCacheManager::new();

        tcm.put_object(&users, CacheKey::from_parts(["k"]), Value::from(1));
        tcm.clear(&orders);
        tcm.rollback();

        assert_eq!(users.size(), 0);
        assert_eq!(orders.size(), 1);
    }

    #[test]
    fn test_staged_removal_applies_on_commit() {
        let users = region("users");
        let k = CacheKey::from_parts(["k"]);
        users.put(k.clone(), Value::from(1));

        let mut tcm = TransactionalCacheManager::new();
        tcm.remove_object(&users, &k);
        assert_eq!(tcm.get_object(&users, &k).unwrap(), None);
        assert_eq!(users.size(), 1);
        tcm.commit();
        assert_eq!(users.size(), 0);
    }

    #[test]
    fn test_reads_see_own_staged_writes() {
        let users = region("users");
        let mut tcm = TransactionalCacheManager::new();
        let k = CacheKey::from_parts(["k"]);
        assert_eq!(tcm.get_object(&users, &k).unwrap(), None);
        tcm.put_object(&users, k.clone(), Value::from("v"));
        assert_eq!(tcm.get_object(&users, &k).unwrap(), Some(Value::from("v")));
    }
}
