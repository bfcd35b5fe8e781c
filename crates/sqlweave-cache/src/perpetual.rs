use sqlweave_types::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::cache::Cache;
use crate::error::Result;
use crate::key::CacheKey;

/// Unbounded map; the base of every decorator chain
pub struct PerpetualCache {
    id: String,
    entries: Mutex<HashMap<CacheKey, Value>>,
}

impl PerpetualCache {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    // each operation is one map call, so a poisoned map is still consistent
    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Cache for PerpetualCache {
    fn id(&self) -> &str {
        &self.id
    }

    fn put(&self, key: CacheKey, value: Value) {
        self.entries().insert(key, value);
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        Ok(self.entries().get(key).cloned())
    }

    fn remove(&self, key: &CacheKey) -> Option<Value> {
        self.entries().remove(key)
    }

    fn clear(&self) {
        self.entries().clear();
    }

    fn size(&self) -> usize {
        self.entries().len()
    }
}
