//! Session-local query results
//!
//! Before a query reaches the data source its key holds an in-flight
//! placeholder. Success replaces the placeholder with the rows; failure
//! removes it.

use sqlweave_cache::CacheKey;
use sqlweave_types::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ExecutorError, Result};

#[derive(Debug, Clone)]
enum LocalEntry {
    InFlight,
    Resolved(Arc<Vec<Value>>),
}

#[derive(Debug, Default)]
pub struct SessionLocalCache {
    entries: HashMap<CacheKey, LocalEntry>,
}

impl SessionLocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` in flight
    pub fn begin(&mut self, key: &CacheKey) -> Result<()> {
        match self.entries.get(key) {
            Some(LocalEntry::InFlight) => Err(ExecutorError::QueryInFlight(key.to_string())),
            _ => {
                debug!(%key, "placeholder stored");
                self.entries.insert(key.clone(), LocalEntry::InFlight);
                Ok(())
            }
        }
    }

    pub fn complete(&mut self, key: CacheKey, rows: Vec<Value>) -> Arc<Vec<Value>> {
        let rows = Arc::new(rows);
        self.entries
            .insert(key, LocalEntry::Resolved(Arc::clone(&rows)));
        rows
    }

    /// Drop the placeholder after a failed query
    pub fn abort(&mut self, key: &CacheKey) {
        if matches!(self.entries.get(key), Some(LocalEntry::InFlight)) {
            debug!(%key, "placeholder removed");
            self.entries.remove(key);
        }
    }

    pub fn resolved(&self, key: &CacheKey) -> Option<Arc<Vec<Value>>> {
        match self.entries.get(key) {
            Some(LocalEntry::Resolved(rows)) => Some(Arc::clone(rows)),
            _ => None,
        }
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        matches!(self.entries.get(key), Some(LocalEntry::InFlight))
    }

    /// Present and not a placeholder
    pub fn is_resolved(&self, key: &CacheKey) -> bool {
        matches!(self.entries.get(key), Some(LocalEntry::Resolved(_)))
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Probe, or compute and store
    ///
    /// The placeholder is in place while `supplier` runs and is removed if
    /// it fails.
    pub fn query<F>(&mut self, key: &CacheKey, supplier: F) -> Result<Arc<Vec<Value>>>
    where
        F: FnOnce() -> Result<Vec<Value>>,
    {
        if let Some(rows) = self.resolved(key) {
            debug!(%key, "local cache hit");
            return Ok(rows);
        }
        self.begin(key)?;
        match supplier() {
            Ok(rows) => Ok(self.complete(key.clone(), rows)),
            Err(e) => {
                self.abort(key);
                Err(e)
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(s: &str) -> CacheKey {
        CacheKey::from_parts([s])
    }

    #[test]
    fn test_query_computes_once() {
        let mut cache = SessionLocalCache::new();
        let mut calls = 0;
        for _ in 0..2 {
            let rows = cache
                .query(&key("k"), || {
                    calls += 1;
                    Ok(vec![Value::from(1)])
                })
                .unwrap();
            assert_eq!(*rows, vec![Value::from(1)]);
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_failure_removes_placeholder() {
        let mut cache = SessionLocalCache::new();
        let err = cache
            .query(&key("k"), || Err(ExecutorError::Closed))
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Closed));
        assert!(!cache.contains(&key("k")));
    }

    #[test]
    fn test_placeholder_is_observable() {
        let mut cache = SessionLocalCache::new();
        cache.begin(&key("k")).unwrap();
        assert!(cache.is_in_flight(&key("k")));
        assert!(!cache.is_resolved(&key("k")));
        assert!(cache.resolved(&key("k")).is_none());
        assert!(matches!(
            cache.begin(&key("k")),
            Err(ExecutorError::QueryInFlight(_))
        ));

        cache.complete(key("k"), vec![]);
        assert!(cache.is_resolved(&key("k")));
        // abort never drops a resolved entry
        cache.abort(&key("k"));
        assert!(cache.is_resolved(&key("k")));
    }

    #[test]
    fn test_clear() {
        let mut cache = SessionLocalCache::new();
        cache.complete(key("a"), vec![Value::Null]);
        cache.begin(&key("b")).unwrap();
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
