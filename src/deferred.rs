//! Deferred loads
//!
//! A nested result that depends on a query still in flight is recorded here
//! and applied once the outermost query of the call stack completes.

use sqlweave_cache::CacheKey;
use sqlweave_types::{ObjectAccessor, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::error::{ExecutorError, Result};

/// A result object that deferred loads write into after it was handed out
pub type SharedObject = Arc<Mutex<Value>>;

pub fn shared(value: impl Into<Value>) -> SharedObject {
    Arc::new(Mutex::new(value.into()))
}

/// Shape of the value assigned to the target property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// 0 rows is null, 1 row is the row, more is an error
    Single,
    List,
}

impl LoadKind {
    pub fn extract(self, key: &CacheKey, rows: &[Value]) -> Result<Value> {
        match self {
            LoadKind::List => Ok(Value::List(rows.to_vec())),
            LoadKind::Single => match rows {
                [] => Ok(Value::Null),
                [row] => Ok(row.clone()),
                _ => Err(ExecutorError::TooManyResults {
                    statement: key.to_string(),
                    count: rows.len(),
                }),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeferredLoad {
    pub target: SharedObject,
    pub property: String,
    pub key: CacheKey,
    pub kind: LoadKind,
}

impl DeferredLoad {
    pub fn new(
        target: SharedObject,
        property: impl Into<String>,
        key: CacheKey,
        kind: LoadKind,
    ) -> Self {
        Self {
            target,
            property: property.into(),
            key,
            kind,
        }
    }

    /// Assign the extracted rows to the target property
    pub fn apply(&self, rows: &[Value], accessor: &dyn ObjectAccessor) -> Result<()> {
        let value = self.kind.extract(&self.key, rows)?;
        let mut target = self.target.lock().unwrap_or_else(PoisonError::into_inner);
        accessor.set_field(&mut target, &self.property, value)?;
        debug!(property = %self.property, key = %self.key, "deferred load applied");
        Ok(())
    }
}
