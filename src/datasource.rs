//! The data-source seam
//!
//! Connection handling, dialects and network I/O live behind
//! [`DataSourceExecutor`]; the runtime hands it rendered SQL plus ordered
//! bindings and gets rows or counts back.

use serde::{Deserialize, Serialize};
use sqlweave_compose::ParameterBinding;
use sqlweave_types::Value;

/// Pagination window applied by the data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowBounds {
    pub offset: usize,
    pub limit: usize,
}

impl RowBounds {
    pub const NO_OFFSET: usize = 0;
    pub const NO_LIMIT: usize = usize::MAX;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Whether these bounds select everything
    pub fn is_unbounded(&self) -> bool {
        self.offset == Self::NO_OFFSET && self.limit == Self::NO_LIMIT
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self::new(Self::NO_OFFSET, Self::NO_LIMIT)
    }
}

pub trait DataSourceExecutor: Send {
    /// `bounds` is `None` when the caller asked for every row
    fn execute_query(
        &mut self,
        sql: &str,
        bindings: &[ParameterBinding],
        bounds: Option<&RowBounds>,
    ) -> anyhow::Result<Vec<Value>>;

    fn execute_update(&mut self, sql: &str, bindings: &[ParameterBinding]) -> anyhow::Result<u64>;

    fn commit(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
