//! Mapped statements
//!
//! A [`MappedStatement`] couples a built [`QueryComposer`] with its cache
//! policy and, for selects, an optional [`ResultMapper`].

use serde::{Deserialize, Serialize};
use sqlweave_compose::QueryComposer;
use sqlweave_types::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Update,
}

/// Turns raw rows into result objects
///
/// Mappers receive the session so nested selects can run inline or be
/// deferred with [`Session::defer_load`].
pub trait ResultMapper: Send + Sync {
    fn map_rows(&self, session: &mut Session, rows: Vec<Value>) -> Result<Vec<Value>>;
}

#[derive(Clone)]
pub struct MappedStatement {
    pub id: String,
    pub kind: StatementKind,
    pub composer: Arc<QueryComposer>,
    /// Clear the local cache (and region, if any) before running
    pub flush_cache: bool,
    /// Read and populate the region
    pub use_cache: bool,
    /// Region name
    pub cache: Option<String>,
    pub result_mapper: Option<Arc<dyn ResultMapper>>,
}

impl MappedStatement {
    pub fn select(id: impl Into<String>, composer: QueryComposer) -> Self {
        Self {
            id: id.into(),
            kind: StatementKind::Select,
            composer: Arc::new(composer),
            flush_cache: false,
            use_cache: true,
            cache: None,
            result_mapper: None,
        }
    }

    pub fn update(id: impl Into<String>, composer: QueryComposer) -> Self {
        Self {
            id: id.into(),
            kind: StatementKind::Update,
            composer: Arc::new(composer),
            flush_cache: true,
            use_cache: false,
            cache: None,
            result_mapper: None,
        }
    }

    pub fn with_cache(mut self, region: impl Into<String>) -> Self {
        self.cache = Some(region.into());
        self
    }

    pub fn flush_cache(mut self, flush: bool) -> Self {
        self.flush_cache = flush;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_result_mapper(mut self, mapper: impl ResultMapper + 'static) -> Self {
        self.result_mapper = Some(Arc::new(mapper));
        self
    }

    pub fn is_select(&self) -> bool {
        self.kind == StatementKind::Select
    }
}

impl fmt::Debug for MappedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedStatement")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("flush_cache", &self.flush_cache)
            .field("use_cache", &self.use_cache)
            .field("cache", &self.cache)
            .field("result_mapper", &self.result_mapper.is_some())
            .finish()
    }
}
