use sqlweave_cache::CacheError;
use sqlweave_compose::CompositionError;
use sqlweave_types::AccessError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("data source error: {0}")]
    DataSource(#[from] anyhow::Error),

    #[error("mapped statement '{0}' is not registered")]
    UnknownStatement(String),

    #[error("mapped statement '{0}' is already registered")]
    DuplicateStatement(String),

    #[error("cache region '{region}' referenced by '{statement}' is not configured")]
    UnknownRegion { statement: String, region: String },

    #[error("executor was closed")]
    Closed,

    #[error("expected one result (or null) from '{statement}' but found {count}")]
    TooManyResults { statement: String, count: usize },

    #[error("cannot apply loaded value: {0}")]
    Accessor(#[from] AccessError),

    #[error("query for key {0} is already in flight in this session; defer the load instead")]
    QueryInFlight(String),

    #[error("deferred load of '{property}' found no completed result for key {key}")]
    DeferredUnresolved { property: String, key: String },
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
