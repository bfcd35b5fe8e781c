//! sqlweave - persistence-mapping runtime
//!
//! Statements are composed from templates by `sqlweave-compose`, results are
//! cached per session and, through transactional staging, in shared regions
//! from `sqlweave-cache`. This crate ties both to a data source.
//!
//! ## Flow
//! Template -> QueryComposer -> MappedStatement -> Session -> DataSourceExecutor
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sqlweave::{MappedStatement, RuntimeConfig, SqlRuntime};
//! use sqlweave_compose::TemplateNode;
//! # fn data_source() -> Box<dyn sqlweave::DataSourceExecutor> { unimplemented!() }
//!
//! # fn main() -> sqlweave::Result<()> {
//! let mut builder = SqlRuntime::builder(RuntimeConfig::default())?;
//! let composer = builder.compose(None, &TemplateNode::text("SELECT * FROM users WHERE id = #{id}"))?;
//! builder.add_statement(MappedStatement::select("users.byId", composer))?;
//! let runtime = builder.build();
//!
//! let mut session = runtime.open_session(data_source());
//! let user = session.select_one("users.byId", &7.into())?;
//! session.commit()?;
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Configuration and logging setup
pub mod config;
pub mod telemetry;

// Collaborator seam
pub mod datasource;

// Statements and the runtime that holds them
pub mod runtime;
pub mod statement;

// Per-session execution
pub mod deferred;
pub mod local_cache;
pub mod session;

pub use config::{ConfigLoader, LocalCacheScope, RuntimeConfig, CONFIG_ENV_VAR};
pub use datasource::{DataSourceExecutor, RowBounds};
pub use deferred::{shared, DeferredLoad, LoadKind, SharedObject};
pub use error::{ExecutorError, Result};
pub use local_cache::SessionLocalCache;
pub use runtime::{SqlRuntime, SqlRuntimeBuilder};
pub use session::Session;
pub use statement::{MappedStatement, ResultMapper, StatementKind};
pub use telemetry::init_tracing;

pub use sqlweave_cache as cache;
pub use sqlweave_compose as compose;
pub use sqlweave_types::{ObjectAccessor, Record, StructuralAccessor, Value};
