//! The session executor
//!
//! One [`Session`] is one unit of work over one [`DataSourceExecutor`]. It
//! owns the session-local cache, the deferred-load queue and the
//! transactional staging for every region it touches. A session is used from
//! one thread at a time; regions are shared with other sessions through the
//! runtime.
//!
//! Query path for a select:
//!
//! 1. render the statement and compute its [`CacheKey`]
//! 2. if the statement has a region and `use_cache` is set, probe the region
//!    through the transactional manager
//! 3. otherwise (or on a region miss) probe the local cache, then the data
//!    source, guarding the key with an in-flight placeholder
//! 4. when the outermost query returns, drain deferred loads

use sqlweave_cache::{Cache, CacheKey, TransactionalCacheManager};
use sqlweave_compose::{BoundStatement, RenderEnvironment};
use sqlweave_types::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LocalCacheScope;
use crate::datasource::{DataSourceExecutor, RowBounds};
use crate::deferred::{DeferredLoad, LoadKind, SharedObject};
use crate::error::{ExecutorError, Result};
use crate::local_cache::SessionLocalCache;
use crate::runtime::SqlRuntime;
use crate::statement::MappedStatement;

pub struct Session {
    id: Uuid,
    runtime: SqlRuntime,
    data_source: Box<dyn DataSourceExecutor>,
    local_cache: SessionLocalCache,
    deferred: Vec<DeferredLoad>,
    tcm: TransactionalCacheManager,
    query_depth: usize,
    closed: bool,
}

impl Session {
    pub(crate) fn new(runtime: SqlRuntime, data_source: Box<dyn DataSourceExecutor>) -> Self {
        let id = Uuid::new_v4();
        debug!(session = %id, "session opened");
        Self {
            id,
            runtime,
            data_source,
            local_cache: SessionLocalCache::new(),
            deferred: Vec::new(),
            tcm: TransactionalCacheManager::new(),
            query_depth: 0,
            closed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn runtime(&self) -> &SqlRuntime {
        &self.runtime
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn local_cache(&self) -> &SessionLocalCache {
        &self.local_cache
    }

    /// Regions with staged work since the last commit or rollback
    pub fn pending_regions(&self) -> usize {
        self.tcm.len()
    }

    /// Nesting level of the query currently running; 0 when idle
    pub fn query_depth(&self) -> usize {
        self.query_depth
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ExecutorError::Closed);
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn query(&mut self, statement_id: &str, parameter: &Value) -> Result<Vec<Value>> {
        self.query_with_bounds(statement_id, parameter, None)
    }

    pub fn query_with_bounds(
        &mut self,
        statement_id: &str,
        parameter: &Value,
        bounds: Option<RowBounds>,
    ) -> Result<Vec<Value>> {
        self.ensure_open()?;
        let statement = self.runtime.statement(statement_id)?;
        let bound = self.render(&statement, parameter)?;
        let key = self.cache_key(&statement, &bound, bounds.as_ref());

        if let Some(region) = self.region_for(&statement) {
            if statement.flush_cache {
                self.tcm.clear(&region);
            }
            if statement.use_cache {
                if let Some(hit) = self.tcm.get_object(&region, &key)? {
                    debug!(statement = %statement.id, cache = %region.id(), "region hit");
                    return Ok(hit.into_rows());
                }
                let rows = self.local_query(&statement, &bound, bounds.as_ref(), &key)?;
                self.tcm
                    .put_object(&region, key, Value::List(rows.clone()));
                return Ok(rows);
            }
        }

        self.local_query(&statement, &bound, bounds.as_ref(), &key)
    }

    /// At most one row
    pub fn select_one(&mut self, statement_id: &str, parameter: &Value) -> Result<Option<Value>> {
        let mut rows = self.query(statement_id, parameter)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            count => Err(ExecutorError::TooManyResults {
                statement: statement_id.to_string(),
                count,
            }),
        }
    }

    fn local_query(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: Option<&RowBounds>,
        key: &CacheKey,
    ) -> Result<Vec<Value>> {
        if self.query_depth == 0 && statement.flush_cache {
            self.local_cache.clear();
        }

        self.query_depth += 1;
        let result = match self.local_cache.resolved(key) {
            Some(rows) => {
                debug!(statement = %statement.id, "local cache hit");
                Ok(Vec::clone(&rows))
            }
            None => self.query_data_source(statement, bound, bounds, key),
        };
        self.query_depth -= 1;

        if self.query_depth == 0 {
            let drained = match &result {
                Ok(_) => self.drain_deferred(),
                Err(_) => {
                    self.deferred.clear();
                    Ok(())
                }
            };
            if self.runtime.config().local_cache_scope == LocalCacheScope::Statement {
                self.local_cache.clear();
            }
            drained?;
        }
        result
    }

    fn query_data_source(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: Option<&RowBounds>,
        key: &CacheKey,
    ) -> Result<Vec<Value>> {
        self.local_cache.begin(key)?;
        match self.fetch_and_map(statement, bound, bounds) {
            Ok(rows) => Ok(Vec::clone(&self.local_cache.complete(key.clone(), rows))),
            Err(e) => {
                self.local_cache.abort(key);
                Err(e)
            }
        }
    }

    fn fetch_and_map(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: Option<&RowBounds>,
    ) -> Result<Vec<Value>> {
        debug!(statement = %statement.id, sql = %bound.sql, "querying data source");
        let rows = self
            .data_source
            .execute_query(&bound.sql, &bound.bindings, bounds)?;
        match statement.result_mapper.clone() {
            Some(mapper) => mapper.map_rows(self, rows),
            None => Ok(rows),
        }
    }

    // ========================================================================
    // Deferred loads
    // ========================================================================

    /// Whether `key` has a local entry, resolved or still in flight
    pub fn is_cached(&self, key: &CacheKey) -> bool {
        self.local_cache.contains(key)
    }

    /// Assign the result of `key` to `property` on `target`
    ///
    /// Applied immediately when the result is already resolved; otherwise
    /// queued until the outermost query completes.
    pub fn defer_load(
        &mut self,
        target: SharedObject,
        property: impl Into<String>,
        key: CacheKey,
        kind: LoadKind,
    ) -> Result<()> {
        self.ensure_open()?;
        let load = DeferredLoad::new(target, property, key, kind);
        match self.local_cache.resolved(&load.key) {
            Some(rows) => load.apply(&rows, self.runtime.accessor()),
            None => {
                debug!(property = %load.property, key = %load.key, "deferring load");
                self.deferred.push(load);
                Ok(())
            }
        }
    }

    fn drain_deferred(&mut self) -> Result<()> {
        let loads = std::mem::take(&mut self.deferred);
        if loads.is_empty() {
            return Ok(());
        }
        debug!(count = loads.len(), "draining deferred loads");
        for load in loads {
            let rows = self.local_cache.resolved(&load.key).ok_or_else(|| {
                ExecutorError::DeferredUnresolved {
                    property: load.property.clone(),
                    key: load.key.to_string(),
                }
            })?;
            load.apply(&rows, self.runtime.accessor())?;
        }
        Ok(())
    }

    // ========================================================================
    // Keys and rendering
    // ========================================================================

    /// Key a query with these arguments would be cached under
    pub fn create_cache_key(
        &self,
        statement_id: &str,
        parameter: &Value,
        bounds: Option<RowBounds>,
    ) -> Result<CacheKey> {
        self.ensure_open()?;
        let statement = self.runtime.statement(statement_id)?;
        let bound = self.render(&statement, parameter)?;
        Ok(self.cache_key(&statement, &bound, bounds.as_ref()))
    }

    fn render(&self, statement: &MappedStatement, parameter: &Value) -> Result<BoundStatement> {
        let env = RenderEnvironment {
            database_id: self.runtime.config().database_id.as_deref(),
            accessor: self.runtime.accessor(),
        };
        Ok(statement.composer.render_in(parameter, &env)?)
    }

    /// Statement id, offset, limit, SQL, input values, environment
    fn cache_key(
        &self,
        statement: &MappedStatement,
        bound: &BoundStatement,
        bounds: Option<&RowBounds>,
    ) -> CacheKey {
        let bounds = bounds.copied().unwrap_or_default();
        let mut key = CacheKey::new();
        key.update(statement.id.as_str());
        key.update(bounds.offset);
        key.update(i64::try_from(bounds.limit).unwrap_or(i64::MAX));
        key.update(bound.sql.as_str());
        for binding in &bound.bindings {
            if !binding.mode.is_output_only() {
                key.update(binding.value.clone());
            }
        }
        key.update(self.runtime.config().environment.as_str());
        key
    }

    fn region_for(&self, statement: &MappedStatement) -> Option<Arc<dyn Cache>> {
        if !self.runtime.config().cache_enabled {
            return None;
        }
        statement
            .cache
            .as_deref()
            .and_then(|name| self.runtime.region(name))
            .cloned()
    }

    // ========================================================================
    // Updates and lifecycle
    // ========================================================================

    pub fn update(&mut self, statement_id: &str, parameter: &Value) -> Result<u64> {
        self.ensure_open()?;
        let statement = self.runtime.statement(statement_id)?;
        if statement.flush_cache {
            if let Some(region) = self.region_for(&statement) {
                self.tcm.clear(&region);
            }
        }
        self.local_cache.clear();

        let bound = self.render(&statement, parameter)?;
        debug!(statement = %statement.id, sql = %bound.sql, "executing update");
        Ok(self.data_source.execute_update(&bound.sql, &bound.bindings)?)
    }

    pub fn clear_local_cache(&mut self) {
        self.local_cache.clear();
    }

    /// Commit the data source, then publish staged region writes
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.local_cache.clear();
        self.data_source.commit()?;
        self.tcm.commit();
        Ok(())
    }

    /// Discard staged region writes and roll the data source back
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.local_cache.clear();
        let result = self.data_source.rollback();
        self.tcm.rollback();
        Ok(result?)
    }

    /// End the unit of work; every later call fails with `Closed`
    ///
    /// Without `force_rollback` staged region writes are published. Closing
    /// twice is a no-op.
    pub fn close(&mut self, force_rollback: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.local_cache.clear();
        self.deferred.clear();

        if !force_rollback {
            self.tcm.commit();
            debug!(session = %self.id, "session closed");
            return Ok(());
        }

        self.tcm.rollback();
        match self.data_source.rollback() {
            Ok(()) => {
                debug!(session = %self.id, "session closed with rollback");
                Ok(())
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "rollback on close failed");
                Err(ExecutorError::DataSource(e))
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            // hand back any single-flight locks taken by region misses
            self.tcm.rollback();
        }
    }
}
