//! Runtime assembly
//!
//! [`SqlRuntimeBuilder`] collects fragments, statements and regions; the
//! resulting [`SqlRuntime`] is immutable, cheap to clone and shared by every
//! [`Session`] it opens.

use sqlweave_cache::Cache;
use sqlweave_compose::{FragmentRegistry, QueryComposer, TemplateNode};
use sqlweave_types::{ObjectAccessor, StructuralAccessor};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::datasource::DataSourceExecutor;
use crate::error::{ExecutorError, Result};
use crate::session::Session;
use crate::statement::MappedStatement;

struct RuntimeInner {
    config: RuntimeConfig,
    statements: HashMap<String, Arc<MappedStatement>>,
    regions: HashMap<String, Arc<dyn Cache>>,
    accessor: Arc<dyn ObjectAccessor>,
}

#[derive(Clone)]
pub struct SqlRuntime {
    inner: Arc<RuntimeInner>,
}

impl SqlRuntime {
    pub fn builder(config: RuntimeConfig) -> Result<SqlRuntimeBuilder> {
        SqlRuntimeBuilder::new(config)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn statement(&self, id: &str) -> Result<Arc<MappedStatement>> {
        self.inner
            .statements
            .get(id)
            .cloned()
            .ok_or_else(|| ExecutorError::UnknownStatement(id.to_string()))
    }

    pub fn region(&self, name: &str) -> Option<&Arc<dyn Cache>> {
        self.inner.regions.get(name)
    }

    pub fn accessor(&self) -> &dyn ObjectAccessor {
        self.inner.accessor.as_ref()
    }

    pub fn open_session(&self, data_source: Box<dyn DataSourceExecutor>) -> Session {
        Session::new(self.clone(), data_source)
    }
}

pub struct SqlRuntimeBuilder {
    config: RuntimeConfig,
    fragments: FragmentRegistry,
    statements: HashMap<String, Arc<MappedStatement>>,
    regions: HashMap<String, Arc<dyn Cache>>,
    accessor: Arc<dyn ObjectAccessor>,
}

impl SqlRuntimeBuilder {
    /// Builds every region named in `config`
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let regions = config.build_regions()?;
        Ok(Self {
            config,
            fragments: FragmentRegistry::new(),
            statements: HashMap::new(),
            regions,
            accessor: Arc::new(StructuralAccessor),
        })
    }

    pub fn accessor(mut self, accessor: impl ObjectAccessor + 'static) -> Self {
        self.accessor = Arc::new(accessor);
        self
    }

    pub fn fragment(
        &mut self,
        namespace: Option<&str>,
        id: &str,
        body: Vec<TemplateNode>,
    ) -> &mut Self {
        self.fragments.register(namespace, id, body);
        self
    }

    /// Build a template against the fragments registered so far
    pub fn compose(&self, namespace: Option<&str>, template: &TemplateNode) -> Result<QueryComposer> {
        Ok(QueryComposer::build_with(template, &self.fragments, namespace)?)
    }

    /// Register a region built outside the configuration
    pub fn add_region(&mut self, cache: Arc<dyn Cache>) -> &mut Self {
        self.regions.insert(cache.id().to_string(), cache);
        self
    }

    pub fn region(&self, name: &str) -> Option<&Arc<dyn Cache>> {
        self.regions.get(name)
    }

    pub fn add_statement(&mut self, statement: MappedStatement) -> Result<&mut Self> {
        if self.statements.contains_key(&statement.id) {
            return Err(ExecutorError::DuplicateStatement(statement.id));
        }
        if let Some(region) = &statement.cache {
            if !self.regions.contains_key(region) {
                return Err(ExecutorError::UnknownRegion {
                    statement: statement.id.clone(),
                    region: region.clone(),
                });
            }
        }
        debug!(statement = %statement.id, kind = ?statement.kind, "registered mapped statement");
        self.statements
            .insert(statement.id.clone(), Arc::new(statement));
        Ok(self)
    }

    pub fn build(self) -> SqlRuntime {
        info!(
            environment = %self.config.environment,
            statements = self.statements.len(),
            regions = self.regions.len(),
            "sql runtime ready"
        );
        SqlRuntime {
            inner: Arc::new(RuntimeInner {
                config: self.config,
                statements: self.statements,
                regions: self.regions,
                accessor: self.accessor,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlweave_cache::PerpetualCache;

    fn select(id: &str) -> MappedStatement {
        let composer = QueryComposer::build(&TemplateNode::text("SELECT 1")).unwrap();
        MappedStatement::select(id, composer)
    }

    #[test]
    fn test_statement_lookup() {
        let mut builder = SqlRuntime::builder(RuntimeConfig::default()).unwrap();
        builder.add_statement(select("a")).unwrap();
        let runtime = builder.build();

        assert_eq!(runtime.statement("a").unwrap().id, "a");
        assert!(matches!(
            runtime.statement("b"),
            Err(ExecutorError::UnknownStatement(id)) if id == "b"
        ));
    }

    #[test]
    fn test_duplicate_statement_rejected() {
        let mut builder = SqlRuntime::builder(RuntimeConfig::default()).unwrap();
        builder.add_statement(select("a")).unwrap();
        assert!(matches!(
            builder.add_statement(select("a")),
            Err(ExecutorError::DuplicateStatement(_))
        ));
    }

    #[test]
    fn test_statement_region_must_exist() {
        let mut builder = SqlRuntime::builder(RuntimeConfig::default()).unwrap();
        assert!(matches!(
            builder.add_statement(select("a").with_cache("users")),
            Err(ExecutorError::UnknownRegion { .. })
        ));

        builder.add_region(Arc::new(PerpetualCache::new("users")));
        builder.add_statement(select("a").with_cache("users")).unwrap();
        assert!(builder.build().region("users").is_some());
    }

    #[test]
    fn test_regions_come_from_config() {
        let config = RuntimeConfig::from_yaml_str("regions:\n  users: {}\n").unwrap();
        let builder = SqlRuntime::builder(config).unwrap();
        assert_eq!(builder.region("users").map(|c| c.id()), Some("users"));
    }

    #[test]
    fn test_compose_resolves_fragments_in_namespace() {
        let mut builder = SqlRuntime::builder(RuntimeConfig::default()).unwrap();
        builder.fragment(
            Some("users"),
            "columns",
            vec![TemplateNode::text("id, name")],
        );
        let template = TemplateNode::Mixed(vec![
            TemplateNode::text("SELECT"),
            TemplateNode::include("columns"),
            TemplateNode::text("FROM users"),
        ]);
        let composer = builder.compose(Some("users"), &template).unwrap();
        let bound = composer.render(&sqlweave_types::Value::Null).unwrap();
        assert_eq!(bound.sql, "SELECT id, name FROM users");
    }
}
