#![allow(dead_code)]

use sqlweave::compose::{ParameterBinding, QueryComposer, TemplateNode};
use sqlweave::{DataSourceExecutor, MappedStatement, RowBounds, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub type Responder =
    Box<dyn FnMut(&str, &[ParameterBinding]) -> anyhow::Result<Vec<Value>> + Send>;

#[derive(Debug, Default)]
pub struct Calls {
    pub queries: AtomicUsize,
    pub updates: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

impl Calls {
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

/// Data source double answering queries from a closure and counting calls
pub struct ScriptedDataSource {
    responder: Responder,
    calls: Arc<Calls>,
}

impl ScriptedDataSource {
    pub fn new(
        calls: Arc<Calls>,
        responder: impl FnMut(&str, &[ParameterBinding]) -> anyhow::Result<Vec<Value>> + Send + 'static,
    ) -> Box<Self> {
        Box::new(Self {
            responder: Box::new(responder),
            calls,
        })
    }

    /// Echo the first bound value back as a one-row result
    pub fn echo(calls: Arc<Calls>) -> Box<Self> {
        Self::new(calls, |_, bindings| {
            Ok(bindings
                .first()
                .map(|b| vec![Value::map([("id", b.value.clone())])])
                .unwrap_or_default())
        })
    }
}

impl DataSourceExecutor for ScriptedDataSource {
    fn execute_query(
        &mut self,
        sql: &str,
        bindings: &[ParameterBinding],
        _bounds: Option<&RowBounds>,
    ) -> anyhow::Result<Vec<Value>> {
        self.calls.queries.fetch_add(1, Ordering::SeqCst);
        (self.responder)(sql, bindings)
    }

    fn execute_update(&mut self, _sql: &str, _bindings: &[ParameterBinding]) -> anyhow::Result<u64> {
        self.calls.updates.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        self.calls.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&mut self) -> anyhow::Result<()> {
        self.calls.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn select(id: &str, sql: &str) -> MappedStatement {
    let composer = QueryComposer::build(&TemplateNode::text(sql)).expect("template builds");
    MappedStatement::select(id, composer)
}

pub fn update(id: &str, sql: &str) -> MappedStatement {
    let composer = QueryComposer::build(&TemplateNode::text(sql)).expect("template builds");
    MappedStatement::update(id, composer)
}
