//! Variable scope for one render call
//!
//! Names resolve innermost layer first, then the two reserved bindings, then
//! the parameter object:
//!
//! - a map parameter answers with its entry (absent keys are null)
//! - a list parameter answers to `list` and `collection`
//! - a scalar parameter answers every name with itself
//! - any other parameter goes through the [`ObjectAccessor`]; a field the
//!   object does not declare is an error

use sqlweave_types::{FieldLookup, ObjectAccessor, Value};
use std::collections::BTreeMap;

use crate::error::{CompositionError, Result};

/// Reserved name bound to the raw parameter object
pub const PARAMETER_OBJECT_KEY: &str = "_parameter";
/// Reserved name bound to the active environment discriminator
pub const DATABASE_ID_KEY: &str = "_databaseId";

pub struct VariableScope<'a> {
    parameter: &'a Value,
    database_id: Option<&'a str>,
    accessor: &'a dyn ObjectAccessor,
    /// `layers[0]` is the render-wide layer; loops push nested layers
    layers: Vec<BTreeMap<String, Value>>,
}

impl<'a> VariableScope<'a> {
    pub fn new(
        parameter: &'a Value,
        database_id: Option<&'a str>,
        accessor: &'a dyn ObjectAccessor,
    ) -> Self {
        Self {
            parameter,
            database_id,
            accessor,
            layers: vec![BTreeMap::new()],
        }
    }

    pub fn parameter(&self) -> &Value {
        self.parameter
    }

    pub fn database_id(&self) -> Option<&str> {
        self.database_id
    }

    pub fn accessor(&self) -> &dyn ObjectAccessor {
        self.accessor
    }

    /// Bind into the innermost layer
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        if let Some(layer) = self.layers.last_mut() {
            layer.insert(name.into(), value);
        }
    }

    /// Bind into the render-wide layer, visible until the render ends
    pub fn bind_root(&mut self, name: impl Into<String>, value: Value) {
        self.layers[0].insert(name.into(), value);
    }

    pub fn push_layer(&mut self) {
        self.layers.push(BTreeMap::new());
    }

    pub fn pop_layer(&mut self) {
        if self.layers.len() > 1 {
            self.layers.pop();
        }
    }

    /// Whether `name` is an explicit binding (as opposed to a parameter field)
    pub fn is_bound(&self, name: &str) -> bool {
        self.layers.iter().any(|layer| layer.contains_key(name))
    }

    /// Render-wide bindings in name order
    pub fn root_bindings(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.layers[0].iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn lookup(&self, name: &str) -> Result<Value> {
        for layer in self.layers.iter().rev() {
            if let Some(v) = layer.get(name) {
                return Ok(v.clone());
            }
        }

        match name {
            PARAMETER_OBJECT_KEY => return Ok(self.parameter.clone()),
            DATABASE_ID_KEY => return Ok(Value::from(self.database_id)),
            _ => {}
        }

        match self.parameter {
            Value::Null => Ok(Value::Null),
            Value::Map(entries) => Ok(entries.get(name).cloned().unwrap_or(Value::Null)),
            Value::List(_) if name == "list" || name == "collection" => Ok(self.parameter.clone()),
            param => match self.accessor.get_field(param, name) {
                FieldLookup::Present(v) => Ok(v),
                FieldLookup::Missing if param.is_scalar() => Ok(param.clone()),
                FieldLookup::Missing => Err(CompositionError::UnknownProperty {
                    type_name: param.type_name().to_string(),
                    property: name.to_string(),
                }),
            },
        }
    }
}
