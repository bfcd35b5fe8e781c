//! Structural field access
//!
//! Composition and deferred loading read and write fields of objects they know
//! nothing about. [`ObjectAccessor`] is the capability they go through.

use thiserror::Error;

use crate::value::Value;

/// Outcome of a field read
#[derive(Debug, Clone, PartialEq)]
pub enum FieldLookup {
    /// The object declares the field; its value may be null
    Present(Value),
    /// The object has no such field
    Missing,
}

impl FieldLookup {
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldLookup::Missing)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AccessError {
    #[error("no field '{field}' on {type_name}")]
    UnknownField { type_name: String, field: String },

    #[error("cannot set field '{field}' on a {type_name} value")]
    NotAnObject { type_name: String, field: String },
}

/// Name-based get/set over arbitrary objects
pub trait ObjectAccessor: Send + Sync {
    fn get_field(&self, object: &Value, name: &str) -> FieldLookup;

    fn set_field(&self, object: &mut Value, name: &str, value: Value) -> Result<(), AccessError>;

    fn has_field(&self, object: &Value, name: &str) -> bool {
        !self.get_field(object, name).is_missing()
    }
}

/// Default accessor
///
/// - Maps declare every key: an absent key reads as `Present(Null)` and
///   writes insert.
/// - Records declare exactly their fields.
/// - Lists expose `size`.
/// - Scalars and null declare nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralAccessor;

impl ObjectAccessor for StructuralAccessor {
    fn get_field(&self, object: &Value, name: &str) -> FieldLookup {
        match object {
            Value::Map(entries) => {
                FieldLookup::Present(entries.get(name).cloned().unwrap_or(Value::Null))
            }
            Value::Record(record) => match record.fields.get(name) {
                Some(v) => FieldLookup::Present(v.clone()),
                None => FieldLookup::Missing,
            },
            Value::List(items) if name == "size" => FieldLookup::Present(Value::from(items.len())),
            _ => FieldLookup::Missing,
        }
    }

    fn set_field(&self, object: &mut Value, name: &str, value: Value) -> Result<(), AccessError> {
        match object {
            Value::Map(entries) => {
                entries.insert(name.to_string(), value);
                Ok(())
            }
            Value::Record(record) => match record.fields.get_mut(name) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(AccessError::UnknownField {
                    type_name: record.type_name.clone(),
                    field: name.to_string(),
                }),
            },
            other => Err(AccessError::NotAnObject {
                type_name: other.type_name().to_string(),
                field: name.to_string(),
            }),
        }
    }
}
