//! Bound parameters
//!
//! A `#{property[:jdbcType][,option=value...]}` token in rendered text becomes
//! a `?` placeholder plus a [`ParameterMapping`]. Each mapping is resolved
//! against the render scope into a [`ParameterBinding`].

use serde::Serialize;
use sqlweave_types::Value;

use crate::error::{CompositionError, Result};
use crate::evaluator::ExpressionEvaluator;
use crate::expression::Expression;
use crate::scope::VariableScope;
use crate::token::replace_tokens;

const KNOWN_OPTIONS: &[&str] = &[
    "javaType",
    "jdbcType",
    "mode",
    "numericScale",
    "resultMap",
    "typeHandler",
    "jdbcTypeName",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParamMode {
    #[default]
    In,
    Out,
    InOut,
}

impl ParamMode {
    fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_uppercase().as_str() {
            "IN" => Some(ParamMode::In),
            "OUT" => Some(ParamMode::Out),
            "INOUT" => Some(ParamMode::InOut),
            _ => None,
        }
    }

    /// Output-only parameters carry no input value
    pub fn is_output_only(self) -> bool {
        self == ParamMode::Out
    }
}

/// A parsed `#{...}` token
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMapping {
    pub property: String,
    pub mode: ParamMode,
    pub jdbc_type: Option<String>,
    path: Expression,
}

impl ParameterMapping {
    pub fn parse(content: &str) -> Result<Self> {
        let malformed = || CompositionError::MalformedToken(content.to_string());

        let mut parts = content.split(',');
        let head = parts.next().unwrap_or_default();
        let (property, mut jdbc_type) = match head.split_once(':') {
            Some((p, t)) => (p.trim(), Some(t.trim().to_string())),
            None => (head.trim(), None),
        };
        if property.is_empty() {
            return Err(malformed());
        }

        let mut mode = ParamMode::In;
        for option in parts {
            let (key, value) = option.split_once('=').ok_or_else(malformed)?;
            let (key, value) = (key.trim(), value.trim());
            if !KNOWN_OPTIONS.contains(&key) {
                return Err(malformed());
            }
            match key {
                "mode" => mode = ParamMode::parse(value).ok_or_else(malformed)?,
                "jdbcType" => jdbc_type = Some(value.to_string()),
                _ => {}
            }
        }

        let path = Expression::parse(property).map_err(|_| malformed())?;
        Ok(Self {
            property: property.to_string(),
            mode,
            jdbc_type,
            path,
        })
    }

    /// Resolve the value for this placeholder
    pub fn resolve(&self, scope: &VariableScope<'_>, position: usize) -> Result<ParameterBinding> {
        let value = if self.mode.is_output_only() {
            Value::Null
        } else {
            ExpressionEvaluator::evaluate(&self.path, scope)?
        };
        Ok(ParameterBinding {
            name: self.property.clone(),
            value,
            position,
            mode: self.mode,
            jdbc_type: self.jdbc_type.clone(),
        })
    }
}

/// A resolved positional parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterBinding {
    pub name: String,
    pub value: Value,
    pub position: usize,
    pub mode: ParamMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jdbc_type: Option<String>,
}

/// Replace every `#{...}` token with `?`, returning the placeholder SQL and
/// the mappings in placeholder order
pub fn extract_parameters(text: &str) -> Result<(String, Vec<ParameterMapping>)> {
    let mut mappings = Vec::new();
    let sql = replace_tokens(text, "#{", "}", |content| {
        mappings.push(ParameterMapping::parse(content)?);
        Ok("?".to_string())
    })?;
    Ok((sql, mappings))
}

pub fn resolve_all(
    mappings: &[ParameterMapping],
    scope: &VariableScope<'_>,
) -> Result<Vec<ParameterBinding>> {
    mappings
        .iter()
        .enumerate()
        .map(|(i, m)| m.resolve(scope, i))
        .collect()
}
