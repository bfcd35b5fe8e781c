use thiserror::Error;

/// Failure while building or rendering a template
///
/// A render that fails produces no partial SQL; the template itself is never
/// modified, so the same composer can be rendered again with corrected input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompositionError {
    #[error("error evaluating expression '{expression}': {message}")]
    Expression { expression: String, message: String },

    #[error("the expression '{expression}' evaluated to a null value")]
    NullIterable { expression: String },

    #[error("error evaluating expression '{expression}': return value ({value}) was not iterable")]
    NotIterable { expression: String, value: String },

    #[error("there is no property named '{property}' on {type_name}")]
    UnknownProperty { type_name: String, property: String },

    #[error("too many default (otherwise) elements in choose statement")]
    DuplicateOtherwise,

    #[error("could not find SQL fragment to include with refid '{0}'")]
    UnknownFragment(String),

    #[error("variable '{name}' defined twice in the same include definition")]
    DuplicateIncludeProperty { name: String },

    #[error("circular fragment inclusion: {}", .0.join(" -> "))]
    CircularInclude(Vec<String>),

    #[error("malformed parameter token '{0}'")]
    MalformedToken(String),
}

impl CompositionError {
    pub(crate) fn expression(expression: &str, message: impl Into<String>) -> Self {
        Self::Expression {
            expression: expression.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CompositionError>;
