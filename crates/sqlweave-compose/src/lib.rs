//! sqlweave-compose: dynamic statement composition
//!
//! A [`TemplateNode`] tree (produced by whatever parses the mapping source)
//! is compiled once into a [`StatementNode`] tree owned by a
//! [`QueryComposer`]. Each [`QueryComposer::render`] call walks that tree
//! against a fresh [`VariableScope`] and returns the SQL text with `?`
//! placeholders plus the ordered [`ParameterBinding`]s.
//!
//! Templates with no conditional, loop, binding or `${...}` interpolation are
//! classified static and rendered once at build time.

mod binding;
mod composer;
mod error;
mod evaluator;
mod expression;
mod fragment;
mod node;
mod scope;
mod template;
mod token;

pub use binding::{ParamMode, ParameterBinding, ParameterMapping};
pub use composer::{BoundStatement, QueryComposer, RenderEnvironment};
pub use error::{CompositionError, Result};
pub use evaluator::{is_truthy, ExpressionEvaluator, LoopElement};
pub use expression::{parse_expression, BinaryOp, Expr, Expression, Method, UnaryOp};
pub use fragment::{qualify, FragmentRegistry};
pub use node::{ConditionalNode, LoopNode, RenderContext, StatementNode, TextSegment, TrimNode};
pub use scope::{VariableScope, DATABASE_ID_KEY, PARAMETER_OBJECT_KEY};
pub use template::{ForeachSpec, TemplateNode, TrimSpec};
pub use token::replace_tokens;
