//! Compiled statement tree and its renderer

use sqlweave_types::Value;
use tracing::trace;

use crate::error::Result;
use crate::evaluator::ExpressionEvaluator;
use crate::expression::Expression;
use crate::scope::VariableScope;
use crate::token::{contains_token, tokenize, TokenPart};

const WHERE_PREFIX_OVERRIDES: &[&str] = &[
    "AND ", "OR ", "AND\n", "OR\n", "AND\r", "OR\r", "AND\t", "OR\t",
];
const LOOP_NAME_PREFIX: &str = "__frch_";

// ============================================================================
// Node types
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum TextSegment {
    Literal(String),
    /// `${expr}`: the value's text is spliced into the SQL, not bound
    Interpolation(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalNode {
    pub test: Expression,
    pub body: Box<StatementNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopNode {
    pub collection: Expression,
    pub item: String,
    pub index: Option<String>,
    pub open: Option<String>,
    pub close: Option<String>,
    pub separator: Option<String>,
    pub body: Box<StatementNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrimNode {
    pub prefix: Option<String>,
    pub prefix_overrides: Vec<String>,
    pub suffix: Option<String>,
    pub suffix_overrides: Vec<String>,
    pub body: Box<StatementNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementNode {
    StaticText(String),
    DynamicText(Vec<TextSegment>),
    Conditional(ConditionalNode),
    ChooseFirst {
        branches: Vec<ConditionalNode>,
        otherwise: Option<Box<StatementNode>>,
    },
    Loop(LoopNode),
    TrimmedGroup(TrimNode),
    VarDecl {
        name: String,
        value: Expression,
    },
    Group(Vec<StatementNode>),
}

impl StatementNode {
    /// Text node; becomes `DynamicText` only if it holds a `${...}` token
    pub fn text(text: &str) -> Result<Self> {
        if !contains_token(text, "${", "}") {
            return Ok(StatementNode::StaticText(text.to_string()));
        }
        Ok(StatementNode::DynamicText(split_segments(text)?))
    }

    pub fn conditional(test: &str, body: StatementNode) -> Result<Self> {
        Ok(StatementNode::Conditional(ConditionalNode {
            test: Expression::parse(test)?,
            body: Box::new(body),
        }))
    }

    pub fn var_decl(name: impl Into<String>, value: &str) -> Result<Self> {
        Ok(StatementNode::VarDecl {
            name: name.into(),
            value: Expression::parse(value)?,
        })
    }

    /// `WHERE` group stripping a leading `AND`/`OR`
    pub fn where_clause(body: StatementNode) -> Self {
        StatementNode::TrimmedGroup(TrimNode {
            prefix: Some("WHERE".to_string()),
            prefix_overrides: WHERE_PREFIX_OVERRIDES.iter().map(|s| s.to_string()).collect(),
            suffix: None,
            suffix_overrides: Vec::new(),
            body: Box::new(body),
        })
    }

    /// `SET` group stripping a leading or trailing comma
    pub fn set_clause(body: StatementNode) -> Self {
        StatementNode::TrimmedGroup(TrimNode {
            prefix: Some("SET".to_string()),
            prefix_overrides: vec![",".to_string()],
            suffix: None,
            suffix_overrides: vec![",".to_string()],
            body: Box::new(body),
        })
    }

    /// Whether rendering depends on the parameter object
    pub fn is_dynamic(&self) -> bool {
        match self {
            StatementNode::StaticText(_) => false,
            StatementNode::DynamicText(_)
            | StatementNode::Conditional(_)
            | StatementNode::ChooseFirst { .. }
            | StatementNode::Loop(_)
            | StatementNode::VarDecl { .. } => true,
            StatementNode::TrimmedGroup(trim) => trim.body.is_dynamic(),
            StatementNode::Group(children) => children.iter().any(StatementNode::is_dynamic),
        }
    }

    pub fn render(&self, ctx: &mut RenderContext<'_>) -> Result<()> {
        match self {
            StatementNode::StaticText(text) => ctx.sql.append(text),
            StatementNode::DynamicText(segments) => {
                let mut text = String::new();
                for segment in segments {
                    match segment {
                        TextSegment::Literal(s) => text.push_str(s),
                        TextSegment::Interpolation(expr) => {
                            match ExpressionEvaluator::evaluate(expr, &ctx.scope)? {
                                Value::Null => {}
                                v => text.push_str(&v.to_string()),
                            }
                        }
                    }
                }
                ctx.sql.append(&text);
            }
            StatementNode::Conditional(cond) => {
                if ExpressionEvaluator::evaluate_boolean(&cond.test, &ctx.scope)? {
                    cond.body.render(ctx)?;
                }
            }
            StatementNode::ChooseFirst {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    if ExpressionEvaluator::evaluate_boolean(&branch.test, &ctx.scope)? {
                        return branch.body.render(ctx);
                    }
                }
                if let Some(node) = otherwise {
                    node.render(ctx)?;
                }
            }
            StatementNode::Loop(node) => node.render(ctx)?,
            StatementNode::TrimmedGroup(node) => node.render(ctx)?,
            StatementNode::VarDecl { name, value } => {
                let v = ExpressionEvaluator::evaluate(value, &ctx.scope)?;
                ctx.scope.bind_root(name.clone(), v);
            }
            StatementNode::Group(children) => {
                for child in children {
                    child.render(ctx)?;
                }
            }
        }
        Ok(())
    }
}

/// Split text into literal and `${}` segments
fn split_segments(text: &str) -> Result<Vec<TextSegment>> {
    tokenize(text, "${", "}")
        .into_iter()
        .map(|part| match part {
            TokenPart::Literal(literal) => Ok(TextSegment::Literal(literal)),
            TokenPart::Token(content) => Ok(TextSegment::Interpolation(Expression::parse(&content)?)),
        })
        .collect()
}

impl LoopNode {
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<()> {
        let elements = ExpressionEvaluator::evaluate_iterable(&self.collection, &ctx.scope)?;
        if elements.is_empty() {
            return Ok(());
        }

        let mut parts = Vec::with_capacity(elements.len());
        for element in elements {
            let n = ctx.next_unique();
            let item_name = format!("{}{}_{}", LOOP_NAME_PREFIX, self.item, n);
            let index_name = self
                .index
                .as_ref()
                .map(|index| (index, format!("{}{}_{}", LOOP_NAME_PREFIX, index, n)));

            ctx.scope.bind_root(item_name.clone(), element.item.clone());
            ctx.scope.push_layer();
            ctx.scope.bind(self.item.clone(), element.item);
            if let Some((index, unique)) = &index_name {
                ctx.scope.bind_root(unique.clone(), element.index.clone());
                ctx.scope.bind((*index).clone(), element.index);
            }

            let rendered = ctx.capture(|ctx| self.body.render(ctx));
            ctx.scope.pop_layer();
            let mut text = rendered?;

            text = rewrite_loop_tokens(&text, &self.item, &item_name);
            if let Some((index, unique)) = &index_name {
                text = rewrite_loop_tokens(&text, index, unique);
            }
            if !text.is_empty() {
                parts.push(text);
            }
        }

        let separator = self.separator.as_deref().unwrap_or("");
        let mut out = String::new();
        out.push_str(self.open.as_deref().unwrap_or(""));
        out.push_str(&parts.join(separator));
        out.push_str(self.close.as_deref().unwrap_or(""));
        trace!(collection = %self.collection, iterations = parts.len(), "rendered loop");
        ctx.sql.append(&out);
        Ok(())
    }
}

/// Point `#{name...}` tokens at the per-iteration binding `unique`
///
/// A token refers to `name` when its content starts with `name` followed by
/// the end of the content, a property or index accessor, or an option list.
fn rewrite_loop_tokens(text: &str, name: &str, unique: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("#{") {
        let escaped = start > 0 && rest.as_bytes()[start - 1] == b'\\';
        out.push_str(&rest[..start + 2]);
        rest = &rest[start + 2..];
        if escaped {
            continue;
        }

        let content = rest.trim_start();
        out.push_str(&rest[..rest.len() - content.len()]);
        rest = content;
        if let Some(tail) = rest.strip_prefix(name) {
            let boundary = tail
                .chars()
                .next()
                .map_or(true, |c| matches!(c, '}' | '.' | ',' | ':' | '[') || c.is_whitespace());
            if boundary {
                out.push_str(unique);
                rest = tail;
            }
        }
    }

    out.push_str(rest);
    out
}

impl TrimNode {
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<()> {
        let body = ctx.capture(|ctx| self.body.render(ctx))?;
        let mut text = body.trim();
        if text.is_empty() {
            return Ok(());
        }

        if let Some(o) = self
            .prefix_overrides
            .iter()
            .find(|o| starts_with_ignore_case(text, o))
        {
            text = &text[o.len()..];
        }
        if let Some(o) = self
            .suffix_overrides
            .iter()
            .find(|o| ends_with_ignore_case(text, o))
        {
            text = &text[..text.len() - o.len()];
        }

        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let mut out = String::new();
        if let Some(prefix) = &self.prefix {
            out.push_str(prefix);
            out.push(' ');
        }
        out.push_str(text);
        if let Some(suffix) = &self.suffix {
            out.push(' ');
            out.push_str(suffix);
        }
        ctx.sql.append(&out);
        Ok(())
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn ends_with_ignore_case(text: &str, suffix: &str) -> bool {
    let Some(start) = text.len().checked_sub(suffix.len()) else {
        return false;
    };
    text.is_char_boundary(start) && text[start..].eq_ignore_ascii_case(suffix)
}

// ============================================================================
// Render state
// ============================================================================

/// SQL text accumulated during one render, joined with single spaces
#[derive(Debug, Default)]
pub struct SqlBuffer {
    parts: Vec<String>,
}

impl SqlBuffer {
    pub fn append(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.parts.push(text.to_string());
        }
    }

    pub fn finish(self) -> String {
        self.parts.join(" ")
    }
}

/// Per-render mutable state: the scope, the output buffer and the loop
/// counter used to name per-iteration bindings
pub struct RenderContext<'a> {
    pub scope: VariableScope<'a>,
    sql: SqlBuffer,
    unique: usize,
}

impl<'a> RenderContext<'a> {
    pub fn new(scope: VariableScope<'a>) -> Self {
        Self {
            scope,
            sql: SqlBuffer::default(),
            unique: 0,
        }
    }

    fn next_unique(&mut self) -> usize {
        let n = self.unique;
        self.unique += 1;
        n
    }

    /// Render into a fresh buffer and hand back its text
    fn capture<F>(&mut self, f: F) -> Result<String>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let outer = std::mem::take(&mut self.sql);
        let result = f(self);
        let inner = std::mem::replace(&mut self.sql, outer);
        result.map(|()| inner.finish())
    }

    /// Finish the render, returning the SQL text and the scope for binding
    /// resolution
    pub fn finish(self) -> (String, VariableScope<'a>) {
        (self.sql.finish(), self.scope)
    }
}
