//! Expression language
//!
//! Conditions, loop collections, `${...}` interpolations, `bind` values and
//! `#{...}` property paths are all written in one small expression language:
//!
//! ```text
//! expr       := or
//! or         := and (("||" | "or") and)*
//! and        := equality (("&&" | "and") equality)*
//! equality   := relational (("==" | "!=" | "eq" | "neq") relational)*
//! relational := additive (("<=" | ">=" | "<" | ">" | "lte" | "gte" | "lt" | "gt") additive)*
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "%") unary)*
//! unary      := ("!" | "not" | "-") unary | postfix
//! postfix    := primary ("." ident | "." method "()" | "[" expr "]")*
//! primary    := null | true | false | number | string | ident | "(" expr ")"
//! ```
//!
//! Expressions are parsed once when a template is built and evaluated on every
//! render.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, none_of, satisfy},
    combinator::{all_consuming, cut, map, map_opt, map_res, not, opt, recognize, value, verify},
    error::{context, convert_error, VerboseError},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use std::fmt;
use sqlweave_types::Value;

use crate::error::{CompositionError, Result};

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Zero-argument methods callable on values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Size,
    IsEmpty,
    Length,
    Trim,
    ToString,
}

impl Method {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "size" => Some(Method::Size),
            "isEmpty" => Some(Method::IsEmpty),
            "length" => Some(Method::Length),
            "trim" => Some(Method::Trim),
            "toString" => Some(Method::ToString),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Property(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Method),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }
}

/// A parsed expression together with the text it came from
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self> {
        let ast =
            parse_expression(source).map_err(|msg| CompositionError::expression(source, msg))?;
        Ok(Self {
            source: source.trim().to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse expression source text into an AST
pub fn parse_expression(input: &str) -> std::result::Result<Expr, String> {
    match all_consuming(ws(expression))(input) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(convert_error(input, e)),
        Err(nom::Err::Incomplete(_)) => Err("Incomplete input".to_string()),
    }
}

// ============================================================================
// Internal Parsers
// ============================================================================

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

const RESERVED: &[&str] = &[
    "null", "true", "false", "and", "or", "not", "eq", "neq", "lt", "lte", "gt", "gte",
];

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> Res<'a, O>
where
    F: FnMut(&'a str) -> Res<'a, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// A word operator or literal that must not run into a following identifier
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> Res<'a, &'a str> {
    terminated(tag(kw), not(satisfy(is_ident_char)))
}

fn identifier(input: &str) -> Res<'_, &str> {
    verify(
        recognize(pair(
            alt((alpha1, tag("_"), tag("$"))),
            many0(alt((alphanumeric1, tag("_"), tag("$")))),
        )),
        |name: &str| !RESERVED.contains(&name),
    )(input)
}

fn expression(input: &str) -> Res<'_, Expr> {
    or_expr(input)
}

fn binary_level<'a>(
    input: &'a str,
    operand: fn(&'a str) -> Res<'a, Expr>,
    operator: fn(&'a str) -> Res<'a, BinaryOp>,
) -> Res<'a, Expr> {
    let (input, first) = operand(input)?;
    let (input, rest) = many0(pair(ws(operator), operand))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |lhs, (op, rhs)| Expr::binary(op, lhs, rhs)),
    ))
}

fn or_expr(input: &str) -> Res<'_, Expr> {
    binary_level(input, and_expr, |i| {
        value(BinaryOp::Or, alt((tag("||"), keyword("or"))))(i)
    })
}

fn and_expr(input: &str) -> Res<'_, Expr> {
    binary_level(input, equality, |i| {
        value(BinaryOp::And, alt((tag("&&"), keyword("and"))))(i)
    })
}

fn equality(input: &str) -> Res<'_, Expr> {
    binary_level(input, relational, |i| {
        alt((
            value(BinaryOp::Eq, alt((tag("=="), keyword("eq")))),
            value(BinaryOp::Ne, alt((tag("!="), keyword("neq")))),
        ))(i)
    })
}

fn relational(input: &str) -> Res<'_, Expr> {
    binary_level(input, additive, |i| {
        alt((
            value(BinaryOp::Le, alt((tag("<="), keyword("lte")))),
            value(BinaryOp::Ge, alt((tag(">="), keyword("gte")))),
            value(BinaryOp::Lt, alt((tag("<"), keyword("lt")))),
            value(BinaryOp::Gt, alt((tag(">"), keyword("gt")))),
        ))(i)
    })
}

fn additive(input: &str) -> Res<'_, Expr> {
    binary_level(input, term, |i| {
        alt((
            value(BinaryOp::Add, char('+')),
            value(BinaryOp::Sub, char('-')),
        ))(i)
    })
}

fn term(input: &str) -> Res<'_, Expr> {
    binary_level(input, unary, |i| {
        alt((
            value(BinaryOp::Mul, char('*')),
            value(BinaryOp::Div, char('/')),
            value(BinaryOp::Rem, char('%')),
        ))(i)
    })
}

fn unary(input: &str) -> Res<'_, Expr> {
    alt((
        map(
            preceded(ws(alt((tag("!"), keyword("not")))), unary),
            |e| Expr::Unary(UnaryOp::Not, Box::new(e)),
        ),
        map(preceded(ws(char('-')), unary), |e| {
            Expr::Unary(UnaryOp::Neg, Box::new(e))
        }),
        postfix,
    ))(input)
}

enum Postfix {
    Member(String),
    Call(Method),
    Index(Expr),
}

fn postfix_op(input: &str) -> Res<'_, Postfix> {
    alt((
        preceded(
            ws(char('.')),
            alt((
                map_opt(
                    terminated(identifier, pair(ws(char('(')), char(')'))),
                    |name| Method::from_name(name).map(Postfix::Call),
                ),
                map(identifier, |name| Postfix::Member(name.to_string())),
            )),
        ),
        map(
            delimited(
                ws(char('[')),
                expression,
                cut(context("closing bracket", ws(char(']')))),
            ),
            Postfix::Index,
        ),
    ))(input)
}

fn postfix(input: &str) -> Res<'_, Expr> {
    let (input, base) = primary(input)?;
    let (input, ops) = many0(postfix_op)(input)?;
    let expr = ops.into_iter().fold(base, |acc, op| match op {
        Postfix::Member(name) => Expr::Property(Box::new(acc), name),
        Postfix::Call(method) => Expr::Call(Box::new(acc), method),
        Postfix::Index(index) => Expr::Index(Box::new(acc), Box::new(index)),
    });
    Ok((input, expr))
}

fn primary(input: &str) -> Res<'_, Expr> {
    ws(alt((
        value(Expr::Literal(Value::Null), keyword("null")),
        value(Expr::Literal(Value::Bool(true)), keyword("true")),
        value(Expr::Literal(Value::Bool(false)), keyword("false")),
        number,
        map(string_literal, |s| Expr::Literal(Value::Text(s))),
        map(identifier, |name| Expr::Ident(name.to_string())),
        delimited(
            char('('),
            expression,
            cut(context("closing parenthesis", char(')'))),
        ),
    )))(input)
}

fn number(input: &str) -> Res<'_, Expr> {
    map_res(
        recognize(pair(digit1, opt(pair(char('.'), digit1)))),
        |text: &str| -> std::result::Result<Expr, String> {
            if text.contains('.') {
                text.parse::<f64>()
                    .map(|f| Expr::Literal(Value::Float(f)))
                    .map_err(|e| e.to_string())
            } else {
                text.parse::<i64>()
                    .map(|i| Expr::Literal(Value::Int(i)))
                    .map_err(|e| e.to_string())
            }
        },
    )(input)
}

fn string_literal(input: &str) -> Res<'_, String> {
    alt((quoted('\'', "'\\"), quoted('"', "\"\\")))(input)
}

fn quoted<'a>(quote: char, stop: &'static str) -> impl FnMut(&'a str) -> Res<'a, String> {
    delimited(
        char(quote),
        // escaped_transform refuses empty content, hence the opt
        map(
            opt(escaped_transform(
                none_of(stop),
                '\\',
                alt((
                    value('\n', char('n')),
                    value('\t', char('t')),
                    value('\\', char('\\')),
                    value('\'', char('\'')),
                    value('"', char('"')),
                )),
            )),
            Option::unwrap_or_default,
        ),
        cut(context("closing quote", char(quote))),
    )
}
