//! Expression evaluation against a [`VariableScope`]

use sqlweave_types::{FieldLookup, Value};
use std::cmp::Ordering;

use crate::error::{CompositionError, Result};
use crate::expression::{BinaryOp, Expr, Expression, Method, UnaryOp};
use crate::scope::VariableScope;

/// One element of an iterated collection
///
/// Lists yield their position as the index; maps yield the entry key.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopElement {
    pub index: Value,
    pub item: Value,
}

/// Truthiness used by conditionals: booleans are themselves, numbers are
/// truthy when non-zero, null is falsy and every other value is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        _ => true,
    }
}

pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    pub fn evaluate(expression: &Expression, scope: &VariableScope<'_>) -> Result<Value> {
        Eval {
            source: expression.source(),
            scope,
        }
        .eval(expression.ast())
    }

    pub fn evaluate_boolean(expression: &Expression, scope: &VariableScope<'_>) -> Result<bool> {
        Self::evaluate(expression, scope).map(|v| is_truthy(&v))
    }

    pub fn evaluate_iterable(
        expression: &Expression,
        scope: &VariableScope<'_>,
    ) -> Result<Vec<LoopElement>> {
        match Self::evaluate(expression, scope)? {
            Value::Null => Err(CompositionError::NullIterable {
                expression: expression.source().to_string(),
            }),
            Value::List(items) => Ok(items
                .into_iter()
                .enumerate()
                .map(|(i, item)| LoopElement {
                    index: Value::from(i),
                    item,
                })
                .collect()),
            Value::Map(entries) => Ok(entries
                .into_iter()
                .map(|(k, item)| LoopElement {
                    index: Value::Text(k),
                    item,
                })
                .collect()),
            other => Err(CompositionError::NotIterable {
                expression: expression.source().to_string(),
                value: other.to_string(),
            }),
        }
    }
}

struct Eval<'s, 'a> {
    source: &'s str,
    scope: &'s VariableScope<'a>,
}

impl Eval<'_, '_> {
    fn fail(&self, message: impl Into<String>) -> CompositionError {
        CompositionError::expression(self.source, message)
    }

    fn eval(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Ident(name) => self.scope.lookup(name),
            Expr::Property(base, name) => {
                let target = self.eval(base)?;
                self.property(&target, name)
            }
            Expr::Index(base, index) => {
                let target = self.eval(base)?;
                let index = self.eval(index)?;
                self.index(&target, &index)
            }
            Expr::Call(base, method) => {
                let target = self.eval(base)?;
                self.call(&target, *method)
            }
            Expr::Unary(UnaryOp::Not, operand) => Ok(Value::Bool(!is_truthy(&self.eval(operand)?))),
            Expr::Unary(UnaryOp::Neg, operand) => match self.eval(operand)? {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| self.fail("integer overflow")),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(self.fail(format!("cannot negate a {} value", other.type_name()))),
            },
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                let result = is_truthy(&self.eval(lhs)?) && is_truthy(&self.eval(rhs)?);
                Ok(Value::Bool(result))
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                let result = is_truthy(&self.eval(lhs)?) || is_truthy(&self.eval(rhs)?);
                Ok(Value::Bool(result))
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                self.binary(*op, lhs, rhs)
            }
        }
    }

    fn property(&self, target: &Value, name: &str) -> Result<Value> {
        if target.is_null() {
            return Err(self.fail(format!("source is null for getProperty(null, \"{}\")", name)));
        }
        match self.scope.accessor().get_field(target, name) {
            FieldLookup::Present(v) => Ok(v),
            FieldLookup::Missing => Err(CompositionError::UnknownProperty {
                type_name: target.type_name().to_string(),
                property: name.to_string(),
            }),
        }
    }

    fn index(&self, target: &Value, index: &Value) -> Result<Value> {
        match (target, index) {
            (Value::List(items), Value::Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| {
                    self.fail(format!("index {} out of bounds for length {}", i, items.len()))
                }),
            (Value::Map(_) | Value::Record(_), Value::Text(key)) => self.property(target, key),
            (Value::Null, _) => Err(self.fail("cannot index a null value")),
            (t, i) => Err(self.fail(format!(
                "cannot index a {} value with a {} value",
                t.type_name(),
                i.type_name()
            ))),
        }
    }

    fn call(&self, target: &Value, method: Method) -> Result<Value> {
        let result = match (method, target) {
            (_, Value::Null) => None,
            (Method::Size | Method::Length, Value::List(items)) => Some(Value::from(items.len())),
            (Method::Size, Value::Map(entries)) => Some(Value::from(entries.len())),
            (Method::Size | Method::Length, Value::Text(s)) => Some(Value::from(s.chars().count())),
            (Method::IsEmpty, Value::List(items)) => Some(Value::Bool(items.is_empty())),
            (Method::IsEmpty, Value::Map(entries)) => Some(Value::Bool(entries.is_empty())),
            (Method::IsEmpty, Value::Text(s)) => Some(Value::Bool(s.is_empty())),
            (Method::Trim, Value::Text(s)) => Some(Value::from(s.trim())),
            (Method::ToString, v) => Some(Value::Text(v.to_string())),
            _ => None,
        };
        result.ok_or_else(|| {
            self.fail(format!(
                "method {:?} is not available on a {} value",
                method,
                target.type_name()
            ))
        })
    }

    fn binary(&self, op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
        match op {
            BinaryOp::Eq => Ok(Value::Bool(loose_eq(&lhs, &rhs))),
            BinaryOp::Ne => Ok(Value::Bool(!loose_eq(&lhs, &rhs))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ord = self.compare(&lhs, &rhs)?;
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ord == Ordering::Less,
                    BinaryOp::Le => ord != Ordering::Greater,
                    BinaryOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }))
            }
            BinaryOp::Add if matches!(lhs, Value::Text(_)) || matches!(rhs, Value::Text(_)) => {
                Ok(Value::Text(format!("{}{}", lhs, rhs)))
            }
            _ => self.arithmetic(op, &lhs, &rhs),
        }
    }

    fn compare(&self, lhs: &Value, rhs: &Value) -> Result<Ordering> {
        match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
            _ => match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => a
                    .partial_cmp(&b)
                    .ok_or_else(|| self.fail("cannot compare NaN")),
                _ => Err(self.fail(format!(
                    "cannot compare a {} value with a {} value",
                    lhs.type_name(),
                    rhs.type_name()
                ))),
            },
        }
    }

    fn arithmetic(&self, op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
        if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                BinaryOp::Div | BinaryOp::Rem if *b == 0 => {
                    return Err(self.fail("division by zero"))
                }
                BinaryOp::Div => a.checked_div(*b),
                BinaryOp::Rem => a.checked_rem(*b),
                _ => None,
            };
            return result.map(Value::Int).ok_or_else(|| self.fail("integer overflow"));
        }
        match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            })),
            _ => Err(self.fail(format!(
                "operator {:?} is not defined for {} and {}",
                op,
                lhs.type_name(),
                rhs.type_name()
            ))),
        }
    }
}

/// Equality with numeric coercion; null only equals null
fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            lhs.as_f64() == rhs.as_f64()
        }
        _ => lhs == rhs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlweave_types::{Record, StructuralAccessor};

    fn eval_with(src: &str, param: &Value) -> Result<Value> {
        let scope = VariableScope::new(param, Some("pg"), &StructuralAccessor);
        ExpressionEvaluator::evaluate(&Expression::parse(src).unwrap(), &scope)
    }

    fn truthy(src: &str, param: &Value) -> bool {
        let scope = VariableScope::new(param, None, &StructuralAccessor);
        ExpressionEvaluator::evaluate_boolean(&Expression::parse(src).unwrap(), &scope).unwrap()
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&Value::Int(0)));
        assert!(is_truthy(&Value::Int(-3)));
        assert!(!is_truthy(&Value::Float(0.0)));
        assert!(is_truthy(&Value::from("")));
        assert!(is_truthy(&Value::List(vec![])));
    }

    #[test]
    fn test_null_checks() {
        let p = Value::map([("name", Value::Null)]);
        assert!(!truthy("name != null", &p));
        assert!(truthy("name == null", &p));
        let p = Value::map([("name", "a")]);
        assert!(truthy("name != null and name != ''", &p));
    }

    #[test]
    fn test_numeric_coercion() {
        let p = Value::map([("n", Value::Int(2)), ("f", Value::Float(2.0))]);
        assert!(truthy("n == f", &p));
        assert!(truthy("n < 2.5", &p));
        assert_eq!(eval_with("n * 3 + 1", &p).unwrap(), Value::Int(7));
        assert_eq!(eval_with("7 % n", &p).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_concat() {
        let p = Value::map([("name", "bo")]);
        assert_eq!(
            eval_with("'%' + name + '%'", &p).unwrap(),
            Value::from("%bo%")
        );
    }

    #[test]
    fn test_methods() {
        let p = Value::map([("ids", Value::from(vec![1, 2, 3])), ("s", Value::from(" x "))]);
        assert_eq!(eval_with("ids.size()", &p).unwrap(), Value::Int(3));
        assert!(truthy("!ids.isEmpty()", &p));
        assert_eq!(eval_with("s.trim()", &p).unwrap(), Value::from("x"));
        assert_eq!(eval_with("ids[1]", &p).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_reserved_database_id() {
        assert!(truthy("_databaseId == null", &Value::Null));
        assert_eq!(
            eval_with("_databaseId", &Value::Null).unwrap(),
            Value::from("pg")
        );
    }

    #[test]
    fn test_property_of_null_fails() {
        let p = Value::map([("user", Value::Null)]);
        let err = eval_with("user.name", &p).unwrap_err();
        assert!(matches!(err, CompositionError::Expression { .. }));
    }

    #[test]
    fn test_undeclared_record_field_fails() {
        let p = Value::map([("u", Value::from(Record::new("User").with_field("id", 1)))]);
        assert_eq!(eval_with("u.id", &p).unwrap(), Value::Int(1));
        assert!(matches!(
            eval_with("u.email", &p).unwrap_err(),
            CompositionError::UnknownProperty { .. }
        ));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(eval_with("1 / 0", &Value::Null).is_err());
        assert_eq!(eval_with("1.0 / 4", &Value::Null).unwrap(), Value::Float(0.25));
    }

    #[test]
    fn test_iterable() {
        let p = Value::map([
            ("ids", Value::from(vec![10, 20])),
            ("m", Value::map([("a", 1)])),
            ("n", Value::Null),
            ("s", Value::from("x")),
        ]);
        let scope = VariableScope::new(&p, None, &StructuralAccessor);
        let iter = |src: &str| {
            ExpressionEvaluator::evaluate_iterable(&Expression::parse(src).unwrap(), &scope)
        };

        let items = iter("ids").unwrap();
        assert_eq!(items[1], LoopElement { index: Value::Int(1), item: Value::Int(20) });

        let entries = iter("m").unwrap();
        assert_eq!(entries[0], LoopElement { index: Value::from("a"), item: Value::Int(1) });

        assert!(matches!(iter("n").unwrap_err(), CompositionError::NullIterable { .. }));
        assert!(matches!(iter("s").unwrap_err(), CompositionError::NotIterable { .. }));
    }
}
