//! Expression evaluation against the case data document.

use std::collections::HashMap;

use serde_json::Value;

use crate::ast::{BinaryOp, Builtin, Expr, PathSegment};
use crate::error::ExpressionError;
use crate::parser::parse;

/// Bindings an expression is evaluated against: the document root plus
/// named variables (multi-instance evaluation binds `item` / `items`).
/// Variables shadow root fields of the same name.
#[derive(Debug)]
pub struct EvaluationContext<'a> {
    root: &'a Value,
    vars: HashMap<String, Value>,
}

impl<'a> EvaluationContext<'a> {
    /// A context over the given document with no variables.
    #[must_use]
    pub fn new(root: &'a Value) -> Self {
        Self {
            root,
            vars: HashMap::new(),
        }
    }

    /// Bind a variable.
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: Value) -> Self {
        self.vars.insert(name.into(), value);
        self
    }
}

/// The expression evaluator. Stateless; clone freely.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionEngine;

impl ExpressionEngine {
    /// Create an engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `expr` to a JSON value.
    pub fn evaluate(
        &self,
        expr: &str,
        ctx: &EvaluationContext<'_>,
    ) -> Result<Value, ExpressionError> {
        let ast = parse(expr)?;
        eval(&ast, expr, ctx)
    }

    /// Evaluate `expr` as a predicate; errors if the result is not boolean.
    pub fn evaluate_bool(
        &self,
        expr: &str,
        ctx: &EvaluationContext<'_>,
    ) -> Result<bool, ExpressionError> {
        match self.evaluate(expr, ctx)? {
            Value::Bool(b) => Ok(b),
            _ => Err(ExpressionError::NotABool {
                expr: expr.to_string(),
            }),
        }
    }
}

fn eval_err(expr: &str, message: impl Into<String>) -> ExpressionError {
    ExpressionError::Eval {
        expr: expr.to_string(),
        message: message.into(),
    }
}

fn eval(ast: &Expr, expr: &str, ctx: &EvaluationContext<'_>) -> Result<Value, ExpressionError> {
    match ast {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(n) => Ok(Value::from(*n)),
        Expr::Float(f) => Ok(Value::from(*f)),
        Expr::Str(s) => Ok(Value::from(s.clone())),
        Expr::Path(segments) => Ok(resolve_path(segments, ctx)),
        Expr::Not(inner) => match eval(inner, expr, ctx)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(eval_err(expr, format!("cannot negate {}", kind(&other)))),
        },
        Expr::Neg(inner) => match eval(inner, expr, ctx)? {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::from(-i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::from(-f))
                } else {
                    Err(eval_err(expr, "cannot negate number"))
                }
            }
            other => Err(eval_err(expr, format!("cannot negate {}", kind(&other)))),
        },
        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, expr, ctx),
        Expr::Call { builtin, arg } => eval_builtin(*builtin, arg, expr, ctx),
    }
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    expr: &str,
    ctx: &EvaluationContext<'_>,
) -> Result<Value, ExpressionError> {
    // Logical operators short-circuit.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let left = match eval(lhs, expr, ctx)? {
            Value::Bool(b) => b,
            other => {
                return Err(eval_err(
                    expr,
                    format!("logical operand is {}, expected bool", kind(&other)),
                ));
            }
        };
        let short = match op {
            BinaryOp::And => !left,
            _ => left,
        };
        if short {
            return Ok(Value::Bool(left));
        }
        return match eval(rhs, expr, ctx)? {
            Value::Bool(b) => Ok(Value::Bool(b)),
            other => Err(eval_err(
                expr,
                format!("logical operand is {}, expected bool", kind(&other)),
            )),
        };
    }

    let left = eval(lhs, expr, ctx)?;
    let right = eval(rhs, expr, ctx)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(value_eq(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!value_eq(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = value_cmp(&left, &right)
                .ok_or_else(|| {
                    eval_err(
                        expr,
                        format!("cannot compare {} with {}", kind(&left), kind(&right)),
                    )
                })?;
            let holds = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(holds))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Rem => {
            arith(op, &left, &right, expr)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn arith(op: BinaryOp, left: &Value, right: &Value, expr: &str) -> Result<Value, ExpressionError> {
    let (Value::Number(l), Value::Number(r)) = (left, right) else {
        return Err(eval_err(
            expr,
            format!("arithmetic on {} and {}", kind(left), kind(right)),
        ));
    };
    if let (Some(a), Some(b)) = (l.as_i64(), r.as_i64()) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            _ => {
                if b == 0 {
                    return Err(eval_err(expr, "remainder by zero"));
                }
                a.checked_rem(b)
            }
        };
        return result
            .map(Value::from)
            .ok_or_else(|| eval_err(expr, "integer overflow"));
    }
    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Err(eval_err(expr, "non-finite number"));
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        _ => a % b,
    };
    Ok(Value::from(result))
}

fn eval_builtin(
    builtin: Builtin,
    arg: &Expr,
    expr: &str,
    ctx: &EvaluationContext<'_>,
) -> Result<Value, ExpressionError> {
    match builtin {
        Builtin::Exists => {
            let Expr::Path(segments) = arg else {
                return Err(eval_err(expr, "exists() takes a path argument"));
            };
            Ok(Value::Bool(!resolve_path(segments, ctx).is_null()))
        }
        Builtin::Size => match eval(arg, expr, ctx)? {
            Value::Array(items) => Ok(Value::from(items.len())),
            Value::Object(map) => Ok(Value::from(map.len())),
            Value::String(s) => Ok(Value::from(s.chars().count())),
            other => Err(eval_err(expr, format!("size() of {}", kind(&other)))),
        },
        Builtin::Sum => match eval(arg, expr, ctx)? {
            Value::Array(items) => {
                let mut int_sum = 0i64;
                let mut float_sum = 0f64;
                let mut any_float = false;
                for item in &items {
                    match item {
                        Value::Number(n) if n.as_i64().is_some() && !any_float => {
                            int_sum = int_sum
                                .checked_add(n.as_i64().unwrap_or(0))
                                .ok_or_else(|| eval_err(expr, "integer overflow"))?;
                        }
                        Value::Number(n) => {
                            if !any_float {
                                any_float = true;
                                float_sum = int_sum as f64;
                            }
                            float_sum += n.as_f64().unwrap_or(0.0);
                        }
                        other => {
                            return Err(eval_err(
                                expr,
                                format!("sum() over non-numeric {}", kind(other)),
                            ));
                        }
                    }
                }
                if any_float {
                    Ok(Value::from(float_sum))
                } else {
                    Ok(Value::from(int_sum))
                }
            }
            other => Err(eval_err(expr, format!("sum() of {}", kind(&other)))),
        },
    }
}

fn resolve_path(segments: &[PathSegment], ctx: &EvaluationContext<'_>) -> Value {
    let (mut current, rest) = match segments.first() {
        Some(PathSegment::Field(name)) if ctx.vars.contains_key(name) => {
            (ctx.vars[name].clone(), &segments[1..])
        }
        _ => (ctx.root.clone(), segments),
    };
    for segment in rest {
        current = match (segment, current) {
            (PathSegment::Field(name), Value::Object(mut map)) => {
                map.remove(name).unwrap_or(Value::Null)
            }
            (PathSegment::Index(i), Value::Array(mut items)) => {
                if *i < items.len() {
                    items.swap_remove(*i)
                } else {
                    Value::Null
                }
            }
            _ => Value::Null,
        };
        if current.is_null() {
            break;
        }
    }
    current
}

fn value_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        // Numeric equality bridges int/float representations.
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON || a == b,
            _ => l == r,
        },
        _ => left == right,
    }
}

fn value_cmp(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "data": {
                "x": 1,
                "name": "order-7",
                "items": [{"qty": 2}, {"qty": 3}],
                "flag": true,
                "price": 9.5
            }
        })
    }

    #[rstest]
    #[case("data.x == 1", true)]
    #[case("data.x != 1", false)]
    #[case("data.x < 2", true)]
    #[case("data.price >= 9.5", true)]
    #[case("data.name == 'order-7'", true)]
    #[case("data.flag && data.x == 1", true)]
    #[case("!data.flag || data.x == 1", true)]
    #[case("data.missing == 1", false)]
    #[case("exists(data.x)", true)]
    #[case("exists(data.missing)", false)]
    #[case("size(data.items) == 2", true)]
    #[case("data.items[1].qty == 3", true)]
    #[case("data.x + 1 == 2", true)]
    #[case("data.x * 3 > 2", true)]
    fn predicates(#[case] expr: &str, #[case] expected: bool) {
        let doc = doc();
        let ctx = EvaluationContext::new(&doc);
        let engine = ExpressionEngine::new();
        assert_eq!(engine.evaluate_bool(expr, &ctx).unwrap(), expected, "{expr}");
    }

    #[test]
    fn evaluate_returns_values() {
        let doc = doc();
        let ctx = EvaluationContext::new(&doc);
        let engine = ExpressionEngine::new();
        assert_eq!(engine.evaluate("data.items", &ctx).unwrap(), doc["data"]["items"]);
        assert_eq!(engine.evaluate("data.x", &ctx).unwrap(), json!(1));
        assert_eq!(engine.evaluate("'lit'", &ctx).unwrap(), json!("lit"));
    }

    #[test]
    fn missing_path_is_null() {
        let doc = doc();
        let ctx = EvaluationContext::new(&doc);
        let engine = ExpressionEngine::new();
        assert_eq!(engine.evaluate("data.nope.deeper", &ctx).unwrap(), Value::Null);
    }

    #[test]
    fn variables_shadow_root() {
        let doc = doc();
        let ctx = EvaluationContext::new(&doc).with_var("item", json!({"qty": 9}));
        let engine = ExpressionEngine::new();
        assert_eq!(engine.evaluate("item.qty", &ctx).unwrap(), json!(9));
        // Root still reachable for non-variable heads.
        assert_eq!(engine.evaluate("data.x", &ctx).unwrap(), json!(1));
    }

    #[test]
    fn sum_over_numbers() {
        let doc = json!({"ns": [1, 2, 3]});
        let ctx = EvaluationContext::new(&doc);
        let engine = ExpressionEngine::new();
        assert_eq!(engine.evaluate("sum(ns)", &ctx).unwrap(), json!(6));
    }

    #[test]
    fn sum_promotes_to_float() {
        let doc = json!({"ns": [1, 2.5]});
        let ctx = EvaluationContext::new(&doc);
        let engine = ExpressionEngine::new();
        assert_eq!(engine.evaluate("sum(ns)", &ctx).unwrap(), json!(3.5));
    }

    #[test]
    fn non_bool_predicate_is_error() {
        let doc = doc();
        let ctx = EvaluationContext::new(&doc);
        let engine = ExpressionEngine::new();
        let err = engine.evaluate_bool("data.x", &ctx).unwrap_err();
        assert!(matches!(err, ExpressionError::NotABool { .. }));
    }

    #[test]
    fn comparing_mixed_types_is_error() {
        let doc = doc();
        let ctx = EvaluationContext::new(&doc);
        let engine = ExpressionEngine::new();
        assert!(engine.evaluate_bool("data.name > 1", &ctx).is_err());
    }

    #[test]
    fn logical_on_non_bool_is_error() {
        let doc = doc();
        let ctx = EvaluationContext::new(&doc);
        let engine = ExpressionEngine::new();
        assert!(engine.evaluate_bool("data.x && true", &ctx).is_err());
    }

    #[test]
    fn short_circuit_skips_rhs_errors() {
        let doc = doc();
        let ctx = EvaluationContext::new(&doc);
        let engine = ExpressionEngine::new();
        // RHS would error (logical on number) but is never evaluated.
        assert!(!engine.evaluate_bool("false && (data.x && true)", &ctx).unwrap());
        assert!(engine.evaluate_bool("true || (data.x && true)", &ctx).unwrap());
    }

    #[test]
    fn remainder_by_zero_is_error() {
        let doc = doc();
        let ctx = EvaluationContext::new(&doc);
        let engine = ExpressionEngine::new();
        assert!(engine.evaluate("data.x % 0", &ctx).is_err());
    }
}
