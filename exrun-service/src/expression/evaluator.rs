// Expression Evaluator
// Evaluates expression ASTs against a document snapshot

use crate::document::Document;
use crate::expression::functions::BuiltinFunctions;
use crate::expression::parser::{BinaryOp, Expr, ExprParser, Reference, ReferencePart, UnaryOp};
use crate::expression::value::{loose_eq, number, ValueExt};
use crate::expression::ExpressionEvaluator;

use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;

/// Evaluation error
#[derive(Debug, Clone)]
pub struct EvalError {
    pub message: String,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evaluation error: {}", self.message)
    }
}

impl std::error::Error for EvalError {}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Walks an expression tree. Bare identifiers name top-level document keys.
pub struct Evaluator<'a> {
    document: &'a Document,
    functions: BuiltinFunctions,
}

impl<'a> Evaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self {
            document,
            functions: BuiltinFunctions::new(),
        }
    }

    /// Evaluate an expression
    pub fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(number(*n)),
            Expr::String(s) => Ok(Value::String(s.clone())),

            Expr::Reference(reference) => self.eval_reference(reference),

            Expr::FunctionCall { name, args } => {
                let evaluated = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.functions.call(name, evaluated)
            }

            Expr::Index { object, index } => {
                let obj = self.eval(object)?;
                let idx = self.eval(index)?;
                index_value(&obj, &idx)
            }

            Expr::Member { object, property } => {
                let obj = self.eval(object)?;
                member_value(&obj, property)
            }

            Expr::Unary { op, expr } => {
                let val = self.eval(expr)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!val.is_truthy())),
                    UnaryOp::Neg => val
                        .coerce_f64()
                        .filter(|_| !val.is_string())
                        .map(|n| number(-n))
                        .ok_or_else(|| EvalError::new("cannot negate non-number")),
                }
            }

            // && and || short-circuit and yield booleans
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => Ok(Value::Bool(
                self.eval(left)?.is_truthy() && self.eval(right)?.is_truthy(),
            )),
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => Ok(Value::Bool(
                self.eval(left)?.is_truthy() || self.eval(right)?.is_truthy(),
            )),
            Expr::Binary { op, left, right } => {
                let left_val = self.eval(left)?;
                let right_val = self.eval(right)?;
                eval_binary(*op, &left_val, &right_val)
            }

            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.eval(then_expr)
                } else {
                    self.eval(else_expr)
                }
            }

            Expr::Array(items) => items
                .iter()
                .map(|e| self.eval(e))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),

            Expr::Object(pairs) => {
                let mut map = Map::new();
                for (key, value_expr) in pairs {
                    map.insert(key.clone(), self.eval(value_expr)?);
                }
                Ok(Value::Object(map))
            }
        }
    }

    fn eval_reference(&self, reference: &Reference) -> Result<Value, EvalError> {
        let mut current = Cow::Borrowed(self.document);

        for part in &reference.parts {
            let next = match part {
                ReferencePart::Property(name) => member_value(&current, name)?,
                ReferencePart::Index(index_expr) => {
                    let index = self.eval(index_expr)?;
                    index_value(&current, &index)?
                }
            };
            current = Cow::Owned(next);
        }

        Ok(current.into_owned())
    }
}

fn index_value(object: &Value, index: &Value) -> Result<Value, EvalError> {
    match (object, index) {
        (Value::Array(items), Value::Number(n)) => {
            let i = n
                .as_i64()
                .ok_or_else(|| EvalError::new(format!("invalid array index {}", n)))?;
            // negative indices count from the end
            let position = if i < 0 { items.len() as i64 + i } else { i };
            usize::try_from(position)
                .ok()
                .and_then(|p| items.get(p))
                .cloned()
                .ok_or_else(|| EvalError::new(format!("array index {} out of bounds", i)))
        }
        (Value::Object(map), key) => Ok(map.get(&key.as_string()).cloned().unwrap_or(Value::Null)),
        (Value::String(s), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| s.chars().nth(i as usize))
            .map(|c| Value::String(c.to_string()))
            .ok_or_else(|| EvalError::new(format!("string index {} out of bounds", n))),
        _ => Err(EvalError::new(format!("cannot index {} with {}", object, index))),
    }
}

fn member_value(object: &Value, property: &str) -> Result<Value, EvalError> {
    match object {
        Value::Object(map) => Ok(map.get(property).cloned().unwrap_or(Value::Null)),
        Value::Array(items) if property == "length" => Ok(number(items.len() as f64)),
        Value::String(s) if property == "length" => Ok(number(s.chars().count() as f64)),
        Value::Null => Ok(Value::Null),
        _ => Err(EvalError::new(format!(
            "cannot access property '{}' on {}",
            property, object
        ))),
    }
}

fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(format!("{}{}", left.as_string(), right.as_string())))
            }
            (Value::Array(a), Value::Array(b)) => {
                Ok(Value::Array(a.iter().chain(b).cloned().collect()))
            }
            _ => numeric_op(left, right, |a, b| Ok(a + b)),
        },
        BinaryOp::Sub => numeric_op(left, right, |a, b| Ok(a - b)),
        BinaryOp::Mul => numeric_op(left, right, |a, b| Ok(a * b)),
        BinaryOp::Div => numeric_op(left, right, |a, b| {
            if b == 0.0 {
                Err(EvalError::new("division by zero"))
            } else {
                Ok(a / b)
            }
        }),
        BinaryOp::Mod => numeric_op(left, right, |a, b| {
            if b == 0.0 {
                Err(EvalError::new("modulo by zero"))
            } else {
                Ok(a % b)
            }
        }),

        BinaryOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => {
                    let (a, b) = operands(left, right)?;
                    a.partial_cmp(&b)
                        .ok_or_else(|| EvalError::new("operands are not comparable"))?
                }
            };
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }

        BinaryOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
    }
}

fn operands(left: &Value, right: &Value) -> Result<(f64, f64), EvalError> {
    let a = left
        .coerce_f64()
        .ok_or_else(|| EvalError::new(format!("left operand {} is not a number", left)))?;
    let b = right
        .coerce_f64()
        .ok_or_else(|| EvalError::new(format!("right operand {} is not a number", right)))?;
    Ok((a, b))
}

fn numeric_op<F>(left: &Value, right: &Value, op: F) -> Result<Value, EvalError>
where
    F: FnOnce(f64, f64) -> Result<f64, EvalError>,
{
    let (a, b) = operands(left, right)?;
    op(a, b).map(number)
}

/// Constrained expression language over the document: literals, references,
/// arithmetic, comparison, logic, ternaries and a fixed function set.
#[derive(Debug, Default)]
pub struct ExpressionEngine;

impl ExpressionEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ExpressionEvaluator for ExpressionEngine {
    fn evaluate(&self, expression: &str, document: &Document) -> Result<Document, EvalError> {
        let ast = ExprParser::parse_str(expression)
            .map_err(|e| EvalError::new(format!("{} in '{}'", e, expression)))?;
        Evaluator::new(document).eval(&ast)
    }
}
