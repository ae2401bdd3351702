//! Expression evaluation.
//!
//! Evaluation is async only so that `store.*` lookups and pipes can suspend;
//! nodes are always evaluated one at a time, left to right.

use std::cmp::Ordering;

use super::context::ExecutionContext;
use super::value::{format_number, Value};
use super::BoxFuture;
use crate::ast::{BinaryOp, Expr, LogicalOp, MemberSegment, UnaryOp};
use crate::registry::PipeResolver;

/// Root name whose members resolve against the scope chain only.
pub const SCOPE_ROOT: &str = "scope";
/// Root name whose members are fetched from the store provider.
pub const STORE_ROOT: &str = "store";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} (in {kind} expression `{node}`)")]
pub struct EvaluationError {
    pub kind: &'static str,
    pub node: Expr,
    pub message: String,
}

impl EvaluationError {
    pub fn new(node: &Expr, message: impl Into<String>) -> Self {
        Self {
            kind: node.kind(),
            node: node.clone(),
            message: message.into(),
        }
    }
}

pub struct Evaluator<'a> {
    pipes: Option<&'a dyn PipeResolver>,
}

impl<'a> Evaluator<'a> {
    pub fn new(pipes: Option<&'a dyn PipeResolver>) -> Self {
        Self { pipes }
    }

    pub fn evaluate<'b>(
        &'b self,
        expr: &'b Expr,
        ctx: &'b ExecutionContext,
    ) -> BoxFuture<'b, Result<Value, EvaluationError>>
    where
        'a: 'b,
    {
        Box::pin(async move {
            match expr {
                Expr::Identifier { name } => Ok(resolve_identifier(name, ctx)),
                Expr::StringLiteral { value } => Ok(Value::Str(value.clone())),
                Expr::NumberLiteral { value } => Ok(Value::Number(*value)),
                Expr::BoolLiteral { value } => Ok(Value::Bool(*value)),
                Expr::NullLiteral => Ok(Value::Null),
                Expr::Member { object, path, .. } => {
                    self.eval_member(expr, object, path, ctx).await
                }
                Expr::Unary { op, operand } => {
                    let value = self.evaluate(operand, ctx).await?;
                    apply_unary(expr, *op, value)
                }
                Expr::Binary { left, op, right } => {
                    let l = self.evaluate(left, ctx).await?;
                    let r = self.evaluate(right, ctx).await?;
                    apply_binary(expr, *op, &l, &r)
                }
                Expr::Logical { left, op, right } => {
                    let l = self.evaluate(left, ctx).await?;
                    match op {
                        LogicalOp::And if !l.is_truthy() => Ok(l),
                        LogicalOp::Or if l.is_truthy() => Ok(l),
                        _ => self.evaluate(right, ctx).await,
                    }
                }
                Expr::ArrayLiteral { elements } => {
                    let mut items = Vec::with_capacity(elements.len());
                    for element in elements {
                        items.push(self.evaluate(element, ctx).await?);
                    }
                    Ok(Value::List(items))
                }
                Expr::Pipe { input, segments } => {
                    let mut value = self.evaluate(input, ctx).await?;
                    for segment in segments {
                        let mut args = Vec::with_capacity(segment.args.len());
                        for arg in &segment.args {
                            args.push(self.evaluate(arg, ctx).await?);
                        }
                        let resolver = self.pipes.ok_or_else(|| {
                            EvaluationError::new(
                                expr,
                                format!("No pipe resolver configured for pipe '{}'", segment.name),
                            )
                        })?;
                        let pipe = resolver.get(&segment.name).await.ok_or_else(|| {
                            EvaluationError::new(expr, format!("Unknown pipe '{}'", segment.name))
                        })?;
                        value = pipe.execute(value, args).await.map_err(|message| {
                            EvaluationError::new(
                                expr,
                                format!("Pipe '{}' failed: {}", segment.name, message),
                            )
                        })?;
                    }
                    Ok(value)
                }
                Expr::Mapper { source, target } => {
                    let value = self.evaluate(source, ctx).await?;
                    Ok(map_field(&value, target))
                }
            }
        })
    }

    async fn eval_member(
        &self,
        node: &Expr,
        object: &Expr,
        path: &[MemberSegment],
        ctx: &ExecutionContext,
    ) -> Result<Value, EvaluationError> {
        if let Expr::Identifier { name } = object {
            if name == SCOPE_ROOT && !path.is_empty() {
                let keys = self.segment_keys(node, path, ctx).await?;
                return Ok(match ctx.scope.lookup(&keys[0]) {
                    Some(root) => walk(root, &keys[1..]),
                    None => Value::Null,
                });
            }
            if name == STORE_ROOT && !path.is_empty() {
                let keys = self.segment_keys(node, path, ctx).await?;
                return Ok(match &ctx.store {
                    Some(store) => store.get(&keys.join(".")).await.unwrap_or(Value::Null),
                    None => Value::Null,
                });
            }
        }

        let base = self.evaluate(object, ctx).await?;
        let keys = self.segment_keys(node, path, ctx).await?;
        Ok(walk(&base, &keys))
    }

    async fn segment_keys(
        &self,
        node: &Expr,
        path: &[MemberSegment],
        ctx: &ExecutionContext,
    ) -> Result<Vec<String>, EvaluationError> {
        let mut keys = Vec::with_capacity(path.len());
        for segment in path {
            match segment {
                MemberSegment::Field(name) => keys.push(name.clone()),
                MemberSegment::Index(index) => match self.evaluate(index, ctx).await? {
                    Value::Str(s) => keys.push(s),
                    Value::Number(n) => keys.push(format_number(n)),
                    other => {
                        return Err(EvaluationError::new(
                            node,
                            format!("Cannot use {} as a member key", other.type_name()),
                        ))
                    }
                },
            }
        }
        Ok(keys)
    }
}

/// Scope first, then the persistent `data` namespace; missing is `null`.
pub fn resolve_identifier(name: &str, ctx: &ExecutionContext) -> Value {
    ctx.scope
        .lookup(name)
        .or_else(|| ctx.data.get(name))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Lenient navigation: a missing key anywhere along the path yields `null`.
fn walk(root: &Value, keys: &[String]) -> Value {
    let mut current = root;
    for (i, key) in keys.iter().enumerate() {
        match current.get(key) {
            Some(next) => current = next,
            None => {
                let is_last = i + 1 == keys.len();
                return match (current, key.as_str()) {
                    (Value::List(items), "length") if is_last => Value::from(items.len()),
                    (Value::Str(s), "length") if is_last => Value::from(s.chars().count()),
                    _ => Value::Null,
                };
            }
        }
    }
    current.clone()
}

fn map_field(value: &Value, field: &str) -> Value {
    match value {
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| item.get(field).cloned().unwrap_or(Value::Null))
                .collect(),
        ),
        Value::Object(fields) => fields.get(field).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn apply_unary(node: &Expr, op: UnaryOp, value: Value) -> Result<Value, EvaluationError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::Neg => match value {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(EvaluationError::new(
                node,
                format!("Cannot negate {}", other.type_name()),
            )),
        },
        UnaryOp::Plus => match value {
            Value::Number(n) => Ok(Value::Number(n)),
            Value::Bool(b) => Ok(Value::Number(if b { 1.0 } else { 0.0 })),
            Value::Null => Ok(Value::Number(0.0)),
            Value::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Ok(Value::Number(0.0))
                } else {
                    Ok(Value::Number(trimmed.parse().unwrap_or(f64::NAN)))
                }
            }
            other => Err(EvaluationError::new(
                node,
                format!("Cannot convert {} to a number", other.type_name()),
            )),
        },
    }
}

fn apply_binary(node: &Expr, op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvaluationError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => {
                    return Err(EvaluationError::new(
                        node,
                        format!(
                            "Cannot compare {} with {} using '{}'",
                            left.type_name(),
                            right.type_name(),
                            op
                        ),
                    ))
                }
            };
            // NaN compares false against everything
            let result = match ordering {
                None => false,
                Some(ord) => match op {
                    BinaryOp::Lt => ord == Ordering::Less,
                    BinaryOp::LtEq => ord != Ordering::Greater,
                    BinaryOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                },
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::Str(format!("{}{}", left, right))),
            (Value::List(a), Value::List(b)) => {
                let mut combined = a.clone();
                combined.extend(b.iter().cloned());
                Ok(Value::List(combined))
            }
            _ => Err(type_mismatch(node, op, left, right)),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (a, b) = match (left, right) {
                (Value::Number(a), Value::Number(b)) => (*a, *b),
                _ => return Err(type_mismatch(node, op, left, right)),
            };
            // IEEE semantics: x / 0 is ±Infinity (or NaN), never an error
            let result = match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            };
            Ok(Value::Number(result))
        }
    }
}

fn type_mismatch(node: &Expr, op: BinaryOp, left: &Value, right: &Value) -> EvaluationError {
    EvaluationError::new(
        node,
        format!(
            "Cannot apply '{}' to {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ),
    )
}
