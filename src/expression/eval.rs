//! Expression evaluation
//!
//! Each interpolation, list item and object value is evaluated on its own and
//! the failures are collected, so a caller sees every unavailable namespace at
//! once. When the evaluator rejects an expression, its free traversals are
//! walked against the context to find which namespace or attribute is
//! missing.

use super::ast::{eager_variables, Expr, TemplatePart, Traversal, Traverser};
use super::convert::{from_hcl, to_display_string, to_f64, to_hcl, type_name};
use super::{functions, EvalError};
use crate::core::context::EvalContext;
use hcl::eval::{Context, ErrorKind, Evaluate};
use hcl::expr::{Expression, Operation, TraversalOperator};
use serde_json::{Map, Value};

pub type EvalResult = Result<Value, Vec<EvalError>>;

impl Expr {
    /// Evaluate against a context
    pub fn evaluate(&self, ctx: &EvalContext) -> EvalResult {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Hcl { expr, .. } => evaluate_hcl(expr, ctx),
            Expr::Template { parts, .. } => eval_template(parts, ctx),
            Expr::List(items) => {
                let values = collect(items.iter().map(|item| item.evaluate(ctx)))?;
                Ok(Value::Array(values))
            }
            Expr::Object(items) => {
                let mut map = Map::new();
                let mut errors = Vec::new();
                for (key, value) in items {
                    match value.evaluate(ctx) {
                        Ok(value) => {
                            map.insert(key.clone(), value);
                        }
                        Err(errs) => errors.extend(errs),
                    }
                }
                if errors.is_empty() {
                    Ok(Value::Object(map))
                } else {
                    Err(errors)
                }
            }
        }
    }
}

/// Read a condition result, rejecting anything that is not a bool
pub fn expect_bool(value: &Value) -> Result<bool, &'static str> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(type_name(other)),
    }
}

fn collect(results: impl Iterator<Item = EvalResult>) -> Result<Vec<Value>, Vec<EvalError>> {
    let mut values = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(errs) => errors.extend(errs),
        }
    }
    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors)
    }
}

fn eval_template(parts: &[TemplatePart], ctx: &EvalContext) -> EvalResult {
    let mut out = String::new();
    let mut errors = Vec::new();
    for part in parts {
        match part {
            TemplatePart::Literal(text) => out.push_str(text),
            TemplatePart::Interpolation(expr) => match evaluate_hcl(expr, ctx) {
                Ok(value) => match to_display_string(&value) {
                    Ok(s) => out.push_str(&s),
                    Err(_) => errors.push(EvalError::TypeMismatch(format!(
                        "cannot interpolate a {} value into a string",
                        type_name(&value)
                    ))),
                },
                Err(errs) => errors.extend(errs),
            },
        }
    }
    if errors.is_empty() {
        Ok(Value::String(out))
    } else {
        Err(errors)
    }
}

fn evaluate_hcl(expr: &Expression, ctx: &EvalContext) -> EvalResult {
    let eager = eager_variables(expr);

    let late: Vec<EvalError> = eager.iter().filter_map(|t| late_binding(t, ctx)).collect();
    if !late.is_empty() {
        return Err(dedup(late));
    }

    let mut expr = expr.clone();
    expand_guarded(&mut expr, ctx)?;

    let mut scope = Context::new();
    for (namespace, value) in &ctx.variables {
        scope.declare_var(namespace.as_str(), to_hcl(value));
    }
    functions::declare(&mut scope);

    match expr.evaluate(&scope) {
        Ok(value) => Ok(from_hcl(value)),
        Err(error) => {
            let missing: Vec<EvalError> = eager.iter().filter_map(|t| check_traversal(t, ctx).err()).collect();
            if missing.is_empty() {
                Err(vec![map_error(&error)])
            } else {
                Err(dedup(missing))
            }
        }
    }
}

fn map_error(error: &hcl::eval::Error) -> EvalError {
    match error.kind() {
        ErrorKind::UndefinedFunc(name) => EvalError::UnknownFunction(name.to_string()),
        ErrorKind::FuncCall(name, message) => EvalError::FunctionCall {
            name: name.to_string(),
            message: message.to_string(),
        },
        _ => EvalError::TypeMismatch(error.to_string()),
    }
}

fn dedup(errors: Vec<EvalError>) -> Vec<EvalError> {
    let mut out: Vec<EvalError> = Vec::with_capacity(errors.len());
    for error in errors {
        if !out.contains(&error) {
            out.push(error);
        }
    }
    out
}

/// Replace `try(...)` and `can(...)` calls with the value they produce
fn expand_guarded(expr: &mut Expression, ctx: &EvalContext) -> Result<(), Vec<EvalError>> {
    if let Some(value) = guarded_value(expr, ctx)? {
        *expr = value;
        return Ok(());
    }
    match expr {
        Expression::FuncCall(call) => call.args.iter_mut().try_for_each(|arg| expand_guarded(arg, ctx)),
        Expression::Parenthesis(inner) => expand_guarded(inner, ctx),
        Expression::Conditional(cond) => {
            expand_guarded(&mut cond.cond_expr, ctx)?;
            expand_guarded(&mut cond.true_expr, ctx)?;
            expand_guarded(&mut cond.false_expr, ctx)
        }
        Expression::Operation(op) => expand_operation(op, ctx),
        Expression::Traversal(traversal) => {
            expand_guarded(&mut traversal.expr, ctx)?;
            for op in traversal.operators.iter_mut() {
                if let TraversalOperator::Index(key) = op {
                    expand_guarded(key, ctx)?;
                }
            }
            Ok(())
        }
        Expression::Array(items) => items.iter_mut().try_for_each(|item| expand_guarded(item, ctx)),
        Expression::Object(items) => items.values_mut().try_for_each(|value| expand_guarded(value, ctx)),
        _ => Ok(()),
    }
}

fn expand_operation(op: &mut Operation, ctx: &EvalContext) -> Result<(), Vec<EvalError>> {
    match op {
        Operation::Unary(unary) => expand_guarded(&mut unary.expr, ctx),
        Operation::Binary(binary) => {
            expand_guarded(&mut binary.lhs_expr, ctx)?;
            expand_guarded(&mut binary.rhs_expr, ctx)
        }
    }
}

fn guarded_value(expr: &Expression, ctx: &EvalContext) -> Result<Option<Expression>, Vec<EvalError>> {
    let Expression::FuncCall(call) = expr else {
        return Ok(None);
    };
    let name = call.name.to_string();
    match name.as_str() {
        "try" => {
            let mut reasons = Vec::new();
            for arg in &call.args {
                match evaluate_hcl(arg, ctx) {
                    Ok(value) => return Ok(Some(Expression::from(to_hcl(&value)))),
                    Err(errs) => reasons.extend(errs.iter().map(|e| e.to_string())),
                }
            }
            Err(vec![EvalError::FunctionCall {
                name,
                message: format!("no expression succeeded: {}", reasons.join("; ")),
            }])
        }
        "can" => match call.args.as_slice() {
            [arg] => Ok(Some(Expression::Bool(evaluate_hcl(arg, ctx).is_ok()))),
            _ => Err(vec![EvalError::FunctionCall {
                name,
                message: "expects exactly one argument".to_string(),
            }]),
        },
        _ => Ok(None),
    }
}

fn late_binding(traversal: &Traversal, ctx: &EvalContext) -> Option<EvalError> {
    if traversal.root != "var" {
        return None;
    }
    let Some(Traverser::Attr(name)) = traversal.steps.first() else {
        return None;
    };
    ctx.late_binding_resources(name).map(|resources| EvalError::LateBinding {
        variable: name.clone(),
        resources: resources.to_vec(),
    })
}

fn check_traversal(traversal: &Traversal, ctx: &EvalContext) -> Result<(), EvalError> {
    let mut current = ctx
        .get(&traversal.root)
        .ok_or_else(|| EvalError::UnknownVariable {
            name: traversal.root.clone(),
        })?;

    let mut walked = traversal.root.clone();
    for step in &traversal.steps {
        current = match step {
            Traverser::Attr(name) => match current {
                Value::Object(map) => map.get(name),
                _ => None,
            }
            .ok_or_else(|| EvalError::UnsupportedAttribute {
                root: traversal.root.clone(),
                traversal: walked.clone(),
                attribute: name.clone(),
            })?,
            Traverser::Index(key) => index_ref(current, key).map_err(|message| EvalError::InvalidIndex {
                root: traversal.root.clone(),
                traversal: walked.clone(),
                message,
            })?,
        };
        walked = match step {
            Traverser::Attr(name) => format!("{}.{}", walked, name),
            Traverser::Index(key) => format!("{}[{}]", walked, key),
        };
    }
    Ok(())
}

fn index_ref<'v>(collection: &'v Value, key: &Value) -> Result<&'v Value, String> {
    match collection {
        Value::Array(items) => {
            let idx = to_f64(key).map_err(|_| format!("a list index must be a number, got {}", type_name(key)))?;
            if idx < 0.0 || idx.fract() != 0.0 {
                return Err(format!("invalid list index {}", idx));
            }
            items
                .get(idx as usize)
                .ok_or_else(|| format!("index {} out of range for list of length {}", idx, items.len()))
        }
        Value::Object(map) => {
            let name = to_display_string(key)
                .map_err(|_| format!("an object key must be a string, got {}", type_name(key)))?;
            map.get(&name)
                .ok_or_else(|| format!("the given key \"{}\" does not identify an element", name))
        }
        other => Err(format!("cannot index a {} value", type_name(other))),
    }
}
