//! Two-phase attribute resolution
//!
//! At decode time every attribute is either evaluated to a concrete value
//! or deferred to run time. Deferral is only allowed for failures that are
//! expected before execution (a step that has not run yet, a parameter, an
//! `each` value, ...). Anything else is a configuration error.
//!
//! The same expression is re-evaluated at run time through
//! [`evaluate_attribute`] against the full context.

use crate::core::body::Attribute;
use crate::core::context::{
    EvalContext, NAMESPACE_CONNECTION, NAMESPACE_CREDENTIAL, NAMESPACE_EACH, NAMESPACE_LOOP,
    NAMESPACE_PARAM, NAMESPACE_RESULT, NAMESPACE_RETRY, NAMESPACE_STEP, NAMESPACE_VAR,
};
use crate::core::dependency::dependencies_from_expr;
use crate::core::error::{Diagnostic, Diagnostics, PipelineError};
use crate::expression::convert::{self, ConversionError};
use crate::expression::eval::expect_bool;
use crate::expression::{EvalError, Expr, Traverser};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Attribute whose param reference is only resolvable at run time
pub const ATTRIBUTE_PIPELINE: &str = "pipeline";

/// Anything that owns dependency sets and an unresolved attribute map
///
/// Implemented by steps, outputs, triggers and the per-step policy blocks.
/// Policy blocks forward dependency appends to their parent step.
pub trait ResolutionTarget {
    fn append_depends_on(&mut self, names: &[String]);
    fn append_credential_depends_on(&mut self, names: &[String]);
    fn append_connection_depends_on(&mut self, names: &[String]);
    fn add_unresolved_attribute(&mut self, name: &str, expr: &Expr);

    /// Location used in diagnostics
    fn subject(&self) -> String;
}

/// Unresolved attribute expressions keyed by attribute name
pub type UnresolvedAttributes = BTreeMap<String, Expr>;

/// Resolve an attribute now, or record it for run time.
///
/// Returns `Ok(Some(value))` when the attribute evaluated, `Ok(None)` when it
/// was deferred (it is then in the target's unresolved attributes), and the
/// diagnostics when evaluation failed for a reason that cannot be deferred.
///
/// `results_reference` allows `result.*` and `retry.*` references, which
/// only make sense inside loop, retry and throw blocks.
pub fn resolve_or_defer(
    attr: &Attribute,
    ctx: &EvalContext,
    target: &mut dyn ResolutionTarget,
    results_reference: bool,
) -> Result<Option<Value>, Diagnostics> {
    let expr = &attr.expr;
    let mut deferred = false;

    for traversal in expr.variables() {
        if traversal.root == NAMESPACE_PARAM {
            target.add_unresolved_attribute(&attr.name, expr);
            deferred = true;

            // A pipeline reference built from a param can only ever be
            // resolved at run time, and it has no step dependencies.
            if attr.name == ATTRIBUTE_PIPELINE {
                return Ok(None);
            }
        }
        if traversal.root == NAMESPACE_VAR {
            if let Some(Traverser::Attr(name)) = traversal.steps.first() {
                if let Some(resources) = ctx.late_binding_resources(name) {
                    target.append_connection_depends_on(resources);
                    target.add_unresolved_attribute(&attr.name, expr);
                    deferred = true;
                }
            }
        }
    }

    if expr.contains_try() {
        debug!(attribute = %attr.name, "deferring attribute containing try()");
        target.add_unresolved_attribute(&attr.name, expr);
        append_extracted(expr, target);
        return Ok(None);
    }

    let errors = match expr.evaluate(ctx) {
        Ok(value) if deferred => {
            append_extracted(expr, target);
            debug!(attribute = %attr.name, value = %value, "attribute evaluates now but stays deferred");
            return Ok(None);
        }
        Ok(value) => return Ok(Some(value)),
        Err(errors) => errors,
    };

    let subject = target.subject();
    let mut left_over = Diagnostics::new();
    for error in &errors {
        match error {
            EvalError::UnknownVariable { name }
                if matches!(name.as_str(), NAMESPACE_STEP | NAMESPACE_CREDENTIAL | NAMESPACE_CONNECTION) =>
            {
                // Only recoverable when the expression yields a usable edge
                if !append_extracted(expr, target) {
                    left_over.push(eval_diagnostic(&attr.name, error, &subject));
                }
            }
            EvalError::UnknownVariable { name }
                if matches!(name.as_str(), NAMESPACE_EACH | NAMESPACE_PARAM | NAMESPACE_LOOP) => {}
            EvalError::UnknownVariable { name }
                if results_reference && matches!(name.as_str(), NAMESPACE_RESULT | NAMESPACE_RETRY) => {}
            EvalError::LateBinding { resources, .. } => {
                target.append_connection_depends_on(resources);
            }
            other => left_over.push(eval_diagnostic(&attr.name, other, &subject)),
        }
    }

    if left_over.has_errors() {
        return Err(left_over);
    }

    append_extracted(expr, target);
    debug!(attribute = %attr.name, subject = %subject, "attribute deferred to run time");
    target.add_unresolved_attribute(&attr.name, expr);
    Ok(None)
}

/// Append every dependency the expression references; true if any exist
fn append_extracted(expr: &Expr, target: &mut dyn ResolutionTarget) -> bool {
    let deps = dependencies_from_expr(expr);
    target.append_depends_on(&deps.steps);
    target.append_credential_depends_on(&deps.credentials);
    target.append_connection_depends_on(&deps.connections);
    !deps.is_empty()
}

fn eval_diagnostic(attribute: &str, error: &EvalError, subject: &str) -> Diagnostic {
    Diagnostic::error(error.summary())
        .with_detail(format!("Attribute '{}': {}", attribute, error))
        .with_subject(subject)
}

fn conversion_diagnostic(attribute: &str, expected: &str, error: &ConversionError, subject: &str) -> Diagnostic {
    Diagnostic::error(format!("Unable to parse '{}' attribute to {}", attribute, expected))
        .with_detail(error.to_string())
        .with_subject(subject)
}

/// Native types an attribute value can be converted into
pub trait AttributeValue: Sized {
    /// Type name used in "Unable to parse" messages
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Result<Self, ConversionError>;
    fn to_value(&self) -> Value;
}

impl AttributeValue for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        convert::to_display_string(value)
    }

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }
}

impl AttributeValue for bool {
    const EXPECTED: &'static str = "bool";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        convert::to_bool(value)
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl AttributeValue for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        convert::to_whole_number(value)
    }

    fn to_value(&self) -> Value {
        Value::from(*self)
    }
}

impl AttributeValue for Vec<String> {
    const EXPECTED: &'static str = "string slice";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        convert::to_string_slice(value)
    }

    fn to_value(&self) -> Value {
        Value::Array(self.iter().cloned().map(Value::String).collect())
    }
}

impl AttributeValue for BTreeMap<String, String> {
    const EXPECTED: &'static str = "string map";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        convert::to_string_map(value)
    }

    fn to_value(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

impl AttributeValue for Map<String, Value> {
    const EXPECTED: &'static str = "map";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        convert::to_map(value)
    }

    fn to_value(&self) -> Value {
        Value::Object(self.clone())
    }
}

impl AttributeValue for Vec<Value> {
    const EXPECTED: &'static str = "list";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Array(items) => Ok(items.clone()),
            other => Err(ConversionError {
                expected: "list",
                found: convert::type_name(other),
            }),
        }
    }

    fn to_value(&self) -> Value {
        Value::Array(self.clone())
    }
}

impl AttributeValue for Value {
    const EXPECTED: &'static str = "value";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }

    fn to_value(&self) -> Value {
        self.clone()
    }
}

/// Resolve and convert in one go; `null` counts as "not set"
pub fn resolve_as<T: AttributeValue>(
    attr: &Attribute,
    ctx: &EvalContext,
    target: &mut dyn ResolutionTarget,
    results_reference: bool,
) -> Result<Option<T>, Diagnostics> {
    match resolve_or_defer(attr, ctx, target, results_reference)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => T::from_value(&value)
            .map(Some)
            .map_err(|e| conversion_diagnostic(&attr.name, T::EXPECTED, &e, &target.subject()).into()),
    }
}

/// Evaluate a deferred attribute at run time
pub fn evaluate_attribute(name: &str, expr: &Expr, ctx: &EvalContext) -> crate::core::error::Result<Value> {
    expr.evaluate(ctx).map_err(|errors| PipelineError::Evaluation {
        attribute: name.to_string(),
        errors,
    })
}

/// Evaluate a gate such as `if` or `until`; anything but a bool is an error
pub fn evaluate_condition(name: &str, expr: &Expr, ctx: &EvalContext) -> crate::core::error::Result<bool> {
    let value = evaluate_attribute(name, expr, ctx)?;
    expect_bool(&value).map_err(|found| PipelineError::Conversion {
        attribute: name.to_string(),
        expected: format!("bool, got {}", found),
    })
}

/// Evaluate a deferred attribute and convert the result; `null` gives `None`
pub fn evaluate_as<T: AttributeValue>(name: &str, expr: &Expr, ctx: &EvalContext) -> crate::core::error::Result<Option<T>> {
    match evaluate_attribute(name, expr, ctx)? {
        Value::Null => Ok(None),
        value => T::from_value(&value).map(Some).map_err(|_| PipelineError::Conversion {
            attribute: name.to_string(),
            expected: T::EXPECTED.to_string(),
        }),
    }
}

/// Static value if set, otherwise the evaluated unresolved expression
pub fn static_or_evaluate<T: AttributeValue + Clone>(
    name: &str,
    field: &Option<T>,
    unresolved: &UnresolvedAttributes,
    ctx: &EvalContext,
) -> crate::core::error::Result<Option<T>> {
    match unresolved.get(name) {
        Some(expr) => evaluate_as(name, expr, ctx),
        None => Ok(field.clone()),
    }
}

/// A plain [`ResolutionTarget`] that owns its own sets
///
/// Used for outputs, triggers and anything else with no parent step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandaloneTarget {
    pub subject: String,
    pub dependencies: crate::core::dependency::Dependencies,
    pub unresolved_attributes: UnresolvedAttributes,
}

impl StandaloneTarget {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }
}

impl ResolutionTarget for StandaloneTarget {
    fn append_depends_on(&mut self, names: &[String]) {
        self.dependencies.depends_on.append(names);
    }

    fn append_credential_depends_on(&mut self, names: &[String]) {
        self.dependencies.credential_depends_on.append(names);
    }

    fn append_connection_depends_on(&mut self, names: &[String]) {
        self.dependencies.connection_depends_on.append(names);
    }

    fn add_unresolved_attribute(&mut self, name: &str, expr: &Expr) {
        self.unresolved_attributes.insert(name.to_string(), expr.clone());
    }

    fn subject(&self) -> String {
        self.subject.clone()
    }
}
