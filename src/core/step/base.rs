//! Attributes and policies shared by every step type

use super::StepType;
use crate::core::body::{Attribute, Body};
use crate::core::context::EvalContext;
use crate::core::dependency::{dependencies_from_expr, Dependencies};
use crate::core::error::{Diagnostic, Diagnostics};
use crate::core::output::PipelineOutput;
use crate::core::policy::{ErrorConfig, LoopDefn, RetryConfig, ThrowConfig, ATTRIBUTE_IF};
use crate::core::resolver::{evaluate_as, resolve_as, resolve_or_defer, ResolutionTarget, UnresolvedAttributes};
use crate::expression::{parse_expression, Expr, Traversal};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::trace;

pub const ATTRIBUTE_DEPENDS_ON: &str = "depends_on";
pub const ATTRIBUTE_FOR_EACH: &str = "for_each";
pub const ATTRIBUTE_TITLE: &str = "title";
pub const ATTRIBUTE_DESCRIPTION: &str = "description";
pub const ATTRIBUTE_TIMEOUT: &str = "timeout";
pub const ATTRIBUTE_MAX_CONCURRENCY: &str = "max_concurrency";

#[derive(Debug, Clone, PartialEq)]
pub struct StepBase {
    pub step_type: StepType,
    pub name: String,
    /// Full name of the owning pipeline, e.g. `local.pipeline.deploy`
    pub pipeline_name: String,

    pub title: Option<String>,
    pub description: Option<String>,
    pub dependencies: Dependencies,
    pub for_each: Option<Expr>,
    /// A duration string or a whole number of milliseconds
    pub timeout: Option<Value>,
    pub max_concurrency: Option<i64>,
    pub unresolved_attributes: UnresolvedAttributes,
    /// Nested blocks that have to be decoded again at run time
    pub unresolved_bodies: BTreeMap<String, Body>,

    pub retry: Option<RetryConfig>,
    pub error_config: Option<ErrorConfig>,
    pub throws: Vec<ThrowConfig>,
    pub loop_defn: Option<LoopDefn>,
    pub outputs: Vec<PipelineOutput>,
}

impl StepBase {
    pub fn new(step_type: StepType, name: &str, pipeline_name: &str) -> Self {
        Self {
            step_type,
            name: name.to_string(),
            pipeline_name: pipeline_name.to_string(),
            title: None,
            description: None,
            dependencies: Dependencies::default(),
            for_each: None,
            timeout: None,
            max_concurrency: None,
            unresolved_attributes: UnresolvedAttributes::new(),
            unresolved_bodies: BTreeMap::new(),
            retry: None,
            error_config: None,
            throws: Vec::new(),
            loop_defn: None,
            outputs: Vec::new(),
        }
    }

    /// `<type>.<name>`, the form used in dependency sets
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.step_type, self.name)
    }

    /// Decode one of the shared attributes; `Ok(false)` if `attr` is not one
    pub fn set_base_attribute(&mut self, attr: &Attribute, ctx: &EvalContext) -> Result<bool, Diagnostics> {
        match attr.name.as_str() {
            ATTRIBUTE_DEPENDS_ON => {
                self.set_depends_on(&attr.expr)?;
            }
            ATTRIBUTE_FOR_EACH => {
                let deps = dependencies_from_expr(&attr.expr);
                self.append_depends_on(&deps.steps);
                self.append_credential_depends_on(&deps.credentials);
                self.append_connection_depends_on(&deps.connections);
                self.for_each = Some(attr.expr.clone());
            }
            ATTRIBUTE_IF => {
                // Never evaluated before the step is about to run
                let deps = dependencies_from_expr(&attr.expr);
                self.append_depends_on(&deps.steps);
                self.add_unresolved_attribute(ATTRIBUTE_IF, &attr.expr);
            }
            ATTRIBUTE_TITLE => self.title = resolve_as(attr, ctx, self, false)?,
            ATTRIBUTE_DESCRIPTION => self.description = resolve_as(attr, ctx, self, false)?,
            ATTRIBUTE_TIMEOUT => {
                if let Some(value) = resolve_or_defer(attr, ctx, self, false)? {
                    match duration_value(&value) {
                        Some(timeout) => self.timeout = Some(timeout),
                        None => return Err(self.must_be(ATTRIBUTE_TIMEOUT, "a string or a whole number").into()),
                    }
                }
            }
            ATTRIBUTE_MAX_CONCURRENCY => {
                if let Some(value) = resolve_or_defer(attr, ctx, self, false)? {
                    match value.as_i64() {
                        Some(n) => self.max_concurrency = Some(n),
                        None => return Err(self.must_be(ATTRIBUTE_MAX_CONCURRENCY, "a whole number").into()),
                    }
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// `depends_on: [step.sleep.wait, "${step.http.fetch}"]`
    fn set_depends_on(&mut self, expr: &Expr) -> Result<(), Diagnostics> {
        let items: Vec<Expr> = match expr {
            Expr::Literal(Value::Array(items)) => items.iter().cloned().map(Expr::Literal).collect(),
            Expr::List(items) => items.clone(),
            other => vec![other.clone()],
        };

        let mut diags = Diagnostics::new();
        for item in items {
            let traversals = match &item {
                Expr::Literal(Value::String(s)) => match parse_expression(s) {
                    Ok(parsed) => parsed.variables(),
                    Err(_) => {
                        diags.push(self.invalid_depends_on(s));
                        continue;
                    }
                },
                other => other.variables(),
            };
            if traversals.is_empty() {
                diags.push(self.invalid_depends_on(&format!("{:?}", item)));
            }
            for traversal in traversals {
                match step_reference(&traversal) {
                    Some(name) => {
                        self.dependencies.depends_on.append([name]);
                    }
                    None => diags.push(self.invalid_depends_on(&traversal.dotted())),
                }
            }
        }
        diags.into_result()
    }

    fn invalid_depends_on(&self, text: &str) -> Diagnostic {
        Diagnostic::error("Invalid depends_on format")
            .with_detail(format!("Invalid depends_on format {}", text))
            .with_subject(self.subject())
    }

    fn must_be(&self, attribute: &str, expected: &str) -> Diagnostic {
        Diagnostic::error(format!(
            "Value of the attribute '{}' must be {}: {}",
            attribute,
            expected,
            self.full_name()
        ))
        .with_subject(self.subject())
    }

    /// Static `max_concurrency`, or its evaluation; `None` when it cannot be evaluated
    pub fn max_concurrency(&self, ctx: &EvalContext) -> Option<i64> {
        match self.unresolved_attributes.get(ATTRIBUTE_MAX_CONCURRENCY) {
            Some(expr) => evaluate_as::<i64>(ATTRIBUTE_MAX_CONCURRENCY, expr, ctx).ok().flatten(),
            None => self.max_concurrency,
        }
    }
}

/// `step.<type>.<name>` gives `<type>.<name>`
fn step_reference(traversal: &Traversal) -> Option<String> {
    let parts = traversal.parts();
    if traversal.root != "step" || parts.len() < 3 {
        return None;
    }
    Some(format!("{}.{}", parts[1], parts[2]))
}

/// A duration is either a string such as `5s` or a whole number
pub fn duration_value(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) => Some(value.clone()),
        Value::Number(n) => n.as_i64().map(Value::from),
        _ => None,
    }
}

impl ResolutionTarget for StepBase {
    fn append_depends_on(&mut self, names: &[String]) {
        let added = self.dependencies.depends_on.append(names);
        if added > 0 {
            trace!(step = %self.full_name(), depends_on = ?names, "appended step dependencies");
        }
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
        format!("{}.step.{}", self.pipeline_name, self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parse_value_string;
    use serde_json::json;

    fn attr(name: &str, source: &str) -> Attribute {
        Attribute {
            name: name.to_string(),
            expr: parse_value_string(source).unwrap(),
        }
    }

    fn base() -> StepBase {
        StepBase::new(StepType::Http, "fetch", "local.pipeline.test")
    }

    #[test]
    fn test_depends_on_strings_and_traversals() {
        let mut step = base();
        let expr = Expr::List(vec![
            Expr::Literal(json!("step.sleep.wait")),
            parse_value_string("${step.http.login}").unwrap(),
        ]);
        step.set_depends_on(&expr).unwrap();
        assert!(step.dependencies.depends_on.contains("sleep.wait"));
        assert!(step.dependencies.depends_on.contains("http.login"));
    }

    #[test]
    fn test_depends_on_too_short() {
        let mut step = base();
        let err = step.set_depends_on(&Expr::Literal(json!(["sleep.wait"]))).unwrap_err();
        assert!(err.contains("Invalid depends_on format sleep.wait"));
    }

    #[test]
    fn test_if_is_always_deferred() {
        let mut step = base();
        let ctx = EvalContext::new();
        assert!(step.set_base_attribute(&attr("if", "${true}"), &ctx).unwrap());
        assert!(step.unresolved_attributes.contains_key("if"));

        step.set_base_attribute(&attr("if", "${step.transform.gate.value}"), &ctx).unwrap();
        assert!(step.dependencies.depends_on.contains("transform.gate"));
    }

    #[test]
    fn test_timeout_and_max_concurrency() {
        let mut step = base();
        let ctx = EvalContext::new();
        step.set_base_attribute(&attr("timeout", "10s"), &ctx).unwrap();
        assert_eq!(step.timeout, Some(json!("10s")));

        let err = step.set_base_attribute(&attr("timeout", "${true}"), &ctx).unwrap_err();
        assert!(err.contains("Value of the attribute 'timeout' must be a string or a whole number: http.fetch"));

        let err = step.set_base_attribute(&attr("max_concurrency", "${1.5}"), &ctx).unwrap_err();
        assert!(err.contains("Value of the attribute 'max_concurrency' must be a whole number: http.fetch"));
    }

    #[test]
    fn test_max_concurrency_from_param() {
        let mut step = base();
        step.set_base_attribute(&attr("max_concurrency", "${param.limit}"), &EvalContext::new())
            .unwrap();
        assert_eq!(step.max_concurrency(&EvalContext::new()), None);
        let ctx = EvalContext::new().with_param("limit", json!(4));
        assert_eq!(step.max_concurrency(&ctx), Some(4));
    }

    #[test]
    fn test_unknown_attribute_is_not_base() {
        let mut step = base();
        assert!(!step.set_base_attribute(&attr("url", "x"), &EvalContext::new()).unwrap());
    }
}
