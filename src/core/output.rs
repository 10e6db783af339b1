//! Pipeline and step outputs

use crate::core::body::{Block, Body};
use crate::core::context::EvalContext;
use crate::core::dependency::{dependencies_from_expr, Dependencies};
use crate::core::error::{Diagnostic, Diagnostics, Result};
use crate::core::resolver::evaluate_attribute;
use crate::expression::Expr;
use serde_json::Value;

pub const ATTRIBUTE_VALUE: &str = "value";

/// `output "<name>" { value, description, sensitive }`
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub name: String,
    pub description: Option<String>,
    pub sensitive: bool,
    /// Set when the value needs no evaluation
    pub value: Option<Value>,
    pub unresolved_value: Option<Expr>,
    pub dependencies: Dependencies,
}

impl PipelineOutput {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            sensitive: false,
            value: None,
            unresolved_value: None,
            dependencies: Dependencies::default(),
        }
    }

    /// Decode a pipeline-level output.
    ///
    /// The value is always evaluated at run time since it almost always
    /// refers to step results. Its dependencies are kept on the output.
    pub fn decode(name: &str, body: &Body, subject: &str) -> std::result::Result<Self, Diagnostics> {
        let mut output = PipelineOutput::empty(name);
        let mut diags = Diagnostics::new();

        for attr in &body.attributes {
            match attr.name.as_str() {
                ATTRIBUTE_VALUE => {
                    let deps = dependencies_from_expr(&attr.expr);
                    output.dependencies.depends_on.append(&deps.steps);
                    output.dependencies.credential_depends_on.append(&deps.credentials);
                    output.dependencies.connection_depends_on.append(&deps.connections);
                    output.unresolved_value = Some(attr.expr.clone());
                }
                "description" => match &attr.expr {
                    Expr::Literal(Value::String(s)) => output.description = Some(s.clone()),
                    _ => diags.push(invalid_literal(name, "description", "a string", subject)),
                },
                "sensitive" => match &attr.expr {
                    Expr::Literal(Value::Bool(b)) => output.sensitive = *b,
                    _ => diags.push(invalid_literal(name, "sensitive", "a bool", subject)),
                },
                other => diags.push(
                    Diagnostic::error("Unsupported attribute")
                        .with_detail(format!("Unsupported attribute '{}' in output '{}'", other, name))
                        .with_subject(subject),
                ),
            }
        }

        if output.unresolved_value.is_none() {
            diags.push(missing_value(name, subject));
        }

        diags.into_result().map(|_| output)
    }

    /// Decode an `output` block nested in a step.
    ///
    /// A literal value is kept as is. Anything with variables is evaluated
    /// at run time and its step references become dependencies of the step.
    pub fn decode_step_output(block: &Block, step: &mut Dependencies, subject: &str) -> std::result::Result<Self, Diagnostics> {
        let name = block.labels.first().map(String::as_str).unwrap_or_default();
        let mut output = PipelineOutput::empty(name);
        let mut diags = Diagnostics::new();

        for attr in &block.body.attributes {
            match attr.name.as_str() {
                ATTRIBUTE_VALUE => match &attr.expr {
                    Expr::Literal(value) => output.value = Some(value.clone()),
                    expr => {
                        step.depends_on.append(&dependencies_from_expr(expr).steps);
                        output.unresolved_value = Some(expr.clone());
                    }
                },
                "description" => match &attr.expr {
                    Expr::Literal(Value::String(s)) => output.description = Some(s.clone()),
                    _ => diags.push(invalid_literal(name, "description", "a string", subject)),
                },
                other => diags.push(
                    Diagnostic::error("Unsupported attribute")
                        .with_detail(format!("Unsupported attribute '{}' in output '{}'", other, name))
                        .with_subject(subject),
                ),
            }
        }

        if output.value.is_none() && output.unresolved_value.is_none() {
            diags.push(missing_value(name, subject));
        }

        diags.into_result().map(|_| output)
    }

    /// Value of the output against the run-time context
    pub fn resolve(&self, ctx: &EvalContext) -> Result<Value> {
        match (&self.value, &self.unresolved_value) {
            (_, Some(expr)) => evaluate_attribute(&self.name, expr, ctx),
            (Some(value), None) => Ok(value.clone()),
            (None, None) => Ok(Value::Null),
        }
    }
}

fn missing_value(name: &str, subject: &str) -> Diagnostic {
    Diagnostic::error("Missing value attribute")
        .with_detail(format!("Output '{}' has no value", name))
        .with_subject(subject)
}

fn invalid_literal(name: &str, attribute: &str, expected: &str, subject: &str) -> Diagnostic {
    Diagnostic::error(format!("Invalid {} attribute", attribute))
        .with_detail(format!("Output '{}': '{}' must be {}", name, attribute, expected))
        .with_subject(subject)
}
