//! Expression language used by declaration attributes
//!
//! Declaration strings use HCL template syntax: literal text with `${...}`
//! interpolations around HCL expressions. Parsing and evaluation are done by
//! `hcl-rs`. This module binds the parsed expressions once at decode time,
//! walks them for variable references and `try()` calls, and maps evaluation
//! failures onto [`EvalError`] values so the attribute resolver can tell
//! "this namespace does not exist yet" apart from a genuine configuration
//! mistake without looking at message text.

pub mod ast;
pub mod convert;
pub mod eval;
pub mod functions;

pub use ast::{Expr, TemplatePart, Traversal, Traverser};

use hcl::template::{Element, Template};
use serde_json::Value;
use thiserror::Error;

/// Syntax error in an expression or template
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (in \"{source_text}\")")]
pub struct ParseError {
    pub message: String,
    pub source_text: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>, source: &str) -> Self {
        Self {
            message: message.into(),
            source_text: source.to_string(),
        }
    }
}

/// Why an expression could not produce a value
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// The root namespace of a traversal is absent from the context
    #[error("There is no variable named \"{name}\"")]
    UnknownVariable { name: String },

    /// The namespace exists but the traversal walks into a missing attribute
    #[error("Unsupported attribute: {traversal} has no attribute named \"{attribute}\"")]
    UnsupportedAttribute {
        root: String,
        traversal: String,
        attribute: String,
    },

    /// An index step could not be applied
    #[error("Invalid index: {message} ({traversal})")]
    InvalidIndex {
        root: String,
        traversal: String,
        message: String,
    },

    /// A `var` that stands for a connection only known at run time
    #[error("Variable \"var.{variable}\" is bound late to {}", resources.join(", "))]
    LateBinding {
        variable: String,
        resources: Vec<String>,
    },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Call to unknown function \"{0}\"")]
    UnknownFunction(String),

    #[error("Call to function \"{name}\" failed: {message}")]
    FunctionCall { name: String, message: String },
}

impl EvalError {
    /// One-line category used as a diagnostic summary
    pub fn summary(&self) -> &'static str {
        match self {
            EvalError::UnknownVariable { .. } => "Unknown variable",
            EvalError::UnsupportedAttribute { .. } => "Unsupported attribute",
            EvalError::InvalidIndex { .. } => "Invalid index",
            EvalError::LateBinding { .. } => "Late-bound variable",
            EvalError::TypeMismatch(_) => "Type mismatch",
            EvalError::UnknownFunction(_) => "Call to unknown function",
            EvalError::FunctionCall { .. } => "Error in function call",
        }
    }

    /// Root namespace the error refers to, when it comes from a traversal
    pub fn namespace(&self) -> Option<&str> {
        match self {
            EvalError::UnknownVariable { name } => Some(name),
            EvalError::UnsupportedAttribute { root, .. } | EvalError::InvalidIndex { root, .. } => Some(root),
            EvalError::LateBinding { .. } => Some("var"),
            _ => None,
        }
    }

    /// True when the failure is a reference into `connection` or `credential`
    pub fn is_connection_reference(&self) -> bool {
        matches!(self.namespace(), Some("connection") | Some("credential"))
    }
}

/// Parse a bare expression such as `step.http.a.status_code == 200`
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let mut parts = parse_template(&format!("${{{}}}", source))?;
    match (parts.pop(), parts.is_empty()) {
        (Some(TemplatePart::Interpolation(expr)), true) => Ok(Expr::Hcl {
            source: source.trim().to_string(),
            expr,
        }),
        _ => Err(ParseError::new("expected a single expression", source)),
    }
}

/// Parse a declaration string value.
///
/// A string made of exactly one `${...}` interpolation yields the inner
/// expression so its type is preserved. A string without interpolations
/// yields a string literal.
pub fn parse_value_string(source: &str) -> Result<Expr, ParseError> {
    if !source.contains("${") {
        return Ok(Expr::Literal(Value::String(source.to_string())));
    }

    let mut parts = parse_template(source)?;
    if parts.len() == 1 && matches!(parts[0], TemplatePart::Interpolation(_)) {
        if let Some(TemplatePart::Interpolation(expr)) = parts.pop() {
            return Ok(Expr::Hcl {
                source: source.to_string(),
                expr,
            });
        }
    }

    // `$${` escapes leave nothing to evaluate
    if parts.iter().all(|p| matches!(p, TemplatePart::Literal(_))) {
        let text: String = parts
            .iter()
            .filter_map(|p| match p {
                TemplatePart::Literal(text) => Some(text.as_str()),
                TemplatePart::Interpolation(_) => None,
            })
            .collect();
        return Ok(Expr::Literal(Value::String(text)));
    }

    Ok(Expr::Template {
        source: source.to_string(),
        parts,
    })
}

/// Split a template into literal text and interpolated expressions
pub(crate) fn parse_template(source: &str) -> Result<Vec<TemplatePart>, ParseError> {
    let template: Template = source
        .parse()
        .map_err(|e: hcl::Error| ParseError::new(e.to_string(), source))?;

    template
        .elements()
        .iter()
        .map(|element| match element {
            Element::Literal(text) => Ok(TemplatePart::Literal(text.clone())),
            Element::Interpolation(interpolation) => Ok(TemplatePart::Interpolation(interpolation.expr.clone())),
            _ => Err(ParseError::new("template directives are not supported", source)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_string_is_literal() {
        assert_eq!(
            parse_value_string("https://example.com/50%").unwrap(),
            Expr::Literal(json!("https://example.com/50%"))
        );
    }

    #[test]
    fn test_single_interpolation_keeps_expression() {
        let expr = parse_value_string("${step.http.a.status_code}").unwrap();
        assert!(matches!(expr, Expr::Hcl { .. }));
        assert_eq!(expr.to_string(), "${step.http.a.status_code}");
    }

    #[test]
    fn test_mixed_text_is_template() {
        let expr = parse_value_string("hello ${param.name}!").unwrap();
        let Expr::Template { parts, .. } = expr else {
            panic!("expected a template");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], TemplatePart::Literal("hello ".into()));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_value_string("${step.http.}").is_err());
        assert!(parse_expression("a b").is_err());
        assert!(parse_value_string("%{ if true }x%{ endif } ${a}").is_err());
    }
}
