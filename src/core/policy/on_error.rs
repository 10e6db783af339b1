//! `error { if, ignore }` block

use super::{PolicyTarget, ATTRIBUTE_IF};
use crate::core::body::Body;
use crate::core::context::EvalContext;
use crate::core::dependency::Dependencies;
use crate::core::error::{Diagnostic, Diagnostics, Result};
use crate::core::resolver::{evaluate_condition, resolve_as, UnresolvedAttributes};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorConfig {
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore: Option<bool>,

    #[serde(skip)]
    pub unresolved_attributes: UnresolvedAttributes,
}

impl ErrorConfig {
    pub fn decode(body: &Body, ctx: &EvalContext, parent: &mut Dependencies, subject: &str) -> std::result::Result<Self, Diagnostics> {
        let mut config = ErrorConfig::default();
        let mut target = PolicyTarget::new(subject, parent);
        let mut diags = Diagnostics::new();

        for attr in &body.attributes {
            match attr.name.as_str() {
                ATTRIBUTE_IF => target.add_condition(&attr.expr),
                "ignore" => match resolve_as(attr, ctx, &mut target, false) {
                    Ok(v) => config.ignore = v,
                    Err(e) => diags.extend(e),
                },
                other => diags.push(
                    Diagnostic::error("Invalid attribute")
                        .with_detail(format!("Unsupported attribute '{}' in error block", other))
                        .with_subject(subject),
                ),
            }
        }

        config.unresolved_attributes = target.into_unresolved();
        diags.into_result().map(|_| config)
    }

    /// `None` when the `if` gate evaluates to false
    pub fn resolve(&self, ctx: &EvalContext) -> Result<Option<ErrorConfig>> {
        let mut resolved = ErrorConfig::default();

        if let Some(expr) = self.unresolved_attributes.get(ATTRIBUTE_IF) {
            if !evaluate_condition(ATTRIBUTE_IF, expr, ctx)? {
                return Ok(None);
            }
            resolved.condition = Some(true);
        }

        if let Some(expr) = self.unresolved_attributes.get("ignore") {
            resolved.ignore = Some(evaluate_condition("ignore", expr, ctx)?);
        } else if self.ignore == Some(true) {
            resolved.ignore = Some(true);
        }

        Ok(Some(resolved))
    }

    pub fn ignores_errors(&self) -> bool {
        self.ignore.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(yaml: &str) -> std::result::Result<ErrorConfig, Diagnostics> {
        let map: serde_yaml::Mapping = serde_yaml::from_str(yaml).unwrap();
        let body = crate::core::body::body_from_mapping(&map, &[], &[], "test").unwrap();
        ErrorConfig::decode(&body, &EvalContext::new(), &mut Dependencies::default(), "test")
    }

    #[test]
    fn test_static_ignore() {
        let config = decode("ignore: true").unwrap();
        assert_eq!(config.ignore, Some(true));
        let resolved = config.resolve(&EvalContext::new()).unwrap().unwrap();
        assert!(resolved.ignores_errors());
    }

    #[test]
    fn test_if_gate() {
        let config = decode(
            r#"
if: "${param.lenient}"
ignore: "${param.lenient}"
"#,
        )
        .unwrap();
        let off = EvalContext::new().with_param("lenient", json!(false));
        assert_eq!(config.resolve(&off).unwrap(), None);

        let on = EvalContext::new().with_param("lenient", json!(true));
        let resolved = config.resolve(&on).unwrap().unwrap();
        assert_eq!(resolved.condition, Some(true));
        assert_eq!(resolved.ignore, Some(true));
    }

    #[test]
    fn test_non_bool_gates_are_rejected() {
        let config = decode(r#"if: "${param.lenient}""#).unwrap();
        let ctx = EvalContext::new().with_param("lenient", json!("yes"));
        assert!(config.resolve(&ctx).is_err());

        let config = decode(r#"ignore: "${param.lenient}""#).unwrap();
        let ctx = EvalContext::new().with_param("lenient", json!(1));
        let err = config.resolve(&ctx).unwrap_err();
        assert!(err.to_string().contains("ignore attribute to bool"));
    }

    #[test]
    fn test_unsupported_attribute() {
        let err = decode("retries: 2").unwrap_err();
        assert!(err.contains("Unsupported attribute 'retries' in error block"));
    }
}
