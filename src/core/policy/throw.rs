//! `throw { if, message }` blocks
//!
//! A step may declare several throws; the caller resolves them in order and
//! stops at the first one whose `if` holds. Later entries are never touched.

use super::{PolicyTarget, ATTRIBUTE_IF};
use crate::core::body::Body;
use crate::core::context::EvalContext;
use crate::core::dependency::Dependencies;
use crate::core::error::{Diagnostic, Diagnostics, Result};
use crate::core::resolver::{evaluate_as, evaluate_condition, resolve_as, UnresolvedAttributes};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThrowConfig {
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip)]
    pub unresolved_attributes: UnresolvedAttributes,
}

impl ThrowConfig {
    pub fn decode(body: &Body, ctx: &EvalContext, parent: &mut Dependencies, subject: &str) -> std::result::Result<Self, Diagnostics> {
        let mut config = ThrowConfig::default();
        let mut target = PolicyTarget::new(subject, parent);
        let mut diags = Diagnostics::new();

        for attr in &body.attributes {
            match attr.name.as_str() {
                ATTRIBUTE_IF => target.add_condition(&attr.expr),
                "message" => match resolve_as(attr, ctx, &mut target, true) {
                    Ok(v) => config.message = v,
                    Err(e) => diags.extend(e),
                },
                other => diags.push(
                    Diagnostic::error("Invalid argument")
                        .with_detail(format!("Unsupported argument '{}' in throw block", other))
                        .with_subject(subject),
                ),
            }
        }

        if !target.has_unresolved(ATTRIBUTE_IF) {
            diags.push(
                Diagnostic::error("Missing required argument")
                    .with_detail("The argument 'if' is required, but no definition was found.")
                    .with_subject(subject),
            );
        }

        config.unresolved_attributes = target.into_unresolved();
        diags.into_result().map(|_| config)
    }

    /// Evaluate `if`, and `message` only when the throw fires
    pub fn resolve(&self, ctx: &EvalContext) -> Result<ThrowConfig> {
        let mut resolved = ThrowConfig {
            condition: self.condition,
            ..Default::default()
        };

        if resolved.condition.is_none() {
            if let Some(expr) = self.unresolved_attributes.get(ATTRIBUTE_IF) {
                resolved.condition = Some(evaluate_condition(ATTRIBUTE_IF, expr, ctx)?);
            }
        }

        if resolved.condition == Some(false) {
            return Ok(resolved);
        }

        resolved.message = match (&self.message, self.unresolved_attributes.get("message")) {
            (Some(message), _) => Some(message.clone()),
            (None, Some(expr)) => evaluate_as::<String>("message", expr, ctx)?,
            (None, None) => None,
        };

        Ok(resolved)
    }

    pub fn fires(&self) -> bool {
        self.condition == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(yaml: &str) -> std::result::Result<ThrowConfig, Diagnostics> {
        let map: serde_yaml::Mapping = serde_yaml::from_str(yaml).unwrap();
        let body = crate::core::body::body_from_mapping(&map, &[], &[], "test").unwrap();
        ThrowConfig::decode(&body, &EvalContext::new(), &mut Dependencies::default(), "test")
    }

    #[test]
    fn test_if_is_required() {
        let err = decode("message: boom").unwrap_err();
        assert!(err.contains("The argument 'if' is required"));
    }

    #[test]
    fn test_false_condition_skips_message() {
        // The message would fail to evaluate if it were ever touched
        let throw = decode(
            r#"
if: "${result.status_code == 500}"
message: "${result.missing.value}"
"#,
        )
        .unwrap();
        let ctx = EvalContext::new().with_namespace("result", json!({"status_code": 200}));
        let resolved = throw.resolve(&ctx).unwrap();
        assert_eq!(resolved.condition, Some(false));
        assert_eq!(resolved.message, None);
    }

    #[test]
    fn test_true_condition_resolves_message() {
        let throw = decode(
            r#"
if: "${result.status_code == 500}"
message: "server said ${result.status_code}"
"#,
        )
        .unwrap();
        let ctx = EvalContext::new().with_namespace("result", json!({"status_code": 500}));
        let resolved = throw.resolve(&ctx).unwrap();
        assert!(resolved.fires());
        assert_eq!(resolved.message.as_deref(), Some("server said 500"));
    }

    #[test]
    fn test_string_condition_is_rejected() {
        let throw = decode(r#"if: "${result.flag}""#).unwrap();
        let ctx = EvalContext::new().with_namespace("result", json!({"flag": "true"}));
        assert!(throw.resolve(&ctx).is_err());
    }

    #[test]
    fn test_static_message() {
        let throw = decode(
            r#"
if: "${true}"
message: boom
"#,
        )
        .unwrap();
        assert_eq!(throw.message.as_deref(), Some("boom"));
        let resolved = throw.resolve(&EvalContext::new()).unwrap();
        assert_eq!(resolved.message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_non_bool_condition_fails() {
        let throw = decode(r#"if: "${[1, 2]}""#).unwrap();
        assert!(throw.resolve(&EvalContext::new()).is_err());
    }
}
