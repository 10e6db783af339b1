//! Retry policy and backoff calculation

use super::{PolicyTarget, ATTRIBUTE_IF};
use crate::core::body::Body;
use crate::core::context::EvalContext;
use crate::core::dependency::Dependencies;
use crate::core::error::{Diagnostic, Diagnostics, Result};
use crate::core::resolver::{evaluate_condition, resolve_as, static_or_evaluate, UnresolvedAttributes};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: i64 = 3;
pub const DEFAULT_STRATEGY: &str = "constant";
pub const DEFAULT_MIN_INTERVAL: i64 = 1000;
pub const DEFAULT_MAX_INTERVAL: i64 = 10000;

const MAX_ATTEMPTS_LIMIT: i64 = 300;
const MIN_INTERVAL_LIMIT: i64 = 100_000;
const MAX_INTERVAL_LIMIT: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    Constant,
    Linear,
    Exponential,
}

impl RetryStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "constant" => Some(Self::Constant),
            "linear" => Some(Self::Linear),
            "exponential" => Some(Self::Exponential),
            _ => None,
        }
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Constant => "constant",
            Self::Linear => "linear",
            Self::Exponential => "exponential",
        };
        write!(f, "{}", s)
    }
}

/// `retry { if, max_attempts, strategy, min_interval, max_interval }`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetryConfig {
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_interval: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_interval: Option<i64>,

    #[serde(skip)]
    pub unresolved_attributes: UnresolvedAttributes,
}

/// Settings with defaults filled in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRetry {
    pub max_attempts: i64,
    pub strategy: String,
    pub min_interval: i64,
    pub max_interval: i64,
}

impl RetryConfig {
    /// Decode a retry block, recording step dependencies on `parent`
    pub fn decode(body: &Body, ctx: &EvalContext, parent: &mut Dependencies, subject: &str) -> std::result::Result<Self, Diagnostics> {
        let mut config = RetryConfig::default();
        let mut target = PolicyTarget::new(subject, parent);
        let mut diags = Diagnostics::new();

        for attr in &body.attributes {
            let result = match attr.name.as_str() {
                ATTRIBUTE_IF => {
                    target.add_condition(&attr.expr);
                    Ok(())
                }
                "max_attempts" => resolve_as(attr, ctx, &mut target, true).map(|v| config.max_attempts = v),
                "strategy" => resolve_as(attr, ctx, &mut target, true).map(|v| config.strategy = v),
                "min_interval" => resolve_as(attr, ctx, &mut target, true).map(|v| config.min_interval = v),
                "max_interval" => resolve_as(attr, ctx, &mut target, true).map(|v| config.max_interval = v),
                other => Err(Diagnostic::error("Invalid attribute")
                    .with_detail(format!("Unsupported attribute '{}' in retry block", other))
                    .with_subject(subject)
                    .into()),
            };
            if let Err(e) = result {
                diags.extend(e);
            }
        }

        config.unresolved_attributes = target.into_unresolved();
        diags.extend(config.validate(subject));
        diags.into_result().map(|_| config)
    }

    pub fn resolve_settings(&self) -> ResolvedRetry {
        ResolvedRetry {
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            strategy: self.strategy.clone().unwrap_or_else(|| DEFAULT_STRATEGY.to_string()),
            min_interval: self.min_interval.unwrap_or(DEFAULT_MIN_INTERVAL),
            max_interval: self.max_interval.unwrap_or(DEFAULT_MAX_INTERVAL),
        }
    }

    /// Delay before the given attempt.
    ///
    /// Attempt 1 is the first try, so the first retry is attempt 2.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let settings = self.resolve_settings();
        let min = settings.min_interval.max(0) as u64;
        let max = settings.max_interval.max(0) as u64;
        let retries = u64::from(attempt - 1);

        let millis = match RetryStrategy::parse(&settings.strategy) {
            Some(RetryStrategy::Linear) => min.saturating_mul(retries).min(max),
            Some(RetryStrategy::Exponential) => 2u64
                .checked_pow(attempt - 2)
                .and_then(|factor| min.checked_mul(factor))
                .map_or(max, |delay| delay.min(max)),
            _ => min,
        };

        Duration::from_millis(millis)
    }

    pub fn validate(&self, subject: &str) -> Diagnostics {
        let settings = self.resolve_settings();
        let mut diags = Diagnostics::new();
        let mut fail = |summary: &str, detail: &str| {
            diags.push(Diagnostic::error(summary).with_detail(detail).with_subject(subject));
        };

        if RetryStrategy::parse(&settings.strategy).is_none() {
            fail("Invalid retry strategy", "Valid values are constant, exponential or linear");
        }
        if settings.max_attempts <= 0 {
            fail("Invalid max_attempts", "max_attempts must be greater than 0");
        }
        if settings.max_attempts > MAX_ATTEMPTS_LIMIT {
            fail("Invalid max_attempts", "max_attempts must be less than 300");
        }
        if settings.min_interval > MIN_INTERVAL_LIMIT {
            fail("Invalid min_interval", "min_interval must be less than 100000");
        }
        if settings.min_interval < 0 {
            fail("Invalid min_interval", "min_interval must be greater than 0");
        }
        if settings.max_interval > MAX_INTERVAL_LIMIT {
            fail("Invalid max_interval", "max_interval must be less than 1000000");
        }
        if settings.max_interval < 0 {
            fail("Invalid max_interval", "max_interval must be greater than 0");
        }
        if settings.min_interval >= settings.max_interval {
            fail("Invalid min_interval", "min_interval must be less than max_interval");
        }

        diags
    }

    /// Produce the retry policy for one failed attempt.
    ///
    /// `None` when the `if` gate evaluates to false.
    pub fn resolve(&self, ctx: &EvalContext, subject: &str) -> Result<Option<RetryConfig>> {
        if let Some(expr) = self.unresolved_attributes.get(ATTRIBUTE_IF) {
            if !evaluate_condition(ATTRIBUTE_IF, expr, ctx)? {
                return Ok(None);
            }
        }

        let unresolved = &self.unresolved_attributes;
        let resolved = RetryConfig {
            condition: None,
            max_attempts: static_or_evaluate("max_attempts", &self.max_attempts, unresolved, ctx)?,
            strategy: static_or_evaluate("strategy", &self.strategy, unresolved, ctx)?,
            min_interval: static_or_evaluate("min_interval", &self.min_interval, unresolved, ctx)?,
            max_interval: static_or_evaluate("max_interval", &self.max_interval, unresolved, ctx)?,
            unresolved_attributes: UnresolvedAttributes::new(),
        };

        resolved.validate(subject).into_result()?;
        Ok(Some(resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(yaml: &str, ctx: &EvalContext) -> (std::result::Result<RetryConfig, Diagnostics>, Dependencies) {
        let map: serde_yaml::Mapping = serde_yaml::from_str(yaml).unwrap();
        let body = crate::core::body::body_from_mapping(&map, &[], &[], "test").unwrap();
        let mut deps = Dependencies::default();
        let result = RetryConfig::decode(&body, ctx, &mut deps, "test");
        (result, deps)
    }

    fn config(strategy: &str, min: i64, max: i64) -> RetryConfig {
        RetryConfig {
            strategy: Some(strategy.to_string()),
            min_interval: Some(min),
            max_interval: Some(max),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let settings = RetryConfig::default().resolve_settings();
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.strategy, "constant");
        assert_eq!(settings.min_interval, 1000);
        assert_eq!(settings.max_interval, 10000);
    }

    #[test]
    fn test_exponential_backoff() {
        let retry = config("exponential", 1000, 10000);
        let delays: Vec<u128> = (1..=6).map(|a| retry.calculate_backoff(a).as_millis()).collect();
        assert_eq!(delays, vec![0, 1000, 2000, 4000, 8000, 10000]);
    }

    #[test]
    fn test_exponential_overflow_caps() {
        let retry = config("exponential", 1000, 10000);
        assert_eq!(retry.calculate_backoff(200), Duration::from_millis(10000));
    }

    #[test]
    fn test_linear_backoff() {
        let retry = config("linear", 1000, 2500);
        assert_eq!(retry.calculate_backoff(2), Duration::from_millis(1000));
        assert_eq!(retry.calculate_backoff(3), Duration::from_millis(2000));
        assert_eq!(retry.calculate_backoff(4), Duration::from_millis(2500));
    }

    #[test]
    fn test_constant_backoff() {
        let retry = RetryConfig::default();
        assert_eq!(retry.calculate_backoff(1), Duration::ZERO);
        assert_eq!(retry.calculate_backoff(5), Duration::from_millis(1000));
    }

    #[test]
    fn test_min_greater_than_max_fails() {
        let diags = config("constant", 5000, 1000).validate("test");
        assert!(diags.contains("min_interval must be less than max_interval"));
    }

    #[test]
    fn test_invalid_strategy() {
        let (result, _) = decode("strategy: fibonacci", &EvalContext::new());
        assert!(result.unwrap_err().contains("Invalid retry strategy"));
    }

    #[test]
    fn test_unsupported_attribute() {
        let (result, _) = decode("backoff: 3", &EvalContext::new());
        assert!(result.unwrap_err().contains("Unsupported attribute 'backoff' in retry block"));
    }

    #[test]
    fn test_deferred_attributes_and_dependencies() {
        let (result, deps) = decode(
            r#"
if: "${result.status_code == 500}"
max_attempts: "${step.transform.limits.value}"
"#,
            &EvalContext::new(),
        );
        let retry = result.unwrap();
        assert!(retry.unresolved_attributes.contains_key("if"));
        assert!(retry.unresolved_attributes.contains_key("max_attempts"));
        assert_eq!(retry.max_attempts, None);
        assert_eq!(deps.depends_on.as_slice(), ["transform.limits"]);
    }

    #[test]
    fn test_resolve_does_not_mutate_template() {
        let (result, _) = decode(
            r#"
if: "${result.status_code == 500}"
max_attempts: 5
min_interval: "${step.transform.limits.value}"
"#,
            &EvalContext::new(),
        );
        let template = result.unwrap();
        let before = template.clone();

        let ctx = EvalContext::new()
            .with_namespace("result", json!({"status_code": 500}))
            .with_step_output("transform", "limits", json!({"value": 200}));
        let resolved = template.resolve(&ctx, "test").unwrap().unwrap();

        assert_eq!(resolved.max_attempts, Some(5));
        assert_eq!(resolved.min_interval, Some(200));
        assert!(resolved.unresolved_attributes.is_empty());
        assert_eq!(template, before);
    }

    #[test]
    fn test_resolve_if_false() {
        let (result, _) = decode(r#"if: "${result.status_code == 500}""#, &EvalContext::new());
        let ctx = EvalContext::new().with_namespace("result", json!({"status_code": 200}));
        assert_eq!(result.unwrap().resolve(&ctx, "test").unwrap(), None);
    }

    #[test]
    fn test_resolve_if_must_be_bool() {
        let (result, _) = decode(r#"if: "${result.status_code}""#, &EvalContext::new());
        let ctx = EvalContext::new().with_namespace("result", json!({"status_code": 500}));
        let err = result.unwrap().resolve(&ctx, "test").unwrap_err();
        assert_eq!(err.to_string(), "Unable to parse if attribute to bool, got number");
    }
}
