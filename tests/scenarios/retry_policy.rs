//! Test: Retry Policy - backoff, validation and run-time resolution

use crate::helpers::*;
use flowdef::core::EvalContext;
use serde_json::json;
use std::time::Duration;

#[test]
fn test_exponential_backoff_is_capped() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: flaky
    steps:
      - type: http
        name: call
        url: https://example.com
        retry:
          max_attempts: 6
          strategy: exponential
          min_interval: 1000
          max_interval: 10000
"#,
    );
    let retry = step(&pipeline, "http.call")
        .retry_config(&EvalContext::new(), true)
        .unwrap()
        .expect("retry applies");

    let delays: Vec<u64> = (2..=6).map(|attempt| retry.calculate_backoff(attempt).as_millis() as u64).collect();
    assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10000]);
    assert_eq!(retry.calculate_backoff(1), Duration::ZERO);
}

#[test]
fn test_defaults_when_block_is_empty() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: flaky
    steps:
      - type: sleep
        name: nap
        duration: 1s
        retry: {}
"#,
    );
    let retry = step(&pipeline, "sleep.nap").retry_config(&EvalContext::new(), true).unwrap().unwrap();
    let settings = retry.resolve_settings();
    assert_eq!(settings.max_attempts, 3);
    assert_eq!(settings.strategy, "constant");
    assert_eq!(retry.calculate_backoff(3), Duration::from_millis(1000));
}

#[test]
fn test_min_interval_above_max_interval_fails() {
    let err = load_err(
        r#"
pipelines:
  - name: flaky
    steps:
      - type: sleep
        name: nap
        duration: 1s
        retry:
          min_interval: 5000
          max_interval: 1000
"#,
    );
    assert_contains(&err, "min_interval must be less than max_interval");
}

#[test]
fn test_max_attempts_must_be_positive() {
    let err = load_err(
        r#"
pipelines:
  - name: flaky
    steps:
      - type: sleep
        name: nap
        duration: 1s
        retry:
          max_attempts: 0
"#,
    );
    assert_contains(&err, "max_attempts must be greater than 0");
}

#[test]
fn test_if_gate_on_result() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: flaky
    steps:
      - type: http
        name: call
        url: https://example.com
        retry:
          if: "${result.status_code >= 500}"
          max_attempts: 4
"#,
    );
    let call = step(&pipeline, "http.call");

    let server_error = EvalContext::new().with_namespace("result", json!({"status_code": 503}));
    let retry = call.retry_config(&server_error, true).unwrap().unwrap();
    assert_eq!(retry.max_attempts, Some(4));

    let not_found = EvalContext::new().with_namespace("result", json!({"status_code": 404}));
    assert!(call.retry_config(&not_found, true).unwrap().is_none());
}

#[test]
fn test_retry_template_without_if_resolution() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: flaky
    steps:
      - type: http
        name: call
        url: https://example.com
        retry:
          if: "${result.status_code >= 500}"
          max_attempts: 4
"#,
    );
    let call = step(&pipeline, "http.call");

    // The gate would fail here, yet the template is still handed back
    let not_found = EvalContext::new().with_namespace("result", json!({"status_code": 404}));
    let template = call.retry_config(&not_found, false).unwrap().unwrap();
    assert_eq!(&template, call.base.retry.as_ref().unwrap());
    assert!(template.unresolved_attributes.contains_key("if"));
    assert_eq!(template.max_attempts, Some(4));

    // No result namespace at all: nothing is evaluated
    assert!(call.retry_config(&EvalContext::new(), false).is_ok());
    assert!(call.retry_config(&EvalContext::new(), true).is_err());
}

/// The stored template keeps its expression; each resolution is a new config
#[test]
fn test_dynamic_settings_do_not_mutate_template() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: flaky
    params:
      - name: attempts
        type: number
        default: 2
    steps:
      - type: http
        name: call
        url: https://example.com
        retry:
          max_attempts: "${param.attempts}"
"#,
    );
    let call = step(&pipeline, "http.call");

    let ctx = EvalContext::new().with_param("attempts", json!(5));
    let first = call.retry_config(&ctx, true).unwrap().unwrap();
    assert_eq!(first.max_attempts, Some(5));

    let ctx = EvalContext::new().with_param("attempts", json!(7));
    let second = call.retry_config(&ctx, true).unwrap().unwrap();
    assert_eq!(second.max_attempts, Some(7));

    let template = call.base.retry.as_ref().unwrap();
    assert_eq!(template.max_attempts, None);
    assert!(template.unresolved_attributes.contains_key("max_attempts"));
}
