//! Test: Throw and Error - ordered throws and error handling blocks

use crate::helpers::*;
use flowdef::core::EvalContext;
use serde_json::json;

const THROWS: &str = r#"
pipelines:
  - name: guarded
    steps:
      - type: http
        name: call
        url: https://example.com
        throw:
          - if: "${result.status_code == 500}"
            message: server error
          - if: "${result.status_code == 404}"
            message: "${result.missing.field}"
"#;

fn result(status: i64) -> EvalContext {
    EvalContext::new().with_namespace("result", json!({"status_code": status}))
}

/// The first firing throw wins; later entries are never evaluated
#[test]
fn test_first_firing_throw_short_circuits() {
    let pipeline = only_pipeline(THROWS);
    let call = step(&pipeline, "http.call");

    let thrown = call.first_throw(&result(500)).unwrap().expect("first throw fires");
    assert_eq!(thrown.condition, Some(true));
    assert_eq!(thrown.message.as_deref(), Some("server error"));

    // the second entry's message cannot be evaluated at all
    assert!(call.base.throws[1].resolve(&result(404)).is_err());
}

/// A throw that does not fire never evaluates its message
#[test]
fn test_message_is_only_evaluated_when_firing() {
    let pipeline = only_pipeline(THROWS);
    let call = step(&pipeline, "http.call");

    assert!(call.first_throw(&result(200)).unwrap().is_none());
    let second = call.base.throws[1].resolve(&result(200)).unwrap();
    assert_eq!(second.condition, Some(false));
    assert_eq!(second.message, None);
}

#[test]
fn test_throw_requires_if() {
    let err = load_err(
        r#"
pipelines:
  - name: guarded
    steps:
      - type: sleep
        name: nap
        duration: 1s
        throw:
          - message: always
"#,
    );
    assert_contains(&err, "The argument 'if' is required");
}

#[test]
fn test_throw_condition_records_step_dependency() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: guarded
    steps:
      - type: transform
        name: limit
        value: 10
      - type: transform
        name: check
        value: 3
        throw:
          - if: "${step.transform.limit.value < 5}"
            message: limit too low
"#,
    );
    let check = step(&pipeline, "transform.check");
    assert!(check.base.dependencies.depends_on.contains("transform.limit"));
}

#[test]
fn test_error_block_ignore() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: tolerant
    steps:
      - type: http
        name: call
        url: https://example.com
        error:
          ignore: true
"#,
    );
    let config = step(&pipeline, "http.call")
        .error_config(&EvalContext::new())
        .unwrap()
        .expect("error block applies");
    assert!(config.ignores_errors());
}
