//! Test: Dependency Extraction - step, credential and connection edges

use crate::helpers::*;
use flowdef::core::dependency::DYNAMIC_NAME;
use flowdef::core::EvalContext;
use serde_json::json;

#[test]
fn test_step_reference_yields_exactly_one_edge() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: chain
    steps:
      - type: http
        name: a
        url: https://example.com
      - type: transform
        name: summary
        value:
          body: "${step.http.a.response_body}"
          status: "${step.http.a.status_code}"
"#,
    );
    let summary = step(&pipeline, "transform.summary");
    assert_eq!(summary.base.dependencies.depends_on.as_slice(), ["http.a"]);
    assert!(summary.base.dependencies.credential_depends_on.is_empty());
    assert!(summary.base.dependencies.connection_depends_on.is_empty());
}

#[test]
fn test_explicit_and_implicit_dependencies_merge() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: chain
    steps:
      - type: sleep
        name: wait
        duration: 1s
      - type: transform
        name: list
        value: [1, 2]
      - type: transform
        name: each
        for_each: "${step.transform.list.value}"
        value: "${each.value}"
        depends_on: [step.sleep.wait, step.transform.list]
"#,
    );
    let each = step(&pipeline, "transform.each");
    let deps = &each.base.dependencies.depends_on;
    assert_eq!(deps.len(), 2);
    assert!(deps.contains("sleep.wait"));
    assert!(deps.contains("transform.list"));
    assert_eq!(pipeline.execution_order().last().map(String::as_str), Some("transform.each"));
}

#[test]
fn test_dynamic_credential_reference() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: creds
    params:
      - name: cred
        default: default
    steps:
      - type: http
        name: call
        url: https://example.com
        request_headers:
          Authorization: "Bearer ${credential.aws[param.cred].session_token}"
"#,
    );
    let call = step(&pipeline, "http.call");
    let expected = format!("aws.{}", DYNAMIC_NAME);
    assert!(call.base.dependencies.credential_depends_on.contains(&expected));
    assert!(call.base.unresolved_attributes.contains_key("request_headers"));
}

#[test]
fn test_connection_reference_is_deferred() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: rows
    steps:
      - type: query
        name: users
        database: "${connection.postgres.prod.connection_string}"
        sql: select * from users
"#,
    );
    let users = step(&pipeline, "query.users");
    assert_eq!(users.base.dependencies.connection_depends_on.as_slice(), ["postgres.prod"]);

    let ctx = EvalContext::new().with_namespace(
        "connection",
        json!({"postgres": {"prod": {"connection_string": "postgres://prod"}}}),
    );
    let inputs = users.get_inputs(&ctx).unwrap().inputs;
    assert_eq!(inputs["database"], json!("postgres://prod"));
}

#[test]
fn test_late_binding_variable_adds_connection_edge() {
    let pipeline = only_pipeline(
        r#"
late_binding_variables:
  conn: [aws.prod]
pipelines:
  - name: late
    steps:
      - type: transform
        name: account
        value: "${var.conn.account_id}"
"#,
    );
    let account = step(&pipeline, "transform.account");
    assert!(account.base.dependencies.connection_depends_on.contains("aws.prod"));
    assert!(account.base.unresolved_attributes.contains_key("value"));
}

#[test]
fn test_invalid_depends_on_format() {
    let err = load_err(
        r#"
pipelines:
  - name: bad
    steps:
      - type: sleep
        name: wait
        duration: 1s
        depends_on: [sleep.other]
"#,
    );
    assert_contains(&err, "Invalid depends_on format sleep.other");
}
