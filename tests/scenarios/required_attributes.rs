//! Test: Required Attributes - per step type checks and late-bound inputs

use crate::helpers::*;
use flowdef::core::dependency::ConnectionDependency;
use flowdef::core::{EvalContext, PipelineStep, StepDefaults};
use serde_json::json;
use serde_yaml::Mapping;

#[test]
fn test_every_step_type_reports_its_missing_attributes() {
    let err = load_err(
        r#"
pipelines:
  - name: bare
    steps:
      - type: http
        name: fetch
        method: get
      - type: sleep
        name: nap
      - type: email
        name: mail
        subject: hi
      - type: function
        name: handler
        runtime: python3.12
      - type: input
        name: approve
        prompt: Continue?
      - type: message
        name: tell
"#,
    );
    for (attribute, step) in [
        ("url", "http.fetch"),
        ("duration", "sleep.nap"),
        ("to", "email.mail"),
        ("from", "email.mail"),
        ("smtp_username", "email.mail"),
        ("smtp_password", "email.mail"),
        ("host", "email.mail"),
        ("port", "email.mail"),
        ("source", "function.handler"),
        ("notifier", "input.approve"),
        ("input_type", "input.approve"),
        ("notifier", "message.tell"),
        ("text", "message.tell"),
    ] {
        assert_contains(&err, &format!("The attribute '{}' is required: {}", attribute, step));
    }
}

#[test]
fn test_email_with_partial_connection_settings() {
    let err = load_err(
        r#"
pipelines:
  - name: mailer
    steps:
      - type: email
        name: mail
        to: [ops@example.com]
        from: ci@example.com
        host: smtp.example.com
        port: 587
"#,
    );
    assert_contains(&err, "The attribute 'smtp_username' is required: email.mail");
    assert_contains(&err, "The attribute 'smtp_password' is required: email.mail");
    assert!(!err.contains("The attribute 'host' is required"), "{}", err);
    assert!(!err.contains("The attribute 'port' is required"), "{}", err);
}

/// An expression counts as set even when it can only be resolved at run time
#[test]
fn test_deferred_expressions_satisfy_required_attributes() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: deferred
    params:
      - name: target
        type: string
        default: https://example.com
      - name: wait
        type: string
        default: 5s
    steps:
      - type: http
        name: fetch
        url: "${param.target}"
      - type: sleep
        name: nap
        duration: "${param.wait}"
      - type: message
        name: tell
        notifier: "${notifier.default}"
        text: "fetched ${step.http.fetch.status_code}"
"#,
    );
    assert!(step(&pipeline, "http.fetch").base.unresolved_attributes.contains_key("url"));
    assert!(step(&pipeline, "sleep.nap").base.unresolved_attributes.contains_key("duration"));
    assert!(step(&pipeline, "message.tell").base.unresolved_attributes.contains_key("text"));
}

#[test]
fn test_late_binding_variable_is_reported_by_get_inputs() {
    let map: Mapping = serde_yaml::from_str(
        r#"
type: http
name: call
method: get
url: "https://${var.conn.host}/health"
"#,
    )
    .unwrap();
    let ctx = EvalContext::new().with_late_binding_variable("conn", vec!["aws.prod".into()]);
    let call = PipelineStep::decode(&map, &ctx, "local.pipeline.test", &StepDefaults::default()).unwrap();
    assert!(call.base.unresolved_attributes.contains_key("url"));
    assert!(call.base.dependencies.connection_depends_on.contains("aws.prod"));

    let inputs = call.get_inputs(&ctx).unwrap();
    assert_eq!(
        inputs.connection_dependencies,
        vec![ConnectionDependency {
            source: "prod".to_string(),
            connection_type: "aws".to_string(),
        }]
    );
    assert!(!inputs.inputs.contains_key("url"));
    assert_eq!(inputs.inputs["method"], json!("get"));
}

#[test]
fn test_late_binding_variable_from_declarations() {
    let config = load(
        r#"
late_binding_variables:
  conn: [aws.prod, aws.staging]
pipelines:
  - name: late
    steps:
      - type: transform
        name: account
        value: "${var.conn.account_id}"
"#,
    );
    let pipeline = &config.pipelines[0];
    let account = step(pipeline, "transform.account");

    let inputs = account.get_inputs(config.context()).unwrap();
    assert_eq!(inputs.connection_dependencies.len(), 2);
    assert!(inputs.connection_dependencies.contains(&ConnectionDependency {
        source: "staging".to_string(),
        connection_type: "aws".to_string(),
    }));
    assert!(inputs.inputs.get("value").is_none());
}
