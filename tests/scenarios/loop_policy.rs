//! Test: Loop Policy - until conditions and per-iteration overrides

use crate::helpers::*;
use flowdef::core::policy::LoopDefn;
use flowdef::core::{EvalContext, StepType};
use serde_json::json;

#[test]
fn test_until_and_url_override() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: pages
    steps:
      - type: http
        name: page
        url: https://example.com/0
        loop:
          until: "${loop.index >= 2}"
          url: "https://example.com/${loop.index + 1}"
"#,
    );
    let page = step(&pipeline, "http.page");
    let defn = page.loop_config().expect("loop block");

    let first = EvalContext::new().with_namespace("loop", json!({"index": 0}));
    assert!(!defn.resolve_until(&first).unwrap());

    let inputs = page.get_inputs(&EvalContext::new()).unwrap().inputs;
    let next = defn.update_input(inputs.clone(), &first).unwrap();
    assert_eq!(next["url"], json!("https://example.com/1"));
    assert_eq!(next.get("method"), inputs.get("method"));

    let third = EvalContext::new().with_namespace("loop", json!({"index": 2}));
    assert!(defn.resolve_until(&third).unwrap());
}

/// A loop definition without `until` keeps looping
#[test]
fn test_unset_until_resolves_to_false() {
    let defn = LoopDefn::new(StepType::Transform);
    assert!(!defn.resolve_until(&EvalContext::new()).unwrap());
}

#[test]
fn test_until_is_required_in_declarations() {
    let err = load_err(
        r#"
pipelines:
  - name: pages
    steps:
      - type: sleep
        name: nap
        duration: 1s
        loop:
          duration: 2s
"#,
    );
    assert_contains(&err, "The argument 'until' is required");
}

#[test]
fn test_static_override_wins() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: naps
    steps:
      - type: sleep
        name: nap
        duration: 1s
        loop:
          until: "${loop.index > 3}"
          duration: 5s
"#,
    );
    let nap = step(&pipeline, "sleep.nap");
    let inputs = nap.get_inputs(&EvalContext::new()).unwrap().inputs;
    let ctx = EvalContext::new().with_namespace("loop", json!({"index": 0}));
    let next = nap.loop_config().unwrap().update_input(inputs, &ctx).unwrap();
    assert_eq!(next["duration"], json!("5s"));
}

#[test]
fn test_email_steps_loop() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: mail
    steps:
      - type: email
        name: remind
        to: [ops@example.com]
        from: bot@example.com
        smtp_username: bot
        smtp_password: secret
        host: smtp.example.com
        port: 587
        subject: reminder
        loop:
          until: "${loop.index >= 1}"
          subject: "reminder ${loop.index + 1}"
"#,
    );
    let remind = step(&pipeline, "email.remind");
    let inputs = remind.get_inputs(&EvalContext::new()).unwrap().inputs;
    let ctx = EvalContext::new().with_namespace("loop", json!({"index": 0}));
    let next = remind.loop_config().unwrap().update_input(inputs, &ctx).unwrap();
    assert_eq!(next["subject"], json!("reminder 1"));
}

#[test]
fn test_unknown_loop_attribute() {
    let err = load_err(
        r#"
pipelines:
  - name: naps
    steps:
      - type: sleep
        name: nap
        duration: 1s
        loop:
          until: true
          url: https://example.com
"#,
    );
    assert_contains(&err, "Invalid attribute 'url' in the step loop block");
}
