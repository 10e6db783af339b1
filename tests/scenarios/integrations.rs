//! Test: Integrations and Notifiers - delivery targets used by input and message steps

use crate::helpers::*;
use flowdef::core::integration::IntegrationKind;
use flowdef::core::{EvalContext, IntegrationType};
use serde_json::json;

const DECLARATIONS: &str = r##"
variables:
  slack_token: xoxb-123
integrations:
  - type: slack
    name: ops
    token: "${var.slack_token}"
    channel: "#ops"
  - type: email
    name: mail
    from: bot@example.com
    smtp_host: smtp.example.com
    smtp_tls: required
  - type: msteams
    name: chat
    webhook_url: https://teams.example.com/hook
notifiers:
  - name: admins
    notify:
      - integration: slack.ops
        channel: "#admins"
      - integration: "${integration.email.mail}"
        to: [admins@example.com]
        subject: Approval needed
pipelines:
  - name: approve
    steps:
      - type: input
        name: ask
        input_type: button
        prompt: Ship it?
        notifier: "${notifier.admins}"
        options:
          - value: "yes"
          - value: "no"
      - type: message
        name: tell
        notifier: "${notifier.default}"
        text: shipped
"##;

#[test]
fn test_integrations_are_decoded() {
    let config = load(DECLARATIONS);
    let slack = config.integration("slack.ops").unwrap();
    assert_eq!(slack.integration_type(), IntegrationType::Slack);
    let IntegrationKind::Slack(inner) = &slack.kind else {
        panic!("expected slack");
    };
    assert_eq!(inner.token.as_deref(), Some("xoxb-123"));

    assert!(config.integration("email.mail").is_some());
    assert!(config.integration("msteams.chat").is_some());
    assert!(config.integration("http.default").is_some());
}

#[test]
fn test_notifier_reaches_input_step() {
    let config = load(DECLARATIONS);
    let admins = config.notifier("admins").unwrap();
    assert_eq!(admins.notifies.len(), 2);

    let pipeline = config.pipeline("approve").unwrap();
    let inputs = step(pipeline, "input.ask").get_inputs(&EvalContext::new()).unwrap().inputs;
    assert_eq!(inputs["notifier"]["name"], json!("admins"));
    assert_eq!(
        inputs["notifier"]["notifies"][0]["integration"]["full_name"],
        json!("slack.ops")
    );
}

#[test]
fn test_message_step_uses_builtin_default_notifier() {
    let config = load(DECLARATIONS);
    let pipeline = config.pipeline("approve").unwrap();
    let inputs = step(pipeline, "message.tell").get_inputs(config.context()).unwrap().inputs;
    assert_eq!(inputs["notifier"]["name"], json!("default"));
}

#[test]
fn test_slack_token_and_webhook_are_exclusive() {
    let err = load_err(
        r#"
integrations:
  - type: slack
    name: ops
    token: xoxb-123
    webhook_url: https://hooks.slack.com/x
"#,
    );
    assert_contains(&err, "Attributes token and webhook_url are mutually exclusive: slack.ops");
}

#[test]
fn test_email_tls_mode() {
    let err = load_err(
        r#"
integrations:
  - type: email
    name: mail
    from: bot@example.com
    smtp_host: smtp.example.com
    smtp_tls: maybe
"#,
    );
    assert_contains(&err, "Attribute smtp_tls specified with invalid value maybe: email.mail");
}

#[test]
fn test_notify_channel_requires_slack() {
    let err = load_err(
        r##"
integrations:
  - type: email
    name: mail
    from: bot@example.com
    smtp_host: smtp.example.com
notifiers:
  - name: admins
    notify:
      - integration: email.mail
        channel: "#admins"
"##,
    );
    assert_contains(&err, "Attribute 'channel' is not a valid attribute for email type integration");
}

#[test]
fn test_notifier_needs_notify_blocks() {
    let err = load_err(
        r#"
notifiers:
  - name: nobody
    title: Nobody
"#,
    );
    assert_contains(&err, "notifier must have at least one notify block to send the request to: nobody");
}
