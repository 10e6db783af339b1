//! Test: Triggers - schedules, query captures and http methods

use crate::helpers::*;
use chrono::{TimeZone, Utc};
use flowdef::core::trigger::ExecutionMode;
use flowdef::core::{EvalContext, TriggerConfig};
use serde_json::json;

const DECLARATIONS: &str = r#"
default_connection_string: sqlite:///tmp/app.db
pipelines:
  - name: deploy
  - name: cleanup
triggers:
  - type: schedule
    name: nightly
    schedule: daily
    pipeline: "${pipeline.deploy}"
    args:
      env: prod
  - type: schedule
    name: paused
    enabled: false
    schedule: "30 6 * * 1"
    pipeline: "${pipeline.cleanup}"
  - type: query
    name: users
    schedule: 15m
    sql: select * from users
    primary_key: id
    capture:
      insert:
        pipeline: "${pipeline.deploy}"
        args:
          rows: "${self.inserted_rows}"
  - type: http
    name: hook
    execution_mode: synchronous
    method:
      post:
        pipeline: "${pipeline.deploy}"
        args:
          body: "${self.request_body}"
      get:
        pipeline: "${pipeline.cleanup}"
        execution_mode: asynchronous
"#;

#[test]
fn test_schedule_fires_on_interval() {
    let config = load(DECLARATIONS);
    let nightly = config.trigger("nightly").unwrap();
    assert_eq!(nightly.full_name, "local.trigger.schedule.nightly");
    assert_eq!(nightly.get_args(&EvalContext::new()).unwrap()["env"], json!("prod"));

    let TriggerConfig::Schedule(schedule) = &nightly.config else {
        panic!("expected a schedule trigger");
    };
    let after = Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 0).unwrap();
    assert_eq!(
        schedule.next_fire(after).unwrap(),
        Some(Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap())
    );
}

#[test]
fn test_disabled_cron_trigger() {
    let config = load(DECLARATIONS);
    let paused = config.trigger("local.trigger.schedule.paused").unwrap();
    assert!(!paused.is_enabled());

    let TriggerConfig::Schedule(schedule) = &paused.config else {
        panic!("expected a schedule trigger");
    };
    // 2024-03-09 is a Saturday; the next Monday is the 11th
    let after = Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap();
    assert_eq!(
        schedule.next_fire(after).unwrap(),
        Some(Utc.with_ymd_and_hms(2024, 3, 11, 6, 30, 0).unwrap())
    );
}

#[test]
fn test_query_trigger_uses_default_database() {
    let config = load(DECLARATIONS);
    let users = config.trigger("users").unwrap();
    let TriggerConfig::Query(query) = &users.config else {
        panic!("expected a query trigger");
    };
    let resolved = query.get_config(config.context()).unwrap();
    assert_eq!(resolved.database.as_deref(), Some("sqlite:///tmp/app.db"));
    assert_eq!(resolved.primary_key.as_deref(), Some("id"));

    let fired = EvalContext::new().with_namespace("self", json!({"inserted_rows": [{"id": 7}]}));
    let args = query.captures["insert"].get_args(&fired).unwrap();
    assert_eq!(args["rows"], json!([{"id": 7}]));
}

#[test]
fn test_http_trigger_methods() {
    let config = load(DECLARATIONS);
    let hook = config.trigger("hook").unwrap();
    let TriggerConfig::Http(http) = &hook.config else {
        panic!("expected an http trigger");
    };
    assert_eq!(http.execution_mode, Some(ExecutionMode::Synchronous));
    assert_eq!(http.methods["get"].execution_mode, Some(ExecutionMode::Asynchronous));
    assert_eq!(
        http.methods["post"].pipeline.as_ref().map(|p| p.name.as_str()),
        Some("local.pipeline.deploy")
    );
    assert_eq!(hook.pipelines().len(), 2);
}

#[test]
fn test_invalid_schedule() {
    let err = load_err(
        r#"
pipelines:
  - name: deploy
triggers:
  - type: schedule
    name: bad
    schedule: "* * *"
    pipeline: "${pipeline.deploy}"
"#,
    );
    assert_contains(&err, "Invalid cron expression: * * *");
}

#[test]
fn test_unknown_trigger_type() {
    let err = load_err(
        r#"
triggers:
  - type: webhook
    name: hook
"#,
    );
    assert_contains(&err, "Invalid trigger type");
}
