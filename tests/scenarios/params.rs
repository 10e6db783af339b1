//! Test: Pipeline Params - args checked against declared types, enums and resources

use crate::helpers::*;
use flowdef::core::ParamType;
use serde_json::{json, Map, Value};

const DECLARATIONS: &str = r#"
connections:
  postgres:
    prod:
      host: db.internal
notifiers:
  - name: ops
    notify:
      - integration: http.default
pipelines:
  - name: deploy
    params:
      - name: env
        type: string
        enum: [dev, prod]
        default: dev
      - name: replicas
        default: 2
      - name: version
        type: string
      - name: note
        type: string
        optional: true
      - name: db
        type: connection.postgres
        optional: true
      - name: notify
        type: notifier
        optional: true
    steps:
      - type: transform
        name: release
        value: "${param.version}"
"#;

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("args must be an object"),
    }
}

#[test]
fn test_defaults_fill_in_missing_args() {
    let config = load(DECLARATIONS);
    let pipeline = config.pipeline("deploy").unwrap();
    let resolved = pipeline
        .resolve_params(&args(json!({"version": "1.2.0"})), config.context())
        .unwrap();

    assert_eq!(resolved["env"], json!("dev"));
    assert_eq!(resolved["replicas"], json!(2));
    assert_eq!(resolved["version"], json!("1.2.0"));
    assert_eq!(resolved["note"], Value::Null);
}

#[test]
fn test_type_is_inferred_from_default() {
    let config = load(DECLARATIONS);
    let pipeline = config.pipeline("deploy").unwrap();
    assert_eq!(pipeline.param("replicas").unwrap().param_type, ParamType::Number);
}

#[test]
fn test_all_problems_are_reported_together() {
    let config = load(DECLARATIONS);
    let pipeline = config.pipeline("deploy").unwrap();
    let err = pipeline
        .resolve_params(&args(json!({"env": "qa", "colour": "blue"})), config.context())
        .unwrap_err()
        .to_string();

    assert_contains(&err, "Unknown pipeline param: colour");
    assert_contains(&err, "Invalid value for param env");
    assert_contains(&err, "Missing required pipeline param: version");
}

#[test]
fn test_connection_param_must_name_a_declared_connection() {
    let config = load(DECLARATIONS);
    let pipeline = config.pipeline("deploy").unwrap();

    let ok = args(json!({"version": "1", "db": "postgres.prod"}));
    assert!(pipeline.resolve_params(&ok, config.context()).is_ok());

    let ok = args(json!({"version": "1", "db": {"type": "postgres", "short_name": "prod"}}));
    assert!(pipeline.resolve_params(&ok, config.context()).is_ok());

    let missing = args(json!({"version": "1", "db": "postgres.staging"}));
    let err = pipeline.resolve_params(&missing, config.context()).unwrap_err().to_string();
    assert_contains(&err, "No connection found for the given connection name: staging");

    let wrong_type = args(json!({"version": "1", "db": "mysql.prod"}));
    let err = pipeline.resolve_params(&wrong_type, config.context()).unwrap_err().to_string();
    assert_contains(&err, "Invalid type for param db");
}

#[test]
fn test_notifier_param_must_name_a_declared_notifier() {
    let config = load(DECLARATIONS);
    let pipeline = config.pipeline("deploy").unwrap();

    let ok = args(json!({"version": "1", "notify": "ops"}));
    assert!(pipeline.resolve_params(&ok, config.context()).is_ok());

    let ok = args(json!({"version": "1", "notify": {"name": "default"}}));
    assert!(pipeline.resolve_params(&ok, config.context()).is_ok());

    let missing = args(json!({"version": "1", "notify": "devs"}));
    let err = pipeline.resolve_params(&missing, config.context()).unwrap_err().to_string();
    assert_contains(&err, "No notifier found for the given notifier name: devs");
}

#[test]
fn test_param_context_resolves_deferred_value() {
    let config = load(DECLARATIONS);
    let pipeline = config.pipeline("deploy").unwrap();
    let ctx = pipeline
        .param_context(&args(json!({"version": "2.0.0"})), config.context())
        .unwrap();
    let inputs = step(pipeline, "transform.release").get_inputs(&ctx).unwrap().inputs;
    assert_eq!(inputs["value"], json!("2.0.0"));
}

#[test]
fn test_default_must_match_declared_type() {
    let err = load_err(
        r#"
pipelines:
  - name: deploy
    params:
      - name: count
        type: number
        default: three
"#,
    );
    assert_contains(&err, "Invalid type for param count");
}
