//! Test: Deferred Resolution - attributes that can only be evaluated at run time

use crate::helpers::*;
use flowdef::core::{EvalContext, PipelineStep, StepDefaults};
use serde_json::{json, Map};
use serde_yaml::Mapping;

/// Param references are deferred, and every run-time resolution is a fresh value
#[test]
fn test_param_reference_resolves_the_same_way_twice() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: fetch
    params:
      - name: host
        type: string
        default: example.com
    steps:
      - type: http
        name: get
        url: "https://${param.host}/items"
"#,
    );
    let get = step(&pipeline, "http.get");
    assert!(get.base.unresolved_attributes.contains_key("url"));

    let ctx = pipeline.param_context(&Map::new(), &EvalContext::new()).unwrap();
    let first = get.get_inputs(&ctx).unwrap();
    let second = get.get_inputs(&ctx).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.inputs["url"], json!("https://example.com/items"));

    // the template keeps its expression after resolution
    assert!(get.base.unresolved_attributes.contains_key("url"));
}

/// `try()` is deferred even when every namespace it needs is present
#[test]
fn test_try_is_never_evaluated_at_decode_time() {
    let map: Mapping = serde_yaml::from_str(
        r#"
type: transform
name: pick
value: '${try(each.value, "default")}'
"#,
    )
    .unwrap();
    let ctx = EvalContext::new().with_namespace("each", json!({"value": "from-each"}));
    let step = PipelineStep::decode(&map, &ctx, "local.pipeline.test", &StepDefaults::default()).unwrap();
    assert!(step.base.unresolved_attributes.contains_key("value"));

    let inputs = step.get_inputs(&ctx).unwrap().inputs;
    assert_eq!(inputs["value"], json!("from-each"));

    let inputs = step.get_inputs(&EvalContext::new()).unwrap().inputs;
    assert_eq!(inputs["value"], json!("default"));
}

#[test]
fn test_static_attributes_are_resolved_at_load() {
    let pipeline = only_pipeline(
        r#"
variables:
  region: eu-west-1
pipelines:
  - name: report
    steps:
      - type: transform
        name: region
        value: "${upper(var.region)}"
"#,
    );
    let region = step(&pipeline, "transform.region");
    assert!(region.base.unresolved_attributes.is_empty());
    let inputs = region.get_inputs(&EvalContext::new()).unwrap().inputs;
    assert_eq!(inputs["value"], json!("EU-WEST-1"));
}

#[test]
fn test_step_output_resolves_once_the_step_ran() {
    let pipeline = only_pipeline(
        r#"
pipelines:
  - name: chain
    steps:
      - type: transform
        name: first
        value: 21
      - type: transform
        name: second
        value: "${step.transform.first.value * 2}"
"#,
    );
    let second = step(&pipeline, "transform.second");
    assert!(second.get_inputs(&EvalContext::new()).is_err());

    let ctx = EvalContext::new().with_step_output("transform", "first", json!({"value": 21}));
    let inputs = second.get_inputs(&ctx).unwrap().inputs;
    assert_eq!(inputs["value"], json!(42));
}

#[test]
fn test_result_outside_policy_block_is_fatal() {
    let err = load_err(
        r#"
pipelines:
  - name: bad
    steps:
      - type: transform
        name: echo
        value: "${result.response_body}"
"#,
    );
    assert_contains(&err, "Unknown variable");
}

#[test]
fn test_unknown_variable_is_fatal() {
    let err = load_err(
        r#"
variables:
  region: eu-west-1
pipelines:
  - name: bad
    steps:
      - type: transform
        name: echo
        value: "${var.zone}"
"#,
    );
    assert_contains(&err, "Unsupported attribute");
}
