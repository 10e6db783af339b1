//! Test: Equality - change detection between two loads of the same declarations

use crate::helpers::*;

fn declarations(depends_on: &str, url: &str) -> String {
    format!(
        r#"
pipelines:
  - name: deploy
    params:
      - name: env
        default: dev
      - name: region
        default: eu
    steps:
      - type: sleep
        name: wait
        duration: 1s
      - type: transform
        name: prepare
        value: ready
      - type: http
        name: call
        url: "{url}"
        depends_on: {depends_on}
    outputs:
      - name: status
        value: "${{step.http.call.status_code}}"
"#
    )
}

#[test]
fn test_same_text_decodes_equal() {
    let yaml = declarations("[step.sleep.wait, step.transform.prepare]", "https://example.com");
    assert_eq!(only_pipeline(&yaml), only_pipeline(&yaml));
}

#[test]
fn test_depends_on_order_is_ignored() {
    let a = only_pipeline(&declarations("[step.sleep.wait, step.transform.prepare]", "https://example.com"));
    let b = only_pipeline(&declarations("[step.transform.prepare, step.sleep.wait]", "https://example.com"));
    assert_eq!(a, b);
}

#[test]
fn test_dependency_content_matters() {
    let a = only_pipeline(&declarations("[step.sleep.wait, step.transform.prepare]", "https://example.com"));
    let b = only_pipeline(&declarations("[step.sleep.wait]", "https://example.com"));
    assert_ne!(a, b);
}

#[test]
fn test_unresolved_expression_content_matters() {
    let a = only_pipeline(&declarations("[step.sleep.wait]", "https://${param.env}.example.com"));
    let b = only_pipeline(&declarations("[step.sleep.wait]", "https://${param.region}.example.com"));
    assert_ne!(a, b);
}
