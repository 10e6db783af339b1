//! Test: File Loading - declarations read from disk

use flowdef::core::PipelineConfig;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_declarations(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_declarations(
        r#"
mod: shop
pipelines:
  - name: checkout
    steps:
      - type: transform
        name: total
        value: 42
      - type: transform
        name: receipt
        value: "${step.transform.total.value}"
"#,
    );
    let config = PipelineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.mod_name, "shop");

    let pipeline = config.pipeline("shop.pipeline.checkout").unwrap();
    assert_eq!(pipeline.execution_order(), vec!["transform.total", "transform.receipt"]);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = PipelineConfig::from_file(dir.path().join("absent.yaml"));
    assert!(result.is_err());
}

#[test]
fn test_malformed_yaml() {
    let file = write_declarations("pipelines:\n  - name: [unclosed\n");
    assert!(PipelineConfig::from_file(file.path()).is_err());
}

#[test]
fn test_unknown_top_level_key() {
    let file = write_declarations("pipelines: []\nvariabels: {}\n");
    let err = PipelineConfig::from_file(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("variabels"));
}
