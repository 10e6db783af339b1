//! Test utility functions for flowdef

use flowdef::core::{Pipeline, PipelineConfig, PipelineStep};

/// Load declarations that are expected to be valid
pub fn load(yaml: &str) -> PipelineConfig {
    match PipelineConfig::from_yaml(yaml) {
        Ok(config) => config,
        Err(e) => panic!("declarations failed to load: {:#}", e),
    }
}

/// Load declarations that are expected to fail; returns the full message
pub fn load_err(yaml: &str) -> String {
    match PipelineConfig::from_yaml(yaml) {
        Ok(_) => panic!("declarations loaded but were expected to fail"),
        Err(e) => format!("{:#}", e),
    }
}

/// The first pipeline of a declaration file
pub fn only_pipeline(yaml: &str) -> Pipeline {
    load(yaml)
        .pipelines
        .into_iter()
        .next()
        .expect("no pipeline declared")
}

pub fn step<'a>(pipeline: &'a Pipeline, full_name: &str) -> &'a PipelineStep {
    pipeline
        .step(full_name)
        .unwrap_or_else(|| panic!("step {} not found in {}", full_name, pipeline.full_name))
}

/// Assert that `message` contains `expected`, showing both on failure
pub fn assert_contains(message: &str, expected: &str) {
    assert!(
        message.contains(expected),
        "expected error containing {:?}, got:\n{}",
        expected,
        message
    );
}
