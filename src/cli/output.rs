//! CLI output formatting

use crate::core::dependency::DependencySet;
use crate::core::{Pipeline, PipelineConfig, PipelineStep};
use chrono::{DateTime, Utc};
use console::Emoji;
use serde_json::{json, Value};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏰ ", "@ ");

/// One indented line per dependency set that is not empty
fn format_dependency_set(label: &str, set: &DependencySet) -> Option<String> {
    if set.is_empty() {
        return None;
    }
    let names: Vec<&str> = set.iter().map(String::as_str).collect();
    Some(format!("    {} {}", style(label).dim(), names.join(", ")))
}

/// Multi-line description of a decoded step
pub fn format_step(step: &PipelineStep) -> String {
    let base = &step.base;
    let mut lines = vec![format!("  {}", style(step.full_name()).cyan().bold())];

    let deps = &base.dependencies;
    lines.extend(format_dependency_set("depends_on:", &deps.depends_on));
    lines.extend(format_dependency_set("credentials:", &deps.credential_depends_on));
    lines.extend(format_dependency_set("connections:", &deps.connection_depends_on));

    if !base.unresolved_attributes.is_empty() {
        let deferred: Vec<&str> = base.unresolved_attributes.keys().map(String::as_str).collect();
        lines.push(format!("    {} {}", style("deferred:").dim(), style(deferred.join(", ")).yellow()));
    }

    let mut policies = Vec::new();
    if base.retry.is_some() {
        policies.push("retry".to_string());
    }
    if base.error_config.is_some() {
        policies.push("error".to_string());
    }
    if !base.throws.is_empty() {
        policies.push(format!("throw x{}", base.throws.len()));
    }
    if base.loop_defn.is_some() {
        policies.push("loop".to_string());
    }
    if base.for_each.is_some() {
        policies.push("for_each".to_string());
    }
    if !policies.is_empty() {
        lines.push(format!("    {} {}", style("policies:").dim(), policies.join(", ")));
    }

    lines.join("\n")
}

/// JSON shape of `inspect --json`
pub fn pipeline_json(pipeline: &Pipeline) -> Value {
    let steps: Vec<Value> = pipeline
        .steps
        .iter()
        .map(|step| {
            let base = &step.base;
            json!({
                "name": step.full_name(),
                "depends_on": base.dependencies.depends_on,
                "credential_depends_on": base.dependencies.credential_depends_on,
                "connection_depends_on": base.dependencies.connection_depends_on,
                "unresolved_attributes": base.unresolved_attributes.keys().collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "name": pipeline.full_name,
        "params": pipeline.params,
        "steps": steps,
        "outputs": pipeline.outputs.iter().map(|o| &o.name).collect::<Vec<_>>(),
        "execution_order": pipeline.execution_order(),
    })
}

/// JSON shape of `validate --json`
pub fn config_json(config: &PipelineConfig) -> Value {
    json!({
        "mod": config.mod_name,
        "pipelines": config.pipelines.iter().map(|p| json!({
            "name": p.full_name,
            "steps": p.steps.len(),
            "params": p.params.len(),
            "outputs": p.outputs.len(),
        })).collect::<Vec<_>>(),
        "triggers": config.triggers.iter().map(|t| json!({
            "name": t.full_name,
            "type": t.trigger_type().as_str(),
            "enabled": t.is_enabled(),
        })).collect::<Vec<_>>(),
        "integrations": config.integrations.keys().collect::<Vec<_>>(),
        "notifiers": config.notifiers.keys().collect::<Vec<_>>(),
    })
}

/// `attempt 3: 400ms`
pub fn format_backoff(attempt: u32, delay: Duration) -> String {
    format!(
        "  {} {}",
        style(format!("attempt {}:", attempt)).dim(),
        style(format_millis(delay)).cyan()
    )
}

pub fn format_millis(delay: Duration) -> String {
    let millis = delay.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{:.1}s", millis as f64 / 1000.0)
    }
}

pub fn format_fire(at: DateTime<Utc>) -> String {
    format!("  {} {}", CLOCK, at.format("%Y-%m-%d %H:%M UTC"))
}
