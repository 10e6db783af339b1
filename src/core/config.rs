//! Declaration file loading
//!
//! A YAML file is read into serde-derived raw declarations first, then every
//! resource is decoded against an evaluation context built from the file's
//! variables, connections, pipelines, integrations and notifiers.

use crate::core::context::{EvalContext, NAMESPACE_CONNECTION, NAMESPACE_NOTIFIER, NAMESPACE_VAR};
use crate::core::error::{Diagnostic, Diagnostics};
use crate::core::integration::{integration_namespace, with_default_integrations, Integration};
use crate::core::notifier::{notifier_namespace, with_default_notifier, Notifier};
use crate::core::pipeline::Pipeline;
use crate::core::step::{PipelineRef, StepDefaults, StepKind};
use crate::core::trigger::Trigger;
use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use serde_yaml::Mapping;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_MOD: &str = "local";
pub const NAMESPACE_PIPELINE: &str = "pipeline";
pub const NAMESPACE_INTEGRATION: &str = "integration";

const NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_-]*$";

fn default_mod() -> String {
    DEFAULT_MOD.to_string()
}

/// The file as written
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    #[serde(rename = "mod", default = "default_mod")]
    mod_name: String,
    default_connection_string: Option<String>,
    variables: BTreeMap<String, Value>,
    late_binding_variables: BTreeMap<String, Vec<String>>,
    connections: Map<String, Value>,
    pipelines: Vec<PipelineDecl>,
    triggers: Vec<Mapping>,
    integrations: Vec<Mapping>,
    notifiers: Vec<Mapping>,
}

/// A pipeline as written; steps and outputs stay generic until decoded
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineDecl {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub tags: BTreeMap<String, serde_yaml::Value>,
    pub max_concurrency: Option<i64>,
    pub params: Vec<ParamDecl>,
    pub steps: Vec<Mapping>,
    pub outputs: Vec<Mapping>,

    /// Anything else, reported as unsupported
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParamDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: Option<String>,
    pub description: Option<String>,
    pub default: Option<Value>,
    pub optional: bool,
    #[serde(rename = "enum")]
    pub enum_values: Option<Vec<Value>>,
    pub tags: BTreeMap<String, String>,
    pub format: Option<String>,
}

/// A fully decoded declaration file
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mod_name: String,
    pub defaults: StepDefaults,
    pub pipelines: Vec<Pipeline>,
    pub triggers: Vec<Trigger>,
    /// Keyed by `<type>.<name>`, including `http.default`
    pub integrations: BTreeMap<String, Integration>,
    /// Keyed by name, including `default`
    pub notifiers: BTreeMap<String, Notifier>,

    /// Load-time context; pipelines add `param` and `step` at run time
    context: EvalContext,
}

impl PipelineConfig {
    /// Load a declaration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        info!(path = %path.display(), "loading declarations");
        Self::from_yaml(&content)
    }

    /// Parse and decode declarations from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(yaml)?;
        let config = Self::decode(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn decode(raw: RawConfig) -> std::result::Result<Self, Diagnostics> {
        let mod_name = raw.mod_name;
        let defaults = StepDefaults {
            default_connection_string: raw.default_connection_string,
        };
        let name_pattern = Regex::new(NAME_PATTERN)
            .map_err(|e| Diagnostic::error("Invalid name pattern").with_detail(e.to_string()))?;
        let mut diags = Diagnostics::new();

        let mut ctx = EvalContext::new();
        ctx.set_namespace(NAMESPACE_VAR, Value::Object(raw.variables.into_iter().collect()));
        for (name, resources) in raw.late_binding_variables {
            ctx = ctx.with_late_binding_variable(&name, resources);
        }
        // Without declared connections, `connection.*` references stay deferrable
        if !raw.connections.is_empty() {
            ctx.set_namespace(NAMESPACE_CONNECTION, connection_namespace(raw.connections));
        }

        let mut pipeline_names = Map::new();
        for decl in &raw.pipelines {
            pipeline_names.insert(
                decl.name.clone(),
                json!({
                    "name": format!("{}.pipeline.{}", mod_name, decl.name),
                    "mod_full_version": mod_name,
                }),
            );
        }
        ctx.set_namespace(NAMESPACE_PIPELINE, Value::Object(pipeline_names));

        let mut integrations = Vec::new();
        for map in &raw.integrations {
            match Integration::decode(map, &ctx) {
                Ok(integration) => integrations.push(integration),
                Err(e) => diags.extend(e),
            }
        }
        check_duplicates(integrations.iter().map(Integration::full_name), "integration", &mut diags);
        let integrations = with_default_integrations(integrations);
        ctx.set_namespace(NAMESPACE_INTEGRATION, integration_namespace(&integrations));

        let mut notifiers = Vec::new();
        for map in &raw.notifiers {
            match Notifier::decode(map, &ctx, &integrations) {
                Ok(notifier) => notifiers.push(notifier),
                Err(e) => diags.extend(e),
            }
        }
        check_duplicates(notifiers.iter().map(|n| n.name.clone()), "notifier", &mut diags);
        let notifiers = with_default_notifier(notifiers);
        ctx.set_namespace(NAMESPACE_NOTIFIER, notifier_namespace(&notifiers));

        for decl in &raw.pipelines {
            check_name(&name_pattern, &decl.name, "pipeline", &mut diags);
        }
        check_duplicates(raw.pipelines.iter().map(|d| d.name.clone()), "pipeline", &mut diags);

        let mut pipelines = Vec::new();
        for decl in &raw.pipelines {
            match Pipeline::from_config(decl, &ctx, &mod_name, &defaults) {
                Ok(pipeline) => pipelines.push(pipeline),
                Err(e) => diags.extend(e),
            }
        }

        let mut triggers = Vec::new();
        for map in &raw.triggers {
            match Trigger::decode(map, &ctx, &mod_name, &defaults) {
                Ok(trigger) => {
                    check_name(&name_pattern, &trigger.name, "trigger", &mut diags);
                    triggers.push(trigger)
                }
                Err(e) => diags.extend(e),
            }
        }
        check_duplicates(triggers.iter().map(|t| t.full_name.clone()), "trigger", &mut diags);

        diags.into_result()?;
        debug!(
            pipelines = pipelines.len(),
            triggers = triggers.len(),
            integrations = integrations.len(),
            notifiers = notifiers.len(),
            "decoded declarations"
        );

        Ok(PipelineConfig {
            mod_name,
            defaults,
            pipelines,
            triggers,
            integrations,
            notifiers,
            context: ctx,
        })
    }

    /// Cross-resource checks: every referenced pipeline must exist
    pub fn validate(&self) -> Result<()> {
        let mut diags = Diagnostics::new();

        for pipeline in &self.pipelines {
            for step in &pipeline.steps {
                if let StepKind::Pipeline(call) = &step.kind {
                    if let Some(reference) = &call.pipeline {
                        if self.resolve_pipeline_ref(reference).is_none() {
                            diags.push(
                                Diagnostic::error(format!("Pipeline not found: {}", reference.name))
                                    .with_subject(format!("{}.{}", pipeline.full_name, step.full_name())),
                            );
                        }
                    }
                }
            }
        }

        for trigger in &self.triggers {
            for reference in trigger.pipelines() {
                if self.resolve_pipeline_ref(reference).is_none() {
                    diags.push(
                        Diagnostic::error(format!("Pipeline not found: {}", reference.name))
                            .with_subject(trigger.full_name.clone()),
                    );
                }
            }
        }

        diags.into_result()?;
        Ok(())
    }

    /// Find a pipeline by short name (`deploy`) or full name (`local.pipeline.deploy`)
    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.iter().find(|p| p.name == name || p.full_name == name)
    }

    pub fn resolve_pipeline_ref(&self, reference: &PipelineRef) -> Option<&Pipeline> {
        self.pipeline(&reference.name)
    }

    /// Find a trigger by short name or full name
    pub fn trigger(&self, name: &str) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.name == name || t.full_name == name)
    }

    pub fn integration(&self, full_name: &str) -> Option<&Integration> {
        self.integrations.get(full_name)
    }

    pub fn notifier(&self, name: &str) -> Option<&Notifier> {
        self.notifiers.get(name)
    }

    /// The context declarations were decoded against
    pub fn context(&self) -> &EvalContext {
        &self.context
    }
}

/// `connection.<type>.<name>` entries gain `type`, `short_name` and `name`
fn connection_namespace(connections: Map<String, Value>) -> Value {
    let mut by_type = Map::new();
    for (connection_type, named) in connections {
        let Value::Object(named) = named else {
            by_type.insert(connection_type, named);
            continue;
        };
        let mut by_name = Map::new();
        for (short_name, attributes) in named {
            let mut attributes = match attributes {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            attributes.insert("type".into(), json!(connection_type));
            attributes.insert("short_name".into(), json!(short_name));
            attributes.insert("name".into(), json!(format!("{}.{}", connection_type, short_name)));
            by_name.insert(short_name, Value::Object(attributes));
        }
        by_type.insert(connection_type, Value::Object(by_name));
    }
    Value::Object(by_type)
}

fn check_name(pattern: &Regex, name: &str, kind: &str, diags: &mut Diagnostics) {
    if !pattern.is_match(name) {
        diags.push(
            Diagnostic::error(format!("Invalid {} name", kind))
                .with_detail(format!("'{}' must start with a letter or underscore and contain only letters, digits, '_' and '-'", name)),
        );
    }
}

fn check_duplicates(names: impl Iterator<Item = String>, kind: &str, diags: &mut Diagnostics) {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.clone()) {
            diags.push(Diagnostic::error(format!("Duplicate {} name: {}", kind, name)));
        }
    }
}
