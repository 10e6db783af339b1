//! Pipeline domain model

use crate::core::body::body_from_mapping;
use crate::core::config::{ParamDecl, PipelineDecl};
use crate::core::context::{EvalContext, NAMESPACE_PARAM};
use crate::core::error::{Diagnostic, Diagnostics};
use crate::core::output::PipelineOutput;
use crate::core::param::{ParamType, PipelineParam};
use crate::core::step::{PipelineStep, StepDefaults};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// A decoded pipeline
///
/// Steps are kept in declaration order and addressed by their
/// `<type>.<name>` full name.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub mod_name: String,
    pub name: String,
    /// `<mod>.pipeline.<name>`
    pub full_name: String,

    pub title: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub max_concurrency: Option<i64>,

    pub params: Vec<PipelineParam>,
    pub steps: Vec<PipelineStep>,
    pub outputs: Vec<PipelineOutput>,

    /// Step execution order (topological sort)
    execution_order: Vec<String>,
}

impl Pipeline {
    /// Decode a pipeline declaration
    pub fn from_config(
        decl: &PipelineDecl,
        ctx: &EvalContext,
        mod_name: &str,
        defaults: &StepDefaults,
    ) -> Result<Self, Diagnostics> {
        let full_name = format!("{}.pipeline.{}", mod_name, decl.name);
        let mut diags = Diagnostics::new();

        for key in decl.extra.keys() {
            diags.push(
                Diagnostic::error(format!("Unsupported attribute for pipeline: {}", key)).with_subject(full_name.clone()),
            );
        }

        let mut tags = BTreeMap::new();
        for (key, value) in &decl.tags {
            match value.as_str() {
                Some(s) => {
                    tags.insert(key.clone(), s.to_string());
                }
                None => diags.push(
                    Diagnostic::error("Unable to parse tags attribute to string map")
                        .with_detail(format!("Tag '{}' is not a string", key))
                        .with_subject(full_name.clone()),
                ),
            }
        }

        let mut params: Vec<PipelineParam> = Vec::new();
        for param_decl in &decl.params {
            match decode_param(param_decl, &full_name) {
                Ok(param) => {
                    if params.iter().any(|p| p.name == param.name) {
                        diags.push(
                            Diagnostic::error(format!("Duplicate param name: {}", param.name))
                                .with_subject(full_name.clone()),
                        );
                    } else {
                        params.push(param);
                    }
                }
                Err(e) => diags.extend(e),
            }
        }

        let mut steps: Vec<PipelineStep> = Vec::new();
        for step_map in &decl.steps {
            match PipelineStep::decode(step_map, ctx, &full_name, defaults) {
                Ok(step) => {
                    if steps.iter().any(|s| s.full_name() == step.full_name()) {
                        diags.push(
                            Diagnostic::error(format!("Duplicate step name: {}", step.full_name()))
                                .with_subject(full_name.clone()),
                        );
                    } else {
                        steps.push(step);
                    }
                }
                Err(e) => diags.extend(e),
            }
        }

        let mut outputs: Vec<PipelineOutput> = Vec::new();
        for output_map in &decl.outputs {
            let name = output_map.get("name").and_then(|v| v.as_str()).unwrap_or_default();
            if name.is_empty() {
                diags.push(Diagnostic::error("Missing output name").with_subject(full_name.clone()));
                continue;
            }
            let subject = format!("{}.output.{}", full_name, name);
            let decoded = body_from_mapping(output_map, &[], &["name"], &subject)
                .and_then(|body| PipelineOutput::decode(name, &body, &subject));
            match decoded {
                Ok(output) if outputs.iter().any(|o| o.name == output.name) => diags.push(
                    Diagnostic::error(format!("Duplicate output name: {}", output.name)).with_subject(full_name.clone()),
                ),
                Ok(output) => outputs.push(output),
                Err(e) => diags.extend(e),
            }
        }

        let mut pipeline = Pipeline {
            mod_name: mod_name.to_string(),
            name: decl.name.clone(),
            full_name,
            title: decl.title.clone(),
            description: decl.description.clone(),
            documentation: decl.documentation.clone(),
            tags,
            max_concurrency: decl.max_concurrency,
            params,
            steps,
            outputs,
            execution_order: Vec::new(),
        };

        if diags.is_empty() {
            diags.extend(pipeline.validate());
        }
        diags.into_result()?;

        pipeline.execution_order = pipeline.topological_sort();
        debug!(
            pipeline = %pipeline.full_name,
            steps = pipeline.steps.len(),
            "decoded pipeline"
        );
        Ok(pipeline)
    }

    /// Check step references and the dependency graph
    fn validate(&self) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let names: HashSet<String> = self.steps.iter().map(|s| s.full_name()).collect();

        for step in &self.steps {
            for dep in step.base.dependencies.depends_on.iter() {
                if !names.contains(dep) {
                    diags.push(
                        Diagnostic::error(format!(
                            "Step '{}' depends on non-existent step '{}'",
                            step.full_name(),
                            dep
                        ))
                        .with_subject(self.full_name.clone()),
                    );
                }
            }
        }
        for output in &self.outputs {
            for dep in output.dependencies.depends_on.iter() {
                if !names.contains(dep) {
                    diags.push(
                        Diagnostic::error(format!(
                            "Output '{}' depends on non-existent step '{}'",
                            output.name, dep
                        ))
                        .with_subject(self.full_name.clone()),
                    );
                }
            }
        }

        if diags.is_empty() {
            if let Err(diag) = self.check_cycles() {
                diags.push(diag);
            }
        }
        diags
    }

    /// Check for cycles in the step dependency graph
    fn check_cycles(&self) -> Result<(), Diagnostic> {
        let mut visited = HashSet::new();
        let mut recursion_stack = HashSet::new();

        for step in &self.steps {
            let name = step.full_name();
            if !visited.contains(&name) {
                self.dfs_check(&name, &mut visited, &mut recursion_stack)?;
            }
        }
        Ok(())
    }

    fn dfs_check(
        &self,
        step_name: &str,
        visited: &mut HashSet<String>,
        recursion_stack: &mut HashSet<String>,
    ) -> Result<(), Diagnostic> {
        visited.insert(step_name.to_string());
        recursion_stack.insert(step_name.to_string());

        if let Some(step) = self.step(step_name) {
            for dep in step.base.dependencies.depends_on.iter() {
                if recursion_stack.contains(dep) {
                    return Err(Diagnostic::error(format!(
                        "Cycle detected in dependency graph involving step '{}'",
                        dep
                    ))
                    .with_subject(self.full_name.clone()));
                }
                if !visited.contains(dep) {
                    self.dfs_check(dep, visited, recursion_stack)?;
                }
            }
        }

        recursion_stack.remove(step_name);
        Ok(())
    }

    /// Get a step by `<type>.<name>`
    pub fn step(&self, full_name: &str) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.full_name() == full_name)
    }

    pub fn param(&self, name: &str) -> Option<&PipelineParam> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&PipelineOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Steps in an order that respects `depends_on`
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Steps whose dependencies are all in `completed` and which are not
    /// themselves completed
    pub fn ready_steps(&self, completed: &HashSet<String>) -> Vec<&PipelineStep> {
        self.steps
            .iter()
            .filter(|s| !completed.contains(&s.full_name()))
            .filter(|s| s.base.dependencies.depends_on.iter().all(|d| completed.contains(d)))
            .collect()
    }

    fn topological_sort(&self) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();

        // Sort for deterministic order
        let mut names: Vec<String> = self.steps.iter().map(|s| s.full_name()).collect();
        names.sort();

        for name in names {
            self.visit(&name, &mut visited, &mut result);
        }
        result
    }

    fn visit(&self, step_name: &str, visited: &mut HashSet<String>, result: &mut Vec<String>) {
        if !visited.insert(step_name.to_string()) {
            return;
        }
        if let Some(step) = self.step(step_name) {
            let mut deps: Vec<&String> = step.base.dependencies.depends_on.iter().collect();
            deps.sort();
            for dep in deps {
                self.visit(dep, visited, result);
            }
        }
        result.push(step_name.to_string());
    }

    /// Check the supplied args and fill in defaults.
    ///
    /// Unknown args, missing required params and values that do not fit a
    /// param are all reported together.
    pub fn resolve_params(&self, args: &Map<String, Value>, ctx: &EvalContext) -> Result<Map<String, Value>, Diagnostics> {
        let mut diags = Diagnostics::new();
        let mut resolved = Map::new();

        for name in args.keys() {
            if self.param(name).is_none() {
                diags.push(
                    Diagnostic::error(format!("Unknown pipeline param: {}", name)).with_subject(self.full_name.clone()),
                );
            }
        }

        for param in &self.params {
            let value = match args.get(&param.name) {
                Some(value) => value.clone(),
                None => match &param.default {
                    Some(default) => default.clone(),
                    None if param.optional => Value::Null,
                    None => {
                        diags.push(
                            Diagnostic::error(format!("Missing required pipeline param: {}", param.name))
                                .with_subject(self.full_name.clone()),
                        );
                        continue;
                    }
                },
            };
            if let Err(e) = param.validate_setting(&value, ctx) {
                diags.extend(e.into_iter().map(|d| d.with_subject(self.full_name.clone())).collect());
                continue;
            }
            resolved.insert(param.name.clone(), value);
        }

        diags.into_result().map(|_| resolved)
    }

    /// A copy of `ctx` with the `param` namespace set from the resolved args
    pub fn param_context(&self, args: &Map<String, Value>, ctx: &EvalContext) -> Result<EvalContext, Diagnostics> {
        let params = self.resolve_params(args, ctx)?;
        Ok(ctx.clone().with_namespace(NAMESPACE_PARAM, Value::Object(params)))
    }
}

/// Params compare by name regardless of order, steps by position and
/// outputs by name
impl PartialEq for Pipeline {
    fn eq(&self, other: &Self) -> bool {
        if self.full_name != other.full_name
            || self.title != other.title
            || self.description != other.description
            || self.documentation != other.documentation
            || self.tags != other.tags
            || self.max_concurrency != other.max_concurrency
        {
            return false;
        }

        if self.params.len() != other.params.len()
            || self.params.iter().any(|p| other.param(&p.name) != Some(p))
        {
            return false;
        }

        if self.outputs.len() != other.outputs.len()
            || self.outputs.iter().any(|o| other.output(&o.name) != Some(o))
        {
            return false;
        }

        self.steps == other.steps
    }
}

fn decode_param(decl: &ParamDecl, subject: &str) -> Result<PipelineParam, Diagnostics> {
    let param_type = match &decl.param_type {
        Some(t) => ParamType::parse(t).ok_or_else(|| {
            Diagnostics::from(
                Diagnostic::error(format!("Invalid param type '{}'", t))
                    .with_detail(format!("Param '{}' has an unsupported type", decl.name))
                    .with_subject(subject),
            )
        })?,
        None => decl.default.as_ref().map(infer_type).unwrap_or(ParamType::Any),
    };

    let param = PipelineParam {
        name: decl.name.clone(),
        description: decl.description.clone(),
        param_type,
        default: decl.default.clone(),
        optional: decl.optional,
        enum_values: decl.enum_values.clone(),
        tags: decl.tags.clone(),
        format: decl.format.clone(),
    };
    param.validate(subject).into_result().map(|_| param)
}

/// Type of a param declared with a default but no type
fn infer_type(default: &Value) -> ParamType {
    match default {
        Value::String(_) => ParamType::String,
        Value::Number(_) => ParamType::Number,
        Value::Bool(_) => ParamType::Bool,
        Value::Array(_) => ParamType::List(Box::new(ParamType::Any)),
        Value::Object(_) => ParamType::Map(Box::new(ParamType::Any)),
        Value::Null => ParamType::Any,
    }
}
