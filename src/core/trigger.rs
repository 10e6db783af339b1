//! Triggers: schedule, query and http
//!
//! A trigger starts a pipeline. Schedule triggers fire on an interval or a
//! cron expression, query triggers poll a database and start a pipeline per
//! captured row event, and http triggers start one per request method.

use crate::core::body::{body_from_mapping, Attribute, Block, BlockShape, BlockSpec, Body};
use crate::core::context::EvalContext;
use crate::core::dependency::Dependencies;
use crate::core::error::{Diagnostic, Diagnostics, PipelineError, Result};
use crate::core::resolver::{
    evaluate_attribute, resolve_as, resolve_or_defer, static_or_evaluate, ResolutionTarget, StandaloneTarget,
    UnresolvedAttributes, ATTRIBUTE_PIPELINE,
};
use crate::core::step::{PipelineRef, StepDefaults};
use crate::expression::Expr;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use serde_yaml::Mapping;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub const ATTRIBUTE_SCHEDULE: &str = "schedule";
pub const ATTRIBUTE_ARGS: &str = "args";
pub const ATTRIBUTE_EXECUTION_MODE: &str = "execution_mode";
pub const BLOCK_CAPTURE: &str = "capture";
pub const BLOCK_METHOD: &str = "method";

pub const VALID_INTERVALS: [&str; 14] = [
    "hourly", "daily", "weekly", "5m", "10m", "15m", "30m", "60m", "1h", "2h", "4h", "6h", "12h", "24h",
];
pub const VALID_CAPTURE_TYPES: [&str; 3] = ["insert", "update", "delete"];
pub const VALID_METHOD_TYPES: [&str; 2] = ["post", "get"];

const BASE_ATTRIBUTES: [&str; 7] = [
    "title",
    "description",
    "documentation",
    "tags",
    "enabled",
    ATTRIBUTE_PIPELINE,
    ATTRIBUTE_ARGS,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TriggerType {
    Schedule,
    Query,
    Http,
}

impl TriggerType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "schedule" => Some(Self::Schedule),
            "query" => Some(Self::Query),
            "http" => Some(Self::Http),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Query => "query",
            Self::Http => "http",
        }
    }

    fn block_specs(&self) -> Vec<BlockSpec> {
        match self {
            Self::Schedule => vec![],
            Self::Query => vec![BlockSpec::new(BLOCK_CAPTURE, BlockShape::Labelled)],
            Self::Http => vec![BlockSpec::new(BLOCK_METHOD, BlockShape::Labelled)],
        }
    }

    fn unsupported_attribute(&self, name: &str) -> String {
        match self {
            Self::Schedule => format!("Unsupported attribute for Trigger Schedule: {}", name),
            Self::Query => format!("Unsupported attribute for Trigger Query: {}", name),
            Self::Http => format!("Unsupported attribute for Trigger Http: {}", name),
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Synchronous,
    Asynchronous,
}

impl ExecutionMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "synchronous" => Some(Self::Synchronous),
            "asynchronous" => Some(Self::Asynchronous),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synchronous => "synchronous",
            Self::Asynchronous => "asynchronous",
        }
    }
}

/// A decoded trigger
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub name: String,
    /// `<mod>.trigger.<type>.<name>`
    pub full_name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub enabled: Option<bool>,
    pub pipeline: Option<PipelineRef>,
    /// Evaluated only when the trigger fires
    pub args: Option<Expr>,
    pub config: TriggerConfig,
}

/// Type-specific part of a trigger
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerConfig {
    Schedule(TriggerSchedule),
    Query(TriggerQuery),
    Http(TriggerHttp),
}

impl TriggerConfig {
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            Self::Schedule(_) => TriggerType::Schedule,
            Self::Query(_) => TriggerType::Query,
            Self::Http(_) => TriggerType::Http,
        }
    }
}

impl Trigger {
    /// Decode a trigger mapping (`type`, `name`, attributes and blocks)
    pub fn decode(
        map: &Mapping,
        ctx: &EvalContext,
        mod_name: &str,
        defaults: &StepDefaults,
    ) -> std::result::Result<Self, Diagnostics> {
        let label = |key: &str| map.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let subject = format!("{}.trigger", mod_name);

        let Some(type_name) = label("type") else {
            return Err(Diagnostic::error("Missing trigger type").with_subject(subject).into());
        };
        let Some(trigger_type) = TriggerType::parse(&type_name) else {
            return Err(Diagnostic::error("Invalid trigger type")
                .with_detail(format!("Unsupported trigger type '{}'", type_name))
                .with_subject(subject)
                .into());
        };
        let Some(name) = label("name") else {
            return Err(Diagnostic::error("Missing trigger name")
                .with_detail(format!("A {} trigger has no 'name'", trigger_type))
                .with_subject(subject)
                .into());
        };

        let full_name = format!("{}.trigger.{}.{}", mod_name, trigger_type, name);
        let body = body_from_mapping(map, &trigger_type.block_specs(), &["type", "name"], &full_name)?;

        let mut target = StandaloneTarget::new(full_name.clone());
        let mut trigger = Trigger {
            name,
            full_name,
            title: None,
            description: None,
            documentation: None,
            tags: BTreeMap::new(),
            enabled: None,
            pipeline: None,
            args: None,
            config: match trigger_type {
                TriggerType::Schedule => TriggerConfig::Schedule(TriggerSchedule::default()),
                TriggerType::Query => TriggerConfig::Query(TriggerQuery {
                    default_database: defaults.default_connection_string.clone(),
                    ..Default::default()
                }),
                TriggerType::Http => TriggerConfig::Http(TriggerHttp::default()),
            },
        };

        trigger.set_base_attributes(&body.attributes, ctx, &mut target)?;

        let mut diags = Diagnostics::new();
        let Trigger { config, pipeline, args, .. } = &mut trigger;
        match config {
            TriggerConfig::Schedule(schedule) => {
                diags.extend(schedule.set_attributes(&body.attributes, ctx, &mut target));
                if schedule.schedule.is_empty() && diags.is_empty() {
                    diags.push(missing_attribute(ATTRIBUTE_SCHEDULE, &target.subject));
                }
                if pipeline.is_none() {
                    diags.push(missing_attribute(ATTRIBUTE_PIPELINE, &target.subject));
                }
            }
            TriggerConfig::Query(query) => {
                diags.extend(query.set_attributes(&body.attributes, ctx, &mut target));
                diags.extend(query.set_blocks(&body.blocks, ctx, &target.subject));
                query.dependencies = target.dependencies.clone();
                query.unresolved_attributes = target.unresolved_attributes.clone();
            }
            TriggerConfig::Http(http) => {
                diags.extend(http.set_attributes(&body.attributes, ctx, &target.subject));
                diags.extend(http.set_blocks(&body.blocks, ctx, pipeline.as_ref(), args.as_ref(), &target.subject));
            }
        }
        diags.into_result()?;

        debug!(trigger = %trigger.full_name, "decoded trigger");
        Ok(trigger)
    }

    fn set_base_attributes(
        &mut self,
        attributes: &[Attribute],
        ctx: &EvalContext,
        target: &mut StandaloneTarget,
    ) -> std::result::Result<(), Diagnostics> {
        let mut diags = Diagnostics::new();
        for attr in attributes {
            let result = match attr.name.as_str() {
                "title" => resolve_as(attr, ctx, target, false).map(|v| self.title = v),
                "description" => resolve_as(attr, ctx, target, false).map(|v| self.description = v),
                "documentation" => resolve_as(attr, ctx, target, false).map(|v| self.documentation = v),
                "tags" => resolve_as(attr, ctx, target, false).map(|v| self.tags = v.unwrap_or_default()),
                "enabled" => resolve_as(attr, ctx, target, false).map(|v| self.enabled = v),
                ATTRIBUTE_PIPELINE => resolve_pipeline(&attr.expr, ctx, &target.subject).map(|p| self.pipeline = Some(p)),
                ATTRIBUTE_ARGS => {
                    self.args = Some(attr.expr.clone());
                    Ok(())
                }
                _ => Ok(()),
            };
            if let Err(e) = result {
                diags.extend(e);
            }
        }
        diags.into_result()
    }

    pub fn trigger_type(&self) -> TriggerType {
        self.config.trigger_type()
    }

    /// Triggers are enabled unless they say otherwise
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Evaluate the top-level `args` against the firing context
    pub fn get_args(&self, ctx: &EvalContext) -> Result<Map<String, Value>> {
        evaluate_args(self.args.as_ref(), ctx)
    }

    /// Every pipeline this trigger can start
    pub fn pipelines(&self) -> Vec<&PipelineRef> {
        match &self.config {
            TriggerConfig::Schedule(_) => self.pipeline.iter().collect(),
            TriggerConfig::Query(query) => query.captures.values().filter_map(|c| c.pipeline.as_ref()).collect(),
            TriggerConfig::Http(http) => http.methods.values().filter_map(|m| m.pipeline.as_ref()).collect(),
        }
    }
}

fn missing_attribute(name: &str, subject: &str) -> Diagnostic {
    Diagnostic::error("Bad Request")
        .with_detail(format!("Missing required attribute '{}'", name))
        .with_subject(subject)
}

/// The pipeline of a trigger has to resolve at load time
fn resolve_pipeline(expr: &Expr, ctx: &EvalContext, subject: &str) -> std::result::Result<PipelineRef, Diagnostics> {
    let value = expr.evaluate(ctx).map_err(|errors| {
        errors
            .iter()
            .map(|e| {
                Diagnostic::error(e.summary())
                    .with_detail(format!("Attribute 'pipeline': {}", e))
                    .with_subject(subject)
            })
            .collect::<Diagnostics>()
    })?;
    PipelineRef::from_value(&value).ok_or_else(|| {
        Diagnostics::from(
            Diagnostic::error("Invalid pipeline reference")
                .with_detail("'pipeline' must be a pipeline or a pipeline name")
                .with_subject(subject),
        )
    })
}

fn evaluate_args(args: Option<&Expr>, ctx: &EvalContext) -> Result<Map<String, Value>> {
    let Some(expr) = args else {
        return Ok(Map::new());
    };
    match evaluate_attribute(ATTRIBUTE_ARGS, expr, ctx)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(PipelineError::Conversion {
            attribute: ATTRIBUTE_ARGS.to_string(),
            expected: "map".to_string(),
        }),
    }
}

/// Interval or five-field cron expression
fn check_schedule(schedule: &str, subject: &str) -> std::result::Result<(), Diagnostic> {
    if VALID_INTERVALS.contains(&schedule) {
        return Ok(());
    }
    let invalid = |detail: String| {
        Diagnostic::error(format!(
            "Invalid cron expression: {}. Specify valid intervals hourly, daily, weekly, monthly or valid cron expression",
            schedule
        ))
        .with_detail(detail)
        .with_subject(subject)
    };
    let fields = schedule.split_whitespace().count();
    if fields != 5 {
        return Err(invalid(format!("expected exactly 5 fields, found {}", fields)));
    }
    schedule
        .parse::<croner::Cron>()
        .map(|_| ())
        .map_err(|e| invalid(e.to_string()))
}

/// Schedule attributes are never deferred
fn schedule_attribute(attr: &Attribute, ctx: &EvalContext, subject: &str) -> std::result::Result<String, Diagnostics> {
    let value = evaluate_attribute(&attr.name, &attr.expr, ctx)
        .map_err(|e| Diagnostics::from(Diagnostic::error(e.to_string()).with_subject(subject)))?;
    let Value::String(schedule) = value else {
        return Err(Diagnostic::error("The given schedule is not a string")
            .with_detail("The given schedule is not a string")
            .with_subject(subject)
            .into());
    };
    check_schedule(&schedule, subject)?;
    Ok(schedule)
}

/// Cron expression an interval fires on
fn interval_cron(interval: &str) -> Option<&'static str> {
    Some(match interval {
        "5m" => "*/5 * * * *",
        "10m" => "*/10 * * * *",
        "15m" => "*/15 * * * *",
        "30m" => "*/30 * * * *",
        "hourly" | "60m" | "1h" => "0 * * * *",
        "2h" => "0 */2 * * *",
        "4h" => "0 */4 * * *",
        "6h" => "0 */6 * * *",
        "12h" => "0 */12 * * *",
        "daily" | "24h" => "0 0 * * *",
        "weekly" => "0 0 * * 0",
        _ => return None,
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerSchedule {
    pub schedule: String,
}

impl TriggerSchedule {
    fn set_attributes(&mut self, attributes: &[Attribute], ctx: &EvalContext, target: &mut StandaloneTarget) -> Diagnostics {
        let mut diags = Diagnostics::new();
        for attr in attributes {
            match attr.name.as_str() {
                ATTRIBUTE_SCHEDULE => match schedule_attribute(attr, ctx, &target.subject) {
                    Ok(schedule) => self.schedule = schedule,
                    Err(e) => diags.extend(e),
                },
                name if BASE_ATTRIBUTES.contains(&name) => {}
                name => diags.push(
                    Diagnostic::error(TriggerType::Schedule.unsupported_attribute(name)).with_subject(target.subject()),
                ),
            }
        }
        diags
    }

    /// The cron expression this schedule fires on
    pub fn cron_expression(&self) -> &str {
        interval_cron(&self.schedule).unwrap_or(&self.schedule)
    }

    /// The next `count` firing times after `after`
    pub fn next_fires(&self, after: DateTime<Utc>, count: usize) -> Result<Vec<DateTime<Utc>>> {
        let cron = self
            .cron_expression()
            .parse::<croner::Cron>()
            .map_err(|e| PipelineError::Schedule(format!("{}: {}", self.schedule, e)))?;
        Ok(cron.iter_after(after).take(count).collect())
    }

    pub fn next_fire(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        Ok(self.next_fires(after, 1)?.into_iter().next())
    }
}

/// Pipeline started for one kind of row event
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerCapture {
    pub capture_type: String,
    pub pipeline: Option<PipelineRef>,
    pub args: Option<Expr>,
}

impl TriggerCapture {
    pub fn get_args(&self, ctx: &EvalContext) -> Result<Map<String, Value>> {
        evaluate_args(self.args.as_ref(), ctx)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerQuery {
    pub sql: Option<String>,
    pub schedule: Option<String>,
    pub database: Option<String>,
    pub primary_key: Option<String>,
    pub captures: BTreeMap<String, TriggerCapture>,
    pub default_database: Option<String>,
    pub dependencies: Dependencies,
    pub unresolved_attributes: UnresolvedAttributes,
}

impl TriggerQuery {
    fn set_attributes(&mut self, attributes: &[Attribute], ctx: &EvalContext, target: &mut StandaloneTarget) -> Diagnostics {
        let mut diags = Diagnostics::new();
        for attr in attributes {
            let result = match attr.name.as_str() {
                ATTRIBUTE_SCHEDULE => schedule_attribute(attr, ctx, &target.subject).map(|s| self.schedule = Some(s)),
                "sql" => resolve_as(attr, ctx, target, false).map(|v| self.sql = v),
                "primary_key" => resolve_as(attr, ctx, target, false).map(|v| self.primary_key = v),
                "database" => match resolve_or_defer(attr, ctx, target, false) {
                    Ok(Some(value)) => match connection_string(&value) {
                        Some(database) => {
                            self.database = Some(database);
                            Ok(())
                        }
                        None => Err(Diagnostic::error("Unable to parse 'database' attribute to string")
                            .with_subject(target.subject())
                            .into()),
                    },
                    Ok(None) => Ok(()),
                    Err(e) => Err(e),
                },
                name if BASE_ATTRIBUTES.contains(&name) => Ok(()),
                name => Err(Diagnostic::error(TriggerType::Query.unsupported_attribute(name))
                    .with_subject(target.subject())
                    .into()),
            };
            if let Err(e) = result {
                diags.extend(e);
            }
        }
        diags
    }

    fn set_blocks(&mut self, blocks: &[Block], ctx: &EvalContext, subject: &str) -> Diagnostics {
        let mut diags = Diagnostics::new();
        for block in blocks.iter().filter(|b| b.kind == BLOCK_CAPTURE) {
            let Some(capture_type) = block.labels.first() else {
                diags.push(
                    Diagnostic::error("Invalid capture block")
                        .with_detail("Capture block must have a single label")
                        .with_subject(subject),
                );
                continue;
            };
            if !VALID_CAPTURE_TYPES.contains(&capture_type.as_str()) {
                diags.push(
                    Diagnostic::error("Invalid capture block type")
                        .with_detail(format!(
                            "Capture block type must be one of: {}",
                            VALID_CAPTURE_TYPES.join(",")
                        ))
                        .with_subject(subject),
                );
                continue;
            }
            let Some(pipeline_attr) = block.body.attribute(ATTRIBUTE_PIPELINE) else {
                diags.push(Diagnostic::error("Pipeline attribute is required for capture block").with_subject(subject));
                continue;
            };
            if self.captures.contains_key(capture_type) {
                diags.push(
                    Diagnostic::error("Duplicate capture block")
                        .with_detail(format!("Duplicate capture block for type: {}", capture_type))
                        .with_subject(subject),
                );
                continue;
            }
            let pipeline = match resolve_pipeline(&pipeline_attr.expr, ctx, subject) {
                Ok(p) => Some(p),
                Err(e) => {
                    diags.extend(e);
                    None
                }
            };
            self.captures.insert(
                capture_type.clone(),
                TriggerCapture {
                    capture_type: capture_type.clone(),
                    pipeline,
                    args: block.body.attribute(ATTRIBUTE_ARGS).map(|a| a.expr.clone()),
                },
            );
        }
        diags
    }

    /// Resolve database, sql, schedule and primary key into a fresh config.
    ///
    /// Without a `database` the default connection string is used.
    pub fn get_config(&self, ctx: &EvalContext) -> Result<TriggerQuery> {
        let database = match self.unresolved_attributes.get("database") {
            Some(expr) => {
                let value = evaluate_attribute("database", expr, ctx)?;
                Some(connection_string(&value).ok_or_else(|| PipelineError::Conversion {
                    attribute: "database".to_string(),
                    expected: "connection string".to_string(),
                })?)
            }
            None => self.database.clone(),
        };
        let database = database
            .filter(|d| !d.is_empty())
            .or_else(|| self.default_database.clone())
            .ok_or_else(|| {
                PipelineError::from(Diagnostic::error("Missing database").with_detail("database must be supplied"))
            })?;

        Ok(TriggerQuery {
            sql: static_or_evaluate("sql", &self.sql, &self.unresolved_attributes, ctx)?,
            schedule: self.schedule.clone(),
            database: Some(database),
            primary_key: static_or_evaluate("primary_key", &self.primary_key, &self.unresolved_attributes, ctx)?,
            captures: self.captures.clone(),
            default_database: self.default_database.clone(),
            dependencies: Dependencies::default(),
            unresolved_attributes: UnresolvedAttributes::new(),
        })
    }
}

fn connection_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("connection_string").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Pipeline started for one request method
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerHttpMethod {
    pub method: String,
    pub execution_mode: Option<ExecutionMode>,
    pub pipeline: Option<PipelineRef>,
    pub args: Option<Expr>,
}

impl TriggerHttpMethod {
    pub fn get_args(&self, ctx: &EvalContext) -> Result<Map<String, Value>> {
        evaluate_args(self.args.as_ref(), ctx)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerHttp {
    pub execution_mode: Option<ExecutionMode>,
    pub methods: BTreeMap<String, TriggerHttpMethod>,
}

fn execution_mode(attr: &Attribute, ctx: &EvalContext, subject: &str) -> std::result::Result<ExecutionMode, Diagnostics> {
    let value = evaluate_attribute(&attr.name, &attr.expr, ctx)
        .map_err(|e| Diagnostics::from(Diagnostic::error(e.to_string()).with_subject(subject)))?;
    let Value::String(mode) = value else {
        return Err(Diagnostic::error("The given execution mode is not a string")
            .with_detail("The given execution mode is not a string")
            .with_subject(subject)
            .into());
    };
    ExecutionMode::parse(&mode).ok_or_else(|| {
        Diagnostics::from(
            Diagnostic::error("Invalid execution mode")
                .with_detail("The execution mode must be one of: synchronous,asynchronous")
                .with_subject(subject),
        )
    })
}

impl TriggerHttp {
    fn set_attributes(&mut self, attributes: &[Attribute], ctx: &EvalContext, subject: &str) -> Diagnostics {
        let mut diags = Diagnostics::new();
        for attr in attributes {
            match attr.name.as_str() {
                ATTRIBUTE_EXECUTION_MODE => match execution_mode(attr, ctx, subject) {
                    Ok(mode) => self.execution_mode = Some(mode),
                    Err(e) => diags.extend(e),
                },
                name if BASE_ATTRIBUTES.contains(&name) => {}
                name => diags.push(Diagnostic::error(TriggerType::Http.unsupported_attribute(name)).with_subject(subject)),
            }
        }
        diags
    }

    /// Without method blocks a single `post` method is built from the
    /// trigger's own pipeline, args and execution mode
    fn set_blocks(
        &mut self,
        blocks: &[Block],
        ctx: &EvalContext,
        pipeline: Option<&PipelineRef>,
        args: Option<&Expr>,
        subject: &str,
    ) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let method_blocks: Vec<&Block> = blocks.iter().filter(|b| b.kind == BLOCK_METHOD).collect();

        if method_blocks.is_empty() {
            let Some(pipeline) = pipeline else {
                diags.push(missing_attribute(ATTRIBUTE_PIPELINE, subject));
                return diags;
            };
            self.methods.insert(
                "post".to_string(),
                TriggerHttpMethod {
                    method: "post".to_string(),
                    execution_mode: self.execution_mode,
                    pipeline: Some(pipeline.clone()),
                    args: args.cloned(),
                },
            );
            return diags;
        }

        for block in method_blocks {
            let Some(method) = block.labels.first() else {
                diags.push(
                    Diagnostic::error("Invalid method block")
                        .with_detail("Method block must have a single label")
                        .with_subject(subject),
                );
                continue;
            };
            if !VALID_METHOD_TYPES.contains(&method.as_str()) {
                diags.push(
                    Diagnostic::error("Invalid method block type")
                        .with_detail(format!("Method block type must be one of: {}", VALID_METHOD_TYPES.join(",")))
                        .with_subject(subject),
                );
                continue;
            }
            let Some(pipeline_attr) = block.body.attribute(ATTRIBUTE_PIPELINE) else {
                diags.push(Diagnostic::error("Pipeline attribute is required for method block").with_subject(subject));
                continue;
            };
            if self.methods.contains_key(method) {
                diags.push(
                    Diagnostic::error("Duplicate method block")
                        .with_detail(format!("Duplicate method block for type: {}", method))
                        .with_subject(subject),
                );
                continue;
            }

            let mut entry = TriggerHttpMethod {
                method: method.clone(),
                execution_mode: None,
                pipeline: None,
                args: block.body.attribute(ATTRIBUTE_ARGS).map(|a| a.expr.clone()),
            };
            match resolve_pipeline(&pipeline_attr.expr, ctx, subject) {
                Ok(p) => entry.pipeline = Some(p),
                Err(e) => diags.extend(e),
            }
            if let Some(attr) = block.body.attribute(ATTRIBUTE_EXECUTION_MODE) {
                match execution_mode(attr, ctx, subject) {
                    Ok(mode) => entry.execution_mode = Some(mode),
                    Err(e) => diags.extend(e),
                }
            }
            diags.extend(unknown_method_attributes(&block.body, subject));
            self.methods.insert(method.clone(), entry);
        }
        diags
    }
}

fn unknown_method_attributes(body: &Body, subject: &str) -> Diagnostics {
    body.attributes
        .iter()
        .filter(|a| ![ATTRIBUTE_PIPELINE, ATTRIBUTE_ARGS, ATTRIBUTE_EXECUTION_MODE].contains(&a.name.as_str()))
        .map(|a| {
            Diagnostic::error("Unsupported attribute")
                .with_detail(format!("Unsupported attribute '{}' in method block", a.name))
                .with_subject(subject)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ctx() -> EvalContext {
        EvalContext::new().with_namespace(
            "pipeline",
            json!({
                "deploy": {"name": "local.pipeline.deploy", "mod_full_version": "local"},
                "cleanup": {"name": "local.pipeline.cleanup", "mod_full_version": "local"}
            }),
        )
    }

    fn decode(yaml: &str) -> std::result::Result<Trigger, Diagnostics> {
        let map: Mapping = serde_yaml::from_str(yaml).unwrap();
        Trigger::decode(&map, &ctx(), "local", &StepDefaults::default())
    }

    #[test]
    fn test_schedule_interval() {
        let trigger = decode(
            r#"
type: schedule
name: nightly
schedule: daily
pipeline: "${pipeline.deploy}"
args:
  env: prod
"#,
        )
        .unwrap();
        assert_eq!(trigger.full_name, "local.trigger.schedule.nightly");
        assert!(trigger.is_enabled());
        assert_eq!(trigger.pipeline.as_ref().map(|p| p.name.as_str()), Some("local.pipeline.deploy"));
        assert_eq!(trigger.get_args(&EvalContext::new()).unwrap()["env"], json!("prod"));

        let TriggerConfig::Schedule(schedule) = &trigger.config else {
            panic!("expected a schedule trigger");
        };
        assert_eq!(schedule.cron_expression(), "0 0 * * *");
    }

    #[test]
    fn test_invalid_cron() {
        let err = decode("type: schedule\nname: bad\nschedule: every tuesday\npipeline: deploy").unwrap_err();
        assert!(err.contains("Invalid cron expression: every tuesday"));

        let err = decode("type: schedule\nname: bad\nschedule: 61 * * * *\npipeline: deploy").unwrap_err();
        assert!(err.contains("Invalid cron expression"));
    }

    #[test]
    fn test_schedule_not_a_string() {
        let err = decode("type: schedule\nname: bad\nschedule: 5\npipeline: deploy").unwrap_err();
        assert!(err.contains("The given schedule is not a string"));
    }

    #[test]
    fn test_unsupported_schedule_attribute() {
        let err = decode("type: schedule\nname: s\nschedule: hourly\npipeline: deploy\nsql: select 1").unwrap_err();
        assert!(err.contains("Unsupported attribute for Trigger Schedule: sql"));
    }

    #[test]
    fn test_next_fire() {
        let trigger = decode("type: schedule\nname: s\nschedule: \"*/15 * * * *\"\npipeline: deploy").unwrap();
        let TriggerConfig::Schedule(schedule) = &trigger.config else {
            panic!("expected a schedule trigger");
        };
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 10, 7, 0).unwrap();
        let fires = schedule.next_fires(after, 2).unwrap();
        assert_eq!(fires[0], Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 0).unwrap());
        assert_eq!(fires[1], Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_query_captures() {
        let trigger = decode(
            r#"
type: query
name: new_rows
schedule: 5m
sql: select * from users
primary_key: id
capture:
  insert:
    pipeline: "${pipeline.deploy}"
    args:
      rows: "${self.inserted_rows}"
  delete:
    pipeline: "${pipeline.cleanup}"
"#,
        )
        .unwrap();
        let TriggerConfig::Query(query) = &trigger.config else {
            panic!("expected a query trigger");
        };
        assert_eq!(query.captures.len(), 2);
        assert_eq!(
            query.captures["delete"].pipeline.as_ref().map(|p| p.name.as_str()),
            Some("local.pipeline.cleanup")
        );
        assert_eq!(trigger.pipelines().len(), 2);

        let fired = EvalContext::new().with_namespace("self", json!({"inserted_rows": [{"id": 1}]}));
        let args = query.captures["insert"].get_args(&fired).unwrap();
        assert_eq!(args["rows"], json!([{"id": 1}]));
    }

    #[test]
    fn test_invalid_capture_type() {
        let err = decode(
            r#"
type: query
name: q
sql: select 1
capture:
  upsert:
    pipeline: deploy
"#,
        )
        .unwrap_err();
        assert!(err.contains("Capture block type must be one of: insert,update,delete"));
    }

    #[test]
    fn test_query_get_config_uses_default_database() {
        let map: Mapping = serde_yaml::from_str("type: query\nname: q\nsql: select 1").unwrap();
        let defaults = StepDefaults {
            default_connection_string: Some("sqlite:///tmp/db".to_string()),
        };
        let trigger = Trigger::decode(&map, &ctx(), "local", &defaults).unwrap();
        let TriggerConfig::Query(query) = &trigger.config else {
            panic!("expected a query trigger");
        };
        let config = query.get_config(&EvalContext::new()).unwrap();
        assert_eq!(config.database.as_deref(), Some("sqlite:///tmp/db"));
        assert_eq!(config.sql.as_deref(), Some("select 1"));
    }

    #[test]
    fn test_query_database_from_connection() {
        let trigger = decode(
            r#"
type: query
name: q
sql: select 1
database: "${connection.postgres.prod}"
"#,
        )
        .unwrap();
        let TriggerConfig::Query(query) = &trigger.config else {
            panic!("expected a query trigger");
        };
        assert!(query.dependencies.connection_depends_on.contains("postgres.prod"));

        let run = EvalContext::new().with_namespace(
            "connection",
            json!({"postgres": {"prod": {"connection_string": "postgres://prod"}}}),
        );
        let config = query.get_config(&run).unwrap();
        assert_eq!(config.database.as_deref(), Some("postgres://prod"));
    }

    #[test]
    fn test_http_implicit_post() {
        let trigger = decode(
            r#"
type: http
name: hook
pipeline: "${pipeline.deploy}"
execution_mode: synchronous
"#,
        )
        .unwrap();
        let TriggerConfig::Http(http) = &trigger.config else {
            panic!("expected an http trigger");
        };
        assert_eq!(http.methods.len(), 1);
        assert_eq!(http.methods["post"].execution_mode, Some(ExecutionMode::Synchronous));
    }

    #[test]
    fn test_http_requires_pipeline() {
        let err = decode("type: http\nname: hook").unwrap_err();
        assert!(err.contains("Missing required attribute 'pipeline'"));
    }

    #[test]
    fn test_http_method_blocks() {
        let trigger = decode(
            r#"
type: http
name: hook
method:
  get:
    pipeline: "${pipeline.deploy}"
    execution_mode: asynchronous
  post:
    pipeline: "${pipeline.cleanup}"
"#,
        )
        .unwrap();
        let TriggerConfig::Http(http) = &trigger.config else {
            panic!("expected an http trigger");
        };
        assert_eq!(http.methods["get"].execution_mode, Some(ExecutionMode::Asynchronous));
        assert_eq!(http.methods["post"].execution_mode, None);

        let err = decode("type: http\nname: hook\nexecution_mode: later\npipeline: deploy").unwrap_err();
        assert!(err.contains("The execution mode must be one of: synchronous,asynchronous"));
    }

    #[test]
    fn test_equal_decodes() {
        let yaml = "type: schedule\nname: s\nschedule: hourly\npipeline: deploy";
        assert_eq!(decode(yaml).unwrap(), decode(yaml).unwrap());
        assert_ne!(decode(yaml).unwrap(), decode(&yaml.replace("hourly", "daily")).unwrap());
    }
}
