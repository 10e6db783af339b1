//! `loop { until, ... }` block
//!
//! A loop re-runs its step with per-iteration overrides of the step's own
//! attributes. Which attributes may be overridden depends on the step type.

use super::PolicyTarget;
use crate::core::body::Body;
use crate::core::context::EvalContext;
use crate::core::dependency::Dependencies;
use crate::core::error::{Diagnostic, Diagnostics, PipelineError, Result};
use crate::core::resolver::{evaluate_attribute, evaluate_condition, resolve_as, resolve_or_defer, UnresolvedAttributes};
use crate::core::step::StepType;
use crate::expression::convert::{self, ConversionError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

pub const ATTRIBUTE_UNTIL: &str = "until";

/// Shape a loop override must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopValue {
    String,
    Bool,
    Integer,
    StringSlice,
    StringMap,
    Map,
    List,
    /// A string like `5s` or a whole number of milliseconds
    Duration,
    Any,
}

impl LoopValue {
    fn expected(self) -> &'static str {
        match self {
            LoopValue::String => "string",
            LoopValue::Bool => "bool",
            LoopValue::Integer => "integer",
            LoopValue::StringSlice => "string slice",
            LoopValue::StringMap => "string map",
            LoopValue::Map => "map",
            LoopValue::List => "list",
            LoopValue::Duration => "string or whole number",
            LoopValue::Any => "value",
        }
    }

    /// Normalise a value into this shape
    pub fn check(self, value: &Value) -> std::result::Result<Value, ConversionError> {
        let mismatch = || ConversionError {
            expected: self.expected(),
            found: convert::type_name(value),
        };
        Ok(match self {
            LoopValue::String => Value::String(convert::to_display_string(value)?),
            LoopValue::Bool => Value::Bool(convert::to_bool(value)?),
            LoopValue::Integer => Value::from(convert::to_whole_number(value)?),
            LoopValue::StringSlice => {
                Value::Array(convert::to_string_slice(value)?.into_iter().map(Value::String).collect())
            }
            LoopValue::StringMap => Value::Object(
                convert::to_string_map(value)?
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            ),
            LoopValue::Map => Value::Object(convert::to_map(value)?),
            LoopValue::List => match value {
                Value::Array(_) => value.clone(),
                _ => return Err(mismatch()),
            },
            LoopValue::Duration => match value {
                Value::String(_) => value.clone(),
                Value::Number(_) => Value::from(convert::to_whole_number(value)?),
                _ => return Err(mismatch()),
            },
            LoopValue::Any => value.clone(),
        })
    }
}

mod tables {
    use super::LoopValue::{self, *};

    pub const HTTP: &[(&str, LoopValue)] = &[
        ("url", String),
        ("method", String),
        ("request_body", String),
        ("request_headers", Map),
        ("ca_cert_pem", String),
        ("insecure", Bool),
    ];

    pub const SLEEP: &[(&str, LoopValue)] = &[("duration", Duration)];

    pub const EMAIL: &[(&str, LoopValue)] = &[
        ("to", StringSlice),
        ("from", String),
        ("smtp_username", String),
        ("smtp_password", String),
        ("host", String),
        ("port", Integer),
        ("sender_name", String),
        ("cc", StringSlice),
        ("bcc", StringSlice),
        ("body", String),
        ("content_type", String),
        ("subject", String),
    ];

    pub const TRANSFORM: &[(&str, LoopValue)] = &[("value", Any)];

    pub const QUERY: &[(&str, LoopValue)] = &[("database", String), ("sql", String), ("args", List)];

    pub const PIPELINE: &[(&str, LoopValue)] = &[("args", Map)];

    pub const FUNCTION: &[(&str, LoopValue)] = &[
        ("runtime", String),
        ("source", String),
        ("handler", String),
        ("env", StringMap),
        ("event", Map),
    ];

    pub const CONTAINER: &[(&str, LoopValue)] = &[
        ("image", String),
        ("source", String),
        ("user", String),
        ("workdir", String),
        ("cmd", StringSlice),
        ("entrypoint", StringSlice),
        ("env", StringMap),
        ("cpu_shares", Integer),
        ("memory", Integer),
        ("memory_reservation", Integer),
        ("memory_swap", Integer),
        ("memory_swappiness", Integer),
        ("read_only", Bool),
    ];

    pub const INPUT: &[(&str, LoopValue)] = &[
        ("prompt", String),
        ("channel", String),
        ("subject", String),
        ("cc", StringSlice),
        ("bcc", StringSlice),
        ("to", StringSlice),
        ("notifier", Map),
    ];

    pub const MESSAGE: &[(&str, LoopValue)] = &[
        ("text", String),
        ("channel", String),
        ("subject", String),
        ("cc", StringSlice),
        ("bcc", StringSlice),
        ("to", StringSlice),
        ("notifier", Map),
    ];
}

/// Attributes a loop block may override for a step type
pub fn loop_attributes(step_type: StepType) -> &'static [(&'static str, LoopValue)] {
    match step_type {
        StepType::Http => tables::HTTP,
        StepType::Sleep => tables::SLEEP,
        StepType::Email => tables::EMAIL,
        StepType::Transform => tables::TRANSFORM,
        StepType::Query => tables::QUERY,
        StepType::Pipeline => tables::PIPELINE,
        StepType::Function => tables::FUNCTION,
        StepType::Container => tables::CONTAINER,
        StepType::Input => tables::INPUT,
        StepType::Message => tables::MESSAGE,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopDefn {
    pub step_type: StepType,
    pub until: Option<bool>,
    /// Overrides known at decode time
    pub overrides: BTreeMap<String, Value>,
    pub unresolved_attributes: UnresolvedAttributes,
}

impl LoopDefn {
    pub fn new(step_type: StepType) -> Self {
        Self {
            step_type,
            until: None,
            overrides: BTreeMap::new(),
            unresolved_attributes: UnresolvedAttributes::new(),
        }
    }

    pub fn decode(
        step_type: StepType,
        body: &Body,
        ctx: &EvalContext,
        parent: &mut Dependencies,
        subject: &str,
    ) -> std::result::Result<Self, Diagnostics> {
        let mut defn = LoopDefn::new(step_type);
        let mut target = PolicyTarget::new(subject, parent);
        let mut diags = Diagnostics::new();
        let allowed = loop_attributes(step_type);

        for attr in &body.attributes {
            if attr.name == ATTRIBUTE_UNTIL {
                match resolve_as::<bool>(attr, ctx, &mut target, true) {
                    Ok(until) => defn.until = until,
                    Err(e) => diags.extend(e),
                }
                continue;
            }

            let Some((_, shape)) = allowed.iter().find(|(name, _)| *name == attr.name) else {
                diags.push(
                    Diagnostic::error("Invalid attribute")
                        .with_detail(format!("Invalid attribute '{}' in the step loop block", attr.name))
                        .with_subject(subject),
                );
                continue;
            };

            match resolve_or_defer(attr, ctx, &mut target, true) {
                Ok(Some(Value::Null)) | Ok(None) => {}
                Ok(Some(value)) => match shape.check(&value) {
                    Ok(value) => {
                        defn.overrides.insert(attr.name.clone(), value);
                    }
                    Err(e) => diags.push(
                        Diagnostic::error(format!("Unable to parse '{}' attribute to {}", attr.name, shape.expected()))
                            .with_detail(e.to_string())
                            .with_subject(subject),
                    ),
                },
                Err(e) => diags.extend(e),
            }
        }

        if defn.until.is_none() && !target.has_unresolved(ATTRIBUTE_UNTIL) {
            diags.push(
                Diagnostic::error("Missing required attribute")
                    .with_detail("The argument 'until' is required, but no definition was found")
                    .with_subject(subject),
            );
        }

        defn.unresolved_attributes = target.into_unresolved();
        diags.into_result().map(|_| defn)
    }

    /// Whether the loop should stop; an unset `until` keeps looping
    pub fn resolve_until(&self, ctx: &EvalContext) -> Result<bool> {
        if let Some(until) = self.until {
            return Ok(until);
        }
        match self.unresolved_attributes.get(ATTRIBUTE_UNTIL) {
            Some(expr) => evaluate_condition(ATTRIBUTE_UNTIL, expr, ctx),
            None => {
                warn!(step_type = %self.step_type, "loop has no until condition, continuing");
                Ok(false)
            }
        }
    }

    /// Build the input for the next iteration.
    ///
    /// A static override wins, then an unresolved override is evaluated,
    /// otherwise the previous value is carried over.
    pub fn update_input(&self, mut input: Map<String, Value>, ctx: &EvalContext) -> Result<Map<String, Value>> {
        for (name, shape) in loop_attributes(self.step_type) {
            if let Some(value) = self.overrides.get(*name) {
                input.insert(name.to_string(), value.clone());
                continue;
            }
            let Some(expr) = self.unresolved_attributes.get(*name) else {
                continue;
            };
            let value = evaluate_attribute(name, expr, ctx)?;
            if value.is_null() {
                continue;
            }
            let value = shape.check(&value).map_err(|_| PipelineError::Conversion {
                attribute: name.to_string(),
                expected: shape.expected().to_string(),
            })?;
            input.insert(name.to_string(), value);
        }
        Ok(input)
    }
}
