//! `pipeline` step: run another pipeline

use super::{is_set, require, set, InputCollector, StepBase, StepVariant};
use crate::core::body::Attribute;
use crate::core::context::EvalContext;
use crate::core::error::{Diagnostic, Diagnostics, PipelineError, Result};
use crate::core::resolver::{resolve_or_defer, ResolutionTarget, ATTRIBUTE_PIPELINE};
use serde_json::{Map, Value};

/// Target of a pipeline step
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRef {
    pub name: String,
    pub mod_full_version: Option<String>,
}

impl PipelineRef {
    /// Either a pipeline object (`${pipeline.child}`) or a plain name
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => Some(PipelineRef {
                name: name.clone(),
                mod_full_version: None,
            }),
            Value::Object(map) => Some(PipelineRef {
                name: map.get("name")?.as_str()?.to_string(),
                mod_full_version: map.get("mod_full_version").and_then(Value::as_str).map(str::to_string),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStepCall {
    pub pipeline: Option<PipelineRef>,
    pub args: Option<Map<String, Value>>,
}

fn invalid_pipeline(base: &StepBase) -> Diagnostic {
    Diagnostic::error("Invalid pipeline reference")
        .with_detail(format!("{}: 'pipeline' must be a pipeline or a pipeline name", base.full_name()))
        .with_subject(base.subject())
}

impl StepVariant for PipelineStepCall {
    fn set_attribute(&mut self, attr: &Attribute, ctx: &EvalContext, base: &mut StepBase) -> std::result::Result<bool, Diagnostics> {
        match attr.name.as_str() {
            ATTRIBUTE_PIPELINE => {
                if let Some(value) = resolve_or_defer(attr, ctx, base, false)? {
                    match PipelineRef::from_value(&value) {
                        Some(pipeline) => self.pipeline = Some(pipeline),
                        None => return Err(invalid_pipeline(base).into()),
                    }
                }
                Ok(true)
            }
            "args" => set(&mut self.args, attr, ctx, base),
            _ => Ok(false),
        }
    }

    fn validate(&self, base: &StepBase) -> Diagnostics {
        require(base, &[(ATTRIBUTE_PIPELINE, is_set(base, ATTRIBUTE_PIPELINE, &self.pipeline))])
    }

    fn inputs(&self, _base: &StepBase, inputs: &mut InputCollector<'_>) -> Result<()> {
        let pipeline = match inputs.raw(ATTRIBUTE_PIPELINE)? {
            Some(value) => Some(PipelineRef::from_value(&value).ok_or_else(|| PipelineError::Conversion {
                attribute: ATTRIBUTE_PIPELINE.to_string(),
                expected: "pipeline".to_string(),
            })?),
            None => self.pipeline.clone(),
        };
        if let Some(pipeline) = pipeline {
            inputs.insert(ATTRIBUTE_PIPELINE, Value::String(pipeline.name));
            if let Some(version) = pipeline.mod_full_version {
                inputs.insert("mod_full_version", Value::String(version));
            }
        }
        inputs.field("args", &self.args)?;
        Ok(())
    }
}
