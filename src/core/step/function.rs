//! `function` step

use super::{is_set, require, set, InputCollector, StepBase, StepVariant};
use crate::core::body::Attribute;
use crate::core::context::EvalContext;
use crate::core::error::{Diagnostics, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionStep {
    pub runtime: Option<String>,
    pub source: Option<String>,
    pub handler: Option<String>,
    pub env: Option<BTreeMap<String, String>>,
    pub event: Option<Map<String, Value>>,
}

impl StepVariant for FunctionStep {
    fn set_attribute(&mut self, attr: &Attribute, ctx: &EvalContext, base: &mut StepBase) -> std::result::Result<bool, Diagnostics> {
        match attr.name.as_str() {
            "runtime" => set(&mut self.runtime, attr, ctx, base),
            "source" => set(&mut self.source, attr, ctx, base),
            "handler" => set(&mut self.handler, attr, ctx, base),
            "env" => set(&mut self.env, attr, ctx, base),
            "event" => set(&mut self.event, attr, ctx, base),
            _ => Ok(false),
        }
    }

    fn validate(&self, base: &StepBase) -> Diagnostics {
        require(base, &[("source", is_set(base, "source", &self.source))])
    }

    fn inputs(&self, base: &StepBase, inputs: &mut InputCollector<'_>) -> Result<()> {
        inputs.insert("name", Value::String(format!("{}.{}", base.pipeline_name, base.full_name())));
        inputs.field("runtime", &self.runtime)?;
        inputs.field("source", &self.source)?;
        inputs.field("handler", &self.handler)?;
        inputs.field("env", &self.env)?;
        inputs.field("event", &self.event)?;
        Ok(())
    }
}
