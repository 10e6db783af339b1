//! `sleep` step

use super::base::duration_value;
use super::{is_set, require, InputCollector, StepBase, StepVariant};
use crate::core::body::Attribute;
use crate::core::context::EvalContext;
use crate::core::error::{Diagnostic, Diagnostics, PipelineError, Result};
use crate::core::resolver::{resolve_or_defer, ResolutionTarget};
use serde_json::Value;

pub const ATTRIBUTE_DURATION: &str = "duration";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SleepStep {
    /// `"5s"` or a whole number of milliseconds
    pub duration: Option<Value>,
}

impl StepVariant for SleepStep {
    fn set_attribute(&mut self, attr: &Attribute, ctx: &EvalContext, base: &mut StepBase) -> std::result::Result<bool, Diagnostics> {
        if attr.name != ATTRIBUTE_DURATION {
            return Ok(false);
        }
        if let Some(value) = resolve_or_defer(attr, ctx, base, false)? {
            match duration_value(&value) {
                Some(duration) => self.duration = Some(duration),
                None => {
                    return Err(Diagnostic::error(format!(
                        "Value of the attribute 'duration' must be a string or a whole number: {}",
                        base.full_name()
                    ))
                    .with_subject(base.subject())
                    .into())
                }
            }
        }
        Ok(true)
    }

    fn validate(&self, base: &StepBase) -> Diagnostics {
        require(base, &[(ATTRIBUTE_DURATION, is_set(base, ATTRIBUTE_DURATION, &self.duration))])
    }

    fn inputs(&self, _base: &StepBase, inputs: &mut InputCollector<'_>) -> Result<()> {
        if let Some(value) = inputs.raw(ATTRIBUTE_DURATION)? {
            let duration = duration_value(&value).ok_or_else(|| PipelineError::Conversion {
                attribute: ATTRIBUTE_DURATION.to_string(),
                expected: "string or whole number".to_string(),
            })?;
            inputs.insert(ATTRIBUTE_DURATION, duration);
        } else if let Some(duration) = &self.duration {
            inputs.insert(ATTRIBUTE_DURATION, duration.clone());
        }
        Ok(())
    }
}
