//! `message` step: send a notification without waiting for an answer

use super::input::{same_recipients, ATTRIBUTE_NOTIFIER};
use super::{is_set, require, set, InputCollector, StepBase, StepVariant};
use crate::core::body::Attribute;
use crate::core::context::EvalContext;
use crate::core::error::{Diagnostics, Result};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default)]
pub struct MessageStep {
    pub text: Option<String>,
    pub notifier: Option<Map<String, Value>>,
    pub channel: Option<String>,
    pub subject: Option<String>,
    pub to: Option<Vec<String>>,
    pub cc: Option<Vec<String>>,
    pub bcc: Option<Vec<String>>,
}

impl PartialEq for MessageStep {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
            && self.notifier == other.notifier
            && self.channel == other.channel
            && self.subject == other.subject
            && same_recipients(&self.to, &other.to)
            && same_recipients(&self.cc, &other.cc)
            && same_recipients(&self.bcc, &other.bcc)
    }
}

impl StepVariant for MessageStep {
    fn set_attribute(&mut self, attr: &Attribute, ctx: &EvalContext, base: &mut StepBase) -> std::result::Result<bool, Diagnostics> {
        match attr.name.as_str() {
            "text" => set(&mut self.text, attr, ctx, base),
            ATTRIBUTE_NOTIFIER => set(&mut self.notifier, attr, ctx, base),
            "channel" => set(&mut self.channel, attr, ctx, base),
            "subject" => set(&mut self.subject, attr, ctx, base),
            "to" => set(&mut self.to, attr, ctx, base),
            "cc" => set(&mut self.cc, attr, ctx, base),
            "bcc" => set(&mut self.bcc, attr, ctx, base),
            _ => Ok(false),
        }
    }

    fn validate(&self, base: &StepBase) -> Diagnostics {
        require(
            base,
            &[
                (ATTRIBUTE_NOTIFIER, is_set(base, ATTRIBUTE_NOTIFIER, &self.notifier)),
                ("text", is_set(base, "text", &self.text)),
            ],
        )
    }

    fn inputs(&self, _base: &StepBase, inputs: &mut InputCollector<'_>) -> Result<()> {
        inputs.field("text", &self.text)?;
        inputs.field(ATTRIBUTE_NOTIFIER, &self.notifier)?;
        inputs.field("channel", &self.channel)?;
        inputs.field("subject", &self.subject)?;
        inputs.field("to", &self.to)?;
        inputs.field("cc", &self.cc)?;
        inputs.field("bcc", &self.bcc)?;
        Ok(())
    }
}
