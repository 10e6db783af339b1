//! `email` step

use super::{is_set, require, set, InputCollector, StepBase, StepVariant};
use crate::core::body::Attribute;
use crate::core::context::EvalContext;
use crate::core::error::{Diagnostics, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailStep {
    pub to: Option<Vec<String>>,
    pub from: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub sender_name: Option<String>,
    pub cc: Option<Vec<String>>,
    pub bcc: Option<Vec<String>>,
    pub body: Option<String>,
    pub content_type: Option<String>,
    pub subject: Option<String>,
}

impl StepVariant for EmailStep {
    fn set_attribute(&mut self, attr: &Attribute, ctx: &EvalContext, base: &mut StepBase) -> std::result::Result<bool, Diagnostics> {
        match attr.name.as_str() {
            "to" => set(&mut self.to, attr, ctx, base),
            "from" => set(&mut self.from, attr, ctx, base),
            "smtp_username" => set(&mut self.smtp_username, attr, ctx, base),
            "smtp_password" => set(&mut self.smtp_password, attr, ctx, base),
            "host" => set(&mut self.host, attr, ctx, base),
            "port" => set(&mut self.port, attr, ctx, base),
            "sender_name" => set(&mut self.sender_name, attr, ctx, base),
            "cc" => set(&mut self.cc, attr, ctx, base),
            "bcc" => set(&mut self.bcc, attr, ctx, base),
            "body" => set(&mut self.body, attr, ctx, base),
            "content_type" => set(&mut self.content_type, attr, ctx, base),
            "subject" => set(&mut self.subject, attr, ctx, base),
            _ => Ok(false),
        }
    }

    fn validate(&self, base: &StepBase) -> Diagnostics {
        require(
            base,
            &[
                ("to", is_set(base, "to", &self.to)),
                ("from", is_set(base, "from", &self.from)),
                ("smtp_username", is_set(base, "smtp_username", &self.smtp_username)),
                ("smtp_password", is_set(base, "smtp_password", &self.smtp_password)),
                ("host", is_set(base, "host", &self.host)),
                ("port", is_set(base, "port", &self.port)),
            ],
        )
    }

    fn inputs(&self, _base: &StepBase, inputs: &mut InputCollector<'_>) -> Result<()> {
        inputs.field("to", &self.to)?;
        inputs.field("from", &self.from)?;
        inputs.field("smtp_username", &self.smtp_username)?;
        inputs.field("smtp_password", &self.smtp_password)?;
        inputs.field("host", &self.host)?;
        inputs.field("port", &self.port)?;
        inputs.field("sender_name", &self.sender_name)?;
        inputs.field("cc", &self.cc)?;
        inputs.field("bcc", &self.bcc)?;
        inputs.field("body", &self.body)?;
        inputs.field("content_type", &self.content_type)?;
        inputs.field("subject", &self.subject)?;
        Ok(())
    }
}
