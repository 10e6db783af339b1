//! `input` step: ask a person for a decision through a notifier

use super::{is_set, require, set, InputCollector, StepBase, StepVariant};
use crate::core::body::{Attribute, Block};
use crate::core::context::EvalContext;
use crate::core::error::{Diagnostic, Diagnostics, PipelineError, Result};
use crate::core::resolver::{resolve_as, resolve_or_defer, ResolutionTarget, StandaloneTarget};
use serde_json::{Map, Value};
use std::fmt;

pub const BLOCK_OPTION: &str = "option";
pub const ATTRIBUTE_OPTIONS: &str = "options";
pub const ATTRIBUTE_NOTIFIER: &str = "notifier";
/// `type` already names the step type in a step mapping
pub const ATTRIBUTE_INPUT_TYPE: &str = "input_type";

pub const VALID_OPTION_STYLES: [&str; 4] = ["default", "ok", "alert", "info"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Button,
    Text,
    Select,
    MultiSelect,
}

impl InputType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "button" => Some(InputType::Button),
            "text" => Some(InputType::Text),
            "select" => Some(InputType::Select),
            "multiselect" => Some(InputType::MultiSelect),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Button => "button",
            InputType::Text => "text",
            InputType::Select => "select",
            InputType::MultiSelect => "multiselect",
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputOption {
    pub label: Option<String>,
    pub value: Option<String>,
    pub selected: Option<bool>,
    pub style: Option<String>,
}

impl InputOption {
    /// Parse one entry of an `options` list
    pub fn from_value(value: &Value) -> std::result::Result<Self, String> {
        let Value::Object(map) = value else {
            return Err("input options must be objects".to_string());
        };
        let text = |key: &str| -> Option<String> {
            match map.get(key)? {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            }
        };
        let option = InputOption {
            value: text("value"),
            label: text("label"),
            selected: map.get("selected").and_then(Value::as_bool),
            style: text("style"),
        };
        if option.value.is_none() {
            return Err("input options must declare a value".to_string());
        }
        option.check_style()?;
        Ok(option)
    }

    fn check_style(&self) -> std::result::Result<(), String> {
        match &self.style {
            Some(style) if !VALID_OPTION_STYLES.contains(&style.as_str()) => {
                Err(format!("Invalid option style '{}'", style))
            }
            _ => Ok(()),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(label) = &self.label {
            map.insert("label".into(), Value::String(label.clone()));
        }
        if let Some(value) = &self.value {
            map.insert("value".into(), Value::String(value.clone()));
        }
        if let Some(selected) = self.selected {
            map.insert("selected".into(), Value::Bool(selected));
        }
        if let Some(style) = &self.style {
            map.insert("style".into(), Value::String(style.clone()));
        }
        Value::Object(map)
    }
}

fn parse_options(value: &Value) -> std::result::Result<Vec<InputOption>, String> {
    match value {
        Value::Array(items) => items.iter().map(InputOption::from_value).collect(),
        _ => Err("options must be a list".to_string()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct InputStep {
    pub input_type: Option<InputType>,
    pub prompt: Option<String>,
    pub options: Option<Vec<InputOption>>,
    /// Set when options come from `option` blocks
    pub option_blocks: bool,
    pub notifier: Option<Map<String, Value>>,
    pub channel: Option<String>,
    pub subject: Option<String>,
    pub to: Option<Vec<String>>,
    pub cc: Option<Vec<String>>,
    pub bcc: Option<Vec<String>>,
}

/// Recipient lists compare as sets
pub(crate) fn same_recipients(a: &Option<Vec<String>>, b: &Option<Vec<String>>) -> bool {
    let sorted = |list: &Option<Vec<String>>| {
        list.as_ref().map(|l| {
            let mut l = l.clone();
            l.sort();
            l
        })
    };
    sorted(a) == sorted(b)
}

impl PartialEq for InputStep {
    fn eq(&self, other: &Self) -> bool {
        self.input_type == other.input_type
            && self.prompt == other.prompt
            && self.options == other.options
            && self.option_blocks == other.option_blocks
            && self.notifier == other.notifier
            && self.channel == other.channel
            && self.subject == other.subject
            && same_recipients(&self.to, &other.to)
            && same_recipients(&self.cc, &other.cc)
            && same_recipients(&self.bcc, &other.bcc)
    }
}

impl StepVariant for InputStep {
    fn set_attribute(&mut self, attr: &Attribute, ctx: &EvalContext, base: &mut StepBase) -> std::result::Result<bool, Diagnostics> {
        match attr.name.as_str() {
            ATTRIBUTE_INPUT_TYPE => {
                let value: Option<String> = resolve_as(attr, ctx, base, false)?;
                if let Some(value) = value {
                    match InputType::parse(&value) {
                        Some(t) => self.input_type = Some(t),
                        None => {
                            return Err(Diagnostic::error(format!("Attribute type specified with invalid value {}", value))
                                .with_subject(base.subject())
                                .into())
                        }
                    }
                }
                Ok(true)
            }
            "prompt" => set(&mut self.prompt, attr, ctx, base),
            ATTRIBUTE_OPTIONS => {
                if let Some(value) = resolve_or_defer(attr, ctx, base, false)? {
                    match parse_options(&value) {
                        Ok(options) => self.options = Some(options),
                        Err(e) => {
                            return Err(Diagnostic::error("Invalid options")
                                .with_detail(e)
                                .with_subject(base.subject())
                                .into())
                        }
                    }
                }
                Ok(true)
            }
            ATTRIBUTE_NOTIFIER => set(&mut self.notifier, attr, ctx, base),
            "channel" => set(&mut self.channel, attr, ctx, base),
            "subject" => set(&mut self.subject, attr, ctx, base),
            "to" => set(&mut self.to, attr, ctx, base),
            "cc" => set(&mut self.cc, attr, ctx, base),
            "bcc" => set(&mut self.bcc, attr, ctx, base),
            _ => Ok(false),
        }
    }

    fn set_block(&mut self, block: &Block, ctx: &EvalContext, base: &mut StepBase) -> Option<std::result::Result<(), Diagnostics>> {
        if block.kind != BLOCK_OPTION {
            return None;
        }
        if !self.option_blocks && is_set(base, ATTRIBUTE_OPTIONS, &self.options) {
            return Some(Err(Diagnostic::error("Option blocks and options attribute are mutually exclusive")
                .with_subject(base.subject())
                .into()));
        }

        let label = block.labels.first().cloned().unwrap_or_default();
        let mut option = InputOption {
            label: Some(label.clone()),
            ..Default::default()
        };
        let mut target = StandaloneTarget::new(base.subject());
        let mut diags = Diagnostics::new();
        for attr in &block.body.attributes {
            let result = match attr.name.as_str() {
                "label" => resolve_as(attr, ctx, &mut target, false).map(|v| option.label = v.or(option.label.take())),
                "value" => resolve_as(attr, ctx, &mut target, false).map(|v| option.value = v),
                "selected" => resolve_as(attr, ctx, &mut target, false).map(|v| option.selected = v),
                "style" => resolve_as(attr, ctx, &mut target, false).map(|v| option.style = v),
                other => Err(Diagnostic::error("Unsupported attribute")
                    .with_detail(format!("Unsupported attribute '{}' in option '{}'", other, label))
                    .with_subject(base.subject())
                    .into()),
            };
            if let Err(e) = result {
                diags.extend(e);
            }
        }
        if !target.unresolved_attributes.is_empty() {
            diags.push(
                Diagnostic::error("Invalid option")
                    .with_detail(format!("Option '{}' must be known when the pipeline is loaded", label))
                    .with_subject(base.subject()),
            );
        }
        if let Err(e) = option.check_style() {
            diags.push(Diagnostic::error(e).with_subject(base.subject()));
        }
        if option.value.is_none() {
            option.value = Some(label);
        }
        if diags.has_errors() {
            return Some(Err(diags));
        }

        self.option_blocks = true;
        self.options.get_or_insert_with(Vec::new).push(option);
        Some(Ok(()))
    }

    fn validate(&self, base: &StepBase) -> Diagnostics {
        require(
            base,
            &[
                (ATTRIBUTE_NOTIFIER, is_set(base, ATTRIBUTE_NOTIFIER, &self.notifier)),
                (ATTRIBUTE_INPUT_TYPE, is_set(base, ATTRIBUTE_INPUT_TYPE, &self.input_type)),
            ],
        )
    }

    fn inputs(&self, _base: &StepBase, inputs: &mut InputCollector<'_>) -> Result<()> {
        if let Some(input_type) = self.input_type {
            inputs.insert("type", Value::String(input_type.to_string()));
        }
        inputs.field("prompt", &self.prompt)?;

        let options = match inputs.raw(ATTRIBUTE_OPTIONS)? {
            Some(value) => Some(parse_options(&value).map_err(|_| PipelineError::Conversion {
                attribute: ATTRIBUTE_OPTIONS.to_string(),
                expected: "list of options".to_string(),
            })?),
            None => self.options.clone(),
        };
        if let Some(options) = options {
            inputs.insert(ATTRIBUTE_OPTIONS, Value::Array(options.iter().map(InputOption::to_value).collect()));
        }

        inputs.field(ATTRIBUTE_NOTIFIER, &self.notifier)?;
        inputs.field("channel", &self.channel)?;
        inputs.field("subject", &self.subject)?;
        inputs.field("to", &self.to)?;
        inputs.field("cc", &self.cc)?;
        inputs.field("bcc", &self.bcc)?;
        Ok(())
    }
}
