//! Notifiers group one or more `notify` targets, each bound to an integration

use crate::core::body::{body_from_mapping, Block, BlockShape, BlockSpec};
use crate::core::context::EvalContext;
use crate::core::error::{Diagnostic, Diagnostics};
use crate::core::integration::{Integration, IntegrationType};
use crate::core::resolver::{evaluate_as, evaluate_attribute, AttributeValue};
use serde_json::{json, Map, Value};
use serde_yaml::Mapping;
use std::collections::BTreeMap;

pub const DEFAULT_NOTIFIER: &str = "default";
pub const BLOCK_NOTIFY: &str = "notify";

const NOTIFIER_BLOCKS: [BlockSpec; 1] = [BlockSpec::new(BLOCK_NOTIFY, BlockShape::List)];

#[derive(Debug, Clone, PartialEq)]
pub struct Notify {
    pub integration: Integration,
    pub cc: Option<Vec<String>>,
    pub bcc: Option<Vec<String>>,
    pub to: Option<Vec<String>>,
    pub channel: Option<String>,
    pub subject: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl Notify {
    fn new(integration: Integration) -> Self {
        Notify {
            integration,
            cc: None,
            bcc: None,
            to: None,
            channel: None,
            subject: None,
            title: None,
            description: None,
        }
    }

    fn decode(
        block: &Block,
        ctx: &EvalContext,
        integrations: &BTreeMap<String, Integration>,
        subject: &str,
    ) -> Result<Self, Diagnostics> {
        let Some(attr) = block.body.attribute("integration") else {
            return Err(Diagnostic::error("Missing required attribute: integration")
                .with_subject(subject)
                .into());
        };
        let parse_error = || Diagnostic::error("Error parsing integration attribute").with_subject(subject);

        let value = evaluate_attribute(&attr.name, &attr.expr, ctx)
            .map_err(|e| parse_error().with_detail(e.to_string()))?;
        let reference = match &value {
            Value::String(name) => name.clone(),
            Value::Object(map) => match map.get("full_name").and_then(Value::as_str) {
                Some(name) => name.to_string(),
                None => return Err(parse_error().into()),
            },
            _ => return Err(parse_error().into()),
        };
        let integration = integrations.get(&reference).cloned().ok_or_else(|| {
            parse_error().with_detail(format!("Integration not found: {}", reference))
        })?;

        let mut notify = Notify::new(integration);
        let mut diags = Diagnostics::new();
        for attr in &block.body.attributes {
            let result = match attr.name.as_str() {
                "integration" => Ok(()),
                "cc" => set(&mut notify.cc, attr, ctx),
                "bcc" => set(&mut notify.bcc, attr, ctx),
                "to" => set(&mut notify.to, attr, ctx),
                "channel" => set(&mut notify.channel, attr, ctx),
                "subject" => set(&mut notify.subject, attr, ctx),
                "title" => set(&mut notify.title, attr, ctx),
                "description" => set(&mut notify.description, attr, ctx),
                other => Err(format!("Unsupported attribute for notify: {}", other)),
            };
            if let Err(summary) = result {
                diags.push(Diagnostic::error(summary).with_subject(subject));
            }
        }
        if diags.is_empty() {
            diags.extend(notify.validate(subject));
        }
        diags.into_result().map(|_| notify)
    }

    /// Email-only and slack-only attributes must match the integration type
    pub fn validate(&self, subject: &str) -> Diagnostics {
        let kind = self.integration.integration_type();
        let mut diags = Diagnostics::new();
        let mut not_valid = |attribute: &str| {
            diags.push(
                Diagnostic::error(format!(
                    "Attribute '{}' is not a valid attribute for {} type integration",
                    attribute, kind
                ))
                .with_subject(subject),
            )
        };

        if kind != IntegrationType::Email {
            for (attribute, set) in [
                ("cc", self.cc.is_some()),
                ("bcc", self.bcc.is_some()),
                ("to", self.to.is_some()),
                ("subject", self.subject.is_some()),
            ] {
                if set {
                    not_valid(attribute);
                }
            }
        }
        if kind != IntegrationType::Slack && self.channel.is_some() {
            not_valid("channel");
        }
        diags
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("integration".into(), self.integration.to_value());
        for (key, value) in [
            ("cc", json!(self.cc)),
            ("bcc", json!(self.bcc)),
            ("to", json!(self.to)),
            ("channel", json!(self.channel)),
            ("subject", json!(self.subject)),
            ("title", json!(self.title)),
            ("description", json!(self.description)),
        ] {
            if !value.is_null() {
                map.insert(key.into(), value);
            }
        }
        Value::Object(map)
    }
}

fn set<T: AttributeValue>(field: &mut Option<T>, attr: &crate::core::body::Attribute, ctx: &EvalContext) -> Result<(), String> {
    *field = evaluate_as(&attr.name, &attr.expr, ctx).map_err(|e| e.to_string())?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notifier {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub notifies: Vec<Notify>,
}

impl Notifier {
    /// `notifier.default`: a single notify through `http.default`
    pub fn default_notifier() -> Self {
        Notifier {
            name: DEFAULT_NOTIFIER.to_string(),
            title: None,
            description: Some("Default notifier".to_string()),
            notifies: vec![Notify::new(Integration::default_http())],
        }
    }

    pub fn full_name(&self) -> String {
        format!("notifier.{}", self.name)
    }

    pub fn decode(
        map: &Mapping,
        ctx: &EvalContext,
        integrations: &BTreeMap<String, Integration>,
    ) -> Result<Self, Diagnostics> {
        let Some(name) = map.get("name").and_then(|v| v.as_str()).map(str::to_string) else {
            return Err(Diagnostic::error("Missing notifier name").into());
        };
        let subject = format!("notifier.{}", name);
        let body = body_from_mapping(map, &NOTIFIER_BLOCKS, &["name"], &subject)?;

        let mut notifier = Notifier {
            name,
            title: None,
            description: None,
            notifies: Vec::new(),
        };
        let mut diags = Diagnostics::new();
        for attr in &body.attributes {
            let result = match attr.name.as_str() {
                "title" => set(&mut notifier.title, attr, ctx),
                "description" => set(&mut notifier.description, attr, ctx),
                other => Err(format!("Unsupported attribute for notifier: {}", other)),
            };
            if let Err(summary) = result {
                diags.push(Diagnostic::error(summary).with_subject(&subject));
            }
        }
        for block in body.blocks_of(BLOCK_NOTIFY) {
            match Notify::decode(block, ctx, integrations, &subject) {
                Ok(notify) => notifier.notifies.push(notify),
                Err(e) => diags.extend(e),
            }
        }
        if diags.is_empty() && notifier.notifies.is_empty() {
            diags.push(
                Diagnostic::error(format!(
                    "notifier must have at least one notify block to send the request to: {}",
                    notifier.name
                ))
                .with_subject(&subject),
            );
        }
        diags.into_result().map(|_| notifier)
    }

    /// Value exposed as `notifier.<name>`
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("name".into(), json!(self.name));
        map.insert("full_name".into(), json!(self.full_name()));
        if let Some(title) = &self.title {
            map.insert("title".into(), json!(title));
        }
        if let Some(description) = &self.description {
            map.insert("description".into(), json!(description));
        }
        map.insert(
            "notifies".into(),
            Value::Array(self.notifies.iter().map(Notify::to_value).collect()),
        );
        Value::Object(map)
    }
}

/// Notifiers keyed by name, always holding `default` unless overridden
pub fn with_default_notifier(notifiers: Vec<Notifier>) -> BTreeMap<String, Notifier> {
    let mut all = BTreeMap::new();
    all.insert(DEFAULT_NOTIFIER.to_string(), Notifier::default_notifier());
    for notifier in notifiers {
        all.insert(notifier.name.clone(), notifier);
    }
    all
}

pub fn notifier_namespace(notifiers: &BTreeMap<String, Notifier>) -> Value {
    Value::Object(
        notifiers
            .iter()
            .map(|(name, notifier)| (name.clone(), notifier.to_value()))
            .collect(),
    )
}
