//! Integrations: where notifications are delivered

use crate::core::body::{body_from_mapping, Attribute};
use crate::core::context::EvalContext;
use crate::core::error::{Diagnostic, Diagnostics};
use crate::core::resolver::{evaluate_as, AttributeValue};
use serde_json::{json, Map, Value};
use serde_yaml::Mapping;
use std::collections::BTreeMap;
use std::fmt;

pub const VALID_SMTP_TLS: [&str; 3] = ["required", "off", "auto"];
pub const DEFAULT_HTTP_INTEGRATION: &str = "http.default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntegrationType {
    Slack,
    Email,
    Http,
    Msteams,
}

impl IntegrationType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "slack" => Some(Self::Slack),
            "email" => Some(Self::Email),
            "http" => Some(Self::Http),
            "msteams" => Some(Self::Msteams),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slack => "slack",
            Self::Email => "email",
            Self::Http => "http",
            Self::Msteams => "msteams",
        }
    }
}

impl fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlackIntegration {
    pub token: Option<String>,
    pub signing_secret: Option<String>,
    pub webhook_url: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailIntegration {
    pub smtp_host: Option<String>,
    pub smtp_tls: Option<String>,
    pub smtp_port: Option<i64>,
    pub smtps_port: Option<i64>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from: Option<String>,
    pub to: Option<Vec<String>>,
    pub cc: Option<Vec<String>>,
    pub bcc: Option<Vec<String>>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamsIntegration {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationKind {
    Slack(SlackIntegration),
    Email(EmailIntegration),
    Http,
    Msteams(TeamsIntegration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Integration {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub kind: IntegrationKind,
}

/// Evaluate an integration attribute; integrations never defer
fn value_of<T: AttributeValue>(attr: &Attribute, ctx: &EvalContext, subject: &str) -> Result<Option<T>, Diagnostic> {
    evaluate_as(&attr.name, &attr.expr, ctx).map_err(|e| Diagnostic::error(e.to_string()).with_subject(subject))
}

impl Integration {
    /// The `http.default` integration every configuration has
    pub fn default_http() -> Self {
        Integration {
            name: "default".to_string(),
            title: None,
            description: Some("Default http integration".to_string()),
            kind: IntegrationKind::Http,
        }
    }

    pub fn integration_type(&self) -> IntegrationType {
        match self.kind {
            IntegrationKind::Slack(_) => IntegrationType::Slack,
            IntegrationKind::Email(_) => IntegrationType::Email,
            IntegrationKind::Http => IntegrationType::Http,
            IntegrationKind::Msteams(_) => IntegrationType::Msteams,
        }
    }

    /// `<type>.<name>`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.integration_type(), self.name)
    }

    /// Decode an integration mapping (`type`, `name` and attributes)
    pub fn decode(map: &Mapping, ctx: &EvalContext) -> Result<Self, Diagnostics> {
        let label = |key: &str| map.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let Some(type_name) = label("type") else {
            return Err(Diagnostic::error("Missing integration type").into());
        };
        let Some(integration_type) = IntegrationType::parse(&type_name) else {
            return Err(Diagnostic::error("Invalid integration type")
                .with_detail(format!("Unsupported integration type '{}'", type_name))
                .into());
        };
        let Some(name) = label("name") else {
            return Err(Diagnostic::error("Missing integration name")
                .with_detail(format!("A {} integration has no 'name'", integration_type))
                .into());
        };

        let subject = format!("integration.{}.{}", integration_type, name);
        let body = body_from_mapping(map, &[], &["type", "name"], &subject)?;

        let mut integration = Integration {
            name,
            title: None,
            description: None,
            kind: match integration_type {
                IntegrationType::Slack => IntegrationKind::Slack(SlackIntegration::default()),
                IntegrationType::Email => IntegrationKind::Email(EmailIntegration::default()),
                IntegrationType::Http => IntegrationKind::Http,
                IntegrationType::Msteams => IntegrationKind::Msteams(TeamsIntegration::default()),
            },
        };

        let mut diags = Diagnostics::new();
        for attr in &body.attributes {
            if let Err(diag) = integration.set_attribute(attr, ctx, &subject) {
                diags.push(diag);
            }
        }
        if diags.is_empty() {
            diags.extend(integration.validate());
        }
        diags.into_result().map(|_| integration)
    }

    fn set_attribute(&mut self, attr: &Attribute, ctx: &EvalContext, subject: &str) -> Result<(), Diagnostic> {
        match attr.name.as_str() {
            "title" => self.title = value_of(attr, ctx, subject)?,
            "description" => self.description = value_of(attr, ctx, subject)?,
            name => {
                let label = match self.integration_type() {
                    IntegrationType::Slack => "Slack",
                    IntegrationType::Email => "Email",
                    IntegrationType::Http => "Http",
                    IntegrationType::Msteams => "msteams",
                };
                let unsupported = || {
                    Diagnostic::error(format!("Unsupported attribute for {} Integration: {}", label, name))
                        .with_subject(subject)
                };
                match &mut self.kind {
                    IntegrationKind::Slack(slack) => match name {
                        "token" => slack.token = value_of(attr, ctx, subject)?,
                        "signing_secret" => slack.signing_secret = value_of(attr, ctx, subject)?,
                        "webhook_url" => slack.webhook_url = value_of(attr, ctx, subject)?,
                        "channel" => slack.channel = value_of(attr, ctx, subject)?,
                        _ => return Err(unsupported()),
                    },
                    IntegrationKind::Email(email) => match name {
                        "smtp_host" => email.smtp_host = value_of(attr, ctx, subject)?,
                        "smtp_tls" => email.smtp_tls = value_of(attr, ctx, subject)?,
                        "smtp_port" => email.smtp_port = value_of(attr, ctx, subject)?,
                        "smtps_port" => email.smtps_port = value_of(attr, ctx, subject)?,
                        "smtp_username" => email.smtp_username = value_of(attr, ctx, subject)?,
                        "smtp_password" => email.smtp_password = value_of(attr, ctx, subject)?,
                        "from" => email.from = value_of(attr, ctx, subject)?,
                        "to" => email.to = value_of(attr, ctx, subject)?,
                        "cc" => email.cc = value_of(attr, ctx, subject)?,
                        "bcc" => email.bcc = value_of(attr, ctx, subject)?,
                        "subject" => email.subject = value_of(attr, ctx, subject)?,
                        _ => return Err(unsupported()),
                    },
                    IntegrationKind::Msteams(teams) => match name {
                        "webhook_url" => teams.webhook_url = value_of(attr, ctx, subject)?,
                        _ => return Err(unsupported()),
                    },
                    IntegrationKind::Http => return Err(unsupported()),
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Diagnostics {
        let name = self.full_name();
        let mut diags = Diagnostics::new();
        let non_empty = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());

        match &self.kind {
            IntegrationKind::Slack(slack) => {
                let token = non_empty(&slack.token);
                let webhook = non_empty(&slack.webhook_url);
                if !token && !webhook {
                    diags.push(Diagnostic::error(format!(
                        "{} requires one of the following attributes set: token, webhook_url",
                        name
                    )));
                }
                if token && webhook {
                    diags.push(Diagnostic::error(format!(
                        "Attributes token and webhook_url are mutually exclusive: {}",
                        name
                    )));
                }
                if !token && non_empty(&slack.signing_secret) {
                    diags.push(Diagnostic::error(format!(
                        "Attribute signing_secret is only applies when attribute token is provided: {}",
                        name
                    )));
                }
            }
            IntegrationKind::Email(email) => {
                let from = non_empty(&email.from);
                let host = non_empty(&email.smtp_host);
                if !from && !host {
                    diags.push(Diagnostic::error(format!(
                        "Missing required attributes from, smtp_host: {}",
                        name
                    )));
                }
                if !from {
                    diags.push(Diagnostic::error(format!("Attribute from must be defined: {}", name)));
                }
                if !host {
                    diags.push(Diagnostic::error(format!("Attribute smtp_host must be defined: {}", name)));
                }
                if let Some(tls) = &email.smtp_tls {
                    if !VALID_SMTP_TLS.contains(&tls.as_str()) {
                        diags.push(Diagnostic::error(format!(
                            "Attribute smtp_tls specified with invalid value {}: {}",
                            tls, name
                        )));
                    }
                }
            }
            IntegrationKind::Msteams(teams) => {
                if !non_empty(&teams.webhook_url) {
                    diags.push(Diagnostic::error(format!("Attribute webhook_url must be defined: {}", name)));
                }
            }
            IntegrationKind::Http => {}
        }
        diags
    }

    /// Value exposed as `integration.<type>.<name>`
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("type".into(), json!(self.integration_type().as_str()));
        map.insert("full_name".into(), json!(self.full_name()));
        map.insert("short_name".into(), json!(self.name));
        map.insert("unqualified_name".into(), json!(self.full_name()));

        let mut put = |key: &str, value: Value| {
            if !value.is_null() {
                map.insert(key.to_string(), value);
            }
        };
        put("title", json!(self.title));
        put("description", json!(self.description));
        match &self.kind {
            IntegrationKind::Slack(slack) => {
                put("token", json!(slack.token));
                put("signing_secret", json!(slack.signing_secret));
                put("webhook_url", json!(slack.webhook_url));
                put("channel", json!(slack.channel));
            }
            IntegrationKind::Email(email) => {
                put("smtp_host", json!(email.smtp_host));
                put("smtp_tls", json!(email.smtp_tls));
                put("smtp_port", json!(email.smtp_port));
                put("smtps_port", json!(email.smtps_port));
                put("smtp_username", json!(email.smtp_username));
                put("smtp_password", json!(email.smtp_password));
                put("from", json!(email.from));
                put("to", json!(email.to));
                put("cc", json!(email.cc));
                put("bcc", json!(email.bcc));
                put("subject", json!(email.subject));
            }
            IntegrationKind::Msteams(teams) => put("webhook_url", json!(teams.webhook_url)),
            IntegrationKind::Http => {}
        }
        Value::Object(map)
    }
}

/// Integrations keyed by `<type>.<name>`, always holding `http.default`
pub fn with_default_integrations(integrations: Vec<Integration>) -> BTreeMap<String, Integration> {
    let mut all = BTreeMap::new();
    let default = Integration::default_http();
    all.insert(default.full_name(), default);
    for integration in integrations {
        all.insert(integration.full_name(), integration);
    }
    all
}

/// The `integration` namespace: `{ <type>: { <name>: {...} } }`
pub fn integration_namespace(integrations: &BTreeMap<String, Integration>) -> Value {
    let mut by_type = Map::new();
    for integration in integrations.values() {
        let entry = by_type
            .entry(integration.integration_type().as_str())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(by_name) = entry {
            by_name.insert(integration.name.clone(), integration.to_value());
        }
    }
    Value::Object(by_type)
}
