//! Pipeline parameters and the checks applied to the values they receive

use crate::core::context::{EvalContext, NAMESPACE_CONNECTION, NAMESPACE_NOTIFIER};
use crate::core::error::{Diagnostic, Diagnostics};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a param
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum ParamType {
    Any,
    String,
    Number,
    Bool,
    List(Box<ParamType>),
    Map(Box<ParamType>),
    /// `connection` or `connection.<type>`
    Connection(Option<String>),
    Notifier,
}

impl ParamType {
    /// Parse `string`, `list(number)`, `map(any)`, `connection.aws`, ...
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix("list(").and_then(|r| r.strip_suffix(')')) {
            return Some(ParamType::List(Box::new(ParamType::parse(inner)?)));
        }
        if let Some(inner) = s.strip_prefix("map(").and_then(|r| r.strip_suffix(')')) {
            return Some(ParamType::Map(Box::new(ParamType::parse(inner)?)));
        }
        if let Some(kind) = s.strip_prefix("connection.") {
            return (!kind.is_empty()).then(|| ParamType::Connection(Some(kind.to_string())));
        }
        Some(match s {
            "any" => ParamType::Any,
            "string" => ParamType::String,
            "number" => ParamType::Number,
            "bool" => ParamType::Bool,
            "list" => ParamType::List(Box::new(ParamType::Any)),
            "map" => ParamType::Map(Box::new(ParamType::Any)),
            "connection" => ParamType::Connection(None),
            "notifier" => ParamType::Notifier,
            _ => return None,
        })
    }

    /// Whether values of this type have to be looked up in the context
    pub fn is_custom(&self) -> bool {
        match self {
            ParamType::Connection(_) | ParamType::Notifier => true,
            ParamType::List(inner) | ParamType::Map(inner) => inner.is_custom(),
            _ => false,
        }
    }

    /// Structural check of plain (non custom) types
    fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ParamType::Any, _) => true,
            (ParamType::String, Value::String(_)) => true,
            (ParamType::Number, Value::Number(_)) => true,
            (ParamType::Bool, Value::Bool(_)) => true,
            (ParamType::List(inner), Value::Array(items)) => items.iter().all(|v| inner.accepts(v)),
            (ParamType::Map(inner), Value::Object(map)) => map.values().all(|v| inner.accepts(v)),
            (ParamType::Connection(_) | ParamType::Notifier, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Any => write!(f, "any"),
            ParamType::String => write!(f, "string"),
            ParamType::Number => write!(f, "number"),
            ParamType::Bool => write!(f, "bool"),
            ParamType::List(inner) => write!(f, "list({})", inner),
            ParamType::Map(inner) => write!(f, "map({})", inner),
            ParamType::Connection(None) => write!(f, "connection"),
            ParamType::Connection(Some(kind)) => write!(f, "connection.{}", kind),
            ParamType::Notifier => write!(f, "notifier"),
        }
    }
}

impl From<ParamType> for String {
    fn from(t: ParamType) -> Self {
        t.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineParam {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub optional: bool,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl PipelineParam {
    pub fn new(name: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            param_type,
            default: None,
            optional: false,
            enum_values: None,
            tags: BTreeMap::new(),
            format: None,
        }
    }

    /// A param without default that is not optional must be supplied
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }

    /// Check the declaration itself: the default and the enum must fit the type
    pub fn validate(&self, subject: &str) -> Diagnostics {
        let mut diags = Diagnostics::new();
        if let Some(values) = &self.enum_values {
            if self.param_type.is_custom() {
                diags.push(
                    Diagnostic::error(format!("Invalid enum for param {}", self.name))
                        .with_detail("enum is not supported for connection and notifier params")
                        .with_subject(subject),
                );
            }
            for value in values {
                let element_type = match &self.param_type {
                    ParamType::List(inner) => inner.as_ref(),
                    other => other,
                };
                if !element_type.accepts(value) {
                    diags.push(
                        Diagnostic::error(format!("Invalid enum for param {}", self.name))
                            .with_detail(format!("enum value {} is not a {}", value, element_type))
                            .with_subject(subject),
                    );
                }
            }
        }
        if let Some(default) = &self.default {
            if !self.param_type.is_custom() {
                if let Err(e) = self.check_plain(default) {
                    diags.extend(e.into_iter().map(|d| d.with_subject(subject)).collect());
                }
            }
        }
        diags
    }

    /// Check a supplied value against the type, the enum and, for
    /// connection and notifier params, the resources known to the context
    pub fn validate_setting(&self, setting: &Value, ctx: &EvalContext) -> Result<(), Diagnostics> {
        if setting.is_null() {
            return Ok(());
        }
        if self.param_type.is_custom() {
            return self.check_custom(&self.param_type, setting, ctx);
        }
        self.check_plain(setting)
    }

    fn check_plain(&self, setting: &Value) -> Result<(), Diagnostics> {
        if !self.param_type.accepts(setting) {
            return Err(Diagnostic::error(format!("Invalid type for param {}", self.name))
                .with_detail("The param type is not compatible with the given value")
                .into());
        }
        let Some(allowed) = &self.enum_values else {
            return Ok(());
        };
        let candidates: Vec<&Value> = match setting {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        match candidates.into_iter().find(|v| !allowed.contains(v)) {
            Some(bad) => Err(Diagnostic::error(format!("Invalid value for param {}", self.name))
                .with_detail(format!("{} is not one of the allowed values", bad))
                .into()),
            None => Ok(()),
        }
    }

    fn check_custom(&self, param_type: &ParamType, setting: &Value, ctx: &EvalContext) -> Result<(), Diagnostics> {
        match (param_type, setting) {
            (ParamType::List(inner), Value::Array(items)) => {
                let mut diags = Diagnostics::new();
                for item in items {
                    if let Err(e) = self.check_custom(inner, item, ctx) {
                        diags.extend(e);
                    }
                }
                diags.into_result()
            }
            (ParamType::Map(inner), Value::Object(map)) => {
                let mut diags = Diagnostics::new();
                for item in map.values() {
                    if let Err(e) = self.check_custom(inner, item, ctx) {
                        diags.extend(e);
                    }
                }
                diags.into_result()
            }
            (ParamType::Connection(required), value) => self.check_connection(required.as_deref(), value, ctx),
            (ParamType::Notifier, value) => self.check_notifier(value, ctx),
            _ => Err(Diagnostic::error(format!("Invalid type for param {}", self.name))
                .with_detail("The param type is not compatible with the given value")
                .into()),
        }
    }

    /// Connections are `{type, short_name}` objects or `type.name` strings
    fn check_connection(&self, required: Option<&str>, value: &Value, ctx: &EvalContext) -> Result<(), Diagnostics> {
        let fail = |summary: String| -> Result<(), Diagnostics> { Err(Diagnostic::error(summary).into()) };

        let (kind, name) = match value {
            Value::String(s) => match s.split_once('.') {
                Some((kind, name)) => (kind.to_string(), name.to_string()),
                None => return fail(format!("Invalid value for param {}", self.name)),
            },
            Value::Object(map) => {
                let Some(kind) = map.get("type").and_then(Value::as_str) else {
                    return fail(format!("The value for param must have a 'type' key: {}", self.name));
                };
                let Some(name) = map.get("short_name").and_then(Value::as_str) else {
                    return fail(format!("The value for param must have a 'short_name' key: {}", self.name));
                };
                (kind.to_string(), name.to_string())
            }
            _ => return fail(format!("The value for param must be an object: {}", self.name)),
        };

        if let Some(required) = required {
            if required != kind {
                return fail(format!("Invalid type for param {}", self.name));
            }
        }
        if !ctx.has_namespace(NAMESPACE_CONNECTION) {
            return fail(format!("No connection found: {}", self.name));
        }
        if !ctx.has_resource(NAMESPACE_CONNECTION, &kind, None) {
            return fail(format!("No connection found for the given connection type: {}", kind));
        }
        if !ctx.has_resource(NAMESPACE_CONNECTION, &kind, Some(&name)) {
            return fail(format!("No connection found for the given connection name: {}", name));
        }
        Ok(())
    }

    /// Notifiers are `{name}` objects or plain names
    fn check_notifier(&self, value: &Value, ctx: &EvalContext) -> Result<(), Diagnostics> {
        let fail = |summary: String| -> Result<(), Diagnostics> { Err(Diagnostic::error(summary).into()) };

        let name = match value {
            Value::String(s) => s.as_str(),
            Value::Object(map) => match map.get("name").and_then(Value::as_str) {
                Some(name) => name,
                None => return fail(format!("The value for param must have a 'name' key: {}", self.name)),
            },
            _ => return fail(format!("The value for param must be an object: {}", self.name)),
        };
        if !ctx.has_namespace(NAMESPACE_NOTIFIER) {
            return fail(format!("No notifier found: {}", self.name));
        }
        if !ctx.has_resource(NAMESPACE_NOTIFIER, name, None) {
            return fail(format!("No notifier found for the given notifier name: {}", name));
        }
        Ok(())
    }
}
