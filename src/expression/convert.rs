//! Conversions between evaluator values, JSON values and native collections

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert {found} to {expected}")]
pub struct ConversionError {
    pub expected: &'static str,
    pub found: &'static str,
}

/// Short type name used in messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn mismatch(expected: &'static str, value: &Value) -> ConversionError {
    ConversionError {
        expected,
        found: type_name(value),
    }
}

/// Render a primitive value the way a template interpolation does
pub fn to_display_string(value: &Value) -> Result<String, ConversionError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(mismatch("string", other)),
    }
}

pub fn to_string_slice(value: &Value) -> Result<Vec<String>, ConversionError> {
    match value {
        Value::Array(items) => items.iter().map(to_display_string).collect(),
        other => Err(mismatch("list of string", other)),
    }
}

pub fn to_string_map(value: &Value) -> Result<BTreeMap<String, String>, ConversionError> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), to_display_string(v)?)))
            .collect(),
        other => Err(mismatch("map of string", other)),
    }
}

pub fn to_map(value: &Value) -> Result<Map<String, Value>, ConversionError> {
    match value {
        Value::Object(map) => Ok(map.clone()),
        other => Err(mismatch("map", other)),
    }
}

pub fn to_bool(value: &Value) -> Result<bool, ConversionError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "true" => Ok(true),
        Value::String(s) if s == "false" => Ok(false),
        other => Err(mismatch("bool", other)),
    }
}

/// A number with no fractional part, also accepted from a numeric string
pub fn to_whole_number(value: &Value) -> Result<i64, ConversionError> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 => Ok(n as i64),
        _ => Err(mismatch("whole number", value)),
    }
}

pub fn to_f64(value: &Value) -> Result<f64, ConversionError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| mismatch("number", value)),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| mismatch("number", value)),
        other => Err(mismatch("number", other)),
    }
}

/// Build a JSON number, keeping integers integral
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// JSON value handed to the evaluator
pub fn to_hcl(value: &Value) -> hcl::Value {
    match value {
        Value::Null => hcl::Value::Null,
        Value::Bool(b) => hcl::Value::Bool(*b),
        Value::Number(n) => {
            let number = match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Some(hcl::Number::from(i)),
                (None, Some(u)) => Some(hcl::Number::from(u)),
                _ => n.as_f64().and_then(hcl::Number::from_f64),
            };
            number.map(hcl::Value::Number).unwrap_or(hcl::Value::Null)
        }
        Value::String(s) => hcl::Value::String(s.clone()),
        Value::Array(items) => hcl::Value::Array(items.iter().map(to_hcl).collect()),
        Value::Object(map) => hcl::Value::Object(map.iter().map(|(k, v)| (k.clone(), to_hcl(v))).collect()),
    }
}

/// Evaluator result as a JSON value, with whole floats turned into integers
pub fn from_hcl(value: hcl::Value) -> Value {
    match value {
        hcl::Value::Null => Value::Null,
        hcl::Value::Bool(b) => Value::Bool(b),
        hcl::Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Value::from(i),
            (None, Some(u), _) => Value::from(u),
            (None, None, Some(f)) => number_value(f),
            _ => Value::Null,
        },
        hcl::Value::String(s) => Value::String(s),
        hcl::Value::Array(items) => Value::Array(items.into_iter().map(from_hcl).collect()),
        hcl::Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, from_hcl(v))).collect()),
    }
}

/// Equality that treats `1` and `1.0` as the same number
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}
