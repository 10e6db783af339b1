//! Built-in functions available to expressions
//!
//! `try` and `can` are special forms handled by the evaluator since they
//! must see argument failures rather than values.

use super::convert::{from_hcl, number_value, to_bool, to_display_string, to_f64, to_hcl, type_name, values_equal};
use super::EvalError;
use hcl::eval::{Context, FuncArgs, FuncDef, ParamType};
use serde_json::{Map, Value};

macro_rules! builtins {
    ($($name:ident),* $(,)?) => {
        /// Register every built-in function on an evaluation scope
        pub(crate) fn declare(scope: &mut Context<'_>) {
            $(
                fn $name(args: FuncArgs) -> Result<hcl::Value, String> {
                    dispatch(stringify!($name), args)
                }
                scope.declare_func(
                    stringify!($name),
                    FuncDef::builder().variadic_param(ParamType::Any).build($name),
                );
            )*
        }
    };
}

builtins!(
    length, upper, lower, trimspace, tostring, tonumber, tobool, jsonencode, jsondecode, merge, keys, values,
    contains, join, split, coalesce, concat, lookup, format,
);

fn dispatch(name: &str, args: FuncArgs) -> Result<hcl::Value, String> {
    let values = args.iter().cloned().map(from_hcl).collect();
    match call(name, values) {
        Ok(value) => Ok(to_hcl(&value)),
        Err(EvalError::FunctionCall { message, .. }) => Err(message),
        Err(other) => Err(other.to_string()),
    }
}

fn fail(name: &str, message: impl Into<String>) -> EvalError {
    EvalError::FunctionCall {
        name: name.to_string(),
        message: message.into(),
    }
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(fail(
            name,
            format!("expects {} argument(s), got {}", expected, args.len()),
        ));
    }
    Ok(())
}

fn string_arg(name: &str, value: &Value) -> Result<String, EvalError> {
    to_display_string(value).map_err(|_| fail(name, format!("expected a string, got {}", type_name(value))))
}

pub fn call(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    match name {
        "length" => {
            arity(name, &args, 1)?;
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => return Err(fail(name, format!("cannot take the length of a {}", type_name(other)))),
            };
            Ok(Value::from(len))
        }
        "upper" => {
            arity(name, &args, 1)?;
            Ok(Value::String(string_arg(name, &args[0])?.to_uppercase()))
        }
        "lower" => {
            arity(name, &args, 1)?;
            Ok(Value::String(string_arg(name, &args[0])?.to_lowercase()))
        }
        "trimspace" => {
            arity(name, &args, 1)?;
            Ok(Value::String(string_arg(name, &args[0])?.trim().to_string()))
        }
        "tostring" => {
            arity(name, &args, 1)?;
            match &args[0] {
                Value::Null => Ok(Value::Null),
                other => Ok(Value::String(string_arg(name, other)?)),
            }
        }
        "tonumber" => {
            arity(name, &args, 1)?;
            match &args[0] {
                Value::Null => Ok(Value::Null),
                other => to_f64(other)
                    .map(number_value)
                    .map_err(|_| fail(name, format!("cannot convert {} to number", other))),
            }
        }
        "tobool" => {
            arity(name, &args, 1)?;
            match &args[0] {
                Value::Null => Ok(Value::Null),
                other => to_bool(other)
                    .map(Value::Bool)
                    .map_err(|_| fail(name, format!("cannot convert {} to bool", other))),
            }
        }
        "jsonencode" => {
            arity(name, &args, 1)?;
            serde_json::to_string(&args[0])
                .map(Value::String)
                .map_err(|e| fail(name, e.to_string()))
        }
        "jsondecode" => {
            arity(name, &args, 1)?;
            let text = string_arg(name, &args[0])?;
            serde_json::from_str(&text).map_err(|e| fail(name, e.to_string()))
        }
        "merge" => {
            let mut merged = Map::new();
            for arg in args {
                match arg {
                    Value::Object(map) => merged.extend(map),
                    Value::Null => {}
                    other => return Err(fail(name, format!("arguments must be objects, got {}", type_name(&other)))),
                }
            }
            Ok(Value::Object(merged))
        }
        "keys" | "values" => {
            arity(name, &args, 1)?;
            match &args[0] {
                Value::Object(map) if name == "keys" => {
                    Ok(Value::Array(map.keys().cloned().map(Value::String).collect()))
                }
                Value::Object(map) => Ok(Value::Array(map.values().cloned().collect())),
                other => Err(fail(name, format!("expected an object, got {}", type_name(other)))),
            }
        }
        "contains" => {
            arity(name, &args, 2)?;
            match &args[0] {
                Value::Array(items) => Ok(Value::Bool(
                    items.iter().any(|item| values_equal(item, &args[1])),
                )),
                other => Err(fail(name, format!("expected a list, got {}", type_name(other)))),
            }
        }
        "join" => {
            arity(name, &args, 2)?;
            let separator = string_arg(name, &args[0])?;
            match &args[1] {
                Value::Array(items) => {
                    let parts = items
                        .iter()
                        .map(|item| string_arg(name, item))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Value::String(parts.join(&separator)))
                }
                other => Err(fail(name, format!("expected a list, got {}", type_name(other)))),
            }
        }
        "split" => {
            arity(name, &args, 2)?;
            let separator = string_arg(name, &args[0])?;
            let text = string_arg(name, &args[1])?;
            Ok(Value::Array(
                text.split(separator.as_str())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            ))
        }
        "coalesce" => Ok(args
            .into_iter()
            .find(|v| !v.is_null() && v.as_str() != Some(""))
            .unwrap_or(Value::Null)),
        "concat" => {
            let mut out = Vec::new();
            for arg in args {
                match arg {
                    Value::Array(items) => out.extend(items),
                    other => return Err(fail(name, format!("arguments must be lists, got {}", type_name(&other)))),
                }
            }
            Ok(Value::Array(out))
        }
        "lookup" => {
            if args.len() < 2 || args.len() > 3 {
                return Err(fail(name, "expects 2 or 3 arguments"));
            }
            let key = string_arg(name, &args[1])?;
            match &args[0] {
                Value::Object(map) => match (map.get(&key), args.get(2)) {
                    (Some(value), _) => Ok(value.clone()),
                    (None, Some(default)) => Ok(default.clone()),
                    (None, None) => Err(fail(name, format!("the given key \"{}\" does not exist", key))),
                },
                other => Err(fail(name, format!("expected an object, got {}", type_name(other)))),
            }
        }
        "format" => {
            let Some((first, rest)) = args.split_first() else {
                return Err(fail(name, "expects a format string"));
            };
            let template = string_arg(name, first)?;
            let mut rest = rest.iter();
            let mut out = String::new();
            let mut chars = template.chars().peekable();
            while let Some(c) = chars.next() {
                if c != '%' {
                    out.push(c);
                    continue;
                }
                match chars.next() {
                    Some('%') => out.push('%'),
                    Some('s') | Some('d') | Some('v') => {
                        let value = rest.next().ok_or_else(|| fail(name, "not enough arguments for format string"))?;
                        match value {
                            Value::String(s) => out.push_str(s),
                            other => out.push_str(&other.to_string()),
                        }
                    }
                    Some(other) => return Err(fail(name, format!("unsupported verb %{}", other))),
                    None => return Err(fail(name, "format string ends with %")),
                }
            }
            Ok(Value::String(out))
        }
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}
