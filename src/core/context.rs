//! Evaluation context - the namespace values expressions are evaluated against

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Namespaces known to the resolver
pub const NAMESPACE_STEP: &str = "step";
pub const NAMESPACE_PARAM: &str = "param";
pub const NAMESPACE_VAR: &str = "var";
pub const NAMESPACE_EACH: &str = "each";
pub const NAMESPACE_LOOP: &str = "loop";
pub const NAMESPACE_RETRY: &str = "retry";
pub const NAMESPACE_RESULT: &str = "result";
pub const NAMESPACE_CREDENTIAL: &str = "credential";
pub const NAMESPACE_CONNECTION: &str = "connection";
pub const NAMESPACE_NOTIFIER: &str = "notifier";

/// Values available to expressions, keyed by namespace
///
/// A context is built once per resolution pass and never mutated by the
/// resolver. Decode-time contexts usually hold only `var` (and perhaps
/// `connection`); run-time contexts add `step`, `param`, `each`, and so on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalContext {
    /// Namespace name -> value tree
    pub variables: BTreeMap<String, Value>,

    /// `var` names that stand for connections resolved only at run time,
    /// mapped to the connection names they may refer to (e.g. `aws.prod`)
    #[serde(default)]
    pub late_binding_vars: BTreeMap<String, Vec<String>>,
}

impl EvalContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value of a namespace
    pub fn get(&self, namespace: &str) -> Option<&Value> {
        self.variables.get(namespace)
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.variables.contains_key(namespace)
    }

    /// Replace a whole namespace
    pub fn set_namespace(&mut self, namespace: impl Into<String>, value: Value) {
        self.variables.insert(namespace.into(), value);
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>, value: Value) -> Self {
        self.set_namespace(namespace, value);
        self
    }

    /// Set `step.<type>.<name>` to the output of a completed step
    pub fn set_step_output(&mut self, step_type: &str, name: &str, output: Value) {
        let steps = object_entry(&mut self.variables, NAMESPACE_STEP);
        let by_type = steps
            .entry(step_type.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !by_type.is_object() {
            *by_type = Value::Object(Map::new());
        }
        if let Value::Object(map) = by_type {
            map.insert(name.to_string(), output);
        }
    }

    pub fn with_step_output(mut self, step_type: &str, name: &str, output: Value) -> Self {
        self.set_step_output(step_type, name, output);
        self
    }

    /// Set a single member of a namespace, creating the namespace if needed
    pub fn set_member(&mut self, namespace: &str, name: &str, value: Value) {
        object_entry(&mut self.variables, namespace).insert(name.to_string(), value);
    }

    pub fn with_param(mut self, name: &str, value: Value) -> Self {
        self.set_member(NAMESPACE_PARAM, name, value);
        self
    }

    pub fn with_variable(mut self, name: &str, value: Value) -> Self {
        self.set_member(NAMESPACE_VAR, name, value);
        self
    }

    /// Declare `var.<name>` as late-bound to the given connections
    pub fn with_late_binding_variable(mut self, name: &str, connections: Vec<String>) -> Self {
        self.late_binding_vars.insert(name.to_string(), connections);
        self
    }

    pub fn late_binding_resources(&self, name: &str) -> Option<&[String]> {
        self.late_binding_vars.get(name).map(|v| v.as_slice())
    }

    /// Whether `<namespace>.<kind>.<name>` exists, e.g. a connection of a type
    pub fn has_resource(&self, namespace: &str, kind: &str, name: Option<&str>) -> bool {
        let Some(Value::Object(by_kind)) = self.get(namespace) else {
            return false;
        };
        match (by_kind.get(kind), name) {
            (Some(Value::Object(by_name)), Some(name)) => by_name.contains_key(name),
            (Some(_), None) => true,
            _ => false,
        }
    }
}

fn object_entry<'a>(variables: &'a mut BTreeMap<String, Value>, namespace: &str) -> &'a mut Map<String, Value> {
    let entry = variables
        .entry(namespace.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    match entry {
        Value::Object(map) => map,
        _ => unreachable!("namespace entry was just made an object"),
    }
}
