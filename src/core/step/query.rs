//! `query` step

use super::{is_set, require, set, InputCollector, StepBase, StepVariant};
use crate::core::body::Attribute;
use crate::core::context::EvalContext;
use crate::core::error::{Diagnostic, Diagnostics, PipelineError, Result};
use crate::core::resolver::{resolve_or_defer, ResolutionTarget};
use serde_json::Value;

pub const ATTRIBUTE_DATABASE: &str = "database";
pub const ATTRIBUTE_SQL: &str = "sql";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryStep {
    pub database: Option<String>,
    pub sql: Option<String>,
    pub args: Option<Vec<Value>>,
    /// Connection string of the declaration file, used when `database` is unset
    pub default_database: Option<String>,
}

impl QueryStep {
    pub fn new(default_database: Option<String>) -> Self {
        Self {
            default_database,
            ..Default::default()
        }
    }
}

/// A database is a connection string or a connection carrying one
fn connection_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("connection_string").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

impl StepVariant for QueryStep {
    fn set_attribute(&mut self, attr: &Attribute, ctx: &EvalContext, base: &mut StepBase) -> std::result::Result<bool, Diagnostics> {
        match attr.name.as_str() {
            ATTRIBUTE_DATABASE => {
                if let Some(value) = resolve_or_defer(attr, ctx, base, false)? {
                    match connection_string(&value) {
                        Some(database) => self.database = Some(database),
                        None => {
                            return Err(Diagnostic::error("Unable to parse 'database' attribute to string")
                                .with_detail("database must be a connection string or a connection")
                                .with_subject(base.subject())
                                .into())
                        }
                    }
                }
                Ok(true)
            }
            ATTRIBUTE_SQL => set(&mut self.sql, attr, ctx, base),
            "args" => set(&mut self.args, attr, ctx, base),
            _ => Ok(false),
        }
    }

    fn validate(&self, base: &StepBase) -> Diagnostics {
        let mut diags = require(base, &[(ATTRIBUTE_SQL, is_set(base, ATTRIBUTE_SQL, &self.sql))]);
        if !is_set(base, ATTRIBUTE_DATABASE, &self.database) && self.default_database.is_none() {
            diags.push(
                Diagnostic::error("Missing required attribute")
                    .with_detail(format!("{}: database must be supplied", base.full_name()))
                    .with_subject(base.subject()),
            );
        }
        diags
    }

    fn inputs(&self, base: &StepBase, inputs: &mut InputCollector<'_>) -> Result<()> {
        let database = match inputs.raw(ATTRIBUTE_DATABASE)? {
            Some(value) => Some(connection_string(&value).ok_or_else(|| PipelineError::Conversion {
                attribute: ATTRIBUTE_DATABASE.to_string(),
                expected: "string".to_string(),
            })?),
            None => self.database.clone(),
        };

        match database.or_else(|| self.default_database.clone()) {
            Some(database) => inputs.insert(ATTRIBUTE_DATABASE, Value::String(database)),
            // The connection will be supplied once it can be resolved
            None if inputs.is_waiting() => {}
            None => {
                return Err(Diagnostic::error(format!("{}: database must be supplied", base.full_name()))
                    .with_subject(base.subject())
                    .into())
            }
        }

        inputs.field(ATTRIBUTE_SQL, &self.sql)?;
        inputs.field("args", &self.args)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::core::context::EvalContext;
    use crate::core::step::tests::decode_with;
    use crate::core::step::{PipelineStep, StepDefaults};
    use serde_json::json;

    #[test]
    fn test_database_from_connection() {
        let ctx = EvalContext::new().with_namespace(
            "connection",
            json!({"postgres": {"prod": {"connection_string": "postgres://prod"}}}),
        );
        let step = decode_with(
            r#"
type: query
name: rows
database: "${connection.postgres.prod}"
sql: select * from users where id = $1
args: [7]
"#,
            &ctx,
        )
        .unwrap();
        let inputs = step.get_inputs(&ctx).unwrap().inputs;
        assert_eq!(inputs["database"], json!("postgres://prod"));
        assert_eq!(inputs["args"], json!([7]));
    }

    #[test]
    fn test_database_must_be_supplied() {
        let err = decode_with("type: query\nname: rows\nsql: select 1", &EvalContext::new()).unwrap_err();
        assert!(err.contains("query.rows: database must be supplied"));
    }

    #[test]
    fn test_default_database() {
        let map: serde_yaml::Mapping = serde_yaml::from_str("type: query\nname: rows\nsql: select 1").unwrap();
        let defaults = StepDefaults {
            default_connection_string: Some("sqlite:///tmp/db".to_string()),
        };
        let step = PipelineStep::decode(&map, &EvalContext::new(), "local.pipeline.test", &defaults).unwrap();
        let inputs = step.get_inputs(&EvalContext::new()).unwrap().inputs;
        assert_eq!(inputs["database"], json!("sqlite:///tmp/db"));
    }
}
