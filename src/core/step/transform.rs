//! `transform` step

use super::{set, InputCollector, StepBase, StepVariant};
use crate::core::body::Attribute;
use crate::core::context::EvalContext;
use crate::core::error::{Diagnostics, Result};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformStep {
    pub value: Option<Value>,
}

impl StepVariant for TransformStep {
    fn set_attribute(&mut self, attr: &Attribute, ctx: &EvalContext, base: &mut StepBase) -> std::result::Result<bool, Diagnostics> {
        match attr.name.as_str() {
            "value" => set(&mut self.value, attr, ctx, base),
            _ => Ok(false),
        }
    }

    fn inputs(&self, _base: &StepBase, inputs: &mut InputCollector<'_>) -> Result<()> {
        inputs.field("value", &self.value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::core::context::EvalContext;
    use crate::core::step::tests::decode;
    use serde_json::json;

    #[test]
    fn test_static_value_of_any_type() {
        let step = decode("type: transform\nname: t\nvalue: {a: [1, 2]}").unwrap();
        assert!(step.base.unresolved_attributes.is_empty());
        let inputs = step.get_inputs(&EvalContext::new()).unwrap().inputs;
        assert_eq!(inputs["value"], json!({"a": [1, 2]}));
    }

    #[test]
    fn test_value_from_previous_step() {
        let step = decode(
            r#"
type: transform
name: t
value: "${length(step.http.list.items) * 2}"
"#,
        )
        .unwrap();
        let ctx = EvalContext::new().with_step_output("http", "list", json!({"items": [1, 2, 3]}));
        assert_eq!(step.get_inputs(&ctx).unwrap().inputs["value"], json!(6));
    }
}
