//! `container` step

use super::{is_set, set, InputCollector, StepBase, StepVariant};
use crate::core::body::Attribute;
use crate::core::context::EvalContext;
use crate::core::error::{Diagnostic, Diagnostics, Result};
use crate::core::resolver::ResolutionTarget;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerStep {
    pub image: Option<String>,
    pub source: Option<String>,
    pub cmd: Option<Vec<String>>,
    pub env: Option<BTreeMap<String, String>>,
    pub entrypoint: Option<Vec<String>>,
    pub cpu_shares: Option<i64>,
    pub memory: Option<i64>,
    pub memory_reservation: Option<i64>,
    pub memory_swap: Option<i64>,
    pub memory_swappiness: Option<i64>,
    pub read_only: Option<bool>,
    pub user: Option<String>,
    pub workdir: Option<String>,
}

impl StepVariant for ContainerStep {
    fn set_attribute(&mut self, attr: &Attribute, ctx: &EvalContext, base: &mut StepBase) -> std::result::Result<bool, Diagnostics> {
        match attr.name.as_str() {
            "image" => set(&mut self.image, attr, ctx, base),
            "source" => set(&mut self.source, attr, ctx, base),
            "cmd" => set(&mut self.cmd, attr, ctx, base),
            "env" => set(&mut self.env, attr, ctx, base),
            "entrypoint" => set(&mut self.entrypoint, attr, ctx, base),
            "cpu_shares" => set(&mut self.cpu_shares, attr, ctx, base),
            "memory" => set(&mut self.memory, attr, ctx, base),
            "memory_reservation" => set(&mut self.memory_reservation, attr, ctx, base),
            "memory_swap" => set(&mut self.memory_swap, attr, ctx, base),
            "memory_swappiness" => {
                set(&mut self.memory_swappiness, attr, ctx, base)?;
                match self.memory_swappiness {
                    Some(n) if !(0..=100).contains(&n) => Err(Diagnostic::error(
                        "The value of 'memory_swappiness' attribute must be between 0 and 100",
                    )
                    .with_subject(base.subject())
                    .into()),
                    _ => Ok(true),
                }
            }
            "read_only" => set(&mut self.read_only, attr, ctx, base),
            "user" => set(&mut self.user, attr, ctx, base),
            "workdir" => set(&mut self.workdir, attr, ctx, base),
            _ => Ok(false),
        }
    }

    fn validate(&self, base: &StepBase) -> Diagnostics {
        let mut diags = Diagnostics::new();
        if is_set(base, "image", &self.image) && is_set(base, "source", &self.source) {
            diags.push(
                Diagnostic::error(format!(
                    "Image and Source attributes are mutually exclusive: {}",
                    base.full_name()
                ))
                .with_subject(base.subject()),
            );
        }
        diags
    }

    fn inputs(&self, base: &StepBase, inputs: &mut InputCollector<'_>) -> Result<()> {
        inputs.insert("name", Value::String(format!("{}.{}", base.pipeline_name, base.full_name())));
        inputs.field("image", &self.image)?;
        inputs.field("source", &self.source)?;
        inputs.field("cmd", &self.cmd)?;
        inputs.field("env", &self.env)?;
        inputs.field("entrypoint", &self.entrypoint)?;
        inputs.field("cpu_shares", &self.cpu_shares)?;
        inputs.field("memory", &self.memory)?;
        inputs.field("memory_reservation", &self.memory_reservation)?;
        inputs.field("memory_swap", &self.memory_swap)?;
        inputs.field("memory_swappiness", &self.memory_swappiness)?;
        inputs.field("read_only", &self.read_only)?;
        inputs.field("user", &self.user)?;
        inputs.field("workdir", &self.workdir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::core::context::EvalContext;
    use crate::core::step::tests::decode;
    use serde_json::json;

    #[test]
    fn test_image_and_source_are_exclusive() {
        let err = decode("type: container\nname: build\nimage: x\nsource: y").unwrap_err();
        assert!(err.contains("Image and Source attributes are mutually exclusive: container.build"));

        // Still exclusive when one side is only known at run time
        let err = decode("type: container\nname: build\nimage: \"${param.image}\"\nsource: y").unwrap_err();
        assert!(err.contains("mutually exclusive"));
    }

    #[test]
    fn test_memory_swappiness_range() {
        let err = decode("type: container\nname: build\nimage: alpine\nmemory_swappiness: 101").unwrap_err();
        assert!(err.contains("must be between 0 and 100"));
        assert!(decode("type: container\nname: build\nimage: alpine\nmemory_swappiness: 100").is_ok());
    }

    #[test]
    fn test_container_inputs() {
        let step = decode(
            r#"
type: container
name: build
image: alpine:3
cmd: [echo, "${param.greeting}"]
memory: 128
read_only: true
"#,
        )
        .unwrap();
        let ctx = EvalContext::new().with_param("greeting", json!("hi"));
        let inputs = step.get_inputs(&ctx).unwrap().inputs;
        assert_eq!(inputs["cmd"], json!(["echo", "hi"]));
        assert_eq!(inputs["memory"], json!(128));
        assert_eq!(inputs["read_only"], json!(true));
        assert_eq!(inputs["name"], json!("local.pipeline.test.container.build"));
    }
}
