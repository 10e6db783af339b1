//! `http` step

use super::{is_set, require, set, InputCollector, StepBase, StepVariant};
use crate::core::body::{Attribute, Block, Body};
use crate::core::context::EvalContext;
use crate::core::error::{Diagnostic, Diagnostics, Result};
use crate::core::resolver::{evaluate_as, resolve_as, ResolutionTarget, StandaloneTarget};
use serde_json::{json, Map, Value};

pub const BLOCK_BASIC_AUTH: &str = "basic_auth";

pub const VALID_HTTP_METHODS: [&str; 5] = ["get", "post", "put", "delete", "patch"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpStep {
    pub url: Option<String>,
    pub method: Option<String>,
    pub request_body: Option<String>,
    pub request_headers: Option<Map<String, Value>>,
    pub ca_cert_pem: Option<String>,
    pub insecure: Option<bool>,
    pub basic_auth: Option<BasicAuth>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicAuth {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BasicAuth {
    /// Decode the block; attributes that cannot be resolved yet are left
    /// unset and reported through the target
    fn decode(body: &Body, ctx: &EvalContext, target: &mut StandaloneTarget) -> std::result::Result<Self, Diagnostics> {
        let mut auth = BasicAuth::default();
        let mut diags = Diagnostics::new();
        for attr in &body.attributes {
            let slot = match attr.name.as_str() {
                "username" => &mut auth.username,
                "password" => &mut auth.password,
                other => {
                    diags.push(
                        Diagnostic::error("Unsupported attribute")
                            .with_detail(format!("Unsupported attribute '{}' in basic_auth block", other))
                            .with_subject(target.subject()),
                    );
                    continue;
                }
            };
            match resolve_as(attr, ctx, target, false) {
                Ok(value) => *slot = value,
                Err(e) => diags.extend(e),
            }
        }
        diags.into_result().map(|_| auth)
    }

    fn resolve(body: &Body, ctx: &EvalContext) -> Result<Self> {
        let mut auth = BasicAuth::default();
        if let Some(attr) = body.attribute("username") {
            auth.username = evaluate_as("username", &attr.expr, ctx)?;
        }
        if let Some(attr) = body.attribute("password") {
            auth.password = evaluate_as("password", &attr.expr, ctx)?;
        }
        Ok(auth)
    }

    fn to_value(&self) -> Value {
        json!({ "username": self.username, "password": self.password })
    }
}

impl StepVariant for HttpStep {
    fn set_attribute(&mut self, attr: &Attribute, ctx: &EvalContext, base: &mut StepBase) -> std::result::Result<bool, Diagnostics> {
        match attr.name.as_str() {
            "url" => set(&mut self.url, attr, ctx, base),
            "method" => {
                set(&mut self.method, attr, ctx, base)?;
                if let Some(method) = &self.method {
                    if !VALID_HTTP_METHODS.contains(&method.to_lowercase().as_str()) {
                        return Err(Diagnostic::error(format!("Invalid HTTP method: {}", method))
                            .with_subject(base.subject())
                            .into());
                    }
                }
                Ok(true)
            }
            "request_body" => set(&mut self.request_body, attr, ctx, base),
            "request_headers" => set(&mut self.request_headers, attr, ctx, base),
            "ca_cert_pem" => set(&mut self.ca_cert_pem, attr, ctx, base),
            "insecure" => set(&mut self.insecure, attr, ctx, base),
            _ => Ok(false),
        }
    }

    fn validate(&self, base: &StepBase) -> Diagnostics {
        require(base, &[("url", is_set(base, "url", &self.url))])
    }

    fn set_block(&mut self, block: &Block, ctx: &EvalContext, base: &mut StepBase) -> Option<std::result::Result<(), Diagnostics>> {
        if block.kind != BLOCK_BASIC_AUTH {
            return None;
        }
        if self.basic_auth.is_some() || base.unresolved_bodies.contains_key(BLOCK_BASIC_AUTH) {
            return Some(Err(Diagnostic::error(format!(
                "Multiple basic_auth blocks found for step {}",
                base.step_type
            ))
            .with_subject(base.subject())
            .into()));
        }

        let mut target = StandaloneTarget::new(base.subject());
        let auth = match BasicAuth::decode(&block.body, ctx, &mut target) {
            Ok(auth) => auth,
            Err(e) => return Some(Err(e)),
        };
        base.append_depends_on(target.dependencies.depends_on.as_slice());
        base.append_credential_depends_on(target.dependencies.credential_depends_on.as_slice());
        base.append_connection_depends_on(target.dependencies.connection_depends_on.as_slice());

        if target.unresolved_attributes.is_empty() {
            self.basic_auth = Some(auth);
        } else {
            base.unresolved_bodies.insert(BLOCK_BASIC_AUTH.to_string(), block.body.clone());
        }
        Some(Ok(()))
    }

    fn inputs(&self, base: &StepBase, inputs: &mut InputCollector<'_>) -> Result<()> {
        inputs.field("url", &self.url)?;
        inputs.field("method", &self.method)?;
        inputs.field("ca_cert_pem", &self.ca_cert_pem)?;
        inputs.field("insecure", &self.insecure)?;
        inputs.field("request_body", &self.request_body)?;
        inputs.field("request_headers", &self.request_headers)?;

        let auth = match base.unresolved_bodies.get(BLOCK_BASIC_AUTH) {
            Some(body) => Some(BasicAuth::resolve(body, inputs.context())?),
            None => self.basic_auth.clone(),
        };
        if let Some(auth) = auth {
            inputs.insert(BLOCK_BASIC_AUTH, auth.to_value());
        }
        inputs.insert("step_name", Value::String(base.name.clone()));
        Ok(())
    }
}
