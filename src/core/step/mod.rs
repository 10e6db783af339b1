//! Pipeline steps
//!
//! A step is a [`StepBase`] holding everything shared by all step types
//! (dependencies, policies, outputs) plus a [`StepKind`] for the attributes
//! of its type. Decoding resolves what it can and records the rest for
//! [`PipelineStep::get_inputs`], which re-evaluates against the run-time
//! context without touching the step itself.

pub mod base;
pub mod container;
pub mod email;
pub mod function;
pub mod http;
pub mod input;
pub mod message;
pub mod pipeline;
pub mod query;
pub mod sleep;
pub mod transform;

pub use base::StepBase;
pub use container::ContainerStep;
pub use email::EmailStep;
pub use function::FunctionStep;
pub use http::{BasicAuth, HttpStep};
pub use input::{InputOption, InputStep, InputType};
pub use message::MessageStep;
pub use pipeline::{PipelineRef, PipelineStepCall};
pub use query::QueryStep;
pub use sleep::SleepStep;
pub use transform::TransformStep;

use crate::core::body::{body_from_mapping, Attribute, Block, BlockShape, BlockSpec};
use crate::core::context::EvalContext;
use crate::core::dependency::{guess_required_connections, ConnectionDependency};
use crate::core::error::{Diagnostic, Diagnostics, PipelineError, Result};
use crate::core::output::PipelineOutput;
use crate::core::policy::{
    ErrorConfig, LoopDefn, RetryConfig, ThrowConfig, BLOCK_ERROR, BLOCK_LOOP, BLOCK_RETRY, BLOCK_THROW,
};
use crate::core::resolver::{resolve_as, AttributeValue, ResolutionTarget, UnresolvedAttributes};
use crate::expression::EvalError;
use serde::Serialize;
use serde_json::{Map, Value};
use serde_yaml::Mapping;
use std::fmt;
use tracing::debug;

pub const BLOCK_OUTPUT: &str = "output";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Http,
    Sleep,
    Email,
    Transform,
    Query,
    Pipeline,
    Function,
    Container,
    Input,
    Message,
}

impl StepType {
    pub const ALL: [StepType; 10] = [
        StepType::Http,
        StepType::Sleep,
        StepType::Email,
        StepType::Transform,
        StepType::Query,
        StepType::Pipeline,
        StepType::Function,
        StepType::Container,
        StepType::Input,
        StepType::Message,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Http => "http",
            StepType::Sleep => "sleep",
            StepType::Email => "email",
            StepType::Transform => "transform",
            StepType::Query => "query",
            StepType::Pipeline => "pipeline",
            StepType::Function => "function",
            StepType::Container => "container",
            StepType::Input => "input",
            StepType::Message => "message",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Nested blocks allowed inside a step of this type
    pub fn block_specs(&self) -> Vec<BlockSpec> {
        let mut specs = vec![
            BlockSpec::new(BLOCK_LOOP, BlockShape::Single),
            BlockSpec::new(BLOCK_RETRY, BlockShape::Single),
            BlockSpec::new(BLOCK_ERROR, BlockShape::Single),
            BlockSpec::new(BLOCK_THROW, BlockShape::List),
            BlockSpec::new(BLOCK_OUTPUT, BlockShape::Labelled),
        ];
        match self {
            StepType::Http => specs.push(BlockSpec::new(http::BLOCK_BASIC_AUTH, BlockShape::Single)),
            StepType::Input => specs.push(BlockSpec::new(input::BLOCK_OPTION, BlockShape::Labelled)),
            _ => {}
        }
        specs
    }

    fn unsupported_attribute(&self, name: &str) -> String {
        match self {
            StepType::Http => format!("Unsupported attribute for HTTP Step: {}", name),
            StepType::Query => format!("Unsupported attribute for Query Step '{}'", name),
            StepType::Sleep => format!("Unsupported attribute for sleep Step: {}", name),
            other => {
                let label = other.as_str();
                let mut chars = label.chars();
                let label = match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                };
                format!("Unsupported attribute for {} Step: {}", label, name)
            }
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Values a step inherits from the declaration file rather than declaring itself
#[derive(Debug, Clone, Default)]
pub struct StepDefaults {
    /// Used by query steps that do not set `database`
    pub default_connection_string: Option<String>,
}

/// Type-specific part of a step
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Http(HttpStep),
    Sleep(SleepStep),
    Email(EmailStep),
    Transform(TransformStep),
    Query(QueryStep),
    Pipeline(PipelineStepCall),
    Function(FunctionStep),
    Container(ContainerStep),
    Input(InputStep),
    Message(MessageStep),
}

/// What each step type provides on top of [`StepBase`]
pub trait StepVariant {
    /// Decode a type-specific attribute; `Ok(false)` if the name is not one
    fn set_attribute(&mut self, attr: &Attribute, ctx: &EvalContext, base: &mut StepBase) -> std::result::Result<bool, Diagnostics>;

    /// Decode a type-specific nested block; `None` if the kind is not one
    fn set_block(
        &mut self,
        _block: &Block,
        _ctx: &EvalContext,
        _base: &mut StepBase,
    ) -> Option<std::result::Result<(), Diagnostics>> {
        None
    }

    fn validate(&self, _base: &StepBase) -> Diagnostics {
        Diagnostics::new()
    }

    /// Add this type's inputs for one execution attempt
    fn inputs(&self, base: &StepBase, inputs: &mut InputCollector<'_>) -> Result<()>;
}

impl StepKind {
    fn new(step_type: StepType, defaults: &StepDefaults) -> Self {
        match step_type {
            StepType::Http => StepKind::Http(HttpStep::default()),
            StepType::Sleep => StepKind::Sleep(SleepStep::default()),
            StepType::Email => StepKind::Email(EmailStep::default()),
            StepType::Transform => StepKind::Transform(TransformStep::default()),
            StepType::Query => StepKind::Query(QueryStep::new(defaults.default_connection_string.clone())),
            StepType::Pipeline => StepKind::Pipeline(PipelineStepCall::default()),
            StepType::Function => StepKind::Function(FunctionStep::default()),
            StepType::Container => StepKind::Container(ContainerStep::default()),
            StepType::Input => StepKind::Input(InputStep::default()),
            StepType::Message => StepKind::Message(MessageStep::default()),
        }
    }

    fn variant(&self) -> &dyn StepVariant {
        match self {
            StepKind::Http(s) => s,
            StepKind::Sleep(s) => s,
            StepKind::Email(s) => s,
            StepKind::Transform(s) => s,
            StepKind::Query(s) => s,
            StepKind::Pipeline(s) => s,
            StepKind::Function(s) => s,
            StepKind::Container(s) => s,
            StepKind::Input(s) => s,
            StepKind::Message(s) => s,
        }
    }

    fn variant_mut(&mut self) -> &mut dyn StepVariant {
        match self {
            StepKind::Http(s) => s,
            StepKind::Sleep(s) => s,
            StepKind::Email(s) => s,
            StepKind::Transform(s) => s,
            StepKind::Query(s) => s,
            StepKind::Pipeline(s) => s,
            StepKind::Function(s) => s,
            StepKind::Container(s) => s,
            StepKind::Input(s) => s,
            StepKind::Message(s) => s,
        }
    }
}

/// A step as declared in a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStep {
    pub base: StepBase,
    pub kind: StepKind,
}

/// Inputs of one execution attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepInputs {
    pub inputs: Map<String, Value>,
    /// Connections that could not be resolved yet; the caller decides
    /// whether to wait for them, prompt for them or fail
    pub connection_dependencies: Vec<ConnectionDependency>,
}

impl PipelineStep {
    /// Create an empty step of the given type
    pub fn new(step_type: StepType, name: &str, pipeline_name: &str, defaults: &StepDefaults) -> Self {
        Self {
            base: StepBase::new(step_type, name, pipeline_name),
            kind: StepKind::new(step_type, defaults),
        }
    }

    /// Decode a step mapping (`type`, `name`, attributes and blocks)
    pub fn decode(
        map: &Mapping,
        ctx: &EvalContext,
        pipeline_name: &str,
        defaults: &StepDefaults,
    ) -> std::result::Result<Self, Diagnostics> {
        let label = |key: &str| map.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let subject = format!("{}.step", pipeline_name);

        let Some(type_name) = label("type") else {
            return Err(Diagnostic::error("Missing step type")
                .with_detail("Every step needs a 'type'")
                .with_subject(subject)
                .into());
        };
        let Some(step_type) = StepType::parse(&type_name) else {
            return Err(Diagnostic::error("Invalid step type")
                .with_detail(format!("Unsupported step type '{}'", type_name))
                .with_subject(subject)
                .into());
        };
        let Some(name) = label("name") else {
            return Err(Diagnostic::error("Missing step name")
                .with_detail(format!("A {} step has no 'name'", step_type))
                .with_subject(subject)
                .into());
        };

        let mut step = PipelineStep::new(step_type, &name, pipeline_name, defaults);
        let subject = step.subject();
        let body = body_from_mapping(map, &step_type.block_specs(), &["type", "name"], &subject)?;

        let mut diags = step.set_attributes(&body.attributes, ctx);
        diags.extend(step.set_block_config(&body.blocks, ctx));
        if diags.is_empty() {
            diags.extend(step.validate());
        }
        diags.into_result().map(|_| step)
    }

    pub fn step_type(&self) -> StepType {
        self.base.step_type
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    /// `<type>.<name>`
    pub fn full_name(&self) -> String {
        self.base.full_name()
    }

    fn subject(&self) -> String {
        self.base.subject()
    }

    pub fn set_attributes(&mut self, attributes: &[Attribute], ctx: &EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let PipelineStep { base, kind } = self;

        for attr in attributes {
            match base.set_base_attribute(attr, ctx) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    diags.extend(e);
                    continue;
                }
            }
            match kind.variant_mut().set_attribute(attr, ctx, base) {
                Ok(true) => {}
                Ok(false) => diags.push(
                    Diagnostic::error(base.step_type.unsupported_attribute(&attr.name))
                        .with_subject(base.subject()),
                ),
                Err(e) => diags.extend(e),
            }
        }
        diags
    }

    /// Decode loop, retry, error, throw and output blocks plus the
    /// type-specific ones
    pub fn set_block_config(&mut self, blocks: &[Block], ctx: &EvalContext) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let subject = self.subject();
        let PipelineStep { base, kind } = self;

        let only_one = |kind: &str, seen: bool, diags: &mut Diagnostics| {
            if seen {
                diags.push(
                    Diagnostic::error(format!("Only one {} block is allowed per step", kind)).with_subject(subject.clone()),
                );
            }
            seen
        };

        for block in blocks {
            match block.kind.as_str() {
                BLOCK_LOOP => {
                    if only_one(BLOCK_LOOP, base.loop_defn.is_some(), &mut diags) {
                        continue;
                    }
                    match LoopDefn::decode(base.step_type, &block.body, ctx, &mut base.dependencies, &subject) {
                        Ok(defn) => base.loop_defn = Some(defn),
                        Err(e) => diags.extend(e),
                    }
                }
                BLOCK_RETRY => {
                    if only_one(BLOCK_RETRY, base.retry.is_some(), &mut diags) {
                        continue;
                    }
                    match RetryConfig::decode(&block.body, ctx, &mut base.dependencies, &subject) {
                        Ok(retry) => base.retry = Some(retry),
                        Err(e) => diags.extend(e),
                    }
                }
                BLOCK_ERROR => {
                    if only_one(BLOCK_ERROR, base.error_config.is_some(), &mut diags) {
                        continue;
                    }
                    match ErrorConfig::decode(&block.body, ctx, &mut base.dependencies, &subject) {
                        Ok(config) => base.error_config = Some(config),
                        Err(e) => diags.extend(e),
                    }
                }
                BLOCK_THROW => match ThrowConfig::decode(&block.body, ctx, &mut base.dependencies, &subject) {
                    Ok(throw) => base.throws.push(throw),
                    Err(e) => diags.extend(e),
                },
                BLOCK_OUTPUT => match PipelineOutput::decode_step_output(block, &mut base.dependencies, &subject) {
                    Ok(output) => base.outputs.push(output),
                    Err(e) => diags.extend(e),
                },
                other => match kind.variant_mut().set_block(block, ctx, base) {
                    Some(Ok(())) => {}
                    Some(Err(e)) => diags.extend(e),
                    None => diags.push(
                        Diagnostic::error("Unsupported block type")
                            .with_detail(format!("Block '{}' is not supported for {} steps", other, base.step_type))
                            .with_subject(subject.clone()),
                    ),
                },
            }
        }
        diags
    }

    pub fn validate(&self) -> Diagnostics {
        self.kind.variant().validate(&self.base)
    }

    /// Resolve every input of the step against the run-time context.
    ///
    /// Never mutates the step. A connection that cannot be resolved yet is
    /// reported in [`StepInputs::connection_dependencies`] instead of failing.
    pub fn get_inputs(&self, ctx: &EvalContext) -> Result<StepInputs> {
        let mut inputs = InputCollector::new(&self.base.unresolved_attributes, ctx);
        inputs.field(base::ATTRIBUTE_TIMEOUT, &self.base.timeout)?;
        self.kind.variant().inputs(&self.base, &mut inputs)?;
        Ok(inputs.finish())
    }

    pub fn max_concurrency(&self, ctx: &EvalContext) -> Option<i64> {
        self.base.max_concurrency(ctx)
    }

    /// Retry policy for this attempt; `None` without a retry block or when its `if` is false
    ///
    /// With `if_resolution` off the declared template comes back as is, with
    /// its expressions still unresolved.
    pub fn retry_config(&self, ctx: &EvalContext, if_resolution: bool) -> Result<Option<RetryConfig>> {
        match &self.base.retry {
            Some(retry) if !if_resolution => Ok(Some(retry.clone())),
            Some(retry) => retry.resolve(ctx, &self.subject()),
            None => Ok(None),
        }
    }

    pub fn error_config(&self, ctx: &EvalContext) -> Result<Option<ErrorConfig>> {
        match &self.base.error_config {
            Some(config) => config.resolve(ctx),
            None => Ok(None),
        }
    }

    /// Throws in declaration order
    pub fn throw_configs(&self) -> &[ThrowConfig] {
        &self.base.throws
    }

    /// Resolve throws in order and stop at the first that fires
    pub fn first_throw(&self, ctx: &EvalContext) -> Result<Option<ThrowConfig>> {
        for throw in &self.base.throws {
            let resolved = throw.resolve(ctx)?;
            if resolved.fires() {
                return Ok(Some(resolved));
            }
        }
        Ok(None)
    }

    pub fn loop_config(&self) -> Option<&LoopDefn> {
        self.base.loop_defn.as_ref()
    }
}

/// Accumulates the inputs of one execution attempt
pub struct InputCollector<'a> {
    unresolved: &'a UnresolvedAttributes,
    ctx: &'a EvalContext,
    out: StepInputs,
}

impl<'a> InputCollector<'a> {
    pub fn new(unresolved: &'a UnresolvedAttributes, ctx: &'a EvalContext) -> Self {
        Self {
            unresolved,
            ctx,
            out: StepInputs::default(),
        }
    }

    pub fn context(&self) -> &EvalContext {
        self.ctx
    }

    /// Add an attribute from its static value or its unresolved expression.
    ///
    /// Returns the value that was added, if any.
    pub fn field<T: AttributeValue>(&mut self, name: &str, field: &Option<T>) -> Result<Option<Value>> {
        let value = match self.evaluate(name)? {
            Evaluated::Deferred => None,
            Evaluated::Missing => field.as_ref().map(AttributeValue::to_value),
            Evaluated::Value(Value::Null) => None,
            Evaluated::Value(value) => {
                let converted = T::from_value(&value).map_err(|_| PipelineError::Conversion {
                    attribute: name.to_string(),
                    expected: T::EXPECTED.to_string(),
                })?;
                Some(converted.to_value())
            }
        };
        if let Some(value) = &value {
            self.out.inputs.insert(name.to_string(), value.clone());
        }
        Ok(value)
    }

    /// Evaluate an unresolved attribute without adding it
    pub fn raw(&mut self, name: &str) -> Result<Option<Value>> {
        Ok(match self.evaluate(name)? {
            Evaluated::Value(value) if !value.is_null() => Some(value),
            _ => None,
        })
    }

    fn evaluate(&mut self, name: &str) -> Result<Evaluated> {
        let Some(expr) = self.unresolved.get(name) else {
            return Ok(Evaluated::Missing);
        };
        let errors = match expr.evaluate(self.ctx) {
            Ok(value) => return Ok(Evaluated::Value(value)),
            Err(errors) => errors,
        };

        let waiting_on_connection = errors
            .iter()
            .all(|e| e.is_connection_reference() || matches!(e, EvalError::LateBinding { .. }));
        if !waiting_on_connection {
            return Err(PipelineError::Evaluation {
                attribute: name.to_string(),
                errors,
            });
        }

        let mut needed = guess_required_connections(expr);
        for error in &errors {
            if let EvalError::LateBinding { resources, .. } = error {
                needed.extend(resources.iter().filter_map(|r| {
                    let (connection_type, source) = r.split_once('.')?;
                    Some(ConnectionDependency {
                        source: source.to_string(),
                        connection_type: connection_type.to_string(),
                    })
                }));
            }
        }
        debug!(attribute = name, connections = ?needed, "attribute is waiting on connections");
        for dep in needed {
            if !self.out.connection_dependencies.contains(&dep) {
                self.out.connection_dependencies.push(dep);
            }
        }
        Ok(Evaluated::Deferred)
    }

    /// True once any attribute turned out to be waiting on a connection
    pub fn is_waiting(&self) -> bool {
        !self.out.connection_dependencies.is_empty()
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.out.inputs.insert(name.to_string(), value);
    }

    pub fn finish(self) -> StepInputs {
        self.out
    }
}

enum Evaluated {
    Missing,
    Deferred,
    Value(Value),
}

/// Resolve a typed attribute into its slot
pub(crate) fn set<T: AttributeValue>(
    slot: &mut Option<T>,
    attr: &Attribute,
    ctx: &EvalContext,
    base: &mut StepBase,
) -> std::result::Result<bool, Diagnostics> {
    *slot = resolve_as(attr, ctx, base, false)?;
    Ok(true)
}

/// Whether an attribute is set, statically or as an expression
pub(crate) fn is_set<T>(base: &StepBase, name: &str, field: &Option<T>) -> bool {
    field.is_some() || base.unresolved_attributes.contains_key(name)
}

/// One `Missing required attribute` error for each `(name, is_set)` pair that is unset
pub(crate) fn require(base: &StepBase, attributes: &[(&str, bool)]) -> Diagnostics {
    let mut diags = Diagnostics::new();
    for (name, _) in attributes.iter().filter(|(_, set)| !set) {
        diags.push(
            Diagnostic::error("Missing required attribute")
                .with_detail(format!("The attribute '{}' is required: {}", name, base.full_name()))
                .with_subject(base.subject()),
        );
    }
    diags
}
