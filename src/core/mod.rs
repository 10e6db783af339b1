//! Declaration model
//!
//! Pipelines, steps, policies, triggers, integrations and notifiers, plus
//! the attribute resolver and dependency extractor they are decoded with.

pub mod body;
pub mod config;
pub mod context;
pub mod dependency;
pub mod error;
pub mod integration;
pub mod notifier;
pub mod output;
pub mod param;
pub mod pipeline;
pub mod policy;
pub mod resolver;
pub mod step;
pub mod trigger;

pub use config::PipelineConfig;
pub use context::EvalContext;
pub use dependency::{Dependencies, DependencySet};
pub use error::{Diagnostic, Diagnostics, PipelineError, Result};
pub use integration::{Integration, IntegrationType};
pub use notifier::{Notifier, Notify};
pub use output::PipelineOutput;
pub use param::{ParamType, PipelineParam};
pub use pipeline::Pipeline;
pub use resolver::{ResolutionTarget, UnresolvedAttributes};
pub use step::{PipelineStep, StepDefaults, StepInputs, StepKind, StepType};
pub use trigger::{Trigger, TriggerConfig, TriggerType};
