//! flowdef - declarative pipeline definitions with deferred attribute resolution

pub mod cli;
pub mod core;
pub mod expression;

// Re-export commonly used types
pub use core::{EvalContext, Pipeline, PipelineConfig, PipelineError, PipelineStep, Trigger};
pub use expression::{parse_expression, Expr};
