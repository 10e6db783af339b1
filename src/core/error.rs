//! Error and diagnostic types

use crate::expression::{EvalError, ParseError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type for runtime resolution and loading
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while loading declarations or resolving them at run time
#[derive(Debug, Error)]
pub enum PipelineError {
    /// One or more configuration errors found while decoding
    #[error("{0}")]
    Config(Diagnostics),

    /// An attribute could not be evaluated against the run-time context
    #[error("Failed to evaluate '{attribute}': {}", join_errors(.errors))]
    Evaluation {
        attribute: String,
        errors: Vec<EvalError>,
    },

    /// A value had the wrong shape for the attribute that holds it
    #[error("Unable to parse {attribute} attribute to {expected}")]
    Conversion { attribute: String, expected: String },

    /// Malformed expression syntax
    #[error("Invalid expression: {0}")]
    Parse(#[from] ParseError),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Trigger not found: {0}")]
    TriggerNotFound(String),

    /// A schedule string that is neither an interval nor a cron expression
    #[error("Invalid schedule: {0}")]
    Schedule(String),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn join_errors(errors: &[EvalError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<Diagnostics> for PipelineError {
    fn from(diags: Diagnostics) -> Self {
        PipelineError::Config(diags)
    }
}

impl From<Diagnostic> for PipelineError {
    fn from(diag: Diagnostic) -> Self {
        PipelineError::Config(Diagnostics::from(diag))
    }
}

/// A single configuration problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub summary: String,
    pub detail: String,
    /// Where the problem is, e.g. `local.pipeline.deploy.step.http.fetch`
    pub subject: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: String::new(),
            subject: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary)?;
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        if let Some(subject) = &self.subject {
            write!(f, " ({})", subject)?;
        }
        Ok(())
    }
}

/// An ordered collection of diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.0.push(diag);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// `Ok(())` when empty, the diagnostics themselves otherwise
    pub fn into_result(self) -> std::result::Result<(), Diagnostics> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// True when any diagnostic's summary or detail contains `text`
    pub fn contains(&self, text: &str) -> bool {
        self.0
            .iter()
            .any(|d| d.summary.contains(text) || d.detail.contains(text))
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diag) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", diag)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}
