//! Per-step runtime policies: retry, error, throw and loop blocks
//!
//! Each policy keeps its own unresolved attributes but records dependencies
//! on the step that owns it. Resolution at run time always returns a fresh
//! value and never touches the stored template.

pub mod loop_defn;
pub mod on_error;
pub mod retry;
pub mod throw;

pub use loop_defn::{LoopDefn, LoopValue};
pub use on_error::ErrorConfig;
pub use retry::{ResolvedRetry, RetryConfig, RetryStrategy};
pub use throw::ThrowConfig;

use crate::core::dependency::{dependencies_from_expr, Dependencies};
use crate::core::resolver::{ResolutionTarget, UnresolvedAttributes};
use crate::expression::Expr;

pub const BLOCK_LOOP: &str = "loop";
pub const BLOCK_RETRY: &str = "retry";
pub const BLOCK_ERROR: &str = "error";
pub const BLOCK_THROW: &str = "throw";

pub const ATTRIBUTE_IF: &str = "if";

/// Resolution target for a block nested in a step
///
/// Step dependencies go to the parent; credential and connection
/// dependencies are not tracked for policy blocks.
pub struct PolicyTarget<'a> {
    subject: String,
    unresolved: UnresolvedAttributes,
    parent: &'a mut Dependencies,
}

impl<'a> PolicyTarget<'a> {
    pub fn new(subject: impl Into<String>, parent: &'a mut Dependencies) -> Self {
        Self {
            subject: subject.into(),
            unresolved: UnresolvedAttributes::new(),
            parent,
        }
    }

    /// Record an `if` gate; it is never evaluated at decode time
    pub fn add_condition(&mut self, expr: &Expr) {
        let deps = dependencies_from_expr(expr);
        self.parent.depends_on.append(&deps.steps);
        self.unresolved.insert(ATTRIBUTE_IF.to_string(), expr.clone());
    }

    pub fn has_unresolved(&self, name: &str) -> bool {
        self.unresolved.contains_key(name)
    }

    pub fn into_unresolved(self) -> UnresolvedAttributes {
        self.unresolved
    }
}

impl ResolutionTarget for PolicyTarget<'_> {
    fn append_depends_on(&mut self, names: &[String]) {
        self.parent.depends_on.append(names);
    }

    fn append_credential_depends_on(&mut self, _names: &[String]) {}

    fn append_connection_depends_on(&mut self, _names: &[String]) {}

    fn add_unresolved_attribute(&mut self, name: &str, expr: &Expr) {
        self.unresolved.insert(name.to_string(), expr.clone());
    }

    fn subject(&self) -> String {
        self.subject.clone()
    }
}
