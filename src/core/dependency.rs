//! Dependency extraction
//!
//! Classifies the free variable traversals of an expression into step,
//! credential and connection dependency edges.

use crate::core::context::{NAMESPACE_CONNECTION, NAMESPACE_CREDENTIAL, NAMESPACE_STEP};
use crate::expression::{Expr, Traversal};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Name segment used when a credential or connection is picked by a dynamic index
pub const DYNAMIC_NAME: &str = "<dynamic>";

/// A set of qualified names that keeps insertion order
///
/// Appending is idempotent. Equality ignores order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencySet(Vec<String>);

impl DependencySet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add names not already present; returns how many were new
    pub fn append<I, S>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for name in names {
            let name = name.as_ref();
            if !self.contains(name) {
                self.0.push(name.to_string());
                added += 1;
            }
        }
        added
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl PartialEq for DependencySet {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().all(|n| other.contains(n))
    }
}

impl<S: AsRef<str>> FromIterator<S> for DependencySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = DependencySet::new();
        set.append(iter);
        set
    }
}

/// The three dependency sets every step, output and policy feeds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependencies {
    pub depends_on: DependencySet,
    pub credential_depends_on: DependencySet,
    pub connection_depends_on: DependencySet,
}

/// Dependencies extracted from a set of traversals
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedDependencies {
    pub steps: Vec<String>,
    pub credentials: Vec<String>,
    pub connections: Vec<String>,
}

impl ExtractedDependencies {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.credentials.is_empty() && self.connections.is_empty()
    }
}

/// Classify traversals into step, credential and connection edges.
///
/// * `step.<type>.<name>...` gives `<type>.<name>`; shorter traversals are dropped
/// * `credential.<type>` (picked by a dynamic index) gives `<type>.<dynamic>`
/// * `credential.<type>.<name>...` gives `<type>.<name>`
///
/// `connection` follows the `credential` rules.
pub fn dependencies_from_traversals(traversals: &[Traversal]) -> ExtractedDependencies {
    let mut out = ExtractedDependencies::default();

    for traversal in traversals {
        let parts = traversal.parts();
        match traversal.root.as_str() {
            NAMESPACE_STEP => {
                if parts.len() < 3 {
                    continue;
                }
                push_unique(&mut out.steps, format!("{}.{}", parts[1], parts[2]));
            }
            NAMESPACE_CREDENTIAL | NAMESPACE_CONNECTION => {
                let name = match parts.len() {
                    0 | 1 => continue,
                    2 => format!("{}.{}", parts[1], DYNAMIC_NAME),
                    _ => format!("{}.{}", parts[1], parts[2]),
                };
                let target = if traversal.root == NAMESPACE_CREDENTIAL {
                    &mut out.credentials
                } else {
                    &mut out.connections
                };
                push_unique(target, name);
            }
            _ => {}
        }
    }

    trace!(
        steps = ?out.steps,
        credentials = ?out.credentials,
        connections = ?out.connections,
        "extracted dependencies"
    );
    out
}

/// Shorthand for `dependencies_from_traversals(&expr.variables())`
pub fn dependencies_from_expr(expr: &Expr) -> ExtractedDependencies {
    dependencies_from_traversals(&expr.variables())
}

fn push_unique(list: &mut Vec<String>, name: String) {
    if !list.contains(&name) {
        list.push(name);
    }
}

/// A connection an attribute needs before it can be evaluated
///
/// `source` is the connection name when it is written literally, or the text
/// of the key expression when the connection is picked dynamically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDependency {
    pub source: String,
    #[serde(rename = "type")]
    pub connection_type: String,
}

/// Work out which connections an unevaluable expression is waiting for
///
/// `connection.aws.prod` names its source directly. For
/// `connection.aws[step.transform.pick.value]` the source is the text of the
/// key expression.
pub fn guess_required_connections(expr: &Expr) -> Vec<ConnectionDependency> {
    let mut out = Vec::new();
    for traversal in expr.variables() {
        if traversal.root != NAMESPACE_CONNECTION && traversal.root != NAMESPACE_CREDENTIAL {
            continue;
        }
        let parts = traversal.parts();
        if parts.len() < 2 {
            continue;
        }
        let source = match (parts.get(2), &traversal.dynamic_key) {
            (Some(name), _) => name.clone(),
            (None, Some(key)) => key.clone(),
            (None, None) => String::new(),
        };
        let dependency = ConnectionDependency {
            connection_type: parts[1].clone(),
            source,
        };
        if !out.contains(&dependency) {
            out.push(dependency);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{parse_expression, parse_value_string};

    fn extract(source: &str) -> ExtractedDependencies {
        dependencies_from_expr(&parse_value_string(source).unwrap())
    }

    #[test]
    fn test_step_dependency() {
        let deps = extract("${step.http.a.body}");
        assert_eq!(deps.steps, vec!["http.a"]);
        assert!(deps.credentials.is_empty());
        assert!(deps.connections.is_empty());
    }

    #[test]
    fn test_short_step_traversal_dropped() {
        assert!(extract("${step.http}").steps.is_empty());
    }

    #[test]
    fn test_literal_index_traversal() {
        let deps = extract("${step.sleep.sleep_1[0].duration}");
        assert_eq!(deps.steps, vec!["sleep.sleep_1"]);
    }

    #[test]
    fn test_credential_and_connection_dependencies() {
        let deps = extract("${credential.aws.default.access_key} ${connection.slack[each.value].token}");
        assert_eq!(deps.credentials, vec!["aws.default"]);
        assert_eq!(deps.connections, vec!["slack.<dynamic>"]);
    }

    #[test]
    fn test_duplicates_collapsed() {
        let deps = extract("${step.http.a.body} ${step.http.a.status_code}");
        assert_eq!(deps.steps, vec!["http.a"]);
    }

    #[test]
    fn test_dependency_set_equality_ignores_order() {
        let a: DependencySet = ["http.a", "sleep.b"].into_iter().collect();
        let b: DependencySet = ["sleep.b", "http.a"].into_iter().collect();
        let c: DependencySet = ["sleep.b", "http.c"].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_append_is_idempotent() {
        let mut set = DependencySet::new();
        assert_eq!(set.append(["http.a", "http.a"]), 1);
        assert_eq!(set.append(["http.a"]), 0);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_guess_connections() {
        let expr = parse_expression("connection.aws[step.transform.source.value]").unwrap();
        assert_eq!(
            guess_required_connections(&expr),
            vec![ConnectionDependency {
                connection_type: "aws".into(),
                source: "step.transform.source.value".into(),
            }]
        );

        let expr = parse_expression(r#"{ akey = connection.aws.example, b = "x" }"#).unwrap();
        assert_eq!(
            guess_required_connections(&expr),
            vec![ConnectionDependency {
                connection_type: "aws".into(),
                source: "example".into(),
            }]
        );
    }
}
