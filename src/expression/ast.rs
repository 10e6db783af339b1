//! Bound expressions and the variable walk over the HCL syntax tree

use hcl::eval::{Context, Evaluate};
use hcl::expr::{Expression, ObjectKey, Operation, TraversalOperator};
use hcl::template::{Element, Template};
use serde_json::Value;
use std::fmt;

use super::convert::from_hcl;

/// A single step after the root of a traversal
#[derive(Debug, Clone, PartialEq)]
pub enum Traverser {
    /// `.name`
    Attr(String),
    /// `[0]` or `["key"]` with a literal key
    Index(Value),
}

/// A static variable reference such as `step.http.fetch.response_body`
///
/// The walk stops at the first index whose key is not a literal. When that
/// happens `dynamic_key` holds the dotted text of the key if the key is itself
/// a plain reference, or an empty string otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    pub root: String,
    pub steps: Vec<Traverser>,
    pub dynamic_key: Option<String>,
}

impl Traversal {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            steps: Vec::new(),
            dynamic_key: None,
        }
    }

    /// Root name plus each step rendered as a plain string
    ///
    /// `step.http.a[0].body` gives `["step", "http", "a", "0", "body"]`.
    pub fn parts(&self) -> Vec<String> {
        let mut parts = vec![self.root.clone()];
        for step in &self.steps {
            parts.push(match step {
                Traverser::Attr(name) => name.clone(),
                Traverser::Index(Value::String(s)) => s.clone(),
                Traverser::Index(other) => other.to_string(),
            });
        }
        parts
    }

    /// Dotted form used in messages and dependency guesses
    pub fn dotted(&self) -> String {
        self.parts().join(".")
    }
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for step in &self.steps {
            match step {
                Traverser::Attr(name) => write!(f, ".{}", name)?,
                Traverser::Index(key) => write!(f, "[{}]", key)?,
            }
        }
        Ok(())
    }
}

/// One piece of a string template
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Interpolation(Expression),
}

/// An expression bound at decode time and evaluated against an [`EvalContext`]
///
/// YAML scalars without interpolations become literals. YAML sequences and
/// mappings that hold expressions keep their shape as `List` and `Object`.
///
/// [`EvalContext`]: crate::core::context::EvalContext
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// A lone expression, typed by its result
    Hcl { source: String, expr: Expression },
    /// Text with interpolations, always a string
    Template { source: String, parts: Vec<TemplatePart> },
    List(Vec<Expr>),
    Object(Vec<(String, Expr)>),
}

impl Expr {
    /// Every free variable traversal in the expression
    pub fn variables(&self) -> Vec<Traversal> {
        let mut walk = Walk::default();
        walk.expr(self);
        walk.out
    }

    /// Whether a `try(...)` call appears anywhere in the tree
    pub fn contains_try(&self) -> bool {
        let mut walk = Walk::default();
        walk.expr(self);
        walk.saw_try
    }
}

/// Variables of an HCL expression that are evaluated unconditionally,
/// leaving out the arguments of `try` and `can`
pub(crate) fn eager_variables(expr: &Expression) -> Vec<Traversal> {
    let mut walk = Walk {
        skip_guarded: true,
        ..Walk::default()
    };
    walk.hcl(expr);
    walk.out
}

#[derive(Default)]
struct Walk {
    skip_guarded: bool,
    saw_try: bool,
    /// Names bound by enclosing `for` expressions
    locals: Vec<String>,
    out: Vec<Traversal>,
}

impl Walk {
    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Hcl { expr, .. } => self.hcl(expr),
            Expr::Template { parts, .. } => {
                for part in parts {
                    if let TemplatePart::Interpolation(expr) = part {
                        self.hcl(expr);
                    }
                }
            }
            Expr::List(items) => items.iter().for_each(|item| self.expr(item)),
            Expr::Object(items) => items.iter().for_each(|(_, value)| self.expr(value)),
        }
    }

    fn hcl(&mut self, expr: &Expression) {
        match expr {
            Expression::Variable(var) => {
                if !self.is_local(var.as_str()) {
                    self.out.push(Traversal::new(var.as_str()));
                }
            }
            Expression::Traversal(traversal) => self.traversal(&traversal.expr, &traversal.operators),
            Expression::FuncCall(call) => {
                let name = call.name.to_string();
                if name == "try" {
                    self.saw_try = true;
                }
                if self.skip_guarded && (name == "try" || name == "can") {
                    return;
                }
                call.args.iter().for_each(|arg| self.hcl(arg));
            }
            Expression::Parenthesis(inner) => self.hcl(inner),
            Expression::Conditional(cond) => {
                self.hcl(&cond.cond_expr);
                self.hcl(&cond.true_expr);
                self.hcl(&cond.false_expr);
            }
            Expression::Operation(op) => self.operation(op),
            Expression::Array(items) => items.iter().for_each(|item| self.hcl(item)),
            Expression::Object(items) => {
                for (key, value) in items.iter() {
                    if let ObjectKey::Expression(key) = key {
                        self.hcl(key);
                    }
                    self.hcl(value);
                }
            }
            Expression::TemplateExpr(template) => {
                if let Ok(template) = Template::from_expr(template) {
                    self.template(&template);
                }
            }
            Expression::ForExpr(for_expr) => {
                self.hcl(&for_expr.collection_expr);
                let bound = self.locals.len();
                if let Some(key) = &for_expr.key_var {
                    self.locals.push(key.to_string());
                }
                self.locals.push(for_expr.value_var.to_string());
                if let Some(key) = &for_expr.key_expr {
                    self.hcl(key);
                }
                self.hcl(&for_expr.value_expr);
                if let Some(cond) = &for_expr.cond_expr {
                    self.hcl(cond);
                }
                self.locals.truncate(bound);
            }
            _ => {}
        }
    }

    fn operation(&mut self, op: &Operation) {
        match op {
            Operation::Unary(unary) => self.hcl(&unary.expr),
            Operation::Binary(binary) => {
                self.hcl(&binary.lhs_expr);
                self.hcl(&binary.rhs_expr);
            }
        }
    }

    fn template(&mut self, template: &Template) {
        for element in template.elements() {
            if let Element::Interpolation(interpolation) = element {
                self.hcl(&interpolation.expr);
            }
        }
    }

    fn traversal(&mut self, root: &Expression, operators: &[TraversalOperator]) {
        let Expression::Variable(var) = root else {
            self.hcl(root);
            operators.iter().for_each(|op| self.index_keys(op));
            return;
        };
        if self.is_local(var.as_str()) {
            operators.iter().for_each(|op| self.index_keys(op));
            return;
        }

        let mut traversal = Traversal::new(var.as_str());
        let mut rest = operators.iter();
        for op in rest.by_ref() {
            match op {
                TraversalOperator::GetAttr(name) => traversal.steps.push(Traverser::Attr(name.to_string())),
                TraversalOperator::LegacyIndex(n) => traversal.steps.push(Traverser::Index(Value::from(*n))),
                TraversalOperator::Index(key) => match literal_key(key) {
                    Some(key) => traversal.steps.push(Traverser::Index(key)),
                    None => {
                        self.hcl(key);
                        traversal.dynamic_key = Some(plain_reference(key).unwrap_or_default());
                        break;
                    }
                },
                _ => break,
            }
        }
        self.out.push(traversal);
        rest.for_each(|op| self.index_keys(op));
    }

    fn index_keys(&mut self, op: &TraversalOperator) {
        if let TraversalOperator::Index(key) = op {
            self.hcl(key);
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.locals.iter().any(|local| local == name)
    }
}

/// The value of an index key that needs no variables
fn literal_key(key: &Expression) -> Option<Value> {
    match key {
        Expression::Variable(_) | Expression::Traversal(_) | Expression::FuncCall(_) => None,
        other => other.evaluate(&Context::new()).ok().map(from_hcl),
    }
}

/// Dotted text of a key that is nothing but a static reference
fn plain_reference(key: &Expression) -> Option<String> {
    let mut walk = Walk::default();
    walk.hcl(key);
    match (walk.out.as_slice(), key) {
        ([single], Expression::Variable(_)) => Some(single.dotted()),
        ([single], Expression::Traversal(traversal))
            if single.dynamic_key.is_none() && single.steps.len() == traversal.operators.len() =>
        {
            Some(single.dotted())
        }
        _ => None,
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Hcl { source, .. } | Expr::Template { source, .. } => write!(f, "{}", source),
            Expr::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expr::Object(items) => {
                write!(f, "{{")?;
                for (i, (key, value)) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}
