//! Generic declaration body: attributes and nested blocks
//!
//! YAML documents are first turned into [`Body`] values so that every
//! resource type decodes attributes and blocks the same way, independent of
//! how the source text was written.

use crate::core::error::{Diagnostic, Diagnostics};
use crate::expression::{parse_value_string, Expr};
use serde_json::Value;
use serde_yaml::{Mapping, Value as Yaml};

/// `name = expression`
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub expr: Expr,
}

/// `kind "label" { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: String,
    pub labels: Vec<String>,
    pub body: Body,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    pub attributes: Vec<Attribute>,
    pub blocks: Vec<Block>,
}

impl Body {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn blocks_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }
}

/// How a YAML key maps onto nested blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockShape {
    /// `retry: { ... }`; a list of mappings yields several blocks
    Single,
    /// `throw: [ { ... }, { ... } ]`
    List,
    /// `output: { name: { ... } }`, the map key becomes the block label
    Labelled,
}

#[derive(Debug, Clone, Copy)]
pub struct BlockSpec {
    pub key: &'static str,
    pub shape: BlockShape,
}

impl BlockSpec {
    pub const fn new(key: &'static str, shape: BlockShape) -> Self {
        Self { key, shape }
    }
}

/// Convert a YAML value into an expression.
///
/// Strings may contain `${...}` interpolations. Mappings and sequences
/// become object and list constructors, collapsed into a literal when
/// nothing inside them needs evaluation.
pub fn expr_from_yaml(value: &Yaml) -> Result<Expr, String> {
    Ok(match value {
        Yaml::Null => Expr::Literal(Value::Null),
        Yaml::Bool(b) => Expr::Literal(Value::Bool(*b)),
        Yaml::Number(n) => Expr::Literal(yaml_number(n)),
        Yaml::String(s) => parse_value_string(s).map_err(|e| e.to_string())?,
        Yaml::Sequence(items) => {
            let items = items.iter().map(expr_from_yaml).collect::<Result<Vec<_>, _>>()?;
            if items.iter().all(|i| matches!(i, Expr::Literal(_))) {
                Expr::Literal(Value::Array(
                    items
                        .into_iter()
                        .filter_map(|i| match i {
                            Expr::Literal(v) => Some(v),
                            _ => None,
                        })
                        .collect(),
                ))
            } else {
                Expr::List(items)
            }
        }
        Yaml::Mapping(map) => {
            let mut items = Vec::new();
            for (key, value) in map {
                items.push((yaml_key(key)?, expr_from_yaml(value)?));
            }
            if items.iter().all(|(_, v)| matches!(v, Expr::Literal(_))) {
                let mut object = serde_json::Map::new();
                for (key, value) in items {
                    if let Expr::Literal(value) = value {
                        object.insert(key, value);
                    }
                }
                Expr::Literal(Value::Object(object))
            } else {
                Expr::Object(items)
            }
        }
        Yaml::Tagged(tagged) => return Err(format!("unsupported YAML tag {}", tagged.tag)),
    })
}

fn yaml_number(n: &serde_yaml::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::from(i)
    } else if let Some(u) = n.as_u64() {
        Value::from(u)
    } else {
        n.as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Render a mapping key as a string
pub fn yaml_key(key: &Yaml) -> Result<String, String> {
    match key {
        Yaml::String(s) => Ok(s.clone()),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        other => Err(format!("unsupported mapping key {:?}", other)),
    }
}

/// Decode a YAML mapping into a body.
///
/// Keys listed in `specs` become blocks; keys in `skip` (labels such as
/// `type` and `name`) are ignored; everything else is an attribute.
pub fn body_from_mapping(
    map: &Mapping,
    specs: &[BlockSpec],
    skip: &[&str],
    subject: &str,
) -> Result<Body, Diagnostics> {
    let mut body = Body::default();
    let mut diags = Diagnostics::new();

    for (key, value) in map {
        let key = match yaml_key(key) {
            Ok(key) => key,
            Err(e) => {
                diags.push(Diagnostic::error("Invalid key").with_detail(e).with_subject(subject));
                continue;
            }
        };
        if skip.contains(&key.as_str()) {
            continue;
        }

        if let Some(spec) = specs.iter().find(|s| s.key == key) {
            match blocks_from_yaml(spec, value, subject) {
                Ok(blocks) => body.blocks.extend(blocks),
                Err(e) => diags.extend(e),
            }
            continue;
        }

        match expr_from_yaml(value) {
            Ok(expr) => body.attributes.push(Attribute { name: key, expr }),
            Err(e) => diags.push(
                Diagnostic::error("Invalid expression")
                    .with_detail(format!("Attribute '{}': {}", key, e))
                    .with_subject(subject),
            ),
        }
    }

    diags.into_result().map(|_| body)
}

fn blocks_from_yaml(spec: &BlockSpec, value: &Yaml, subject: &str) -> Result<Vec<Block>, Diagnostics> {
    let invalid = || {
        Diagnostics::from(
            Diagnostic::error("Invalid block")
                .with_detail(format!("Block '{}' has an unexpected shape", spec.key))
                .with_subject(subject),
        )
    };

    let block = |labels: Vec<String>, value: &Yaml| -> Result<Block, Diagnostics> {
        let map = value.as_mapping().ok_or_else(invalid)?;
        Ok(Block {
            kind: spec.key.to_string(),
            labels,
            body: body_from_mapping(map, &[], &[], subject)?,
        })
    };

    match (spec.shape, value) {
        (BlockShape::Single | BlockShape::List, Yaml::Mapping(_)) => Ok(vec![block(vec![], value)?]),
        (BlockShape::Single | BlockShape::List, Yaml::Sequence(items)) => {
            items.iter().map(|item| block(vec![], item)).collect()
        }
        (BlockShape::Labelled, Yaml::Mapping(map)) => map
            .iter()
            .map(|(label, body)| {
                let label = yaml_key(label).map_err(|_| invalid())?;
                // `option: { red: ~ }` declares a block with no attributes
                if body.is_null() {
                    return Ok(Block {
                        kind: spec.key.to_string(),
                        labels: vec![label],
                        body: Body::default(),
                    });
                }
                block(vec![label], body)
            })
            .collect(),
        _ => Err(invalid()),
    }
}
