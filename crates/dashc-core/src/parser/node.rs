//! Generic syntax tree shared by the markup and script parsers
//!
//! Every node carries a `kind` tag and an open map of named fields. A field
//! holds a single child node, an ordered list of child nodes, or a scalar.
//! Consumers never rely on a fixed schema per kind: `Node::walk` descends
//! into every child regardless of what the node is.

use std::collections::BTreeMap;

use super::tokenizer::Span;

/// Scalar payload stored directly on a node (names, literal values, text)
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a JSON value; non-finite numbers become `null`
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Null => serde_json::Value::Null,
            Scalar::Bool(b) => serde_json::Value::Bool(*b),
            Scalar::Number(n) => number_to_json(*n),
            Scalar::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Integral values serialize as integers so `100` stays `100`, not `100.0`
pub(crate) fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        serde_json::json!(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// A named field on a node
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Node(Box<Node>),
    List(Vec<Node>),
    Value(Scalar),
}

/// Heterogeneous syntax tree node
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: String,
    pub span: Span,
    pub fields: BTreeMap<String, Field>,
}

impl Node {
    pub fn new(kind: &str, span: Span) -> Self {
        Node {
            kind: kind.to_string(),
            span,
            fields: BTreeMap::new(),
        }
    }

    // ── Builders ───────────────────────────────────────────

    pub fn with_node(mut self, name: &str, node: Node) -> Self {
        self.fields.insert(name.to_string(), Field::Node(Box::new(node)));
        self
    }

    pub fn with_list(mut self, name: &str, nodes: Vec<Node>) -> Self {
        self.fields.insert(name.to_string(), Field::List(nodes));
        self
    }

    pub fn with_value(mut self, name: &str, value: Scalar) -> Self {
        self.fields.insert(name.to_string(), Field::Value(value));
        self
    }

    pub fn with_str(self, name: &str, value: impl Into<String>) -> Self {
        self.with_value(name, Scalar::Str(value.into()))
    }

    // ── Accessors ──────────────────────────────────────────

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        match self.fields.get(name) {
            Some(Field::Node(n)) => Some(n),
            _ => None,
        }
    }

    /// Child list; absent or non-list fields read as empty
    pub fn list(&self, name: &str) -> &[Node] {
        match self.fields.get(name) {
            Some(Field::List(nodes)) => nodes,
            _ => &[],
        }
    }

    pub fn value(&self, name: &str) -> Option<&Scalar> {
        match self.fields.get(name) {
            Some(Field::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn str_value(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(Scalar::as_str)
    }

    // ── Traversal ──────────────────────────────────────────

    /// Pre-order visit of this node and every descendant, whatever its kind
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        for field in self.fields.values() {
            match field {
                Field::Node(child) => child.walk(visit),
                Field::List(children) => {
                    for child in children {
                        child.walk(visit);
                    }
                }
                Field::Value(_) => {}
            }
        }
    }

    /// Number of nodes in this subtree
    pub fn count(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |_| n += 1);
        n
    }
}
