//! Owned ESTree-shaped tree nodes, tokens and comments.
//!
//! Template constructs and script constructs share the same [`Node`] type so
//! a single pass can rewrite one into the other in place. Fields keep their
//! insertion order, which is also the order used when a node kind has no
//! entry in the visitor-key table.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

pub use crate::position::{Position, SourceLocation};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Strings(Vec<String>),
    Node(Box<Node>),
    Nodes(Vec<Node>),
    /// Array with holes, e.g. `[a, , b]`.
    Sparse(Vec<Option<Node>>),
    /// Plain record that is not itself a node, e.g. a template element's
    /// `{ raw, cooked }`.
    Object(Vec<(String, Value)>),
}

impl Value {
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Node(Box::new(node))
    }
}

impl From<Option<Node>> for Value {
    fn from(node: Option<Node>) -> Self {
        node.map_or(Value::Null, Value::from)
    }
}

impl From<Vec<Node>> for Value {
    fn from(nodes: Vec<Node>) -> Self {
        Value::Nodes(nodes)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Vec<String>> for Value {
    fn from(strings: Vec<String>) -> Self {
        Value::Strings(strings)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    kind: String,
    pub start: u32,
    pub end: u32,
    pub loc: Option<SourceLocation>,
    fields: Vec<(String, Value)>,
    placeholder: bool,
    visited: bool,
}

impl Node {
    pub fn new(kind: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            kind: kind.into(),
            start,
            end,
            loc: None,
            fields: Vec::new(),
            placeholder: false,
            visited: false,
        }
    }

    /// A node that only records the kind and span of a construct that still
    /// has to be parsed by the script parser.
    pub fn placeholder(kind: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            placeholder: true,
            ..Self::new(kind, start, end)
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn set_kind(&mut self, kind: impl Into<String>) {
        self.kind = kind.into();
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Flips the one-shot traversal marker. Returns `false` when the node
    /// had already been marked.
    pub(crate) fn mark_visited(&mut self) -> bool {
        !std::mem::replace(&mut self.visited, true)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.get_mut(key) {
            Some(slot) => *slot = value,
            None => self.fields.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let position = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(position).1)
    }

    /// Renames a field in place, keeping its position.
    pub fn rename_field(&mut self, from: &str, to: &str) {
        if let Some((key, _)) = self.fields.iter_mut().find(|(k, _)| k == from) {
            *key = to.to_string();
        }
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn child(&self, key: &str) -> Option<&Node> {
        self.get(key).and_then(Value::as_node)
    }

    pub fn child_mut(&mut self, key: &str) -> Option<&mut Node> {
        match self.get_mut(key) {
            Some(Value::Node(node)) => Some(node),
            _ => None,
        }
    }

    /// Removes and returns a single-node field.
    pub fn take_child(&mut self, key: &str) -> Option<Node> {
        match self.remove(key) {
            Some(Value::Node(node)) => Some(*node),
            Some(other) => {
                self.set(key, other);
                None
            }
            None => None,
        }
    }

    pub fn children(&self, key: &str) -> &[Node] {
        match self.get(key) {
            Some(Value::Nodes(nodes)) => nodes,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self, key: &str) -> Option<&mut Vec<Node>> {
        match self.get_mut(key) {
            Some(Value::Nodes(nodes)) => Some(nodes),
            _ => None,
        }
    }

    /// Every node held by `key`, whether single, list or sparse list.
    pub fn nodes_at(&self, key: &str) -> Vec<&Node> {
        match self.get(key) {
            Some(Value::Node(node)) => vec![node],
            Some(Value::Nodes(nodes)) => nodes.iter().collect(),
            Some(Value::Sparse(nodes)) => nodes.iter().flatten().collect(),
            _ => Vec::new(),
        }
    }

    /// Identifiers bound by this node when it is used as a binding pattern,
    /// in source order. Default values are not descended into.
    pub fn pattern_identifiers(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        collect_pattern_identifiers(self, &mut out);
        out
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn bool_field(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Bool(true)))
    }

    pub fn span_text<'s>(&self, source: &'s str) -> &'s str {
        source
            .get(self.start as usize..self.end as usize)
            .unwrap_or_default()
    }

    pub(crate) fn serialize_entries<M: SerializeMap>(&self, map: &mut M) -> Result<(), M::Error> {
        map.serialize_entry("type", &self.kind)?;
        map.serialize_entry("start", &self.start)?;
        map.serialize_entry("end", &self.end)?;
        map.serialize_entry("range", &[self.start, self.end])?;
        if let Some(loc) = &self.loc {
            map.serialize_entry("loc", loc)?;
        }
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        Ok(())
    }
}

fn collect_pattern_identifiers<'n>(node: &'n Node, out: &mut Vec<&'n Node>) {
    match node.kind() {
        "Identifier" => out.push(node),
        "ObjectPattern" => {
            for property in node.children("properties") {
                let target = if property.is("RestElement") {
                    property.child("argument")
                } else {
                    property.child("value")
                };
                if let Some(target) = target {
                    collect_pattern_identifiers(target, out);
                }
            }
        }
        "ArrayPattern" => {
            for element in node.nodes_at("elements") {
                collect_pattern_identifiers(element, out);
            }
        }
        "AssignmentPattern" => {
            if let Some(left) = node.child("left") {
                collect_pattern_identifiers(left, out);
            }
        }
        "RestElement" => {
            if let Some(argument) = node.child("argument") {
                collect_pattern_identifiers(argument, out);
            }
        }
        _ => {}
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        self.serialize_entries(&mut map)?;
        map.end()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Strings(strings) => strings.serialize(serializer),
            Value::Node(node) => node.serialize(serializer),
            Value::Nodes(nodes) => nodes.serialize(serializer),
            Value::Sparse(nodes) => {
                let mut seq = serializer.serialize_seq(Some(nodes.len()))?;
                for node in nodes {
                    seq.serialize_element(node)?;
                }
                seq.end()
            }
            Value::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKENS AND COMMENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    Punctuator,
    Keyword,
    Identifier,
    PrivateIdentifier,
    String,
    Numeric,
    Boolean,
    Null,
    Template,
    RegularExpression,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub start: u32,
    pub end: u32,
    pub loc: Option<SourceLocation>,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            kind,
            value: value.into(),
            start,
            end,
            loc: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommentKind {
    Line,
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub kind: CommentKind,
    pub value: String,
    pub start: u32,
    pub end: u32,
    pub loc: Option<SourceLocation>,
}

impl Comment {
    pub fn new(kind: CommentKind, value: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            kind,
            value: value.into(),
            start,
            end,
            loc: None,
        }
    }
}

fn serialize_spanned<S: Serializer, K: Serialize>(
    serializer: S,
    kind: &K,
    value: &str,
    start: u32,
    end: u32,
    loc: Option<&SourceLocation>,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(None)?;
    map.serialize_entry("type", kind)?;
    map.serialize_entry("value", value)?;
    map.serialize_entry("start", &start)?;
    map.serialize_entry("end", &end)?;
    map.serialize_entry("range", &[start, end])?;
    if let Some(loc) = loc {
        map.serialize_entry("loc", loc)?;
    }
    map.end()
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_spanned(
            serializer,
            &self.kind,
            &self.value,
            self.start,
            self.end,
            self.loc.as_ref(),
        )
    }
}

impl Serialize for Comment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_spanned(
            serializer,
            &self.kind,
            &self.value,
            self.start,
            self.end,
            self.loc.as_ref(),
        )
    }
}

/// Anything with a half-open byte range.
pub trait Spanned {
    fn span_start(&self) -> u32;
    fn span_end(&self) -> u32;
}

impl Spanned for Node {
    fn span_start(&self) -> u32 {
        self.start
    }
    fn span_end(&self) -> u32 {
        self.end
    }
}

impl Spanned for Token {
    fn span_start(&self) -> u32 {
        self.start
    }
    fn span_end(&self) -> u32 {
        self.end
    }
}

impl Spanned for Comment {
    fn span_start(&self) -> u32 {
        self.start
    }
    fn span_end(&self) -> u32 {
        self.end
    }
}

/// The final program together with its token and comment streams.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub program: Node,
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
}

impl Serialize for Ast {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        self.program.serialize_entries(&mut map)?;
        map.serialize_entry("tokens", &self.tokens)?;
        map.serialize_entry("comments", &self.comments)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_keep_insertion_order() {
        let node = Node::new("IfBlock", 0, 10)
            .with("expression", Node::new("Identifier", 5, 6))
            .with("children", Vec::<Node>::new())
            .with("elseif", false);
        assert_eq!(node.field_names(), vec!["expression", "children", "elseif"]);
    }

    #[test]
    fn test_set_replaces_existing_field() {
        let mut node = Node::new("Attribute", 0, 5).with("name", "a");
        node.set("name", "b");
        assert_eq!(node.str_field("name"), Some("b"));
        assert_eq!(node.field_names().len(), 1);
    }

    #[test]
    fn test_take_child_leaves_other_values_alone() {
        let mut node = Node::new("EachBlock", 0, 5).with("index", "i");
        assert!(node.take_child("index").is_none());
        assert_eq!(node.str_field("index"), Some("i"));
    }

    #[test]
    fn test_visit_marker_is_one_shot() {
        let mut node = Node::new("Text", 0, 1);
        assert!(node.mark_visited());
        assert!(!node.mark_visited());
    }

    #[test]
    fn test_pattern_identifiers_skip_keys_and_defaults() {
        let pattern = Node::new("ObjectPattern", 0, 20).with(
            "properties",
            vec![
                Node::new("Property", 2, 8)
                    .with("key", Node::new("Identifier", 2, 3).with("name", "a"))
                    .with(
                        "value",
                        Node::new("AssignmentPattern", 5, 10)
                            .with("left", Node::new("Identifier", 5, 6).with("name", "b"))
                            .with("right", Node::new("Identifier", 9, 10).with("name", "c")),
                    ),
                Node::new("RestElement", 12, 17)
                    .with("argument", Node::new("Identifier", 15, 17).with("name", "rest")),
            ],
        );
        let names: Vec<&str> = pattern
            .pattern_identifiers()
            .into_iter()
            .filter_map(|id| id.str_field("name"))
            .collect();
        assert_eq!(names, vec!["b", "rest"]);
    }

    #[test]
    fn test_node_serializes_estree_shape() {
        let node = Node::new("Identifier", 3, 4).with("name", "x");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "Identifier");
        assert_eq!(json["range"], serde_json::json!([3, 4]));
        assert_eq!(json["name"], "x");
    }

    #[test]
    fn test_sparse_array_serializes_holes_as_null() {
        let node = Node::new("ArrayPattern", 0, 6).with(
            "elements",
            Value::Sparse(vec![None, Some(Node::new("Identifier", 3, 4))]),
        );
        let json = serde_json::to_value(&node).unwrap();
        assert!(json["elements"][0].is_null());
        assert_eq!(json["elements"][1]["type"], "Identifier");
    }
}
