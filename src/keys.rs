//! Visitor keys: which fields of each node kind hold child nodes, in
//! traversal order.

use std::collections::BTreeMap;
use std::collections::HashMap;

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE KEYS
// ═══════════════════════════════════════════════════════════════════════════════

const ELEMENT_KEYS: &[&str] = &["attributes", "children"];

const TEMPLATE_KEYS: &[(&str, &[&str])] = &[
    ("TemplateRoot", &["html", "css", "instance", "module"]),
    ("Fragment", &["children"]),
    ("Script", &["attributes", "content"]),
    ("ScriptElement", &["attributes", "content"]),
    ("Style", &["attributes"]),
    ("StyleElement", &["attributes"]),
    ("Element", ELEMENT_KEYS),
    ("Head", ELEMENT_KEYS),
    ("Options", ELEMENT_KEYS),
    ("Window", ELEMENT_KEYS),
    ("Body", ELEMENT_KEYS),
    ("Title", ELEMENT_KEYS),
    ("Slot", ELEMENT_KEYS),
    ("InlineComponent", &["name", "attributes", "expression", "children"]),
    ("Comment", &[]),
    ("Text", &[]),
    ("Attribute", &["value"]),
    ("AttributeShorthand", &["expression"]),
    ("Spread", &["expression"]),
    ("Action", &["name", "expression"]),
    ("Animation", &["name", "expression"]),
    ("Transition", &["name", "expression"]),
    ("Let", &["name", "expression"]),
    ("Binding", &["expression"]),
    ("Class", &["expression"]),
    ("EventHandler", &["expression"]),
    ("MustacheTag", &["expression"]),
    ("RawMustacheTag", &["expression"]),
    ("DebugTag", &["identifiers"]),
    ("IfBlock", &["expression", "children", "else"]),
    ("ElseBlock", &["children"]),
    ("EachBlock", &["expression", "context", "index", "key", "children", "else"]),
    ("AwaitBlock", &["expression", "pending", "then", "catch"]),
    ("PendingBlock", &["children"]),
    ("ThenBlock", &["value", "children"]),
    ("CatchBlock", &["error", "children"]),
];

/// Template kinds whose `expression` field holds a script expression.
pub const EXPRESSION_PARENTS: &[&str] = &[
    "InlineComponent",
    "AttributeShorthand",
    "Spread",
    "Action",
    "Animation",
    "Binding",
    "Class",
    "EventHandler",
    "Transition",
    "AwaitBlock",
    "EachBlock",
    "IfBlock",
    "RawMustacheTag",
    "MustacheTag",
];

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPT KEYS
// ═══════════════════════════════════════════════════════════════════════════════

const FUNCTION_KEYS: &[&str] = &["id", "params", "body"];
const CLASS_KEYS: &[&str] = &["id", "superClass", "body"];
const FOR_IN_KEYS: &[&str] = &["left", "right", "body"];

const SCRIPT_KEYS: &[(&str, &[&str])] = &[
    ("Program", &["body"]),
    ("ArrayExpression", &["elements"]),
    ("ArrayPattern", &["elements"]),
    ("ArrowFunctionExpression", &["params", "body"]),
    ("AssignmentExpression", &["left", "right"]),
    ("AssignmentPattern", &["left", "right"]),
    ("AwaitExpression", &["argument"]),
    ("BinaryExpression", &["left", "right"]),
    ("BlockStatement", &["body"]),
    ("BreakStatement", &["label"]),
    ("CallExpression", &["callee", "arguments"]),
    ("CatchClause", &["param", "body"]),
    ("ChainExpression", &["expression"]),
    ("ClassBody", &["body"]),
    ("ClassDeclaration", CLASS_KEYS),
    ("ClassExpression", CLASS_KEYS),
    ("ConditionalExpression", &["test", "consequent", "alternate"]),
    ("ContinueStatement", &["label"]),
    ("DebuggerStatement", &[]),
    ("DoWhileStatement", &["body", "test"]),
    ("EmptyStatement", &[]),
    ("ExportAllDeclaration", &["exported", "source"]),
    ("ExportDefaultDeclaration", &["declaration"]),
    ("ExportNamedDeclaration", &["declaration", "specifiers", "source"]),
    ("ExportSpecifier", &["local", "exported"]),
    ("ExpressionStatement", &["expression"]),
    ("ForInStatement", FOR_IN_KEYS),
    ("ForOfStatement", FOR_IN_KEYS),
    ("ForStatement", &["init", "test", "update", "body"]),
    ("FunctionDeclaration", FUNCTION_KEYS),
    ("FunctionExpression", FUNCTION_KEYS),
    ("Identifier", &[]),
    ("IfStatement", &["test", "consequent", "alternate"]),
    ("ImportDeclaration", &["specifiers", "source"]),
    ("ImportDefaultSpecifier", &["local"]),
    ("ImportExpression", &["source"]),
    ("ImportNamespaceSpecifier", &["local"]),
    ("ImportSpecifier", &["imported", "local"]),
    ("LabeledStatement", &["label", "body"]),
    ("Literal", &[]),
    ("LogicalExpression", &["left", "right"]),
    ("MemberExpression", &["object", "property"]),
    ("MetaProperty", &["meta", "property"]),
    ("MethodDefinition", &["key", "value"]),
    ("NewExpression", &["callee", "arguments"]),
    ("ObjectExpression", &["properties"]),
    ("ObjectPattern", &["properties"]),
    ("PrivateIdentifier", &[]),
    ("Property", &["key", "value"]),
    ("PropertyDefinition", &["key", "value"]),
    ("RestElement", &["argument"]),
    ("ReturnStatement", &["argument"]),
    ("SequenceExpression", &["expressions"]),
    ("SpreadElement", &["argument"]),
    ("StaticBlock", &["body"]),
    ("Super", &[]),
    ("SwitchCase", &["test", "consequent"]),
    ("SwitchStatement", &["discriminant", "cases"]),
    ("TaggedTemplateExpression", &["tag", "quasi"]),
    ("TemplateElement", &[]),
    ("TemplateLiteral", &["quasis", "expressions"]),
    ("ThisExpression", &[]),
    ("ThrowStatement", &["argument"]),
    ("TryStatement", &["block", "handler", "finalizer"]),
    ("UnaryExpression", &["argument"]),
    ("UpdateExpression", &["argument"]),
    ("VariableDeclaration", &["declarations"]),
    ("VariableDeclarator", &["id", "init"]),
    ("WhileStatement", &["test", "body"]),
    ("WithStatement", &["object", "body"]),
    ("YieldExpression", &["argument"]),
    ("TSAsExpression", &["expression"]),
    ("TSSatisfiesExpression", &["expression"]),
    ("TSNonNullExpression", &["expression"]),
];

lazy_static::lazy_static! {
    static ref KEYS: HashMap<&'static str, &'static [&'static str]> = TEMPLATE_KEYS
        .iter()
        .chain(SCRIPT_KEYS.iter())
        .map(|(kind, keys)| (*kind, *keys))
        .collect();
}

/// Child keys for `kind`, or `None` when the kind is unknown and callers
/// should fall back to iterating the node's fields.
pub fn child_keys(kind: &str) -> Option<&'static [&'static str]> {
    KEYS.get(kind).copied()
}

/// Field names of `node` that hold children, in traversal order.
pub fn traversal_keys(node: &crate::node::Node) -> Vec<String> {
    match child_keys(node.kind()) {
        Some(keys) => keys.iter().map(|k| k.to_string()).collect(),
        None => node
            .fields()
            .filter(|(_, value)| {
                matches!(
                    value,
                    crate::node::Value::Node(_)
                        | crate::node::Value::Nodes(_)
                        | crate::node::Value::Sparse(_)
                )
            })
            .map(|(key, _)| key.to_string())
            .collect(),
    }
}

/// The full key table handed to downstream consumers of the tree.
pub fn visitor_keys() -> BTreeMap<&'static str, &'static [&'static str]> {
    KEYS.iter().map(|(kind, keys)| (*kind, *keys)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn test_declaration_fields_are_traversed() {
        assert!(child_keys("EachBlock").unwrap().contains(&"context"));
        assert!(child_keys("EachBlock").unwrap().contains(&"index"));
        assert!(child_keys("ThenBlock").unwrap().contains(&"value"));
        assert!(child_keys("CatchBlock").unwrap().contains(&"error"));
    }

    #[test]
    fn test_unknown_kind_falls_back_to_node_fields() {
        let node = Node::new("TSTypeAnnotation", 0, 4)
            .with("name", "x")
            .with("typeAnnotation", Node::new("TSStringKeyword", 0, 4));
        assert_eq!(traversal_keys(&node), vec!["typeAnnotation"]);
    }

    #[test]
    fn test_expression_parents_have_expression_key() {
        for kind in EXPRESSION_PARENTS {
            assert!(child_keys(kind).unwrap().contains(&"expression"), "{kind}");
        }
    }
}
