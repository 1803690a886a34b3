//! Scope-building walk over the converted program.
//!
//! Script constructs follow the usual ESTree scoping rules. Template
//! constructs open their own scopes: `each`, `await`, `await:then`,
//! `await:catch` and `component`, plus plain block scopes for `if`/`else`
//! branches. A construct's own bindings are declared before its children
//! are visited.

use crate::config::ParserOptions;
use crate::errors::InternalError;
use crate::node::Node;

use super::{Definition, DefinitionKind, ReferenceFlag, ScopeId, ScopeKind, ScopeManager, VariableId};

type Result<T> = std::result::Result<T, InternalError>;

/// Builds the scope graph for a converted `Program`.
pub fn analyze(program: &Node, options: &ParserOptions) -> Result<ScopeManager> {
    let mut referencer = Referencer {
        manager: ScopeManager::default(),
        current: None,
        reactive: Vec::new(),
    };
    let global = referencer.open(ScopeKind::Global, program);
    if options.is_module() {
        referencer.open(ScopeKind::Module, program);
        referencer.statements(program.children("body"))?;
        referencer.close()?;
    } else {
        referencer.statements(program.children("body"))?;
    }
    referencer.close()?;
    debug_assert_eq!(referencer.current, None);

    let manager = referencer.manager;
    tracing::debug!(
        scopes = manager.scopes().len(),
        global_through = manager.scope(global).through.len(),
        "scope analysis finished"
    );
    Ok(manager)
}

struct Referencer {
    manager: ScopeManager,
    current: Option<ScopeId>,
    /// `$:` assignment targets per scope, declared on close when nothing
    /// else declared them.
    reactive: Vec<(ScopeId, String, u32, u32)>,
}

fn definition(kind: DefinitionKind, id: &Node, owner: &Node) -> Definition {
    Definition {
        kind,
        name_start: id.start,
        name_end: id.end,
        node_kind: owner.kind().to_string(),
    }
}

fn identifier_name(node: &Node) -> Option<&str> {
    if node.is("Identifier") {
        node.str_field("name")
    } else {
        None
    }
}

impl Referencer {
    fn scope(&self) -> Result<ScopeId> {
        self.current.ok_or(InternalError::ScopeNesting {
            kind: "scope".to_string(),
            offset: 0,
            expected: "any".to_string(),
            found: "none".to_string(),
        })
    }

    fn scope_kind(&self) -> Option<ScopeKind> {
        self.current.map(|id| self.manager.scope(id).kind)
    }

    fn open(&mut self, kind: ScopeKind, block: &Node) -> ScopeId {
        let id = self
            .manager
            .push_scope(kind, self.current, block.kind(), block.start);
        self.current = Some(id);
        id
    }

    fn close(&mut self) -> Result<()> {
        let id = self.scope()?;
        let (pending, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.reactive)
            .into_iter()
            .partition(|(scope, ..)| *scope == id);
        self.reactive = rest;
        for (scope, name, start, end) in pending {
            if !self.manager.scope(scope).set.contains_key(&name) {
                let def = Definition {
                    kind: DefinitionKind::Reactive,
                    name_start: start,
                    name_end: end,
                    node_kind: "LabeledStatement".to_string(),
                };
                self.manager.declare(scope, &name, def);
            }
        }
        self.manager.close(id);
        self.current = self.manager.scope(id).parent;
        Ok(())
    }

    /// Nearest scope that receives `var` declarations.
    fn variable_scope(&self) -> Result<ScopeId> {
        let mut id = self.scope()?;
        loop {
            let scope = self.manager.scope(id);
            if scope.kind.is_variable_scope() {
                return Ok(id);
            }
            match scope.parent {
                Some(parent) => id = parent,
                None => return Ok(id),
            }
        }
    }

    fn reference(&mut self, id: &Node, flag: ReferenceFlag, init: bool) -> Result<()> {
        if let Some(name) = identifier_name(id) {
            let scope = self.scope()?;
            self.manager
                .add_reference(scope, name, (id.start, id.end), flag, init);
        }
        Ok(())
    }

    /// Declares every identifier bound by `pattern` in `scope`, then visits
    /// default values and computed keys in the current scope.
    fn declare_pattern(
        &mut self,
        scope: ScopeId,
        pattern: &Node,
        kind: DefinitionKind,
        owner: &Node,
    ) -> Result<()> {
        for id in pattern.pattern_identifiers() {
            if let Some(name) = id.str_field("name") {
                self.manager.declare(scope, name, definition(kind, id, owner));
            }
        }
        self.pattern_expressions(pattern)
    }

    /// Visits the expression parts of a pattern: defaults and computed keys.
    fn pattern_expressions(&mut self, pattern: &Node) -> Result<()> {
        match pattern.kind() {
            "ObjectPattern" => {
                for property in pattern.children("properties") {
                    if property.bool_field("computed") {
                        if let Some(key) = property.child("key") {
                            self.visit(key)?;
                        }
                    }
                    let target = property.child("value").or_else(|| property.child("argument"));
                    if let Some(target) = target {
                        self.pattern_expressions(target)?;
                    }
                }
            }
            "ArrayPattern" => {
                for element in pattern.nodes_at("elements") {
                    self.pattern_expressions(element)?;
                }
            }
            "AssignmentPattern" => {
                if let Some(left) = pattern.child("left") {
                    self.pattern_expressions(left)?;
                }
                if let Some(right) = pattern.child("right") {
                    self.visit(right)?;
                }
            }
            "RestElement" => {
                if let Some(argument) = pattern.child("argument") {
                    self.pattern_expressions(argument)?;
                }
            }
            "MemberExpression" => self.visit(pattern)?,
            _ => {}
        }
        Ok(())
    }

    /// Assignment target: identifiers become write references, member
    /// expressions are read.
    fn assignment_target(&mut self, target: &Node, flag: ReferenceFlag) -> Result<()> {
        match target.kind() {
            "Identifier" => self.reference(target, flag, false),
            "ObjectPattern" | "ArrayPattern" | "AssignmentPattern" | "RestElement" => {
                for id in target.pattern_identifiers() {
                    self.reference(id, ReferenceFlag::Write, false)?;
                }
                self.pattern_expressions(target)
            }
            _ => self.visit(target),
        }
    }

    fn statements(&mut self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            self.visit(node)?;
        }
        Ok(())
    }

    fn children(&mut self, node: &Node, key: &str) -> Result<()> {
        for child in node.nodes_at(key) {
            self.visit(child)?;
        }
        Ok(())
    }

    fn visit_keys(&mut self, node: &Node) -> Result<()> {
        for key in crate::keys::traversal_keys(node) {
            self.children(node, &key)?;
        }
        Ok(())
    }

    fn visit(&mut self, node: &Node) -> Result<()> {
        match node.kind() {
            "Identifier" => self.reference(node, ReferenceFlag::Read, false),
            "Fragment" => Err(InternalError::StructuralInvariant {
                kind: node.kind().to_string(),
                offset: node.start,
                reason: "markup fragments must be normalized before scope analysis".to_string(),
            }),

            // ── Declarations ──
            "VariableDeclaration" => self.variable_declaration(node),
            "FunctionDeclaration" => {
                if let Some(id) = node.child("id") {
                    let scope = self.scope()?;
                    self.declare_pattern(scope, id, DefinitionKind::FunctionName, node)?;
                }
                self.function(node)
            }
            "FunctionExpression" | "ArrowFunctionExpression" => self.function(node),
            "ClassDeclaration" => {
                if let Some(id) = node.child("id") {
                    let scope = self.scope()?;
                    self.declare_pattern(scope, id, DefinitionKind::ClassName, node)?;
                }
                self.class(node)
            }
            "ClassExpression" => self.class(node),
            "ImportDeclaration" => {
                let scope = self.scope()?;
                for specifier in node.children("specifiers") {
                    if let Some(local) = specifier.child("local") {
                        self.declare_pattern(scope, local, DefinitionKind::ImportBinding, specifier)?;
                    }
                }
                Ok(())
            }
            "ExportNamedDeclaration" => {
                if let Some(declaration) = node.child("declaration") {
                    self.visit(declaration)?;
                }
                if node.child("source").is_none() {
                    for specifier in node.children("specifiers") {
                        if let Some(local) = specifier.child("local") {
                            self.reference(local, ReferenceFlag::Read, false)?;
                        }
                    }
                }
                Ok(())
            }
            "ExportDefaultDeclaration" => self.children(node, "declaration"),
            "ExportAllDeclaration" => Ok(()),

            // ── Scoped statements ──
            "BlockStatement" | "StaticBlock" => {
                self.open(ScopeKind::Block, node);
                self.children(node, "body")?;
                self.close()
            }
            "ForStatement" | "ForInStatement" | "ForOfStatement" => self.for_statement(node),
            "CatchClause" => {
                let scope = self.open(ScopeKind::Catch, node);
                if let Some(param) = node.child("param") {
                    self.declare_pattern(scope, param, DefinitionKind::CatchClause, node)?;
                }
                self.children(node, "body")?;
                self.close()
            }
            "SwitchStatement" => {
                self.children(node, "discriminant")?;
                self.open(ScopeKind::Switch, node);
                self.children(node, "cases")?;
                self.close()
            }
            "LabeledStatement" => self.labeled_statement(node),
            "BreakStatement" | "ContinueStatement" | "MetaProperty" => Ok(()),

            // ── Expressions ──
            "AssignmentExpression" => {
                let flag = if node.str_field("operator") == Some("=") {
                    ReferenceFlag::Write
                } else {
                    ReferenceFlag::ReadWrite
                };
                if let Some(left) = node.child("left") {
                    self.assignment_target(left, flag)?;
                }
                self.children(node, "right")
            }
            "UpdateExpression" => match node.child("argument") {
                Some(argument) => self.assignment_target(argument, ReferenceFlag::ReadWrite),
                None => Ok(()),
            },
            "MemberExpression" => {
                self.children(node, "object")?;
                if node.bool_field("computed") {
                    self.children(node, "property")?;
                }
                Ok(())
            }
            "Property" | "MethodDefinition" | "PropertyDefinition" => {
                if node.bool_field("computed") {
                    self.children(node, "key")?;
                }
                self.children(node, "value")
            }
            kind if kind.starts_with("TS") => {
                if matches!(kind, "TSAsExpression" | "TSSatisfiesExpression" | "TSNonNullExpression") {
                    self.children(node, "expression")?;
                }
                Ok(())
            }

            // ── Template ──
            "IfBlock" => {
                self.children(node, "expression")?;
                self.open(ScopeKind::Block, node);
                self.children(node, "children")?;
                self.close()?;
                self.children(node, "else")
            }
            "ElseBlock" => {
                self.open(ScopeKind::Block, node);
                self.children(node, "children")?;
                self.close()
            }
            "EachBlock" => self.each_block(node),
            "AwaitBlock" => {
                self.children(node, "expression")?;
                self.open(ScopeKind::Await, node);
                for key in ["pending", "then", "catch"] {
                    self.children(node, key)?;
                }
                self.close()
            }
            "PendingBlock" => self.children(node, "children"),
            "ThenBlock" => self.await_branch(node, ScopeKind::AwaitThen, "value"),
            "CatchBlock" => self.await_branch(node, ScopeKind::AwaitCatch, "error"),
            "InlineComponent" => self.inline_component(node),
            "Let" => self.let_directive(node),
            "Action" | "Transition" | "Animation" => {
                if let Some(name) = node.child("name") {
                    self.root_segment_reference(name)?;
                }
                self.children(node, "expression")
            }
            "Binding" => match node.child("expression") {
                Some(expression) if expression.is("Identifier") => {
                    self.reference(expression, ReferenceFlag::ReadWrite, false)
                }
                Some(expression) => self.visit(expression),
                None => Ok(()),
            },
            "DebugTag" => {
                for id in node.children("identifiers") {
                    self.reference(id, ReferenceFlag::Read, false)?;
                }
                Ok(())
            }
            "Text" | "Comment" => Ok(()),

            _ => self.visit_keys(node),
        }
    }

    fn variable_declaration(&mut self, node: &Node) -> Result<()> {
        let scope = if node.str_field("kind") == Some("var") {
            self.variable_scope()?
        } else {
            self.scope()?
        };
        for declarator in node.children("declarations") {
            let Some(id) = declarator.child("id") else {
                continue;
            };
            self.declare_pattern(scope, id, DefinitionKind::Variable, declarator)?;
            if let Some(init) = declarator.child("init") {
                for target in id.pattern_identifiers() {
                    self.reference(target, ReferenceFlag::Write, true)?;
                }
                self.visit(init)?;
            }
        }
        Ok(())
    }

    fn function(&mut self, node: &Node) -> Result<()> {
        let named_expression = node.is("FunctionExpression") && node.child("id").is_some();
        if named_expression {
            let scope = self.open(ScopeKind::FunctionExpressionName, node);
            if let Some(id) = node.child("id") {
                self.declare_pattern(scope, id, DefinitionKind::FunctionName, node)?;
            }
        }

        let scope = self.open(ScopeKind::Function, node);
        for param in node.children("params") {
            self.declare_pattern(scope, param, DefinitionKind::Parameter, node)?;
        }
        match node.child("body") {
            Some(body) if body.is("BlockStatement") => self.children(body, "body")?,
            Some(body) => self.visit(body)?,
            None => {}
        }
        self.close()?;

        if named_expression {
            self.close()?;
        }
        Ok(())
    }

    fn class(&mut self, node: &Node) -> Result<()> {
        self.children(node, "superClass")?;
        let scope = self.open(ScopeKind::Class, node);
        if node.is("ClassExpression") {
            if let Some(id) = node.child("id") {
                self.declare_pattern(scope, id, DefinitionKind::ClassName, node)?;
            }
        }
        self.children(node, "body")?;
        self.close()
    }

    fn for_statement(&mut self, node: &Node) -> Result<()> {
        let head = node.child("init").or_else(|| node.child("left"));
        let lexical = head.is_some_and(|head| {
            head.is("VariableDeclaration") && head.str_field("kind") != Some("var")
        });
        if lexical {
            self.open(ScopeKind::For, node);
        }
        if node.is("ForStatement") {
            for key in ["init", "test", "update"] {
                self.children(node, key)?;
            }
        } else {
            if let Some(left) = node.child("left") {
                if left.is("VariableDeclaration") {
                    self.visit(left)?;
                    for declarator in left.children("declarations") {
                        for id in declarator.child("id").map(Node::pattern_identifiers).unwrap_or_default() {
                            self.reference(id, ReferenceFlag::Write, false)?;
                        }
                    }
                } else {
                    self.assignment_target(left, ReferenceFlag::Write)?;
                }
            }
            self.children(node, "right")?;
        }
        self.children(node, "body")?;
        if lexical {
            self.close()?;
        }
        Ok(())
    }

    /// `$: name = value` declares `name` when nothing else does.
    fn labeled_statement(&mut self, node: &Node) -> Result<()> {
        let reactive = node
            .child("label")
            .and_then(identifier_name)
            .is_some_and(|label| label == "$");
        if reactive {
            let target = node
                .child("body")
                .filter(|body| body.is("ExpressionStatement"))
                .and_then(|body| body.child("expression"))
                .filter(|expression| {
                    expression.is("AssignmentExpression")
                        && expression.str_field("operator") == Some("=")
                })
                .and_then(|assignment| assignment.child("left"));
            if let Some(id) = target {
                if let Some(name) = identifier_name(id) {
                    let scope = self.scope()?;
                    self.reactive
                        .push((scope, name.to_string(), id.start, id.end));
                }
            }
        }
        self.children(node, "body")
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TEMPLATE SCOPES
    // ═══════════════════════════════════════════════════════════════════════

    fn each_block(&mut self, node: &Node) -> Result<()> {
        self.children(node, "expression")?;
        let scope = self.open(ScopeKind::Each, node);
        let Some(context) = node.child("context") else {
            return Err(InternalError::MissingDeclaration {
                kind: node.kind().to_string(),
                offset: node.start,
            });
        };
        self.declare_pattern(scope, context, DefinitionKind::TemplateBinding, node)?;
        if let Some(index) = node.child("index") {
            self.declare_pattern(scope, index, DefinitionKind::TemplateBinding, node)?;
        }
        self.children(node, "key")?;
        self.children(node, "children")?;
        self.close()?;
        if let Some(index) = node.child("index") {
            self.mark_index_used(scope, context, index);
        }
        self.children(node, "else")
    }

    /// An each-block index counts as used once its context is read.
    fn mark_index_used(&mut self, scope: ScopeId, context: &Node, index: &Node) {
        let declared = |pattern: &Node| -> Vec<VariableId> {
            let set = &self.manager.scope(scope).set;
            pattern
                .pattern_identifiers()
                .into_iter()
                .filter_map(identifier_name)
                .filter_map(|name| set.get(name).copied())
                .collect()
        };
        let context_read = declared(context)
            .into_iter()
            .any(|id| self.manager.variable(id).used);
        if !context_read {
            return;
        }
        for id in declared(index) {
            self.manager.variable_mut(id).used = true;
        }
    }

    fn await_branch(&mut self, node: &Node, kind: ScopeKind, field: &str) -> Result<()> {
        if self.scope_kind() != Some(ScopeKind::Await) {
            return Err(InternalError::ScopeNesting {
                kind: node.kind().to_string(),
                offset: node.start,
                expected: ScopeKind::Await.as_str().to_string(),
                found: self.scope_kind().map_or("none", ScopeKind::as_str).to_string(),
            });
        }
        let scope = self.open(kind, node);
        if let Some(binding) = node.child(field) {
            self.declare_pattern(scope, binding, DefinitionKind::TemplateBinding, node)?;
        }
        self.children(node, "children")?;
        self.close()
    }

    /// Component names and directive names are plain reads of their first
    /// dotted segment.
    fn root_segment_reference(&mut self, name: &Node) -> Result<()> {
        let Some(full) = identifier_name(name) else {
            return Ok(());
        };
        let root = full.split('.').next().unwrap_or(full);
        let scope = self.scope()?;
        self.manager.add_reference(
            scope,
            root,
            (name.start, name.start + root.len() as u32),
            ReferenceFlag::Read,
            false,
        );
        Ok(())
    }

    fn inline_component(&mut self, node: &Node) -> Result<()> {
        if let Some(name) = node.child("name") {
            self.root_segment_reference(name)?;
        }
        self.children(node, "expression")?;

        self.open(ScopeKind::InlineComponent, node);
        let attributes = node.children("attributes");
        for attribute in attributes.iter().filter(|a| a.is("Let")) {
            self.let_directive(attribute)?;
        }
        for attribute in attributes.iter().filter(|a| !a.is("Let")) {
            self.visit(attribute)?;
        }
        self.children(node, "children")?;
        self.close()
    }

    fn let_directive(&mut self, node: &Node) -> Result<()> {
        let scope = self.scope()?;
        if self.manager.scope(scope).kind != ScopeKind::InlineComponent {
            return Err(InternalError::ScopeNesting {
                kind: node.kind().to_string(),
                offset: node.start,
                expected: ScopeKind::InlineComponent.as_str().to_string(),
                found: self.manager.scope(scope).kind.as_str().to_string(),
            });
        }
        let binding = node.child("expression").or_else(|| node.child("name"));
        let Some(binding) = binding else {
            return Err(InternalError::MissingDeclaration {
                kind: node.kind().to_string(),
                offset: node.start,
            });
        };
        self.declare_pattern(scope, binding, DefinitionKind::TemplateBinding, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(body: Vec<Node>) -> Node {
        Node::new("Program", 0, 40).with("body", body)
    }

    fn analyze_err(body: Vec<Node>) -> InternalError {
        analyze(&program(body), &ParserOptions::default()).unwrap_err()
    }

    #[test]
    fn test_unnormalized_fragment_is_rejected() {
        let fragment = Node::new("Fragment", 3, 9).with("children", Vec::<Node>::new());
        assert_eq!(
            analyze_err(vec![fragment]),
            InternalError::StructuralInvariant {
                kind: "Fragment".to_string(),
                offset: 3,
                reason: "markup fragments must be normalized before scope analysis".to_string(),
            }
        );
    }

    #[test]
    fn test_then_block_outside_await_is_rejected() {
        let then = Node::new("ThenBlock", 5, 20).with("children", Vec::<Node>::new());
        let InternalError::ScopeNesting { kind, offset, expected, found } = analyze_err(vec![then]) else {
            panic!("expected a nesting error");
        };
        assert_eq!((kind.as_str(), offset), ("ThenBlock", 5));
        assert_eq!(expected, ScopeKind::Await.as_str());
        assert_eq!(found, ScopeKind::Module.as_str());
    }

    #[test]
    fn test_catch_block_outside_await_is_rejected() {
        let catch = Node::new("CatchBlock", 2, 12).with("children", Vec::<Node>::new());
        assert!(matches!(
            analyze_err(vec![catch]),
            InternalError::ScopeNesting { offset: 2, .. }
        ));
    }

    #[test]
    fn test_let_directive_outside_component_is_rejected() {
        let name = Node::new("Identifier", 10, 14).with("name", "item");
        let directive = Node::new("Let", 6, 14).with("name", name);
        let element = Node::new("Element", 0, 30)
            .with("name", "div")
            .with("attributes", vec![directive])
            .with("children", Vec::<Node>::new());
        let InternalError::ScopeNesting { kind, expected, .. } = analyze_err(vec![element]) else {
            panic!("expected a nesting error");
        };
        assert_eq!(kind, "Let");
        assert_eq!(expected, ScopeKind::InlineComponent.as_str());
    }

    #[test]
    fn test_each_block_without_context_is_rejected() {
        let each = Node::new("EachBlock", 0, 20)
            .with("expression", Node::new("Identifier", 7, 12).with("name", "items"))
            .with("children", Vec::<Node>::new());
        assert_eq!(
            analyze_err(vec![each]),
            InternalError::MissingDeclaration {
                kind: "EachBlock".to_string(),
                offset: 0,
            }
        );
    }
}
