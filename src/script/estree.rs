//! Conversion from the oxc AST into owned ESTree-shaped [`Node`]s.
//!
//! Offsets reported by oxc are relative to the parsed text; `shift` maps them
//! back into the component source. Parenthesized expressions are unwrapped,
//! as ESTree has no node for them.

use oxc_ast::ast::*;
use oxc_span::{GetSpan, Span};

use crate::node::{Node, Value};

pub(super) struct EstreeBuilder<'t> {
    text: &'t str,
    shift: i64,
}

impl<'t> EstreeBuilder<'t> {
    pub(super) fn new(text: &'t str, shift: i64) -> Self {
        Self { text, shift }
    }

    fn offset(&self, pos: u32) -> u32 {
        (pos as i64 + self.shift).max(0) as u32
    }

    fn node(&self, kind: &str, span: Span) -> Node {
        Node::new(kind, self.offset(span.start), self.offset(span.end))
    }

    fn raw(&self, span: Span) -> &'t str {
        self.text
            .get(span.start as usize..span.end as usize)
            .unwrap_or_default()
    }

    fn list<T>(&self, items: &[T], convert: impl Fn(&T) -> Node) -> Value {
        Value::Nodes(items.iter().map(convert).collect())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PROGRAM AND STATEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    pub(super) fn program(&self, program: &Program<'_>, start: u32, end: u32, source_type: &str) -> Node {
        let mut body: Vec<Node> = program
            .directives
            .iter()
            .map(|directive| self.directive(directive))
            .collect();
        body.extend(program.body.iter().map(|stmt| self.statement(stmt)));
        Node::new("Program", start, end)
            .with("sourceType", source_type)
            .with("body", body)
    }

    fn directive(&self, directive: &Directive<'_>) -> Node {
        self.node("ExpressionStatement", directive.span)
            .with("expression", self.string_literal(&directive.expression))
            .with("directive", directive.directive.to_string())
    }

    fn statements(&self, statements: &[Statement<'_>]) -> Value {
        self.list(statements, |stmt| self.statement(stmt))
    }

    pub(super) fn statement(&self, stmt: &Statement<'_>) -> Node {
        match stmt {
            Statement::BlockStatement(block) => self.block(block),
            Statement::BreakStatement(s) => self
                .node("BreakStatement", s.span)
                .with("label", s.label.as_ref().map(|l| self.label(l))),
            Statement::ContinueStatement(s) => self
                .node("ContinueStatement", s.span)
                .with("label", s.label.as_ref().map(|l| self.label(l))),
            Statement::DebuggerStatement(s) => self.node("DebuggerStatement", s.span),
            Statement::DoWhileStatement(s) => self
                .node("DoWhileStatement", s.span)
                .with("body", self.statement(&s.body))
                .with("test", self.expression(&s.test)),
            Statement::EmptyStatement(s) => self.node("EmptyStatement", s.span),
            Statement::ExpressionStatement(s) => self
                .node("ExpressionStatement", s.span)
                .with("expression", self.expression(&s.expression)),
            Statement::ForInStatement(s) => self
                .node("ForInStatement", s.span)
                .with("left", self.for_left(&s.left))
                .with("right", self.expression(&s.right))
                .with("body", self.statement(&s.body)),
            Statement::ForOfStatement(s) => self
                .node("ForOfStatement", s.span)
                .with("await", s.r#await)
                .with("left", self.for_left(&s.left))
                .with("right", self.expression(&s.right))
                .with("body", self.statement(&s.body)),
            Statement::ForStatement(s) => self
                .node("ForStatement", s.span)
                .with("init", s.init.as_ref().map(|init| self.for_init(init)))
                .with("test", s.test.as_ref().map(|e| self.expression(e)))
                .with("update", s.update.as_ref().map(|e| self.expression(e)))
                .with("body", self.statement(&s.body)),
            Statement::IfStatement(s) => self
                .node("IfStatement", s.span)
                .with("test", self.expression(&s.test))
                .with("consequent", self.statement(&s.consequent))
                .with("alternate", s.alternate.as_ref().map(|a| self.statement(a))),
            Statement::LabeledStatement(s) => self
                .node("LabeledStatement", s.span)
                .with("label", self.label(&s.label))
                .with("body", self.statement(&s.body)),
            Statement::ReturnStatement(s) => self
                .node("ReturnStatement", s.span)
                .with("argument", s.argument.as_ref().map(|e| self.expression(e))),
            Statement::SwitchStatement(s) => self
                .node("SwitchStatement", s.span)
                .with("discriminant", self.expression(&s.discriminant))
                .with(
                    "cases",
                    self.list(&s.cases, |case| {
                        self.node("SwitchCase", case.span)
                            .with("test", case.test.as_ref().map(|e| self.expression(e)))
                            .with("consequent", self.statements(&case.consequent))
                    }),
                ),
            Statement::ThrowStatement(s) => self
                .node("ThrowStatement", s.span)
                .with("argument", self.expression(&s.argument)),
            Statement::TryStatement(s) => self
                .node("TryStatement", s.span)
                .with("block", self.block(&s.block))
                .with(
                    "handler",
                    s.handler.as_ref().map(|handler| {
                        self.node("CatchClause", handler.span)
                            .with(
                                "param",
                                handler
                                    .param
                                    .as_ref()
                                    .map(|param| self.binding_pattern(&param.pattern)),
                            )
                            .with("body", self.block(&handler.body))
                    }),
                )
                .with("finalizer", s.finalizer.as_ref().map(|f| self.block(f))),
            Statement::WhileStatement(s) => self
                .node("WhileStatement", s.span)
                .with("test", self.expression(&s.test))
                .with("body", self.statement(&s.body)),
            Statement::WithStatement(s) => self
                .node("WithStatement", s.span)
                .with("object", self.expression(&s.object))
                .with("body", self.statement(&s.body)),
            Statement::VariableDeclaration(decl) => self.variable_declaration(decl),
            Statement::FunctionDeclaration(func) => self.function(func, "FunctionDeclaration"),
            Statement::ClassDeclaration(class) => self.class(class, "ClassDeclaration"),
            Statement::ImportDeclaration(decl) => self.import_declaration(decl),
            Statement::ExportNamedDeclaration(decl) => self
                .node("ExportNamedDeclaration", decl.span)
                .with(
                    "declaration",
                    decl.declaration.as_ref().map(|d| self.declaration(d)),
                )
                .with(
                    "specifiers",
                    self.list(&decl.specifiers, |spec| {
                        self.node("ExportSpecifier", spec.span)
                            .with("local", self.module_export_name(&spec.local))
                            .with("exported", self.module_export_name(&spec.exported))
                    }),
                )
                .with(
                    "source",
                    decl.source.as_ref().map(|s| self.string_literal(s)),
                ),
            Statement::ExportDefaultDeclaration(decl) => {
                let declaration = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                        self.function(func, "FunctionDeclaration")
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                        self.class(class, "ClassDeclaration")
                    }
                    other => match other.as_expression() {
                        Some(expr) => self.expression(expr),
                        None => self.node("UnsupportedDeclaration", other.span()),
                    },
                };
                self.node("ExportDefaultDeclaration", decl.span)
                    .with("declaration", declaration)
            }
            Statement::ExportAllDeclaration(decl) => self
                .node("ExportAllDeclaration", decl.span)
                .with(
                    "exported",
                    decl.exported.as_ref().map(|e| self.module_export_name(e)),
                )
                .with("source", self.string_literal(&decl.source)),
            other => self.node("UnsupportedStatement", other.span()),
        }
    }

    fn block(&self, block: &BlockStatement<'_>) -> Node {
        self.node("BlockStatement", block.span)
            .with("body", self.statements(&block.body))
    }

    fn label(&self, label: &LabelIdentifier<'_>) -> Node {
        self.node("Identifier", label.span)
            .with("name", label.name.to_string())
    }

    fn for_left(&self, left: &ForStatementLeft<'_>) -> Node {
        match left {
            ForStatementLeft::VariableDeclaration(decl) => self.variable_declaration(decl),
            other => match other.as_assignment_target() {
                Some(target) => self.assignment_target(target),
                None => self.node("UnsupportedPattern", other.span()),
            },
        }
    }

    fn for_init(&self, init: &ForStatementInit<'_>) -> Node {
        match init {
            ForStatementInit::VariableDeclaration(decl) => self.variable_declaration(decl),
            other => match other.as_expression() {
                Some(expr) => self.expression(expr),
                None => self.node("UnsupportedExpression", other.span()),
            },
        }
    }

    fn declaration(&self, decl: &Declaration<'_>) -> Node {
        match decl {
            Declaration::VariableDeclaration(d) => self.variable_declaration(d),
            Declaration::FunctionDeclaration(f) => self.function(f, "FunctionDeclaration"),
            Declaration::ClassDeclaration(c) => self.class(c, "ClassDeclaration"),
            other => self.node("UnsupportedDeclaration", other.span()),
        }
    }

    fn variable_declaration(&self, decl: &VariableDeclaration<'_>) -> Node {
        let kind = match decl.kind {
            VariableDeclarationKind::Var => "var",
            VariableDeclarationKind::Let => "let",
            VariableDeclarationKind::Const => "const",
            VariableDeclarationKind::Using => "using",
            VariableDeclarationKind::AwaitUsing => "await using",
        };
        self.node("VariableDeclaration", decl.span)
            .with("kind", kind)
            .with(
                "declarations",
                self.list(&decl.declarations, |declarator| {
                    self.node("VariableDeclarator", declarator.span)
                        .with("id", self.binding_pattern(&declarator.id))
                        .with(
                            "init",
                            declarator.init.as_ref().map(|e| self.expression(e)),
                        )
                }),
            )
    }

    fn import_declaration(&self, decl: &ImportDeclaration<'_>) -> Node {
        let specifiers: Vec<Node> = decl
            .specifiers
            .iter()
            .flat_map(|specifiers| specifiers.iter())
            .map(|spec| match spec {
                ImportDeclarationSpecifier::ImportSpecifier(s) => self
                    .node("ImportSpecifier", s.span)
                    .with("imported", self.module_export_name(&s.imported))
                    .with("local", self.binding_identifier(&s.local)),
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => self
                    .node("ImportDefaultSpecifier", s.span)
                    .with("local", self.binding_identifier(&s.local)),
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => self
                    .node("ImportNamespaceSpecifier", s.span)
                    .with("local", self.binding_identifier(&s.local)),
            })
            .collect();
        self.node("ImportDeclaration", decl.span)
            .with("specifiers", specifiers)
            .with("source", self.string_literal(&decl.source))
    }

    fn module_export_name(&self, name: &ModuleExportName<'_>) -> Node {
        match name {
            ModuleExportName::IdentifierName(id) => self
                .node("Identifier", id.span)
                .with("name", id.name.to_string()),
            ModuleExportName::IdentifierReference(id) => self.identifier_reference(id),
            ModuleExportName::StringLiteral(s) => self.string_literal(s),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FUNCTIONS AND CLASSES
    // ═══════════════════════════════════════════════════════════════════════════

    fn function(&self, func: &Function<'_>, kind: &str) -> Node {
        self.node(kind, func.span)
            .with("id", func.id.as_ref().map(|id| self.binding_identifier(id)))
            .with("params", self.params(&func.params))
            .with("body", func.body.as_ref().map(|body| self.function_body(body)))
            .with("async", func.r#async)
            .with("generator", func.generator)
            .with("expression", false)
    }

    fn params(&self, params: &FormalParameters<'_>) -> Value {
        let mut nodes: Vec<Node> = params
            .items
            .iter()
            .map(|param| self.binding_pattern(&param.pattern))
            .collect();
        if let Some(rest) = &params.rest {
            nodes.push(
                self.node("RestElement", rest.span)
                    .with("argument", self.binding_pattern(&rest.rest.argument)),
            );
        }
        Value::Nodes(nodes)
    }

    fn function_body(&self, body: &FunctionBody<'_>) -> Node {
        let mut statements: Vec<Node> = body
            .directives
            .iter()
            .map(|directive| self.directive(directive))
            .collect();
        statements.extend(body.statements.iter().map(|stmt| self.statement(stmt)));
        self.node("BlockStatement", body.span).with("body", statements)
    }

    fn arrow(&self, arrow: &ArrowFunctionExpression<'_>) -> Node {
        let body = match arrow.body.statements.first() {
            Some(Statement::ExpressionStatement(stmt)) if arrow.expression => {
                self.expression(&stmt.expression)
            }
            _ => self.function_body(&arrow.body),
        };
        self.node("ArrowFunctionExpression", arrow.span)
            .with("id", Value::Null)
            .with("params", self.params(&arrow.params))
            .with("body", body)
            .with("async", arrow.r#async)
            .with("generator", false)
            .with("expression", arrow.expression)
    }

    fn class(&self, class: &Class<'_>, kind: &str) -> Node {
        let elements: Vec<Node> = class
            .body
            .body
            .iter()
            .map(|element| match element {
                ClassElement::MethodDefinition(method) => {
                    let kind = match method.kind {
                        MethodDefinitionKind::Constructor => "constructor",
                        MethodDefinitionKind::Method => "method",
                        MethodDefinitionKind::Get => "get",
                        MethodDefinitionKind::Set => "set",
                    };
                    self.node("MethodDefinition", method.span)
                        .with("key", self.property_key(&method.key))
                        .with("value", self.function(&method.value, "FunctionExpression"))
                        .with("kind", kind)
                        .with("computed", method.computed)
                        .with("static", method.r#static)
                }
                ClassElement::PropertyDefinition(prop) => self
                    .node("PropertyDefinition", prop.span)
                    .with("key", self.property_key(&prop.key))
                    .with("value", prop.value.as_ref().map(|v| self.expression(v)))
                    .with("computed", prop.computed)
                    .with("static", prop.r#static),
                ClassElement::StaticBlock(block) => self
                    .node("StaticBlock", block.span)
                    .with("body", self.statements(&block.body)),
                other => self.node("UnsupportedClassElement", other.span()),
            })
            .collect();
        self.node(kind, class.span)
            .with("id", class.id.as_ref().map(|id| self.binding_identifier(id)))
            .with(
                "superClass",
                class.super_class.as_ref().map(|e| self.expression(e)),
            )
            .with(
                "body",
                self.node("ClassBody", class.body.span).with("body", elements),
            )
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════════

    fn expressions(&self, expressions: &[Expression<'_>]) -> Value {
        self.list(expressions, |expr| self.expression(expr))
    }

    pub(super) fn expression(&self, expr: &Expression<'_>) -> Node {
        match expr {
            Expression::BooleanLiteral(lit) => self.literal(lit.span, Value::Bool(lit.value)),
            Expression::NullLiteral(lit) => self.literal(lit.span, Value::Null),
            Expression::NumericLiteral(lit) => self.literal(lit.span, Value::Number(lit.value)),
            Expression::BigIntLiteral(lit) => {
                let raw = self.raw(lit.span);
                self.literal(lit.span, Value::Null)
                    .with("bigint", raw.trim_end_matches('n').to_string())
            }
            Expression::RegExpLiteral(lit) => {
                let raw = self.raw(lit.span);
                let (pattern, flags) = match raw.rfind('/') {
                    Some(last) if last > 0 => (&raw[1..last], &raw[last + 1..]),
                    _ => (raw, ""),
                };
                self.literal(lit.span, Value::Null).with(
                    "regex",
                    Value::Object(vec![
                        ("pattern".to_string(), pattern.into()),
                        ("flags".to_string(), flags.into()),
                    ]),
                )
            }
            Expression::StringLiteral(lit) => self.string_literal(lit),
            Expression::TemplateLiteral(tpl) => self.template_literal(tpl),
            Expression::Identifier(id) => self.identifier_reference(id),
            Expression::MetaProperty(meta) => self
                .node("MetaProperty", meta.span)
                .with("meta", self.identifier_name(&meta.meta))
                .with("property", self.identifier_name(&meta.property)),
            Expression::Super(s) => self.node("Super", s.span),
            Expression::ArrayExpression(array) => {
                let has_holes = array
                    .elements
                    .iter()
                    .any(|el| matches!(el, ArrayExpressionElement::Elision(_)));
                let converted = array.elements.iter().map(|el| match el {
                    ArrayExpressionElement::SpreadElement(spread) => Some(self.spread(spread)),
                    ArrayExpressionElement::Elision(_) => None,
                    other => Some(match other.as_expression() {
                        Some(e) => self.expression(e),
                        None => self.node("UnsupportedExpression", other.span()),
                    }),
                });
                let elements = if has_holes {
                    Value::Sparse(converted.collect())
                } else {
                    Value::Nodes(converted.flatten().collect())
                };
                self.node("ArrayExpression", array.span)
                    .with("elements", elements)
            }
            Expression::ArrowFunctionExpression(arrow) => self.arrow(arrow),
            Expression::AssignmentExpression(assign) => self
                .node("AssignmentExpression", assign.span)
                .with("operator", assign.operator.as_str())
                .with("left", self.assignment_target(&assign.left))
                .with("right", self.expression(&assign.right)),
            Expression::AwaitExpression(e) => self
                .node("AwaitExpression", e.span)
                .with("argument", self.expression(&e.argument)),
            Expression::BinaryExpression(bin) => self
                .node("BinaryExpression", bin.span)
                .with("operator", bin.operator.as_str())
                .with("left", self.expression(&bin.left))
                .with("right", self.expression(&bin.right)),
            Expression::CallExpression(call) => self.call(call),
            Expression::ChainExpression(chain) => {
                let inner = match &chain.expression {
                    ChainElement::CallExpression(call) => self.call(call),
                    ChainElement::StaticMemberExpression(m) => self.static_member(m),
                    ChainElement::ComputedMemberExpression(m) => self.computed_member(m),
                    ChainElement::PrivateFieldExpression(m) => self.private_field(m),
                    other => self.node("UnsupportedExpression", other.span()),
                };
                self.node("ChainExpression", chain.span)
                    .with("expression", inner)
            }
            Expression::ClassExpression(class) => self.class(class, "ClassExpression"),
            Expression::ConditionalExpression(cond) => self
                .node("ConditionalExpression", cond.span)
                .with("test", self.expression(&cond.test))
                .with("consequent", self.expression(&cond.consequent))
                .with("alternate", self.expression(&cond.alternate)),
            Expression::FunctionExpression(func) => self.function(func, "FunctionExpression"),
            Expression::ImportExpression(import) => self
                .node("ImportExpression", import.span)
                .with("source", self.expression(&import.source)),
            Expression::LogicalExpression(logical) => self
                .node("LogicalExpression", logical.span)
                .with("operator", logical.operator.as_str())
                .with("left", self.expression(&logical.left))
                .with("right", self.expression(&logical.right)),
            Expression::NewExpression(new) => self
                .node("NewExpression", new.span)
                .with("callee", self.expression(&new.callee))
                .with("arguments", self.arguments(&new.arguments)),
            Expression::ObjectExpression(object) => self
                .node("ObjectExpression", object.span)
                .with(
                    "properties",
                    self.list(&object.properties, |prop| match prop {
                        ObjectPropertyKind::ObjectProperty(p) => {
                            let kind = match p.kind {
                                PropertyKind::Init => "init",
                                PropertyKind::Get => "get",
                                PropertyKind::Set => "set",
                            };
                            self.node("Property", p.span)
                                .with("key", self.property_key(&p.key))
                                .with("value", self.expression(&p.value))
                                .with("kind", kind)
                                .with("method", p.method)
                                .with("shorthand", p.shorthand)
                                .with("computed", p.computed)
                        }
                        ObjectPropertyKind::SpreadProperty(spread) => self.spread(spread),
                    }),
                ),
            Expression::ParenthesizedExpression(paren) => self.expression(&paren.expression),
            Expression::SequenceExpression(seq) => self
                .node("SequenceExpression", seq.span)
                .with("expressions", self.expressions(&seq.expressions)),
            Expression::TaggedTemplateExpression(tagged) => self
                .node("TaggedTemplateExpression", tagged.span)
                .with("tag", self.expression(&tagged.tag))
                .with("quasi", self.template_literal(&tagged.quasi)),
            Expression::ThisExpression(this) => self.node("ThisExpression", this.span),
            Expression::UnaryExpression(unary) => self
                .node("UnaryExpression", unary.span)
                .with("operator", unary.operator.as_str())
                .with("prefix", true)
                .with("argument", self.expression(&unary.argument)),
            Expression::UpdateExpression(update) => self
                .node("UpdateExpression", update.span)
                .with("operator", update.operator.as_str())
                .with("prefix", update.prefix)
                .with("argument", self.simple_assignment_target(&update.argument)),
            Expression::YieldExpression(y) => self
                .node("YieldExpression", y.span)
                .with("delegate", y.delegate)
                .with("argument", y.argument.as_ref().map(|e| self.expression(e))),
            Expression::PrivateInExpression(private_in) => self
                .node("BinaryExpression", private_in.span)
                .with("operator", "in")
                .with("left", self.private_identifier(&private_in.left))
                .with("right", self.expression(&private_in.right)),
            Expression::StaticMemberExpression(m) => self.static_member(m),
            Expression::ComputedMemberExpression(m) => self.computed_member(m),
            Expression::PrivateFieldExpression(m) => self.private_field(m),
            Expression::TSAsExpression(ts) => self
                .node("TSAsExpression", ts.span)
                .with("expression", self.expression(&ts.expression)),
            Expression::TSSatisfiesExpression(ts) => self
                .node("TSSatisfiesExpression", ts.span)
                .with("expression", self.expression(&ts.expression)),
            Expression::TSNonNullExpression(ts) => self
                .node("TSNonNullExpression", ts.span)
                .with("expression", self.expression(&ts.expression)),
            other => self.node("UnsupportedExpression", other.span()),
        }
    }

    fn literal(&self, span: Span, value: Value) -> Node {
        self.node("Literal", span)
            .with("value", value)
            .with("raw", self.raw(span))
    }

    fn string_literal(&self, lit: &StringLiteral<'_>) -> Node {
        self.literal(lit.span, Value::String(lit.value.to_string()))
    }

    fn template_literal(&self, tpl: &TemplateLiteral<'_>) -> Node {
        let quasis = self.list(&tpl.quasis, |quasi| {
            let cooked = quasi
                .value
                .cooked
                .as_ref()
                .map_or(Value::Null, |c| Value::String(c.to_string()));
            self.node("TemplateElement", quasi.span)
                .with(
                    "value",
                    Value::Object(vec![
                        ("raw".to_string(), quasi.value.raw.to_string().into()),
                        ("cooked".to_string(), cooked),
                    ]),
                )
                .with("tail", quasi.tail)
        });
        self.node("TemplateLiteral", tpl.span)
            .with("quasis", quasis)
            .with("expressions", self.expressions(&tpl.expressions))
    }

    fn call(&self, call: &CallExpression<'_>) -> Node {
        self.node("CallExpression", call.span)
            .with("callee", self.expression(&call.callee))
            .with("arguments", self.arguments(&call.arguments))
            .with("optional", call.optional)
    }

    fn arguments(&self, arguments: &[Argument<'_>]) -> Value {
        self.list(arguments, |arg| match arg {
            Argument::SpreadElement(spread) => self.spread(spread),
            other => match other.as_expression() {
                Some(e) => self.expression(e),
                None => self.node("UnsupportedExpression", other.span()),
            },
        })
    }

    fn spread(&self, spread: &SpreadElement<'_>) -> Node {
        self.node("SpreadElement", spread.span)
            .with("argument", self.expression(&spread.argument))
    }

    fn member(&self, span: Span, object: Node, property: Node, computed: bool, optional: bool) -> Node {
        self.node("MemberExpression", span)
            .with("object", object)
            .with("property", property)
            .with("computed", computed)
            .with("optional", optional)
    }

    fn static_member(&self, m: &StaticMemberExpression<'_>) -> Node {
        self.member(
            m.span,
            self.expression(&m.object),
            self.identifier_name(&m.property),
            false,
            m.optional,
        )
    }

    fn computed_member(&self, m: &ComputedMemberExpression<'_>) -> Node {
        self.member(
            m.span,
            self.expression(&m.object),
            self.expression(&m.expression),
            true,
            m.optional,
        )
    }

    fn private_field(&self, m: &PrivateFieldExpression<'_>) -> Node {
        self.member(
            m.span,
            self.expression(&m.object),
            self.private_identifier(&m.field),
            false,
            m.optional,
        )
    }

    fn property_key(&self, key: &PropertyKey<'_>) -> Node {
        match key {
            PropertyKey::StaticIdentifier(id) => self.identifier_name(id),
            PropertyKey::PrivateIdentifier(id) => self.private_identifier(id),
            other => match other.as_expression() {
                Some(e) => self.expression(e),
                None => self.node("UnsupportedExpression", other.span()),
            },
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // IDENTIFIERS AND PATTERNS
    // ═══════════════════════════════════════════════════════════════════════════

    fn identifier_reference(&self, id: &IdentifierReference<'_>) -> Node {
        self.node("Identifier", id.span)
            .with("name", id.name.to_string())
    }

    fn binding_identifier(&self, id: &BindingIdentifier<'_>) -> Node {
        self.node("Identifier", id.span)
            .with("name", id.name.to_string())
    }

    fn identifier_name(&self, id: &IdentifierName<'_>) -> Node {
        self.node("Identifier", id.span)
            .with("name", id.name.to_string())
    }

    fn private_identifier(&self, id: &PrivateIdentifier<'_>) -> Node {
        self.node("PrivateIdentifier", id.span)
            .with("name", id.name.to_string())
    }

    pub(super) fn binding_pattern(&self, pattern: &BindingPattern<'_>) -> Node {
        match pattern {
            BindingPattern::BindingIdentifier(id) => self.binding_identifier(id),
            BindingPattern::ObjectPattern(object) => {
                let mut properties: Vec<Node> = object
                    .properties
                    .iter()
                    .map(|prop| {
                        self.node("Property", prop.span)
                            .with("key", self.property_key(&prop.key))
                            .with("value", self.binding_pattern(&prop.value))
                            .with("kind", "init")
                            .with("method", false)
                            .with("shorthand", prop.shorthand)
                            .with("computed", prop.computed)
                    })
                    .collect();
                if let Some(rest) = &object.rest {
                    properties.push(
                        self.node("RestElement", rest.span)
                            .with("argument", self.binding_pattern(&rest.argument)),
                    );
                }
                self.node("ObjectPattern", object.span)
                    .with("properties", properties)
            }
            BindingPattern::ArrayPattern(array) => {
                let mut elements: Vec<Option<Node>> = array
                    .elements
                    .iter()
                    .map(|el| el.as_ref().map(|p| self.binding_pattern(p)))
                    .collect();
                if let Some(rest) = &array.rest {
                    elements.push(Some(
                        self.node("RestElement", rest.span)
                            .with("argument", self.binding_pattern(&rest.argument)),
                    ));
                }
                self.node("ArrayPattern", array.span)
                    .with("elements", sparse_or_dense(elements))
            }
            BindingPattern::AssignmentPattern(assign) => self
                .node("AssignmentPattern", assign.span)
                .with("left", self.binding_pattern(&assign.left))
                .with("right", self.expression(&assign.right)),
            #[allow(unreachable_patterns)]
            other => self.node("UnsupportedPattern", other.span()),
        }
    }

    fn assignment_target(&self, target: &AssignmentTarget<'_>) -> Node {
        match target {
            AssignmentTarget::AssignmentTargetIdentifier(id) => self.identifier_reference(id),
            AssignmentTarget::StaticMemberExpression(m) => self.static_member(m),
            AssignmentTarget::ComputedMemberExpression(m) => self.computed_member(m),
            AssignmentTarget::PrivateFieldExpression(m) => self.private_field(m),
            AssignmentTarget::ArrayAssignmentTarget(array) => {
                let mut elements: Vec<Option<Node>> = array
                    .elements
                    .iter()
                    .map(|el| el.as_ref().map(|t| self.maybe_default(t)))
                    .collect();
                if let Some(rest) = &array.rest {
                    elements.push(Some(
                        self.node("RestElement", rest.span)
                            .with("argument", self.assignment_target(&rest.target)),
                    ));
                }
                self.node("ArrayPattern", array.span)
                    .with("elements", sparse_or_dense(elements))
            }
            AssignmentTarget::ObjectAssignmentTarget(object) => {
                let mut properties: Vec<Node> = object
                    .properties
                    .iter()
                    .map(|prop| match prop {
                        AssignmentTargetProperty::AssignmentTargetPropertyIdentifier(p) => {
                            let key = self.identifier_reference(&p.binding);
                            let value = match &p.init {
                                Some(init) => self
                                    .node("AssignmentPattern", p.span)
                                    .with("left", key.clone())
                                    .with("right", self.expression(init)),
                                None => key.clone(),
                            };
                            self.node("Property", p.span)
                                .with("key", key)
                                .with("value", value)
                                .with("kind", "init")
                                .with("method", false)
                                .with("shorthand", true)
                                .with("computed", false)
                        }
                        AssignmentTargetProperty::AssignmentTargetPropertyProperty(p) => self
                            .node("Property", p.span)
                            .with("key", self.property_key(&p.name))
                            .with("value", self.maybe_default(&p.binding))
                            .with("kind", "init")
                            .with("method", false)
                            .with("shorthand", false)
                            .with("computed", p.computed),
                    })
                    .collect();
                if let Some(rest) = &object.rest {
                    properties.push(
                        self.node("RestElement", rest.span)
                            .with("argument", self.assignment_target(&rest.target)),
                    );
                }
                self.node("ObjectPattern", object.span)
                    .with("properties", properties)
            }
            other => self.node("UnsupportedPattern", other.span()),
        }
    }

    fn maybe_default(&self, target: &AssignmentTargetMaybeDefault<'_>) -> Node {
        match target {
            AssignmentTargetMaybeDefault::AssignmentTargetWithDefault(with_default) => self
                .node("AssignmentPattern", with_default.span)
                .with("left", self.assignment_target(&with_default.binding))
                .with("right", self.expression(&with_default.init)),
            other => match other.as_assignment_target() {
                Some(t) => self.assignment_target(t),
                None => self.node("UnsupportedPattern", other.span()),
            },
        }
    }

    fn simple_assignment_target(&self, target: &SimpleAssignmentTarget<'_>) -> Node {
        match target {
            SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => self.identifier_reference(id),
            SimpleAssignmentTarget::StaticMemberExpression(m) => self.static_member(m),
            SimpleAssignmentTarget::ComputedMemberExpression(m) => self.computed_member(m),
            SimpleAssignmentTarget::PrivateFieldExpression(m) => self.private_field(m),
            other => self.node("UnsupportedPattern", other.span()),
        }
    }
}

fn sparse_or_dense(elements: Vec<Option<Node>>) -> Value {
    if elements.iter().all(Option::is_some) {
        Value::Nodes(elements.into_iter().flatten().collect())
    } else {
        Value::Sparse(elements)
    }
}
