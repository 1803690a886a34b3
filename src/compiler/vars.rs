//! Component-level variable table.
//!
//! Every top-level declaration of the module and instance scripts becomes a
//! [`CompilerVariable`]. Names the compiler introduces on its own (store
//! subscriptions and undeclared `$:` assignments) are added as injected
//! variables. Usage flags come from walking the scripts and re-parsing every
//! template expression span.

use std::collections::{HashMap, HashSet};

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    AssignmentTarget, AssignmentTargetPropertyIdentifier, BindingIdentifier, Declaration,
    Expression, IdentifierReference, ImportDeclarationSpecifier, ModuleExportName,
    SimpleAssignmentTarget, Statement, VariableDeclaration, VariableDeclarationKind,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::SourceType;
use serde::{Deserialize, Serialize};

use crate::config::ParserOptions;
use crate::node::Node;
use crate::script::source_type;

use super::parser::Parsed;
use super::CompileError;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompilerVariable {
    pub name: String,
    pub export_name: Option<String>,
    pub injected: bool,
    pub module: bool,
    pub mutated: bool,
    pub reassigned: bool,
    pub referenced: bool,
    pub referenced_from_script: bool,
    pub writable: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Analysis {
    pub vars: Vec<CompilerVariable>,
    /// Span of the declaring identifier of each non-injected variable.
    pub declarations: HashMap<String, (u32, u32)>,
    /// Template references that resolve to nothing the component declares.
    pub undeclared: Vec<(String, u32)>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLECTORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Names bound by a declaration pattern. Default values are skipped.
struct PatternNames<'n> {
    names: &'n mut Vec<(String, u32, u32)>,
}

impl<'n, 'a> Visit<'a> for PatternNames<'n> {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.names
            .push((ident.name.to_string(), ident.span.start, ident.span.end));
    }

    fn visit_expression(&mut self, _expr: &Expression<'a>) {}
}

/// References, local bindings, reassignments and mutations of one program
/// or expression. Offsets are shifted by `offset` to absolute positions.
#[derive(Debug, Default)]
struct UsageCollector {
    offset: u32,
    references: Vec<(String, u32)>,
    bindings: HashSet<String>,
    reassigned: HashSet<String>,
    mutated: HashSet<String>,
}

fn root_identifier(mut expr: &Expression<'_>) -> Option<String> {
    loop {
        match expr {
            Expression::Identifier(id) => return Some(id.name.to_string()),
            Expression::StaticMemberExpression(member) => expr = &member.object,
            Expression::ComputedMemberExpression(member) => expr = &member.object,
            Expression::PrivateFieldExpression(member) => expr = &member.object,
            Expression::ParenthesizedExpression(inner) => expr = &inner.expression,
            _ => return None,
        }
    }
}

impl<'a> Visit<'a> for UsageCollector {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        self.references
            .push((ident.name.to_string(), ident.span.start + self.offset));
    }

    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.bindings.insert(ident.name.to_string());
    }

    fn visit_simple_assignment_target(&mut self, target: &SimpleAssignmentTarget<'a>) {
        if let SimpleAssignmentTarget::AssignmentTargetIdentifier(id) = target {
            self.reassigned.insert(id.name.to_string());
        } else if let Some(root) = target
            .as_member_expression()
            .and_then(|member| root_identifier(member.object()))
        {
            self.mutated.insert(root);
        }
        walk::walk_simple_assignment_target(self, target);
    }

    fn visit_assignment_target_property_identifier(
        &mut self,
        property: &AssignmentTargetPropertyIdentifier<'a>,
    ) {
        self.reassigned.insert(property.binding.name.to_string());
        walk::walk_assignment_target_property_identifier(self, property);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYSIS
// ═══════════════════════════════════════════════════════════════════════════════

struct VariableTable {
    source_type: SourceType,
    vars: Vec<CompilerVariable>,
    by_name: HashMap<String, usize>,
    declarations: HashMap<String, (u32, u32)>,
    /// `export { local as exported }` entries, applied after all
    /// declarations are known.
    export_specifiers: Vec<(String, String)>,
    /// Undeclared `$:` assignment targets.
    reactive: Vec<String>,
}

impl VariableTable {
    fn declare(&mut self, name: String, span: (u32, u32), variable: CompilerVariable) {
        if self.by_name.contains_key(&name) {
            return;
        }
        self.by_name.insert(name.clone(), self.vars.len());
        self.declarations.insert(name, span);
        self.vars.push(variable);
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut CompilerVariable> {
        let slot = *self.by_name.get(name)?;
        self.vars.get_mut(slot)
    }

    fn inject(&mut self, name: &str, writable: bool) {
        if self.by_name.contains_key(name) {
            return;
        }
        self.by_name.insert(name.to_string(), self.vars.len());
        self.vars.push(CompilerVariable {
            name: name.to_string(),
            injected: true,
            writable,
            ..CompilerVariable::default()
        });
    }

    fn parse_error(&self, message: String, offset: u32) -> CompileError {
        CompileError::new("parse-error", message, offset)
    }

    fn script_content(script: &Node) -> Option<(u32, u32)> {
        script.child("content").map(|content| (content.start, content.end))
    }

    fn declare_variables(
        &mut self,
        decl: &VariableDeclaration<'_>,
        offset: u32,
        module: bool,
        exported: bool,
    ) {
        let writable = matches!(
            decl.kind,
            VariableDeclarationKind::Var | VariableDeclarationKind::Let
        );
        let mut names = Vec::new();
        for declarator in &decl.declarations {
            PatternNames { names: &mut names }.visit_binding_pattern(&declarator.id);
        }
        for (name, start, end) in names {
            let variable = CompilerVariable {
                name: name.clone(),
                export_name: exported.then(|| name.clone()),
                module,
                writable,
                ..CompilerVariable::default()
            };
            self.declare(name, (start + offset, end + offset), variable);
        }
    }

    fn declare_binding(
        &mut self,
        ident: &BindingIdentifier<'_>,
        offset: u32,
        module: bool,
        exported: bool,
    ) {
        let name = ident.name.to_string();
        let variable = CompilerVariable {
            name: name.clone(),
            export_name: exported.then(|| name.clone()),
            module,
            ..CompilerVariable::default()
        };
        self.declare(
            name,
            (ident.span.start + offset, ident.span.end + offset),
            variable,
        );
    }

    fn declaration(&mut self, decl: &Declaration<'_>, offset: u32, module: bool, exported: bool) {
        match decl {
            Declaration::VariableDeclaration(decl) => {
                self.declare_variables(decl, offset, module, exported)
            }
            Declaration::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    self.declare_binding(id, offset, module, exported);
                }
            }
            Declaration::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    self.declare_binding(id, offset, module, exported);
                }
            }
            _ => {}
        }
    }

    fn statement(&mut self, stmt: &Statement<'_>, offset: u32, module: bool) {
        match stmt {
            Statement::VariableDeclaration(decl) => self.declare_variables(decl, offset, module, false),
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    self.declare_binding(id, offset, module, false);
                }
            }
            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    self.declare_binding(id, offset, module, false);
                }
            }
            Statement::ImportDeclaration(import) => {
                for specifier in import.specifiers.iter().flat_map(|s| s.iter()) {
                    let local = match specifier {
                        ImportDeclarationSpecifier::ImportSpecifier(s) => &s.local,
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => &s.local,
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => &s.local,
                    };
                    self.declare_binding(local, offset, module, false);
                }
            }
            Statement::ExportNamedDeclaration(export) => {
                if let Some(decl) = &export.declaration {
                    self.declaration(decl, offset, module, true);
                }
                if export.source.is_none() {
                    for specifier in &export.specifiers {
                        self.export_specifiers.push((
                            module_export_name(&specifier.local),
                            module_export_name(&specifier.exported),
                        ));
                    }
                }
            }
            Statement::LabeledStatement(labeled) if labeled.label.name.as_str() == "$" => {
                if let Statement::ExpressionStatement(stmt) = &labeled.body {
                    if let Expression::AssignmentExpression(assign) = &stmt.expression {
                        if let AssignmentTarget::AssignmentTargetIdentifier(id) = &assign.left {
                            self.reactive.push(id.name.to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Declares the script's top-level names and returns its usage.
    fn script(&mut self, source: &str, script: &Node, module: bool) -> Result<UsageCollector, CompileError> {
        let Some((start, end)) = Self::script_content(script) else {
            return Ok(UsageCollector::default());
        };
        let text = source.get(start as usize..end as usize).unwrap_or_default();
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, text, self.source_type).parse();
        if let Some(error) = ret.errors.first() {
            return Err(self.parse_error(error.to_string(), start));
        }
        for stmt in &ret.program.body {
            self.statement(stmt, start, module);
        }
        let mut usage = UsageCollector {
            offset: start,
            ..UsageCollector::default()
        };
        usage.visit_program(&ret.program);
        Ok(usage)
    }

    fn expression(&self, source: &str, start: u32, end: u32) -> Result<UsageCollector, CompileError> {
        let text = source.get(start as usize..end as usize).unwrap_or_default();
        let allocator = Allocator::default();
        let expr = Parser::new(&allocator, text, self.source_type)
            .parse_expression()
            .map_err(|errors| {
                let message = errors
                    .first()
                    .map_or_else(|| "Invalid expression".to_string(), ToString::to_string);
                self.parse_error(message, start)
            })?;
        let mut usage = UsageCollector {
            offset: start,
            ..UsageCollector::default()
        };
        usage.visit_expression(&expr);
        Ok(usage)
    }
}

fn module_export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(literal) => literal.value.to_string(),
    }
}

/// Store subscription name for `$store`, if `name` has that shape.
fn store_name(name: &str) -> Option<&str> {
    name.strip_prefix('$')
        .filter(|rest| !rest.is_empty() && !rest.starts_with('$'))
}

pub(crate) fn analyze(
    source: &str,
    options: &ParserOptions,
    parsed: &Parsed,
) -> Result<Analysis, CompileError> {
    let mut table = VariableTable {
        source_type: source_type(options),
        vars: Vec::new(),
        by_name: HashMap::new(),
        declarations: HashMap::new(),
        export_specifiers: Vec::new(),
        reactive: Vec::new(),
    };

    let mut script_usage = Vec::new();
    if let Some(module) = &parsed.ast.module {
        script_usage.push(table.script(source, module, true)?);
    }
    if let Some(instance) = &parsed.ast.instance {
        script_usage.push(table.script(source, instance, false)?);
    }

    for (local, exported) in std::mem::take(&mut table.export_specifiers) {
        if let Some(variable) = table.get_mut(&local) {
            variable.export_name = Some(exported);
        }
    }
    for name in std::mem::take(&mut table.reactive) {
        table.inject(&name, true);
    }

    for usage in &script_usage {
        for (name, _) in &usage.references {
            if let Some(store) = store_name(name) {
                if table.by_name.contains_key(store) {
                    table.inject(name, true);
                }
            }
            if let Some(variable) = table.get_mut(name) {
                variable.referenced_from_script = true;
            }
        }
        for name in &usage.reassigned {
            if let Some(variable) = table.get_mut(name) {
                variable.reassigned = true;
            }
        }
        for name in &usage.mutated {
            if let Some(variable) = table.get_mut(name) {
                variable.mutated = true;
            }
        }
    }

    let template_declared: HashSet<&str> = parsed
        .sites
        .declared
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();
    let mut undeclared = Vec::new();
    for &(start, end) in &parsed.sites.expressions {
        let usage = table.expression(source, start, end)?;
        for (name, offset) in usage.references {
            if usage.bindings.contains(&name) || template_declared.contains(name.as_str()) {
                continue;
            }
            if let Some(store) = store_name(&name) {
                if table.by_name.contains_key(store) {
                    table.inject(&name, true);
                }
            }
            match table.get_mut(&name) {
                Some(variable) => variable.referenced = true,
                None => undeclared.push((name, offset)),
            }
        }
    }

    for &(start, end) in &parsed.sites.bindings {
        let text = source.get(start as usize..end as usize).unwrap_or_default();
        let allocator = Allocator::default();
        let Ok(expr) = Parser::new(&allocator, text, table.source_type).parse_expression() else {
            continue;
        };
        let (name, reassigned) = match &expr {
            Expression::Identifier(id) => (Some(id.name.to_string()), true),
            other => (root_identifier(other), false),
        };
        let Some(name) = name else { continue };
        if template_declared.contains(name.as_str()) {
            continue;
        }
        if let Some(variable) = table.get_mut(&name) {
            if reassigned {
                variable.reassigned = true;
            } else {
                variable.mutated = true;
            }
        }
    }

    tracing::trace!(
        vars = table.vars.len(),
        undeclared = undeclared.len(),
        "analyzed component variables"
    );
    Ok(Analysis {
        vars: table.vars,
        declarations: table.declarations,
        undeclared,
    })
}
