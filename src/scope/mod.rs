//! Lexical scope graph for the converted tree.
//!
//! Scopes, variables and references live in flat arenas owned by
//! [`ScopeManager`] and point at each other through typed indices. The
//! graph is built by [`analyze`] and then reconciled with the compiler's
//! variable table by [`injected::apply_compiler_variables`].

pub mod injected;
mod referencer;

use std::collections::HashMap;

use crate::errors::InternalError;

pub use self::referencer::analyze;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Global,
    Module,
    Function,
    FunctionExpressionName,
    Block,
    Catch,
    For,
    Switch,
    Class,
    Await,
    AwaitThen,
    AwaitCatch,
    Each,
    InlineComponent,
}

impl ScopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::Global => "global",
            ScopeKind::Module => "module",
            ScopeKind::Function => "function",
            ScopeKind::FunctionExpressionName => "function-expression-name",
            ScopeKind::Block => "block",
            ScopeKind::Catch => "catch",
            ScopeKind::For => "for",
            ScopeKind::Switch => "switch",
            ScopeKind::Class => "class",
            ScopeKind::Await => "await",
            ScopeKind::AwaitThen => "await:then",
            ScopeKind::AwaitCatch => "await:catch",
            ScopeKind::Each => "each",
            ScopeKind::InlineComponent => "component",
        }
    }

    /// Scopes that receive hoisted `var` declarations.
    pub fn is_variable_scope(self) -> bool {
        matches!(self, ScopeKind::Global | ScopeKind::Module | ScopeKind::Function)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Variable,
    Parameter,
    FunctionName,
    ClassName,
    ImportBinding,
    CatchClause,
    /// Each context or index, await value or error, `let:` binding.
    TemplateBinding,
    /// `$: name = ...` without another declaration of `name`.
    Reactive,
    /// Created for a compiler-injected variable.
    Injected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub kind: DefinitionKind,
    /// Span of the declaring identifier.
    pub name_start: u32,
    pub name_end: u32,
    /// Kind of the declaring node, e.g. `VariableDeclarator` or `EachBlock`.
    pub node_kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceFlag {
    Read,
    Write,
    ReadWrite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub from: ScopeId,
    pub resolved: Option<VariableId>,
    pub flag: ReferenceFlag,
    /// Write from a declarator initialiser.
    pub init: bool,
}

impl Reference {
    pub fn is_read(&self) -> bool {
        matches!(self.flag, ReferenceFlag::Read | ReferenceFlag::ReadWrite)
    }

    pub fn is_write(&self) -> bool {
        matches!(self.flag, ReferenceFlag::Write | ReferenceFlag::ReadWrite)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub scope: ScopeId,
    pub defs: Vec<Definition>,
    pub references: Vec<ReferenceId>,
    pub used: bool,
    pub writable: bool,
    pub injected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Kind and start of the node that opened the scope.
    pub block_kind: String,
    pub block_start: u32,
    pub variables: Vec<VariableId>,
    pub set: HashMap<String, VariableId>,
    pub references: Vec<ReferenceId>,
    /// References left unresolved when the scope closed.
    pub through: Vec<ReferenceId>,
    left: Vec<ReferenceId>,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeManager {
    scopes: Vec<Scope>,
    variables: Vec<Variable>,
    references: Vec<Reference>,
}

impl ScopeManager {
    pub fn global_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn variable(&self, id: VariableId) -> &Variable {
        &self.variables[id.0]
    }

    pub fn reference(&self, id: ReferenceId) -> &Reference {
        &self.references[id.0]
    }

    pub fn scope_ids(&self) -> impl Iterator<Item = ScopeId> {
        (0..self.scopes.len()).map(ScopeId)
    }

    /// First scope opened by the node of `kind` starting at `start`.
    pub fn acquire(&self, kind: &str, start: u32) -> Option<ScopeId> {
        self.scopes
            .iter()
            .position(|s| s.block_kind == kind && s.block_start == start)
            .map(ScopeId)
    }

    /// Resolves `name` from `scope` outwards.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<VariableId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scope(id);
            if let Some(&variable) = scope.set.get(name) {
                return Some(variable);
            }
            current = scope.parent;
        }
        None
    }

    pub fn find_variable(&self, scope: ScopeId, name: &str) -> Option<&Variable> {
        self.lookup(scope, name).map(|id| self.variable(id))
    }

    /// The module scope directly under the global scope, if any.
    pub fn module_scope(&self) -> Option<ScopeId> {
        self.scope(self.global_scope())
            .children
            .iter()
            .copied()
            .find(|&id| self.scope(id).kind == ScopeKind::Module)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CONSTRUCTION
    // ═══════════════════════════════════════════════════════════════════════

    pub(crate) fn push_scope(
        &mut self,
        kind: ScopeKind,
        parent: Option<ScopeId>,
        block_kind: &str,
        block_start: u32,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            kind,
            parent,
            children: Vec::new(),
            block_kind: block_kind.to_string(),
            block_start,
            variables: Vec::new(),
            set: HashMap::new(),
            references: Vec::new(),
            through: Vec::new(),
            left: Vec::new(),
        });
        if let Some(parent) = parent {
            self.scopes[parent.0].children.push(id);
        }
        id
    }

    /// Adds `definition` to the variable `name` in `scope`, creating it on
    /// first sight.
    pub(crate) fn declare(&mut self, scope: ScopeId, name: &str, definition: Definition) -> VariableId {
        if let Some(&existing) = self.scopes[scope.0].set.get(name) {
            self.variables[existing.0].defs.push(definition);
            return existing;
        }
        let id = VariableId(self.variables.len());
        let writable = !matches!(
            definition.kind,
            DefinitionKind::ImportBinding | DefinitionKind::ClassName
        );
        self.variables.push(Variable {
            name: name.to_string(),
            scope,
            defs: vec![definition],
            references: Vec::new(),
            used: false,
            writable,
            injected: false,
        });
        let target = &mut self.scopes[scope.0];
        target.variables.push(id);
        target.set.insert(name.to_string(), id);
        id
    }

    pub(crate) fn add_reference(
        &mut self,
        from: ScopeId,
        name: &str,
        span: (u32, u32),
        flag: ReferenceFlag,
        init: bool,
    ) -> ReferenceId {
        let id = ReferenceId(self.references.len());
        self.references.push(Reference {
            name: name.to_string(),
            start: span.0,
            end: span.1,
            from,
            resolved: None,
            flag,
            init,
        });
        let scope = &mut self.scopes[from.0];
        scope.references.push(id);
        scope.left.push(id);
        id
    }

    fn resolve(&mut self, reference: ReferenceId, variable: VariableId) {
        let read = self.references[reference.0].is_read();
        self.references[reference.0].resolved = Some(variable);
        let target = &mut self.variables[variable.0];
        target.references.push(reference);
        if read {
            target.used = true;
        }
    }

    /// Resolves the references left in `scope` against its own variables
    /// and hands the rest to the parent.
    pub(crate) fn close(&mut self, scope: ScopeId) {
        let left = std::mem::take(&mut self.scopes[scope.0].left);
        let parent = self.scopes[scope.0].parent;
        for reference in left {
            let name = &self.references[reference.0].name;
            match self.scopes[scope.0].set.get(name).copied() {
                Some(variable) => self.resolve(reference, variable),
                None => {
                    self.scopes[scope.0].through.push(reference);
                    if let Some(parent) = parent {
                        self.scopes[parent.0].left.push(reference);
                    }
                }
            }
        }
        tracing::trace!(
            kind = self.scopes[scope.0].kind.as_str(),
            through = self.scopes[scope.0].through.len(),
            "closed scope"
        );
    }

    pub(crate) fn variable_mut(&mut self, id: VariableId) -> &mut Variable {
        &mut self.variables[id.0]
    }

    /// Moves `variable` from its owning scope into `target`.
    pub(crate) fn hoist(&mut self, variable: VariableId, target: ScopeId) -> Result<(), InternalError> {
        let owner = self.variables[variable.0].scope;
        if owner == target {
            return Ok(());
        }
        let name = self.variables[variable.0].name.clone();
        let scope = &mut self.scopes[owner.0];
        if scope.set.get(&name) != Some(&variable) {
            return Err(InternalError::UnregisteredVariable { name });
        }
        scope.set.remove(&name);
        scope.variables.retain(|&v| v != variable);

        let target_scope = &mut self.scopes[target.0];
        target_scope.variables.push(variable);
        target_scope.set.insert(name, variable);
        self.variables[variable.0].scope = target;
        Ok(())
    }

    /// Resolves global `through` references against variables that were
    /// added to the global scope after it closed.
    pub(crate) fn reresolve_global_through(&mut self) {
        let global = self.global_scope();
        let through = std::mem::take(&mut self.scopes[global.0].through);
        for reference in through {
            let name = &self.references[reference.0].name;
            match self.scopes[global.0].set.get(name).copied() {
                Some(variable) => self.resolve(reference, variable),
                None => self.scopes[global.0].through.push(reference),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(kind: DefinitionKind) -> Definition {
        Definition {
            kind,
            name_start: 0,
            name_end: 1,
            node_kind: "VariableDeclarator".to_string(),
        }
    }

    #[test]
    fn test_close_resolves_locally_and_propagates_the_rest() {
        let mut manager = ScopeManager::default();
        let global = manager.push_scope(ScopeKind::Global, None, "Program", 0);
        let block = manager.push_scope(ScopeKind::Block, Some(global), "BlockStatement", 0);
        let a = manager.declare(block, "a", definition(DefinitionKind::Variable));
        let read_a = manager.add_reference(block, "a", (2, 3), ReferenceFlag::Read, false);
        let read_b = manager.add_reference(block, "b", (4, 5), ReferenceFlag::Read, false);
        manager.close(block);
        manager.close(global);

        assert_eq!(manager.reference(read_a).resolved, Some(a));
        assert!(manager.variable(a).used);
        assert_eq!(manager.scope(block).through, vec![read_b]);
        assert_eq!(manager.scope(global).through, vec![read_b]);
    }

    #[test]
    fn test_write_reference_does_not_mark_used() {
        let mut manager = ScopeManager::default();
        let global = manager.push_scope(ScopeKind::Global, None, "Program", 0);
        let a = manager.declare(global, "a", definition(DefinitionKind::Variable));
        manager.add_reference(global, "a", (0, 1), ReferenceFlag::Write, true);
        manager.close(global);
        assert!(!manager.variable(a).used);
        assert_eq!(manager.variable(a).references.len(), 1);
    }

    #[test]
    fn test_hoist_moves_storage_and_owner() {
        let mut manager = ScopeManager::default();
        let global = manager.push_scope(ScopeKind::Global, None, "Program", 0);
        let module = manager.push_scope(ScopeKind::Module, Some(global), "Program", 0);
        let a = manager.declare(module, "a", definition(DefinitionKind::Variable));
        manager.hoist(a, global).unwrap();
        assert!(manager.scope(module).set.is_empty());
        assert!(manager.scope(module).variables.is_empty());
        assert_eq!(manager.scope(global).set.get("a"), Some(&a));
        assert_eq!(manager.variable(a).scope, global);
        assert_eq!(manager.module_scope(), Some(module));
    }

    #[test]
    fn test_lookup_walks_parents() {
        let mut manager = ScopeManager::default();
        let global = manager.push_scope(ScopeKind::Global, None, "Program", 0);
        let each = manager.push_scope(ScopeKind::Each, Some(global), "EachBlock", 4);
        let x = manager.declare(global, "x", definition(DefinitionKind::Variable));
        assert_eq!(manager.lookup(each, "x"), Some(x));
        assert_eq!(manager.lookup(global, "y"), None);
        assert_eq!(manager.acquire("EachBlock", 4), Some(each));
        assert_eq!(ScopeKind::AwaitThen.as_str(), "await:then");
    }
}
