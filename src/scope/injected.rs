//! Reconciles the scope graph with the compiler's variable table.
//!
//! Store subscriptions and exported properties are known to the compiler
//! but are not always visible as declarations in the tree. Each compiler
//! variable is looked up in the top-level scopes, created in the global
//! scope when the compiler injected it, and updated with the compiler's
//! `writable`/`referenced` facts. Exported variables are hoisted into the
//! global scope.

use crate::compiler::CompilerVariable;
use crate::errors::InternalError;

use super::{Definition, DefinitionKind, ScopeManager, VariableId};

fn find_top_level(manager: &ScopeManager, name: &str) -> Option<VariableId> {
    let global = manager.global_scope();
    manager.scope(global).set.get(name).copied().or_else(|| {
        manager
            .module_scope()
            .and_then(|module| manager.scope(module).set.get(name).copied())
    })
}

pub fn apply_compiler_variables(
    manager: &mut ScopeManager,
    vars: &[CompilerVariable],
) -> Result<(), InternalError> {
    let global = manager.global_scope();
    let mut created = 0usize;
    let mut hoisted = 0usize;

    for var in vars {
        let id = match find_top_level(manager, &var.name) {
            Some(id) => id,
            None if var.injected => {
                created += 1;
                let definition = Definition {
                    kind: DefinitionKind::Injected,
                    name_start: 0,
                    name_end: 0,
                    node_kind: "Program".to_string(),
                };
                manager.declare(global, &var.name, definition)
            }
            None => {
                return Err(InternalError::MissingCompilerVariable {
                    name: var.name.clone(),
                })
            }
        };

        if var.export_name.is_some() {
            manager.hoist(id, global)?;
            hoisted += 1;
        }

        let variable = manager.variable_mut(id);
        variable.writable = var.writable;
        variable.injected |= var.injected;
        if var.referenced || var.export_name.is_some() {
            variable.used = true;
        }
    }

    manager.reresolve_global_through();
    tracing::debug!(created, hoisted, "applied compiler variables");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{ReferenceFlag, ScopeKind};

    fn var(name: &str) -> CompilerVariable {
        CompilerVariable {
            name: name.to_string(),
            writable: true,
            ..CompilerVariable::default()
        }
    }

    fn module_manager() -> ScopeManager {
        let mut manager = ScopeManager::default();
        let global = manager.push_scope(ScopeKind::Global, None, "Program", 0);
        let module = manager.push_scope(ScopeKind::Module, Some(global), "Program", 0);
        let definition = Definition {
            kind: DefinitionKind::Variable,
            name_start: 0,
            name_end: 5,
            node_kind: "VariableDeclarator".to_string(),
        };
        manager.declare(module, "count", definition);
        manager.add_reference(module, "$count", (10, 16), ReferenceFlag::Read, false);
        manager.close(module);
        manager.close(global);
        manager
    }

    #[test]
    fn test_injected_store_is_created_and_resolves_through() {
        let mut manager = module_manager();
        let store = CompilerVariable {
            injected: true,
            ..var("$count")
        };
        apply_compiler_variables(&mut manager, &[var("count"), store]).unwrap();

        let global = manager.global_scope();
        let id = manager.scope(global).set["$count"];
        let variable = manager.variable(id);
        assert!(variable.injected);
        assert_eq!(variable.references.len(), 1);
        assert!(variable.used);
        assert!(manager.scope(global).through.is_empty());
    }

    #[test]
    fn test_exported_variable_is_hoisted() {
        let mut manager = module_manager();
        let exported = CompilerVariable {
            export_name: Some("count".to_string()),
            ..var("count")
        };
        apply_compiler_variables(&mut manager, &[exported]).unwrap();

        let global = manager.global_scope();
        let module = manager.module_scope().unwrap();
        assert!(manager.scope(module).set.is_empty());
        let id = manager.scope(global).set["count"];
        assert_eq!(manager.variable(id).scope, global);
        assert!(manager.variable(id).used);
    }

    #[test]
    fn test_missing_non_injected_variable_is_internal_error() {
        let mut manager = module_manager();
        let err = apply_compiler_variables(&mut manager, &[var("ghost")]).unwrap_err();
        assert_eq!(
            err,
            InternalError::MissingCompilerVariable {
                name: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_writable_follows_compiler() {
        let mut manager = module_manager();
        let readonly = CompilerVariable {
            writable: false,
            ..var("count")
        };
        apply_compiler_variables(&mut manager, &[readonly]).unwrap();
        let module = manager.module_scope().unwrap();
        let variable = manager.find_variable(module, "count").unwrap();
        assert!(!variable.writable);
        assert!(!variable.used);
    }
}
