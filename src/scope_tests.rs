//! Scope graph tests over whole components.

use crate::scope::{DefinitionKind, ScopeId, ScopeKind, ScopeManager};
use crate::{parse_for_eslint, ParserOptions};

fn scopes(source: &str) -> ScopeManager {
    parse_for_eslint(source, &ParserOptions::default())
        .unwrap()
        .scope_manager
}

fn offset(source: &str, needle: &str) -> u32 {
    source.find(needle).unwrap() as u32
}

fn parent(manager: &ScopeManager, scope: ScopeId) -> ScopeId {
    manager.scope(scope).parent.unwrap()
}

#[test]
fn test_each_scope_declares_context_and_index() {
    let manager = scopes("{#each items as item, i}{item}{/each}");
    let each = manager.acquire("EachBlock", 0).unwrap();
    assert_eq!(manager.scope(each).kind, ScopeKind::Each);
    assert_eq!(Some(parent(&manager, each)), manager.module_scope());

    let item = manager.find_variable(each, "item").unwrap();
    assert_eq!(item.scope, each);
    assert_eq!(item.defs[0].kind, DefinitionKind::TemplateBinding);
    assert_eq!(item.references.len(), 1);
    assert!(item.used);
    let index = manager.find_variable(each, "i").unwrap();
    assert_eq!(index.scope, each);
    assert!(index.references.is_empty());
    assert!(index.used);

    // `items` is not declared anywhere and leaks to the global scope.
    let global = manager.global_scope();
    let leaked: Vec<&str> = manager
        .scope(global)
        .through
        .iter()
        .map(|&r| manager.reference(r).name.as_str())
        .collect();
    assert_eq!(leaked, vec!["items"]);
}

#[test]
fn test_each_index_stays_unused_with_unread_context() {
    let manager = scopes("{#each items as { id }, i}<p/>{/each}");
    let each = manager.acquire("EachBlock", 0).unwrap();
    assert!(!manager.find_variable(each, "id").unwrap().used);
    assert!(!manager.find_variable(each, "i").unwrap().used);

    let manager = scopes("{#each items as { id }, i}{id}{/each}");
    let each = manager.acquire("EachBlock", 0).unwrap();
    assert!(manager.find_variable(each, "i").unwrap().used);
}

#[test]
fn test_then_and_catch_scopes_parent_to_await() {
    let source = "{#await p}...{:then v}{v}{:catch e}{e}{/await}";
    let manager = scopes(source);
    let await_scope = manager.acquire("AwaitBlock", 0).unwrap();
    let then = manager.acquire("ThenBlock", offset(source, "{:then")).unwrap();
    let catch = manager.acquire("CatchBlock", offset(source, "{:catch")).unwrap();

    assert_eq!(manager.scope(then).kind, ScopeKind::AwaitThen);
    assert_eq!(manager.scope(catch).kind, ScopeKind::AwaitCatch);
    assert_eq!(parent(&manager, then), await_scope);
    assert_eq!(parent(&manager, catch), await_scope);

    assert!(manager.find_variable(then, "v").unwrap().used);
    assert!(manager.find_variable(catch, "e").unwrap().used);
    assert!(manager.find_variable(catch, "v").is_none());
    assert!(manager.find_variable(then, "e").is_none());
}

#[test]
fn test_let_directive_binds_in_component_scope() {
    let source = "<script>import Child from './Child.svelte';</script><Child let:item>{item}</Child>";
    let manager = scopes(source);
    let component = manager
        .acquire("InlineComponent", offset(source, "<Child"))
        .unwrap();
    assert_eq!(manager.scope(component).kind, ScopeKind::InlineComponent);

    let item = manager.find_variable(component, "item").unwrap();
    assert_eq!(item.scope, component);
    assert!(item.used);

    let module = manager.module_scope().unwrap();
    let child = manager.find_variable(module, "Child").unwrap();
    assert_eq!(child.defs[0].kind, DefinitionKind::ImportBinding);
    assert!(child.used);
    assert!(!child.writable);
}

#[test]
fn test_exported_props_are_hoisted_to_global() {
    let manager = scopes("<script>export let title = 'x';</script><h1>{title}</h1>");
    let global = manager.global_scope();
    let module = manager.module_scope().unwrap();
    assert!(!manager.scope(module).set.contains_key("title"));

    let id = manager.scope(global).set["title"];
    let title = manager.variable(id);
    assert_eq!(title.scope, global);
    assert!(title.used);
    assert!(title.writable);
    assert!(!title.references.is_empty());
}

#[test]
fn test_store_subscription_is_injected() {
    let source = "<script>import { writable } from 'svelte/store'; const count = writable(0);</script>{$count}";
    let manager = scopes(source);
    let global = manager.global_scope();
    let id = manager.scope(global).set["$count"];
    let store = manager.variable(id);
    assert!(store.injected);
    assert_eq!(store.references.len(), 1);
    assert!(manager.scope(global).through.is_empty());
}

#[test]
fn test_reactive_declaration_is_declared_once() {
    let source = "<script>let a = 1; $: doubled = a * 2;</script><p>{doubled}</p>";
    let manager = scopes(source);
    let module = manager.module_scope().unwrap();
    let doubled = manager.find_variable(module, "doubled").unwrap();
    assert_eq!(doubled.scope, module);
    assert_eq!(doubled.defs.len(), 1);
    assert_eq!(doubled.defs[0].kind, DefinitionKind::Reactive);
    assert!(doubled.injected);
    assert!(doubled.used);
}

#[test]
fn test_component_without_module_source_type_uses_global_scope() {
    let options = ParserOptions::from_json_str(r#"{"sourceType":"script"}"#).unwrap();
    let manager = parse_for_eslint("<script>let a = 1;</script>{a}", &options)
        .unwrap()
        .scope_manager;
    assert!(manager.module_scope().is_none());
    let global = manager.global_scope();
    assert!(manager.find_variable(global, "a").unwrap().used);
}
