//! # Svelte ESLint native parser
//!
//! Turns a Svelte component into a single ESTree-shaped `Program` that lint
//! rules can walk: template nodes and script statements share one `body`,
//! one sorted token stream and one sorted comment stream, and a scope graph
//! covers both.
//!
//! ## Pipeline
//!
//! 1. **Compile**: the markup compiler parses the component into the template
//!    AST and reports warnings and component variables. When it rejects the
//!    source, the template lexer gets the first word: its error points at
//!    the offending character rather than the enclosing element.
//! 2. **Convert**: tag tokenizing, expression embedding and normalization run
//!    over one owned tree (see [`converter`]).
//! 3. **Analyze**: the referencer builds the scope graph, then compiler
//!    variables are reconciled with it (see [`scope`]).
//!
//! Malformed components fail with [`Error::Syntax`]. A broken internal
//! invariant fails with [`Error::Internal`] and no partial result.

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod batch;
pub mod compiler;
pub mod config;
pub mod converter;
pub mod errors;
pub mod keys;
pub mod node;
pub mod position;
pub mod rules;
pub mod scope;
pub mod script;

#[cfg(test)]
mod scope_tests;

use std::collections::BTreeMap;

use serde::Serialize;

pub use crate::compiler::{CompilerVariable, MarkupCompiler, TemplateCompiler, Warning};
pub use crate::config::{ParserOptions, ScriptSourceType};
pub use crate::errors::{Error, InternalError, Result, SyntaxError, SyntaxOrigin};
pub use crate::node::{Ast, Comment, Node, Token, TokenKind};
pub use crate::position::PositionIndex;
pub use crate::scope::ScopeManager;
pub use crate::script::{OxcScriptParser, ScriptParser};

/// Side channel handed to lint rules next to the tree.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserServices {
    pub warnings: Vec<Warning>,
    pub vars: Vec<CompilerVariable>,
    /// The original `<style>` element.
    pub css: Option<Node>,
    /// The original instance `<script>` element.
    pub js_instance: Option<Node>,
    /// The original `<script context="module">` element.
    pub js_module: Option<Node>,
}

#[derive(Debug, Clone)]
pub struct ParseResult {
    pub ast: Ast,
    pub services: ParserServices,
    pub visitor_keys: BTreeMap<&'static str, &'static [&'static str]>,
    pub scope_manager: ScopeManager,
}

/// Parses `source` with the built-in compiler and script parser.
pub fn parse_for_eslint(source: &str, options: &ParserOptions) -> Result<ParseResult> {
    let compiler = MarkupCompiler::new(options);
    let parser = OxcScriptParser::new(options);
    parse_with(source, options, &compiler, &parser)
}

pub fn parse_with(
    source: &str,
    options: &ParserOptions,
    compiler: &dyn TemplateCompiler,
    parser: &dyn ScriptParser,
) -> Result<ParseResult> {
    let span = tracing::debug_span!("parse_for_eslint", file = ?options.file_path);
    let _enter = span.enter();

    let index = PositionIndex::new(source);
    let output = match compiler.compile(source) {
        Ok(output) => output,
        Err(err) => {
            converter::lexer::lex(source, &index)?;
            return Err(err);
        }
    };
    let converted = converter::convert(output.ast, source, &index, parser, options)?;

    let mut scope_manager = scope::analyze(&converted.ast.program, options)?;
    scope::injected::apply_compiler_variables(&mut scope_manager, &output.vars)?;

    Ok(ParseResult {
        ast: converted.ast,
        services: ParserServices {
            warnings: output.warnings,
            vars: output.vars,
            css: converted.css,
            js_instance: converted.instance,
            js_module: converted.module,
        },
        visitor_keys: keys::visitor_keys(),
        scope_manager,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI BRIDGE
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NativeParseResult<'r> {
    ast: &'r Ast,
    services: &'r ParserServices,
    visitor_keys: &'r BTreeMap<&'static str, &'static [&'static str]>,
}

#[cfg(feature = "napi")]
#[napi]
pub fn parse_for_eslint_native(source: String, options_json: String) -> napi::Result<String> {
    let options = if options_json.trim().is_empty() {
        ParserOptions::default()
    } else {
        ParserOptions::from_json_str(&options_json)
            .map_err(|e| napi::Error::from_reason(e.to_string()))?
    };
    let result =
        parse_for_eslint(&source, &options).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    let native = NativeParseResult {
        ast: &result.ast,
        services: &result.services,
        visitor_keys: &result.visitor_keys,
    };
    serde_json::to_string(&native).map_err(|e| napi::Error::from_reason(e.to_string()))
}
