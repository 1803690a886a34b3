//! Component compiler front end.
//!
//! Produces the heterogeneous template AST the converter starts from, plus
//! the compiler's diagnostics and its table of component-level variables.
//! Expression fields are placeholders: the kind the script parser reports
//! and the trimmed source span, nothing more.

mod parser;
pub mod vars;
pub mod warnings;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ParserOptions;
use crate::errors::{Error, InternalError, SyntaxError, SyntaxOrigin};
use crate::node::Node;
use crate::position::PositionIndex;
use crate::script::OxcScriptParser;

pub use self::vars::CompilerVariable;
pub use self::warnings::Warning;

/// Top-level sections of a component.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateAst {
    pub html: Node,
    pub css: Option<Node>,
    pub instance: Option<Node>,
    pub module: Option<Node>,
}

/// 1-based line, 0-based column and byte offset of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WarningPosition {
    pub line: u32,
    pub column: u32,
    pub character: u32,
}

impl WarningPosition {
    pub(crate) fn at(index: &PositionIndex, offset: u32) -> Result<Self, InternalError> {
        let position = index.locate(offset)?;
        Ok(Self {
            line: position.line,
            column: position.column,
            character: offset,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutput {
    pub ast: TemplateAst,
    pub warnings: Vec<Warning>,
    pub vars: Vec<CompilerVariable>,
}

/// An error raised while compiling a component, at a byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message} (offset {offset})")]
pub struct CompileError {
    pub code: String,
    pub message: String,
    pub offset: u32,
}

impl CompileError {
    pub fn new(code: &str, message: impl Into<String>, offset: u32) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            offset,
        }
    }

    /// The user-facing form: `"<code>: <message>"` with a 1-based column.
    /// Fails when the offset lies outside the source.
    pub fn into_syntax_error(self, index: &PositionIndex) -> Result<SyntaxError, InternalError> {
        SyntaxError::at(
            index,
            self.offset,
            format!("{}: {}", self.code, self.message),
            SyntaxOrigin::Compiler,
        )
    }
}

/// Compiles a component. Malformed markup is [`Error::Syntax`]; anything
/// else is an internal failure.
pub trait TemplateCompiler {
    fn compile(&self, source: &str) -> Result<CompileOutput, Error>;
}

/// The built-in compiler front end.
#[derive(Debug, Clone, Default)]
pub struct MarkupCompiler {
    options: ParserOptions,
}

impl MarkupCompiler {
    pub fn new(options: &ParserOptions) -> Self {
        Self {
            options: options.clone(),
        }
    }
}

impl TemplateCompiler for MarkupCompiler {
    fn compile(&self, source: &str) -> Result<CompileOutput, Error> {
        let index = PositionIndex::new(source);
        let script = OxcScriptParser::new(&self.options);
        let rejected = |err: CompileError| -> Error {
            match err.into_syntax_error(&index) {
                Ok(syntax) => syntax.into(),
                Err(internal) => internal.into(),
            }
        };
        let parsed = parser::parse(source, &script).map_err(rejected)?;
        let analysis = vars::analyze(source, &self.options, &parsed).map_err(rejected)?;
        let warnings = warnings::collect(&index, &parsed.ast, &analysis)?;
        tracing::debug!(
            warnings = warnings.len(),
            vars = analysis.vars.len(),
            "compiled component"
        );
        Ok(CompileOutput {
            ast: parsed.ast,
            warnings,
            vars: analysis.vars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_becomes_coded_syntax_error() {
        let index = PositionIndex::new("<div>\n  <p>");
        let err = CompileError::new("unclosed-element", "<p> was left open", 8);
        let syntax = err.into_syntax_error(&index).unwrap();
        assert_eq!(syntax.message, "unclosed-element: <p> was left open");
        assert_eq!((syntax.line, syntax.column), (2, 3));
        assert_eq!(syntax.offset, 8);
        assert_eq!(syntax.origin, SyntaxOrigin::Compiler);
    }

    #[test]
    fn test_offsets_past_the_source_are_internal() {
        let index = PositionIndex::new("<p>");
        assert_eq!(
            WarningPosition::at(&index, 9),
            Err(InternalError::OutOfRange { offset: 9, len: 3 })
        );
        assert_eq!(
            WarningPosition::at(&index, 3),
            Ok(WarningPosition { line: 1, column: 3, character: 3 })
        );
        let err = CompileError::new("unclosed-element", "<p> was left open", 9);
        assert!(err.into_syntax_error(&index).is_err());
    }

    #[test]
    fn test_malformed_markup_is_a_syntax_error() {
        let err = MarkupCompiler::default().compile("<div>\n  <p>").unwrap_err();
        let syntax = err.as_syntax().unwrap();
        assert!(syntax.message.starts_with("unclosed-element"));
        assert_eq!(syntax.origin, SyntaxOrigin::Compiler);
    }

    #[test]
    fn test_compile_produces_sections() {
        let source = "<script>let a = 1;</script>\n<p>{a}</p>\n<style>p {}</style>";
        let output = MarkupCompiler::default().compile(source).unwrap();
        assert!(output.ast.instance.is_some());
        assert!(output.ast.css.is_some());
        assert!(output.ast.module.is_none());
        assert_eq!(output.vars.len(), 1);
        assert!(output.vars[0].referenced);
        assert!(output.warnings.is_empty());
    }
}
