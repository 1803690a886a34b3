//! Script parsing: the seam between template handling and the JavaScript
//! parser.

mod estree;
mod oxc;
pub mod tokens;

pub use self::oxc::OxcScriptParser;
pub(crate) use self::oxc::source_type;

use crate::errors::{InternalError, SyntaxError, SyntaxOrigin};
use crate::node::{Comment, Node, Token};
use crate::position::PositionIndex;

/// Script parser failure, positioned by absolute byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub message: String,
    pub offset: u32,
}

impl ScriptError {
    pub fn new(message: impl Into<String>, offset: u32) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }

    pub fn into_syntax_error(self, index: &PositionIndex) -> Result<SyntaxError, InternalError> {
        SyntaxError::at(index, self.offset, self.message, SyntaxOrigin::Script)
    }
}

#[derive(Debug, Clone)]
pub struct ParsedExpression {
    pub expression: Node,
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone)]
pub struct ParsedProgram {
    pub program: Node,
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
}

/// Parses slices of a component source. All returned offsets are absolute
/// positions in `source`.
pub trait ScriptParser {
    /// Parses `source[start..end]` as one expression, or as one binding
    /// pattern when `assignable` is set.
    fn parse_expression_at(
        &self,
        source: &str,
        start: u32,
        end: u32,
        assignable: bool,
    ) -> Result<ParsedExpression, ScriptError>;

    /// Parses `source[start..end]` as a whole program.
    fn parse_program(&self, source: &str, start: u32, end: u32)
        -> Result<ParsedProgram, ScriptError>;
}

pub(crate) fn slice(source: &str, start: u32, end: u32) -> Result<&str, ScriptError> {
    source
        .get(start as usize..end as usize)
        .ok_or_else(|| ScriptError::new("Expression range is outside the source", start))
}
