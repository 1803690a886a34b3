//! Error types for the parse pipeline.
//!
//! Two categories exist and they are never mixed:
//!
//! - [`SyntaxError`]: the component source is malformed. Recoverable; callers
//!   report it against the offending file and move on.
//! - [`InternalError`]: an internal consistency check failed. The produced
//!   tree can not be trusted and the parse is aborted.

use serde::Serialize;
use thiserror::Error;

use crate::position::PositionIndex;

/// Which stage rejected the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyntaxOrigin {
    Compiler,
    Script,
    Lexer,
    Template,
}

/// A user-facing syntax error with a 1-based line and 1-based column.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message} ({line}:{column})")]
pub struct SyntaxError {
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub offset: u32,
    pub origin: SyntaxOrigin,
}

impl SyntaxError {
    /// Positions `message` at `offset` using the shared line index.
    pub fn at(
        index: &PositionIndex,
        offset: u32,
        message: impl Into<String>,
        origin: SyntaxOrigin,
    ) -> Result<Self, InternalError> {
        let position = index.locate(offset)?;
        Ok(Self {
            message: message.into(),
            line: position.line,
            column: position.column + 1,
            offset,
            origin,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("`{kind}` node at offset {offset} was traversed twice")]
    DuplicateTraversal { kind: String, offset: u32 },
    #[error("template expression at offset {offset} re-parsed as `{found}`, expected `{expected}`")]
    ExpressionKindMismatch {
        offset: u32,
        expected: String,
        found: String,
    },
    #[error("identifier at offset {offset} is `{found}`, expected `{expected}`")]
    IdentifierMismatch {
        offset: u32,
        expected: String,
        found: String,
    },
    #[error("field `{field}` of `{kind}` at offset {offset} is already an identifier node")]
    AlreadyExpanded {
        kind: String,
        field: String,
        offset: u32,
    },
    #[error("no template token starts at offset {offset}")]
    MissingLexerToken { offset: u32 },
    #[error("template token at offset {offset} is `{found}`, expected `{expected}`")]
    UnexpectedLexerToken {
        offset: u32,
        expected: String,
        found: String,
    },
    #[error("offset {offset} lies outside the source text of {len} bytes")]
    OutOfRange { offset: u32, len: u32 },
    #[error("`{kind}` node at offset {offset} can not appear here: {reason}")]
    StructuralInvariant {
        kind: String,
        offset: u32,
        reason: String,
    },
    #[error("`{kind}` at offset {offset} requires an enclosing `{expected}` scope, found `{found}`")]
    ScopeNesting {
        kind: String,
        offset: u32,
        expected: String,
        found: String,
    },
    #[error("`{kind}` at offset {offset} has nothing to declare")]
    MissingDeclaration { kind: String, offset: u32 },
    #[error("traversal finished with {depth} dangling ancestry entries")]
    DanglingAncestry { depth: usize },
    #[error("more than one handler replaced `{kind}` at offset {offset}")]
    ConflictingReplacement { kind: String, offset: u32 },
    #[error("{what} at offset {offset} overlaps the previous entry ending at {previous_end}")]
    Overlap {
        what: &'static str,
        offset: u32,
        previous_end: u32,
    },
    #[error("compiler variable `{name}` has no counterpart in the scope tree")]
    MissingCompilerVariable { name: String },
    #[error("variable `{name}` is not registered in its owning scope")]
    UnregisteredVariable { name: String },
}

/// Error returned from every public entry point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
}

impl Error {
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal(_))
    }

    pub fn as_syntax(&self) -> Option<&SyntaxError> {
        match self {
            Error::Syntax(err) => Some(err),
            Error::Internal(_) => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_is_one_based() {
        let index = PositionIndex::new("ab\ncd");
        let err = SyntaxError::at(&index, 4, "Unexpected token", SyntaxOrigin::Lexer).unwrap();
        assert_eq!((err.line, err.column, err.offset), (2, 2, 4));
        assert_eq!(err.to_string(), "Unexpected token (2:2)");
    }

    #[test]
    fn test_internal_errors_are_flagged() {
        let err: Error = InternalError::DanglingAncestry { depth: 2 }.into();
        assert!(err.is_internal());
        assert!(err.as_syntax().is_none());
    }
}
