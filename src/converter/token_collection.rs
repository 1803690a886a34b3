//! Offset-indexed view over the lexer output, used to locate identifiers the
//! compiler only reports as strings.

use std::collections::HashMap;

use crate::errors::{Error, InternalError, SyntaxError, SyntaxOrigin};
use crate::position::PositionIndex;

use super::lexer::{LexKind, LexToken};

/// Which identifier is being looked up. Each kind fixes the token the owning
/// node starts at, the identifier token kind and the tokens that end the
/// search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdentifierKind {
    Component,
    Directive,
    EachIndex,
    EachKey,
    AwaitThen,
    AwaitCatch,
}

impl IdentifierKind {
    fn start(self) -> LexKind {
        match self {
            IdentifierKind::Component => LexKind::HtmlOpenStart,
            IdentifierKind::Directive => LexKind::AttributeName,
            IdentifierKind::EachIndex
            | IdentifierKind::EachKey
            | IdentifierKind::AwaitThen
            | IdentifierKind::AwaitCatch => LexKind::MustacheStart,
        }
    }

    fn identifier(self) -> LexKind {
        match self {
            IdentifierKind::Component => LexKind::ComponentIdentifier,
            IdentifierKind::Directive => LexKind::DirectiveIdentifier,
            IdentifierKind::EachIndex => LexKind::EachIndexIdentifier,
            IdentifierKind::EachKey => LexKind::EachKeyIdentifier,
            IdentifierKind::AwaitThen => LexKind::AwaitThenIdentifier,
            IdentifierKind::AwaitCatch => LexKind::AwaitCatchIdentifier,
        }
    }

    fn ends(self) -> &'static [LexKind] {
        match self {
            IdentifierKind::Component => &[LexKind::HtmlOpenEnd],
            IdentifierKind::Directive => &[
                LexKind::AttributeEqual,
                LexKind::HtmlOpenEnd,
                LexKind::AttributeName,
                LexKind::MustacheStart,
            ],
            IdentifierKind::EachIndex
            | IdentifierKind::EachKey
            | IdentifierKind::AwaitThen
            | IdentifierKind::AwaitCatch => &[LexKind::MustacheEnd],
        }
    }
}

#[derive(Debug)]
pub(crate) struct LexerTokenCollection {
    tokens: Vec<LexToken>,
    by_offset: HashMap<u32, usize>,
}

impl LexerTokenCollection {
    pub(crate) fn new(tokens: Vec<LexToken>) -> Self {
        let by_offset = tokens
            .iter()
            .enumerate()
            .map(|(i, token)| (token.offset, i))
            .collect();
        Self { tokens, by_offset }
    }

    pub(crate) fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Finds the identifier token of `kind` belonging to the node starting
    /// at `start`, checking that it spells `expected`.
    pub(crate) fn find_identifier(
        &self,
        index: &PositionIndex,
        start: u32,
        kind: IdentifierKind,
        expected: &str,
    ) -> Result<&LexToken, Error> {
        let first = *self
            .by_offset
            .get(&start)
            .ok_or(InternalError::MissingLexerToken { offset: start })?;
        let opening = &self.tokens[first];
        if opening.kind != kind.start() {
            return Err(InternalError::UnexpectedLexerToken {
                offset: start,
                expected: kind.start().name().to_string(),
                found: opening.kind.name().to_string(),
            }
            .into());
        }

        let mut last = opening;
        for token in &self.tokens[first + 1..] {
            if token.kind == kind.identifier() {
                if token.value != expected {
                    return Err(InternalError::IdentifierMismatch {
                        offset: token.offset,
                        expected: expected.to_string(),
                        found: token.value.clone(),
                    }
                    .into());
                }
                return Ok(token);
            }
            if kind.ends().contains(&token.kind) {
                break;
            }
            last = token;
        }

        let err = SyntaxError::at(
            index,
            last.offset,
            format!("Expected identifier `{expected}`"),
            SyntaxOrigin::Template,
        )?;
        Err(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::lexer::lex;

    fn collection(source: &str) -> (LexerTokenCollection, PositionIndex) {
        let index = PositionIndex::new(source);
        let tokens = lex(source, &index).unwrap();
        (LexerTokenCollection::new(tokens), index)
    }

    #[test]
    fn test_finds_directive_name() {
        let source = "<input bind:value={v}>";
        let (tokens, index) = collection(source);
        let found = tokens
            .find_identifier(&index, 7, IdentifierKind::Directive, "value")
            .unwrap();
        assert_eq!((found.offset, found.end()), (12, 17));
    }

    #[test]
    fn test_missing_directive_name_reports_last_token() {
        let source = "<div bind>";
        let (tokens, index) = collection(source);
        let err = tokens
            .find_identifier(&index, 5, IdentifierKind::Directive, "value")
            .unwrap_err();
        let syntax = err.as_syntax().unwrap();
        assert_eq!(syntax.offset, 5);
        assert_eq!(syntax.column, 6);
        assert_eq!(syntax.origin, SyntaxOrigin::Template);
    }

    #[test]
    fn test_wrong_start_token_is_internal() {
        let source = "<Foo />";
        let (tokens, index) = collection(source);
        let err = tokens
            .find_identifier(&index, 0, IdentifierKind::EachIndex, "i")
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_mismatched_name_is_internal() {
        let source = "<Foo />";
        let (tokens, index) = collection(source);
        let err = tokens
            .find_identifier(&index, 0, IdentifierKind::Component, "Bar")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Internal(InternalError::IdentifierMismatch { .. })
        ));
    }

    #[test]
    fn test_no_token_at_offset() {
        let (tokens, index) = collection("<p>text</p>");
        let err = tokens
            .find_identifier(&index, 4, IdentifierKind::Component, "p")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Internal(InternalError::MissingLexerToken { offset: 4 })
        ));
    }
}
