//! ESTree token and comment stream for a parsed script slice.
//!
//! The parser has already validated the slice, so the scanner only has to
//! classify lexemes. Division versus regular expression is decided from the
//! previous significant token; template substitutions are tracked with a
//! brace stack so `}` can resume the enclosing template.

use std::collections::HashSet;

use crate::node::{Comment, CommentKind, Token, TokenKind};

use super::ScriptError;

lazy_static::lazy_static! {
    static ref KEYWORDS: HashSet<&'static str> = [
        "break", "case", "catch", "class", "const", "continue", "debugger", "default",
        "delete", "do", "else", "export", "extends", "finally", "for", "function", "if",
        "import", "in", "instanceof", "let", "new", "return", "static", "super", "switch",
        "this", "throw", "try", "typeof", "var", "void", "while", "with", "yield",
    ]
    .into_iter()
    .collect();
}

const PUNCTUATORS: &[&str] = &[
    ">>>=", "===", "!==", "**=", "<<=", ">>=", ">>>", "...", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".", "@",
];

/// Tokenizes `text`, shifting every offset by `base`.
pub fn tokenize(text: &str, base: u32) -> Result<(Vec<Token>, Vec<Comment>), ScriptError> {
    let mut scanner = Scanner {
        text,
        pos: 0,
        base,
        tokens: Vec::new(),
        comments: Vec::new(),
        braces: Vec::new(),
    };
    scanner.run()?;
    Ok((scanner.tokens, scanner.comments))
}

struct Scanner<'t> {
    text: &'t str,
    pos: usize,
    base: u32,
    tokens: Vec<Token>,
    comments: Vec<Comment>,
    /// `true` entries are template substitutions opened by `${`.
    braces: Vec<bool>,
}

fn is_line_terminator(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn is_id_start(ch: char) -> bool {
    ch == '$' || ch == '_' || ch == '\\' || ch.is_alphabetic()
}

fn is_id_part(ch: char) -> bool {
    is_id_start(ch) || ch.is_alphanumeric() || ch == '\u{200c}' || ch == '\u{200d}'
}

impl<'t> Scanner<'t> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.text[self.pos..].chars().nth(ahead)
    }

    fn rest(&self) -> &'t str {
        &self.text[self.pos..]
    }

    fn error(&self, message: &str) -> ScriptError {
        ScriptError::new(message, self.base + self.pos as u32)
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let value = &self.text[start..self.pos];
        self.tokens.push(Token::new(
            kind,
            value,
            self.base + start as u32,
            self.base + self.pos as u32,
        ));
    }

    fn run(&mut self) -> Result<(), ScriptError> {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || ch == '\u{feff}' {
                self.pos += ch.len_utf8();
                continue;
            }
            let start = self.pos;
            if self.rest().starts_with("//") {
                self.line_comment(start);
            } else if self.rest().starts_with("/*") {
                self.block_comment(start)?;
            } else if ch == '#' && self.peek_at(1).is_some_and(is_id_start) {
                self.pos += 1;
                self.identifier_chars();
                self.push(TokenKind::PrivateIdentifier, start);
            } else if is_id_start(ch) {
                self.identifier_chars();
                let kind = match &self.text[start..self.pos] {
                    "true" | "false" => TokenKind::Boolean,
                    "null" => TokenKind::Null,
                    word if KEYWORDS.contains(word) => TokenKind::Keyword,
                    _ => TokenKind::Identifier,
                };
                self.push(kind, start);
            } else if ch.is_ascii_digit()
                || (ch == '.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()))
            {
                self.number();
                self.push(TokenKind::Numeric, start);
            } else if ch == '"' || ch == '\'' {
                self.string(ch)?;
                self.push(TokenKind::String, start);
            } else if ch == '`' {
                self.pos += 1;
                self.template_part()?;
                self.push(TokenKind::Template, start);
            } else if ch == '}' && self.braces.last() == Some(&true) {
                self.braces.pop();
                self.pos += 1;
                self.template_part()?;
                self.push(TokenKind::Template, start);
            } else if ch == '/' && self.regex_allowed() {
                self.regex()?;
                self.push(TokenKind::RegularExpression, start);
            } else {
                self.punctuator()?;
                self.push(TokenKind::Punctuator, start);
            }
        }
        if self.braces.iter().any(|open| *open) {
            return Err(self.error("Unterminated template"));
        }
        Ok(())
    }

    fn line_comment(&mut self, start: usize) {
        self.pos += 2;
        while let Some(ch) = self.peek() {
            if is_line_terminator(ch) {
                break;
            }
            self.pos += ch.len_utf8();
        }
        self.comments.push(Comment::new(
            CommentKind::Line,
            &self.text[start + 2..self.pos],
            self.base + start as u32,
            self.base + self.pos as u32,
        ));
    }

    fn block_comment(&mut self, start: usize) -> Result<(), ScriptError> {
        let close = self.text[start + 2..]
            .find("*/")
            .ok_or_else(|| self.error("Unterminated comment"))?;
        self.pos = start + 2 + close + 2;
        self.comments.push(Comment::new(
            CommentKind::Block,
            &self.text[start + 2..start + 2 + close],
            self.base + start as u32,
            self.base + self.pos as u32,
        ));
        Ok(())
    }

    fn identifier_chars(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\\' {
                // \uXXXX or \u{X...}
                self.pos += 1;
                if self.peek() == Some('u') {
                    self.pos += 1;
                    if self.peek() == Some('{') {
                        while let Some(c) = self.peek() {
                            self.pos += c.len_utf8();
                            if c == '}' {
                                break;
                            }
                        }
                    } else {
                        for _ in 0..4 {
                            if self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                                self.pos += 1;
                            }
                        }
                    }
                }
            } else if is_id_part(ch) {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
    }

    fn number(&mut self) {
        let radix_prefix = self.rest().get(..2).map(|p| p.to_ascii_lowercase());
        if matches!(radix_prefix.as_deref(), Some("0x" | "0o" | "0b")) {
            self.pos += 2;
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_hexdigit() || c == '_')
            {
                self.pos += 1;
            }
        } else {
            self.digits();
            if self.peek() == Some('.') {
                self.pos += 1;
                self.digits();
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                self.pos += 1;
                if matches!(self.peek(), Some('+' | '-')) {
                    self.pos += 1;
                }
                self.digits();
            }
        }
        if self.peek() == Some('n') {
            self.pos += 1;
        }
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
    }

    fn string(&mut self, quote: char) -> Result<(), ScriptError> {
        self.pos += 1;
        while let Some(ch) = self.peek() {
            match ch {
                '\\' => {
                    self.pos += 1;
                    if let Some(escaped) = self.peek() {
                        self.pos += escaped.len_utf8();
                        if escaped == '\r' && self.peek() == Some('\n') {
                            self.pos += 1;
                        }
                    }
                }
                c if c == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                '\n' | '\r' => break,
                c => self.pos += c.len_utf8(),
            }
        }
        Err(self.error("Unterminated string constant"))
    }

    /// Scans from just after a `` ` `` or `}` to the end of the template
    /// chunk, which is either the closing backtick or a `${`.
    fn template_part(&mut self) -> Result<(), ScriptError> {
        while let Some(ch) = self.peek() {
            match ch {
                '\\' => {
                    self.pos += 1;
                    if let Some(escaped) = self.peek() {
                        self.pos += escaped.len_utf8();
                    }
                }
                '`' => {
                    self.pos += 1;
                    return Ok(());
                }
                '$' if self.peek_at(1) == Some('{') => {
                    self.pos += 2;
                    self.braces.push(true);
                    return Ok(());
                }
                c => self.pos += c.len_utf8(),
            }
        }
        Err(self.error("Unterminated template"))
    }

    fn regex_allowed(&self) -> bool {
        match self.tokens.last() {
            None => true,
            Some(token) => match token.kind {
                TokenKind::Punctuator => {
                    !matches!(token.value.as_str(), ")" | "]" | "}" | "++" | "--")
                }
                TokenKind::Keyword => !matches!(token.value.as_str(), "this" | "super"),
                _ => false,
            },
        }
    }

    fn regex(&mut self) -> Result<(), ScriptError> {
        self.pos += 1;
        let mut in_class = false;
        loop {
            let ch = self
                .peek()
                .ok_or_else(|| self.error("Unterminated regular expression"))?;
            if is_line_terminator(ch) {
                return Err(self.error("Unterminated regular expression"));
            }
            self.pos += ch.len_utf8();
            match ch {
                '\\' => {
                    if let Some(escaped) = self.peek() {
                        self.pos += escaped.len_utf8();
                    }
                }
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => break,
                _ => {}
            }
        }
        while self.peek().is_some_and(is_id_part) {
            self.identifier_chars();
        }
        Ok(())
    }

    fn punctuator(&mut self) -> Result<(), ScriptError> {
        let rest = self.rest();
        let matched = PUNCTUATORS
            .iter()
            .find(|p| {
                rest.starts_with(**p)
                    && !(**p == "?."
                        && rest[2..].chars().next().is_some_and(|c| c.is_ascii_digit()))
            })
            .ok_or_else(|| self.error("Unexpected character"))?;
        match *matched {
            "{" => self.braces.push(false),
            "}" => {
                self.braces.pop();
            }
            _ => {}
        }
        self.pos += matched.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<(TokenKind, String)> {
        tokenize(text, 0)
            .unwrap()
            .0
            .into_iter()
            .map(|t| (t.kind, t.value))
            .collect()
    }

    #[test]
    fn test_basic_classification() {
        assert_eq!(
            kinds("const a = true ?? null;"),
            vec![
                (TokenKind::Keyword, "const".into()),
                (TokenKind::Identifier, "a".into()),
                (TokenKind::Punctuator, "=".into()),
                (TokenKind::Boolean, "true".into()),
                (TokenKind::Punctuator, "??".into()),
                (TokenKind::Null, "null".into()),
                (TokenKind::Punctuator, ";".into()),
            ]
        );
    }

    #[test]
    fn test_contextual_keywords() {
        let tokens = kinds("let a; class B { static c; } yield /re/");
        assert_eq!(tokens[0], (TokenKind::Keyword, "let".into()));
        assert_eq!(tokens[6], (TokenKind::Keyword, "static".into()));
        assert_eq!(tokens[10], (TokenKind::Keyword, "yield".into()));
        assert_eq!(tokens[11], (TokenKind::RegularExpression, "/re/".into()));
    }

    #[test]
    fn test_offsets_are_shifted_by_base() {
        let (tokens, _) = tokenize("x + 1", 10).unwrap();
        assert_eq!((tokens[0].start, tokens[0].end), (10, 11));
        assert_eq!((tokens[2].start, tokens[2].end), (14, 15));
    }

    #[test]
    fn test_regex_versus_division() {
        let tokens = kinds("a / b; x = /re/g");
        assert_eq!(tokens[1], (TokenKind::Punctuator, "/".into()));
        assert_eq!(tokens[6], (TokenKind::RegularExpression, "/re/g".into()));
    }

    #[test]
    fn test_template_with_substitutions() {
        let tokens = kinds("`a${ {b: 1}.b }c${d}`");
        assert_eq!(tokens[0], (TokenKind::Template, "`a${".into()));
        assert_eq!(tokens.last().unwrap(), &(TokenKind::Template, "}`".into()));
        assert!(tokens.contains(&(TokenKind::Template, "}c${".into())));
        assert!(tokens.contains(&(TokenKind::Punctuator, "{".into())));
    }

    #[test]
    fn test_comments_are_collected_separately() {
        let (tokens, comments) = tokenize("a // one\n/* two */ b", 0).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(comments[0].kind, CommentKind::Line);
        assert_eq!(comments[0].value, " one");
        assert_eq!(comments[1].kind, CommentKind::Block);
        assert_eq!(comments[1].value, " two ");
    }

    #[test]
    fn test_optional_chain_is_not_a_conditional() {
        let tokens = kinds("a?.b ? .5 : 1");
        assert_eq!(tokens[1], (TokenKind::Punctuator, "?.".into()));
        assert_eq!(tokens[4], (TokenKind::Numeric, ".5".into()));
    }
}
