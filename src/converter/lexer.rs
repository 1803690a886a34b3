//! Structural lexer for component markup.
//!
//! A stack of lexical states. Each state matches a fixed set of rules against
//! the text at the cursor; a rule may emit a token, push a state or pop back
//! to the enclosing one. Zero-width rules only push or pop. Script, style and
//! comment blocks are skipped without emitting anything, as is the content
//! of a `<textarea>`. Script expressions are consumed as opaque balanced
//! text.

use crate::errors::{Error, SyntaxError, SyntaxOrigin};
use crate::node::TokenKind;
use crate::position::PositionIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum LexKind {
    HtmlOpenStart,
    HtmlTagName,
    ComponentIdentifier,
    AttributeName,
    DirectiveColon,
    DirectiveIdentifier,
    DirectivePipe,
    DirectiveModifier,
    AttributeEqual,
    AttributeValue,
    AttributeDoubleQuote,
    AttributeSingleQuote,
    HtmlOpenEnd,
    HtmlCloseStart,
    HtmlCloseEnd,
    MustacheStart,
    MustacheEnd,
    IfOpen,
    ElseOpen,
    ElseIf,
    IfClose,
    EachOpen,
    EachAs,
    EachComma,
    EachIndexIdentifier,
    EachKeyStart,
    EachKeyEnd,
    EachKeyAmpersat,
    EachKeyIdentifier,
    EachClose,
    AwaitOpen,
    AwaitCompactThen,
    AwaitFullThen,
    AwaitThenIdentifier,
    AwaitCatch,
    AwaitCatchIdentifier,
    AwaitClose,
    RawHtmlStart,
    DebugStart,
    DebugComma,
}

impl LexKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            LexKind::HtmlOpenStart => "HTML_OPEN_START",
            LexKind::HtmlTagName => "HTML_TAG_NAME",
            LexKind::ComponentIdentifier => "COMPONENT_IDENTIFIER",
            LexKind::AttributeName => "ATTRIBUTE_NAME",
            LexKind::DirectiveColon => "DIRECTIVE_COLON",
            LexKind::DirectiveIdentifier => "DIRECTIVE_IDENTIFIER",
            LexKind::DirectivePipe => "DIRECTIVE_PIPE",
            LexKind::DirectiveModifier => "DIRECTIVE_MODIFIER",
            LexKind::AttributeEqual => "ATTRIBUTE_EQUAL",
            LexKind::AttributeValue => "ATTRIBUTE_VALUE",
            LexKind::AttributeDoubleQuote => "ATTRIBUTE_DOUBLE_QUOTE",
            LexKind::AttributeSingleQuote => "ATTRIBUTE_SINGLE_QUOTE",
            LexKind::HtmlOpenEnd => "HTML_OPEN_END",
            LexKind::HtmlCloseStart => "HTML_CLOSE_START",
            LexKind::HtmlCloseEnd => "HTML_CLOSE_END",
            LexKind::MustacheStart => "MUSTACHE_START",
            LexKind::MustacheEnd => "MUSTACHE_END",
            LexKind::IfOpen => "IF_OPEN",
            LexKind::ElseOpen => "ELSE_OPEN",
            LexKind::ElseIf => "ELSE_IF",
            LexKind::IfClose => "IF_CLOSE",
            LexKind::EachOpen => "EACH_OPEN",
            LexKind::EachAs => "EACH_AS",
            LexKind::EachComma => "EACH_COMMA",
            LexKind::EachIndexIdentifier => "EACH_INDEX_IDENTIFIER",
            LexKind::EachKeyStart => "EACH_KEY_START",
            LexKind::EachKeyEnd => "EACH_KEY_END",
            LexKind::EachKeyAmpersat => "EACH_KEY_AMPERSAT",
            LexKind::EachKeyIdentifier => "EACH_KEY_IDENTIFIER",
            LexKind::EachClose => "EACH_CLOSE",
            LexKind::AwaitOpen => "AWAIT_OPEN",
            LexKind::AwaitCompactThen => "AWAIT_COMPACT_THEN",
            LexKind::AwaitFullThen => "AWAIT_FULL_THEN",
            LexKind::AwaitThenIdentifier => "AWAIT_THEN_IDENTIFIER",
            LexKind::AwaitCatch => "AWAIT_CATCH",
            LexKind::AwaitCatchIdentifier => "AWAIT_CATCH_IDENTIFIER",
            LexKind::AwaitClose => "AWAIT_CLOSE",
            LexKind::RawHtmlStart => "RAW_HTML_START",
            LexKind::DebugStart => "DEBUG_START",
            LexKind::DebugComma => "DEBUG_COMMA",
        }
    }

    /// ESTree token kind, or `None` for identifier kinds, which only become
    /// tokens when a tree node claims them.
    pub(crate) fn token_kind(self) -> Option<TokenKind> {
        match self {
            LexKind::ComponentIdentifier
            | LexKind::DirectiveIdentifier
            | LexKind::EachIndexIdentifier
            | LexKind::EachKeyIdentifier
            | LexKind::AwaitThenIdentifier
            | LexKind::AwaitCatchIdentifier => None,
            LexKind::HtmlTagName
            | LexKind::AttributeName
            | LexKind::DirectiveModifier
            | LexKind::AttributeValue => Some(TokenKind::String),
            LexKind::IfOpen
            | LexKind::ElseOpen
            | LexKind::ElseIf
            | LexKind::IfClose
            | LexKind::EachOpen
            | LexKind::EachAs
            | LexKind::EachClose
            | LexKind::AwaitOpen
            | LexKind::AwaitCompactThen
            | LexKind::AwaitFullThen
            | LexKind::AwaitCatch
            | LexKind::AwaitClose
            | LexKind::RawHtmlStart
            | LexKind::DebugStart => Some(TokenKind::Keyword),
            _ => Some(TokenKind::Punctuator),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexToken {
    pub kind: LexKind,
    pub value: String,
    pub offset: u32,
}

impl LexToken {
    pub(crate) fn end(&self) -> u32 {
        self.offset + self.value.len() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Middle,
    Tail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Main,
    HtmlOpen,
    HtmlAttributes,
    HtmlAttribute,
    HtmlAttributeName,
    DirectiveIdentifier,
    DirectiveModifiers,
    AttributeValue,
    QuotedValue(u8),
    HtmlClose,
    HtmlCloseWhitespace,
    Mustache { entered: bool },
    /// `{#if …}`, `{@html …}` and plain `{…}`: consumes the closing brace.
    ExpressionTag,
    ElseOpen,
    ElseIfExpression,
    EachOpen(Phase),
    EachExpression,
    EachContext,
    EachIndex,
    EachParenKey,
    EachAmpersatKey,
    AwaitOpen(Phase),
    AwaitExpression,
    BlockValue { kind: LexKind, compact: bool },
    DebugTag,
    MustacheCloseEnd,
}

/// Elements whose content is raw text rather than markup.
pub(crate) const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea"];

const MUSTACHE_KEYWORDS: &[(&str, LexKind)] = &[
    ("#if", LexKind::IfOpen),
    ("#each", LexKind::EachOpen),
    ("#await", LexKind::AwaitOpen),
    (":else", LexKind::ElseOpen),
    (":then", LexKind::AwaitFullThen),
    (":catch", LexKind::AwaitCatch),
    ("/if", LexKind::IfClose),
    ("/each", LexKind::EachClose),
    ("/await", LexKind::AwaitClose),
    ("@html", LexKind::RawHtmlStart),
    ("@debug", LexKind::DebugStart),
];

/// Runs the lexer over the whole component source.
pub(crate) fn lex(source: &str, index: &PositionIndex) -> Result<Vec<LexToken>, Error> {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        stack: vec![State::Main],
        tokens: Vec::new(),
        raw_text: None,
    };
    match lexer.run() {
        Ok(()) => {
            tracing::debug!(tokens = lexer.tokens.len(), "lexed template");
            Ok(lexer.tokens)
        }
        Err(offset) => {
            let snippet: String = source[offset as usize..].chars().take(12).collect();
            let err = SyntaxError::at(
                index,
                offset,
                format!("Unexpected token {snippet:?}"),
                SyntaxOrigin::Lexer,
            )?;
            Err(err.into())
        }
    }
}

fn is_space(b: u8) -> bool {
    b.is_ascii_whitespace()
}

/// Scans balanced script text from `pos`, skipping strings, template
/// literals, comments and nested brackets, until `stop` accepts a position
/// at depth 0. Returns the stopping position, or the end of input.
pub(crate) fn scan_balanced(bytes: &[u8], mut pos: usize, stop: impl Fn(usize) -> bool) -> usize {
    let mut depth = 0usize;
    while pos < bytes.len() {
        if depth == 0 && stop(pos) {
            return pos;
        }
        match bytes[pos] {
            quote @ (b'"' | b'\'') => pos = skip_string(bytes, pos, quote),
            b'`' => pos = skip_template(bytes, pos),
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                pos = match find_from(bytes, pos + 2, b"*/") {
                    Some(close) => close + 2,
                    None => bytes.len(),
                };
            }
            b'/' if bytes.get(pos + 1) == Some(&b'/') => {
                pos = find_from(bytes, pos + 2, b"\n").unwrap_or(bytes.len());
            }
            b'{' | b'[' | b'(' => {
                depth += 1;
                pos += 1;
            }
            b'}' | b']' | b')' => {
                depth = depth.saturating_sub(1);
                pos += 1;
            }
            _ => pos += 1,
        }
    }
    pos
}

fn find_from(bytes: &[u8], start: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(start..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|found| start + found)
}

fn skip_string(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b if b == quote => return pos + 1,
            _ => pos += 1,
        }
    }
    bytes.len()
}

fn skip_template(bytes: &[u8], start: usize) -> usize {
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'`' => return pos + 1,
            b'$' if bytes.get(pos + 1) == Some(&b'{') => {
                let close = scan_balanced(bytes, pos + 2, |p| bytes[p] == b'}');
                pos = close + 1;
            }
            _ => pos += 1,
        }
    }
    bytes.len()
}

/// `word` at `pos`, delimited the way a keyword between script expressions
/// is: whitespace or a closing bracket before, whitespace or an opening
/// bracket after.
pub(crate) fn is_keyword_at(bytes: &[u8], pos: usize, word: &str) -> bool {
    let end = pos + word.len();
    if bytes.get(pos..end) != Some(word.as_bytes()) || pos == 0 {
        return false;
    }
    let before = bytes[pos - 1];
    let after = bytes.get(end).copied();
    (is_space(before) || matches!(before, b')' | b']' | b'}' | b'"' | b'\'' | b'`'))
        && after.is_some_and(|b| is_space(b) || matches!(b, b'{' | b'[' | b'}'))
}

struct Lexer<'s> {
    source: &'s str,
    bytes: &'s [u8],
    pos: usize,
    stack: Vec<State>,
    tokens: Vec<LexToken>,
    /// Raw-text element whose open tag is being lexed.
    raw_text: Option<&'static str>,
}

type Step = Result<(), u32>;

impl<'s> Lexer<'s> {
    fn run(&mut self) -> Step {
        while self.pos < self.bytes.len() {
            let state = *self.stack.last().unwrap_or(&State::Main);
            self.step(state)?;
        }
        Ok(())
    }

    fn peek(&self) -> u8 {
        self.bytes[self.pos]
    }

    fn rest(&self) -> &'s str {
        &self.source[self.pos..]
    }

    fn fail(&self) -> Step {
        Err(self.pos as u32)
    }

    fn emit(&mut self, kind: LexKind, len: usize) {
        let value = self.source[self.pos..self.pos + len].to_string();
        self.tokens.push(LexToken {
            kind,
            value,
            offset: self.pos as u32,
        });
        self.pos += len;
    }

    fn push(&mut self, state: State) {
        self.stack.push(state);
    }

    fn pop(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    fn replace_top(&mut self, state: State) {
        if let Some(top) = self.stack.last_mut() {
            *top = state;
        }
    }

    fn skip_spaces(&mut self) -> bool {
        let start = self.pos;
        while self.pos < self.bytes.len() && is_space(self.bytes[self.pos]) {
            self.pos += 1;
        }
        self.pos > start
    }

    /// Length of the run at the cursor made of bytes accepted by `accept`.
    fn run_len(&self, accept: impl Fn(u8) -> bool) -> usize {
        self.bytes[self.pos..]
            .iter()
            .take_while(|b| accept(**b))
            .count()
    }

    fn skip_block(&mut self, close: &str) {
        self.pos = match self.rest().find(close) {
            Some(found) => self.pos + found + close.len(),
            None => self.bytes.len(),
        };
    }

    /// Moves to the closing tag of a raw-text element; its content is one
    /// text node and yields no tokens.
    fn skip_raw_text(&mut self, name: &str) {
        let close = format!("</{name}");
        self.pos = match self.rest().find(&close) {
            Some(found) => self.pos + found,
            None => self.bytes.len(),
        };
    }

    fn starts_tag(&self, name: &str) -> bool {
        self.rest().starts_with(name)
            && self
                .bytes
                .get(self.pos + name.len())
                .is_some_and(|b| is_space(*b) || *b == b'>')
    }

    fn step(&mut self, state: State) -> Step {
        match state {
            State::Main => self.main(),
            State::HtmlOpen => self.html_open(),
            State::HtmlAttributes => {
                if !self.skip_spaces() {
                    match self.peek() {
                        b'/' | b'>' => self.pop(),
                        _ => self.push(State::HtmlAttribute),
                    }
                }
                Ok(())
            }
            State::HtmlAttribute => self.html_attribute(),
            State::HtmlAttributeName => self.html_attribute_name(),
            State::DirectiveIdentifier => self.directive_part(LexKind::DirectiveIdentifier),
            State::DirectiveModifiers => self.directive_part(LexKind::DirectiveModifier),
            State::AttributeValue => self.attribute_value(),
            State::QuotedValue(quote) => self.quoted_value(quote),
            State::HtmlClose => {
                if self.peek() == b'>' {
                    self.emit(LexKind::HtmlCloseEnd, 1);
                    self.pop();
                    return Ok(());
                }
                let len = self.run_len(|b| !is_space(b) && b != b'>');
                if len == 0 {
                    return self.fail();
                }
                self.emit(LexKind::HtmlTagName, len);
                self.push(State::HtmlCloseWhitespace);
                Ok(())
            }
            State::HtmlCloseWhitespace => {
                if !self.skip_spaces() {
                    if self.peek() != b'>' {
                        return self.fail();
                    }
                    self.pop();
                }
                Ok(())
            }
            State::Mustache { entered } => self.mustache(entered),
            State::ExpressionTag => {
                self.pos = scan_balanced(self.bytes, self.pos, |p| self.bytes[p] == b'}');
                if self.pos < self.bytes.len() {
                    self.emit(LexKind::MustacheEnd, 1);
                    self.pop();
                }
                Ok(())
            }
            State::ElseOpen => {
                if self.skip_spaces() {
                    return Ok(());
                }
                if self.rest().starts_with("if")
                    && self
                        .bytes
                        .get(self.pos + 2)
                        .is_some_and(|b| is_space(*b))
                {
                    self.emit(LexKind::ElseIf, 2);
                    self.push(State::ElseIfExpression);
                    return Ok(());
                }
                self.close_mustache()
            }
            State::ElseIfExpression => {
                self.pos = scan_balanced(self.bytes, self.pos, |p| self.bytes[p] == b'}');
                self.pop();
                Ok(())
            }
            State::EachOpen(phase) => self.each_open(phase),
            State::EachExpression => {
                self.skip_spaces();
                let bytes = self.bytes;
                self.pos = scan_balanced(bytes, self.pos, |p| {
                    bytes[p] == b'}' || is_keyword_at(bytes, p, "as")
                });
                if self.pos >= bytes.len() || self.peek() == b'}' {
                    return self.fail();
                }
                self.emit(LexKind::EachAs, 2);
                self.pop();
                Ok(())
            }
            State::EachContext => {
                let bytes = self.bytes;
                self.pos = scan_balanced(bytes, self.pos, |p| {
                    matches!(bytes[p], b',' | b'(' | b'@' | b'}')
                });
                self.pop();
                Ok(())
            }
            State::EachIndex => {
                if self.skip_spaces() {
                    return Ok(());
                }
                let len = self.run_len(|b| !is_space(b) && !matches!(b, b'{' | b'}' | b'(' | b')' | b'@'));
                if len == 0 {
                    return self.fail();
                }
                self.emit(LexKind::EachIndexIdentifier, len);
                self.pop();
                Ok(())
            }
            State::EachParenKey => {
                let bytes = self.bytes;
                self.pos = scan_balanced(bytes, self.pos, |p| bytes[p] == b')');
                if self.pos >= bytes.len() {
                    return self.fail();
                }
                self.emit(LexKind::EachKeyEnd, 1);
                self.pop();
                Ok(())
            }
            State::EachAmpersatKey => {
                let len = self.run_len(|b| !is_space(b) && b != b'}');
                if len == 0 {
                    return self.fail();
                }
                self.emit(LexKind::EachKeyIdentifier, len);
                self.pop();
                Ok(())
            }
            State::AwaitOpen(phase) => {
                if phase == Phase::Start {
                    self.replace_top(State::AwaitOpen(Phase::Tail));
                    self.push(State::AwaitExpression);
                    return Ok(());
                }
                if self.skip_spaces() {
                    return Ok(());
                }
                self.close_mustache()
            }
            State::AwaitExpression => {
                let bytes = self.bytes;
                self.pos = scan_balanced(bytes, self.pos, |p| {
                    bytes[p] == b'}' || is_keyword_at(bytes, p, "then")
                });
                if self.pos < bytes.len() && self.peek() != b'}' {
                    self.emit(LexKind::AwaitCompactThen, 4);
                    self.replace_top(State::BlockValue {
                        kind: LexKind::AwaitThenIdentifier,
                        compact: true,
                    });
                } else {
                    self.pop();
                }
                Ok(())
            }
            State::BlockValue { kind, compact } => self.block_value(kind, compact),
            State::DebugTag => {
                let bytes = self.bytes;
                self.pos = scan_balanced(bytes, self.pos, |p| matches!(bytes[p], b',' | b'}'));
                if self.pos >= bytes.len() {
                    return Ok(());
                }
                if self.peek() == b',' {
                    self.emit(LexKind::DebugComma, 1);
                } else {
                    self.emit(LexKind::MustacheEnd, 1);
                    self.pop();
                }
                Ok(())
            }
            State::MustacheCloseEnd => {
                if self.skip_spaces() {
                    return Ok(());
                }
                self.close_mustache()
            }
        }
    }

    fn close_mustache(&mut self) -> Step {
        if self.peek() != b'}' {
            return self.fail();
        }
        self.emit(LexKind::MustacheEnd, 1);
        self.pop();
        Ok(())
    }

    fn main(&mut self) -> Step {
        if self.starts_tag("<script") {
            self.skip_block("</script>");
        } else if self.starts_tag("<style") {
            self.skip_block("</style>");
        } else if self.rest().starts_with("<!--") {
            self.skip_block("-->");
        } else if self.rest().starts_with("</") {
            self.emit(LexKind::HtmlCloseStart, 2);
            self.push(State::HtmlClose);
        } else if self.peek() == b'<' {
            self.emit(LexKind::HtmlOpenStart, 1);
            self.push(State::HtmlOpen);
        } else if self.peek() == b'{' {
            self.emit(LexKind::MustacheStart, 1);
            self.push(State::Mustache { entered: false });
        } else {
            self.pos += self.run_len(|b| b != b'<' && b != b'{');
        }
        Ok(())
    }

    fn html_open(&mut self) -> Step {
        let first = self.peek();
        if first == b'>' {
            self.emit(LexKind::HtmlOpenEnd, 1);
            self.pop();
            if let Some(name) = self.raw_text.take() {
                self.skip_raw_text(name);
            }
            return Ok(());
        }
        if self.rest().starts_with("/>") {
            self.emit(LexKind::HtmlOpenEnd, 2);
            self.pop();
            self.raw_text = None;
            return Ok(());
        }
        if is_space(first) || first == b'/' {
            return self.fail();
        }
        let len = self.run_len(|b| !is_space(b) && b != b'/' && b != b'>');
        let kind = if first.is_ascii_uppercase() {
            LexKind::ComponentIdentifier
        } else {
            LexKind::HtmlTagName
        };
        let name = &self.source[self.pos..self.pos + len];
        self.raw_text = RAW_TEXT_ELEMENTS.iter().find(|raw| **raw == name).copied();
        self.emit(kind, len);
        self.push(State::HtmlAttributes);
        Ok(())
    }

    fn html_attribute(&mut self) -> Step {
        match self.peek() {
            b'{' => {
                self.emit(LexKind::MustacheStart, 1);
                self.push(State::Mustache { entered: false });
            }
            b'=' => {
                self.emit(LexKind::AttributeEqual, 1);
                self.push(State::AttributeValue);
            }
            b'/' | b'>' => self.pop(),
            b if is_space(b) => self.pop(),
            b'}' => return self.fail(),
            _ => self.push(State::HtmlAttributeName),
        }
        Ok(())
    }

    fn html_attribute_name(&mut self) -> Step {
        let b = self.peek();
        if is_space(b) || matches!(b, b'=' | b'/' | b'>') {
            self.pop();
            return Ok(());
        }
        if b == b':' {
            let after_space = self.pos == 0 || is_space(self.bytes[self.pos - 1]);
            let nameless = self
                .bytes
                .get(self.pos + 1)
                .is_none_or(|n| is_space(*n) || matches!(n, b'>' | b'=' | b'/' | b'|'));
            if after_space || nameless {
                return self.fail();
            }
            self.emit(LexKind::DirectiveColon, 1);
            self.push(State::DirectiveIdentifier);
            return Ok(());
        }
        let len = self.run_len(|b| !is_space(b) && !matches!(b, b'\'' | b'"' | b':' | b'|' | b'=' | b'/' | b'>'));
        if len == 0 {
            return self.fail();
        }
        self.emit(LexKind::AttributeName, len);
        Ok(())
    }

    /// Directive name or modifier; both end at `|`, `=`, whitespace, `/` or `>`.
    fn directive_part(&mut self, kind: LexKind) -> Step {
        let b = self.peek();
        if is_space(b) || matches!(b, b'=' | b'/' | b'>') {
            self.pop();
            return Ok(());
        }
        if b == b'|' {
            self.emit(LexKind::DirectivePipe, 1);
            if kind == LexKind::DirectiveIdentifier {
                self.push(State::DirectiveModifiers);
            }
            return Ok(());
        }
        let len = self.run_len(|b| {
            !is_space(b) && !matches!(b, b'{' | b'}' | b'\'' | b'"' | b'|' | b'=' | b'/' | b'>')
        });
        let next = self.bytes.get(self.pos + len).copied();
        let terminated = next.is_some_and(|n| is_space(n) || matches!(n, b'|' | b'=' | b'/' | b'>'));
        if len == 0 || !terminated {
            return self.fail();
        }
        self.emit(kind, len);
        Ok(())
    }

    fn attribute_value(&mut self) -> Step {
        let b = self.peek();
        match b {
            b'{' => {
                self.emit(LexKind::MustacheStart, 1);
                self.push(State::Mustache { entered: false });
            }
            b'"' => {
                self.emit(LexKind::AttributeDoubleQuote, 1);
                self.push(State::QuotedValue(b'"'));
            }
            b'\'' => {
                self.emit(LexKind::AttributeSingleQuote, 1);
                self.push(State::QuotedValue(b'\''));
            }
            b'/' | b'>' => self.pop(),
            b if is_space(b) => self.pop(),
            _ => {
                let directly_after_equal = self.pos > 0 && self.bytes[self.pos - 1] == b'=';
                let len = self.run_len(|b| {
                    !is_space(b) && !matches!(b, b'{' | b'}' | b'\'' | b'"' | b'/' | b'>')
                });
                let next = self.bytes.get(self.pos + len).copied();
                let terminated = next.is_some_and(|n| is_space(n) || n == b'/' || n == b'>');
                if !directly_after_equal || len == 0 || !terminated {
                    return self.fail();
                }
                self.emit(LexKind::AttributeValue, len);
            }
        }
        Ok(())
    }

    fn quoted_value(&mut self, quote: u8) -> Step {
        let b = self.peek();
        if b == quote {
            if self.pos > 0 && self.bytes[self.pos - 1] == b'\\' {
                return self.fail();
            }
            let kind = if quote == b'"' {
                LexKind::AttributeDoubleQuote
            } else {
                LexKind::AttributeSingleQuote
            };
            self.emit(kind, 1);
            self.pop();
            return Ok(());
        }
        match b {
            b'{' => {
                self.emit(LexKind::MustacheStart, 1);
                self.push(State::Mustache { entered: false });
                Ok(())
            }
            b'}' => self.fail(),
            _ => {
                let len = self.run_len(|b| b != quote && b != b'{' && b != b'}');
                self.emit(LexKind::AttributeValue, len);
                Ok(())
            }
        }
    }

    fn mustache(&mut self, entered: bool) -> Step {
        if entered {
            self.pop();
            return Ok(());
        }
        if self.skip_spaces() {
            return Ok(());
        }
        self.replace_top(State::Mustache { entered: true });
        let keyword = MUSTACHE_KEYWORDS
            .iter()
            .find(|(text, _)| self.rest().starts_with(text))
            .copied();
        let Some((text, kind)) = keyword else {
            self.push(State::ExpressionTag);
            return Ok(());
        };
        self.emit(kind, text.len());
        let next = match kind {
            LexKind::IfOpen | LexKind::RawHtmlStart => State::ExpressionTag,
            LexKind::EachOpen => State::EachOpen(Phase::Start),
            LexKind::AwaitOpen => State::AwaitOpen(Phase::Start),
            LexKind::ElseOpen => State::ElseOpen,
            LexKind::AwaitFullThen => State::BlockValue {
                kind: LexKind::AwaitThenIdentifier,
                compact: false,
            },
            LexKind::AwaitCatch => State::BlockValue {
                kind: LexKind::AwaitCatchIdentifier,
                compact: false,
            },
            LexKind::DebugStart => State::DebugTag,
            _ => State::MustacheCloseEnd,
        };
        self.push(next);
        Ok(())
    }

    fn each_open(&mut self, phase: Phase) -> Step {
        match phase {
            Phase::Start => {
                self.replace_top(State::EachOpen(Phase::Middle));
                self.push(State::EachExpression);
                Ok(())
            }
            Phase::Middle => {
                self.replace_top(State::EachOpen(Phase::Tail));
                self.push(State::EachContext);
                Ok(())
            }
            Phase::Tail => {
                if self.skip_spaces() {
                    return Ok(());
                }
                match self.peek() {
                    b',' => {
                        self.emit(LexKind::EachComma, 1);
                        self.push(State::EachIndex);
                        Ok(())
                    }
                    b'(' => {
                        self.emit(LexKind::EachKeyStart, 1);
                        self.push(State::EachParenKey);
                        Ok(())
                    }
                    b'@' => {
                        self.emit(LexKind::EachKeyAmpersat, 1);
                        self.push(State::EachAmpersatKey);
                        Ok(())
                    }
                    _ => self.close_mustache(),
                }
            }
        }
    }

    /// The value or error binding after `then`/`catch`. Destructuring
    /// patterns are consumed without tokens; the script parser supplies them.
    fn block_value(&mut self, kind: LexKind, compact: bool) -> Step {
        if self.skip_spaces() {
            return Ok(());
        }
        match self.peek() {
            b'}' => {
                if compact {
                    self.pop();
                    Ok(())
                } else {
                    self.close_mustache()
                }
            }
            b'{' | b'[' => {
                let open = self.pos;
                let bytes = self.bytes;
                self.pos = scan_balanced(bytes, open + 1, |p| matches!(bytes[p], b'}' | b']'));
                self.pos = (self.pos + 1).min(bytes.len());
                if compact {
                    self.pop();
                }
                Ok(())
            }
            _ => {
                let len = self.run_len(|b| !is_space(b) && b != b'{' && b != b'}');
                self.emit(kind, len);
                if compact {
                    self.pop();
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_kinds(source: &str) -> Vec<(LexKind, String)> {
        lex(source, &PositionIndex::new(source))
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.value))
            .collect()
    }

    #[test]
    fn test_element_with_mustache() {
        use LexKind::*;
        assert_eq!(
            lex_kinds("<div>{x}</div>"),
            vec![
                (HtmlOpenStart, "<".into()),
                (HtmlTagName, "div".into()),
                (HtmlOpenEnd, ">".into()),
                (MustacheStart, "{".into()),
                (MustacheEnd, "}".into()),
                (HtmlCloseStart, "</".into()),
                (HtmlTagName, "div".into()),
                (HtmlCloseEnd, ">".into()),
            ]
        );
    }

    #[test]
    fn test_directive_with_modifiers() {
        use LexKind::*;
        let kinds: Vec<LexKind> = lex_kinds("<button on:click|once={go}>")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(
            kinds,
            vec![
                HtmlOpenStart,
                HtmlTagName,
                AttributeName,
                DirectiveColon,
                DirectiveIdentifier,
                DirectivePipe,
                DirectiveModifier,
                AttributeEqual,
                MustacheStart,
                MustacheEnd,
                HtmlOpenEnd,
            ]
        );
    }

    #[test]
    fn test_quoted_attribute_value_with_mustache() {
        use LexKind::*;
        let tokens = lex_kinds(r#"<a class="x {y} z">"#);
        assert_eq!(tokens[3], (AttributeEqual, "=".into()));
        assert_eq!(tokens[4], (AttributeDoubleQuote, "\"".into()));
        assert_eq!(tokens[5], (AttributeValue, "x ".into()));
        assert_eq!(tokens[6], (MustacheStart, "{".into()));
        assert_eq!(tokens[8], (AttributeValue, " z".into()));
        assert_eq!(tokens[9], (AttributeDoubleQuote, "\"".into()));
    }

    #[test]
    fn test_each_block_with_index_and_key() {
        use LexKind::*;
        let tokens = lex_kinds("{#each items as item, i (item.id)}{/each}");
        let kinds: Vec<LexKind> = tokens.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                MustacheStart,
                EachOpen,
                EachAs,
                EachComma,
                EachIndexIdentifier,
                EachKeyStart,
                EachKeyEnd,
                MustacheEnd,
                MustacheStart,
                EachClose,
                MustacheEnd,
            ]
        );
        assert_eq!(tokens[4].1, "i");
    }

    #[test]
    fn test_each_expression_containing_as_inside_a_word() {
        let tokens = lex_kinds("{#each classes as c}{/each}");
        assert!(tokens.contains(&(LexKind::EachAs, "as".into())));
        assert_eq!(
            tokens.iter().filter(|(k, _)| *k == LexKind::EachAs).count(),
            1
        );
    }

    #[test]
    fn test_await_compact_and_full_forms() {
        use LexKind::*;
        let compact = lex_kinds("{#await p then v}{/await}");
        assert!(compact.contains(&(AwaitCompactThen, "then".into())));
        assert!(compact.contains(&(AwaitThenIdentifier, "v".into())));

        let full = lex_kinds("{#await p}{:then value}{:catch err}{/await}");
        assert!(full.contains(&(AwaitFullThen, ":then".into())));
        assert!(full.contains(&(AwaitThenIdentifier, "value".into())));
        assert!(full.contains(&(AwaitCatchIdentifier, "err".into())));
    }

    #[test]
    fn test_script_and_style_blocks_are_skipped() {
        let tokens = lex_kinds("<script>let a = '<div>';</script><style>p{}</style><p/>");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[2], (LexKind::HtmlOpenEnd, "/>".into()));
    }

    #[test]
    fn test_else_if_chain() {
        use LexKind::*;
        let tokens = lex_kinds("{#if a}{:else if b}{:else}{/if}");
        assert!(tokens.contains(&(ElseIf, "if".into())));
        assert_eq!(tokens.iter().filter(|(k, _)| *k == ElseOpen).count(), 2);
    }

    #[test]
    fn test_colon_after_whitespace_is_rejected() {
        let source = "<div :foo>";
        let err = lex(source, &PositionIndex::new(source)).unwrap_err();
        let syntax = err.as_syntax().unwrap();
        assert_eq!(syntax.offset, 5);
        assert_eq!(syntax.origin, SyntaxOrigin::Lexer);
    }

    #[test]
    fn test_textarea_content_is_raw_text() {
        use LexKind::*;
        let tokens = lex_kinds("<textarea>{a} <b></textarea>{c}");
        let kinds: Vec<LexKind> = tokens.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                HtmlOpenStart,
                HtmlTagName,
                HtmlOpenEnd,
                HtmlCloseStart,
                HtmlTagName,
                HtmlCloseEnd,
                MustacheStart,
                MustacheEnd,
            ]
        );
        assert_eq!(tokens[4].1, "textarea");
    }

    #[test]
    fn test_self_closing_textarea_does_not_swallow_markup() {
        let tokens = lex_kinds("<textarea/>{a}");
        assert_eq!(tokens[2], (LexKind::HtmlOpenEnd, "/>".into()));
        assert_eq!(tokens[3], (LexKind::MustacheStart, "{".into()));
    }

    #[test]
    fn test_debug_commas_are_tokens() {
        let source = "{@debug a, b}";
        let tokens = lex(source, &PositionIndex::new(source)).unwrap();
        let comma = tokens.iter().find(|t| t.kind == LexKind::DebugComma).unwrap();
        assert_eq!((comma.offset, comma.value.as_str()), (9, ","));
        assert_eq!(comma.kind.token_kind(), Some(TokenKind::Punctuator));
        assert_eq!(tokens.last().map(|t| t.offset), Some(12));
    }

    #[test]
    fn test_braces_inside_comments_do_not_close_mustache() {
        let source = "{x /* } */}{y // }\n}";
        let tokens = lex(source, &PositionIndex::new(source)).unwrap();
        let ends: Vec<u32> = tokens
            .iter()
            .filter(|t| t.kind == LexKind::MustacheEnd)
            .map(|t| t.offset)
            .collect();
        assert_eq!(ends, vec![10, 19]);
    }

    #[test]
    fn test_directive_without_name_fails_at_colon() {
        let source = "<div bind:>";
        let err = lex(source, &PositionIndex::new(source)).unwrap_err();
        let syntax = err.as_syntax().unwrap();
        assert_eq!(syntax.offset, 9);
        assert_eq!(syntax.column, 10);
    }
}
