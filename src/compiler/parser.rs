//! Recursive-descent markup parser.
//!
//! Builds the template AST in one forward scan. Child lists stop at the
//! first construct they can not own (a closing tag, a block close or a
//! `{:else}`/`{:then}`/`{:catch}` branch) and hand it to the caller.

use regex::Regex;

use crate::converter::lexer::{is_keyword_at, scan_balanced, RAW_TEXT_ELEMENTS};
use crate::node::{Node, Value};
use crate::script::{ParsedExpression, ScriptParser};

use super::{CompileError, TemplateAst};

lazy_static::lazy_static! {
    static ref COMPONENT_NAME: Regex = Regex::new(r"^[A-Z]|\.").unwrap();
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap();
}

const VOID_ELEMENTS: &[&str] = &[
    "!doctype", "area", "base", "br", "col", "command", "embed", "hr", "img", "input", "keygen",
    "link", "meta", "param", "source", "track", "wbr",
];

/// Source spans the variable analysis needs from the template.
#[derive(Debug, Clone, Default)]
pub(crate) struct TemplateSites {
    /// Expressions evaluated by the template.
    pub expressions: Vec<(u32, u32)>,
    /// `bind:` targets, which the template writes to.
    pub bindings: Vec<(u32, u32)>,
    /// Names declared by template syntax, with their offsets.
    pub declared: Vec<(String, u32)>,
}

#[derive(Debug, Clone)]
pub(crate) struct Parsed {
    pub ast: TemplateAst,
    pub sites: TemplateSites,
}

pub(crate) fn parse(
    source: &str,
    script: &dyn ScriptParser,
) -> Result<Parsed, CompileError> {
    let mut parser = MarkupParser {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        script,
        css: None,
        instance: None,
        module: None,
        sites: TemplateSites::default(),
    };
    let (children, stop) = parser.nodes(0, "Fragment")?;
    match stop {
        Stop::Eof => {}
        Stop::CloseTag { name, start } => {
            return Err(parser.error(
                "invalid-closing-tag",
                format!("</{name}> attempted to close an element that was not open"),
                start,
            ))
        }
        Stop::BlockClose { keyword, start } => {
            return Err(parser.error(
                "unexpected-block-close",
                format!("Unexpected block closing tag {{/{keyword}}}"),
                start,
            ))
        }
        Stop::Branch { keyword, start } => {
            return Err(parser.error(
                "invalid-branch",
                format!("Unexpected {{:{keyword}}} outside of a block"),
                start,
            ))
        }
    }

    let start = children.first().map_or(0, |n| n.start);
    let end = children.last().map_or(0, |n| n.end);
    let html = Node::new("Fragment", start, end).with("children", children);
    tracing::trace!(
        instance = parser.instance.is_some(),
        module = parser.module.is_some(),
        css = parser.css.is_some(),
        "parsed markup"
    );
    Ok(Parsed {
        ast: TemplateAst {
            html,
            css: parser.css,
            instance: parser.instance,
            module: parser.module,
        },
        sites: parser.sites,
    })
}

/// Why a child list ended. Offsets point at the opening `<` or `{`.
#[derive(Debug)]
enum Stop {
    Eof,
    CloseTag { name: String, start: usize },
    BlockClose { keyword: String, start: usize },
    Branch { keyword: String, start: usize },
}

struct MarkupParser<'s> {
    source: &'s str,
    bytes: &'s [u8],
    pos: usize,
    script: &'s dyn ScriptParser,
    css: Option<Node>,
    instance: Option<Node>,
    module: Option<Node>,
    sites: TemplateSites,
}

type PResult<T> = Result<T, CompileError>;

fn element_kind(name: &str, parent: &str) -> &'static str {
    match name {
        "svelte:head" => "Head",
        "svelte:options" => "Options",
        "svelte:window" => "Window",
        "svelte:body" => "Body",
        "svelte:self" | "svelte:component" => "InlineComponent",
        "slot" => "Slot",
        "title" if parent == "Head" => "Title",
        _ if COMPONENT_NAME.is_match(name) => "InlineComponent",
        _ => "Element",
    }
}

fn directive_kind(prefix: &str) -> Option<&'static str> {
    match prefix {
        "on" => Some("EventHandler"),
        "bind" => Some("Binding"),
        "class" => Some("Class"),
        "use" => Some("Action"),
        "transition" | "in" | "out" => Some("Transition"),
        "animate" => Some("Animation"),
        "let" => Some("Let"),
        _ => None,
    }
}

impl<'s> MarkupParser<'s> {
    fn error(&self, code: &str, message: impl Into<String>, offset: usize) -> CompileError {
        CompileError::new(code, message, offset as u32)
    }

    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn rest(&self) -> &'s str {
        &self.source[self.pos..]
    }

    fn skip_spaces(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn skip_spaces_from(&self, mut pos: usize) -> usize {
        while self.bytes.get(pos).is_some_and(|b| b.is_ascii_whitespace()) {
            pos += 1;
        }
        pos
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.rest().starts_with(text) {
            self.pos += text.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, text: &str) -> PResult<()> {
        if self.eat(text) {
            return Ok(());
        }
        let (code, message) = if self.eof() {
            ("unexpected-eof", "Unexpected end of input".to_string())
        } else {
            ("unexpected-token", format!("Expected {text}"))
        };
        Err(self.error(code, message, self.pos))
    }

    fn read_while(&mut self, accept: impl Fn(u8) -> bool) -> &'s str {
        let start = self.pos;
        while self.peek().is_some_and(&accept) {
            self.pos += 1;
        }
        &self.source[start..self.pos]
    }

    fn word_at(&self, pos: usize) -> &'s str {
        let pos = pos.min(self.bytes.len());
        let end = self.bytes[pos..]
            .iter()
            .take_while(|b| b.is_ascii_alphabetic())
            .count();
        &self.source[pos..pos + end]
    }

    fn trimmed(&self, mut start: usize, mut end: usize) -> (usize, usize) {
        while start < end && self.bytes[start].is_ascii_whitespace() {
            start += 1;
        }
        while end > start && self.bytes[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
        (start, end)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════

    fn parse_span(&self, start: usize, end: usize, assignable: bool) -> PResult<ParsedExpression> {
        if start == end {
            return Err(self.error("parse-error", "Expected an expression", start));
        }
        self.script
            .parse_expression_at(self.source, start as u32, end as u32, assignable)
            .map_err(|err| self.error("parse-error", err.message, err.offset as usize))
    }

    /// Placeholder for the expression in `start..end`.
    fn expression(&mut self, start: usize, end: usize) -> PResult<Node> {
        let (start, end) = self.trimmed(start, end);
        let parsed = self.parse_span(start, end, false)?;
        self.sites.expressions.push((start as u32, end as u32));
        Ok(Node::placeholder(parsed.expression.kind(), start as u32, end as u32))
    }

    /// Placeholder for a binding pattern; its names are recorded as
    /// template declarations.
    fn pattern(&mut self, start: usize, end: usize) -> PResult<Node> {
        let (start, end) = self.trimmed(start, end);
        let parsed = self.parse_span(start, end, true)?;
        for id in parsed.expression.pattern_identifiers() {
            if let Some(name) = id.str_field("name") {
                self.sites.declared.push((name.to_string(), id.start));
            }
        }
        Ok(Node::placeholder(parsed.expression.kind(), start as u32, end as u32))
    }

    /// Each/await value: a bare name stays a string, anything else is a
    /// pattern placeholder.
    fn block_value(&mut self, start: usize, end: usize) -> PResult<Value> {
        let (start, end) = self.trimmed(start, end);
        let text = &self.source[start..end];
        if text.is_empty() {
            return Ok(Value::Null);
        }
        if IDENTIFIER.is_match(text) {
            self.sites.declared.push((text.to_string(), start as u32));
            return Ok(Value::from(text));
        }
        Ok(Value::from(self.pattern(start, end)?))
    }

    /// Expression up to the closing `}` of the current tag, consuming it.
    fn expression_to_brace(&mut self) -> PResult<Node> {
        let start = self.pos;
        let end = scan_balanced(self.bytes, start, |p| self.bytes[p] == b'}');
        if end >= self.bytes.len() {
            return Err(self.error("unexpected-eof", "Expected }", start));
        }
        let expression = self.expression(start, end)?;
        self.pos = end + 1;
        Ok(expression)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FRAGMENTS
    // ═══════════════════════════════════════════════════════════════════════

    fn nodes(&mut self, depth: usize, parent: &'static str) -> PResult<(Vec<Node>, Stop)> {
        let mut nodes = Vec::new();
        loop {
            if self.eof() {
                return Ok((nodes, Stop::Eof));
            }
            let start = self.pos;
            if self.rest().starts_with("<!--") {
                nodes.push(self.comment()?);
            } else if self.rest().starts_with("</") {
                let name_start = start + 2;
                let name = self.source[name_start..]
                    .split(|c: char| c.is_ascii_whitespace() || c == '>')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                return Ok((nodes, Stop::CloseTag { name, start }));
            } else if self.peek() == Some(b'<') {
                if let Some(element) = self.element(depth, parent)? {
                    nodes.push(element);
                }
            } else if self.peek() == Some(b'{') {
                let inner = self.skip_spaces_from(start + 1);
                match self.bytes.get(inner) {
                    Some(b'/') => {
                        let keyword = self.word_at(inner + 1).to_string();
                        return Ok((nodes, Stop::BlockClose { keyword, start }));
                    }
                    Some(b':') => {
                        let keyword = self.word_at(inner + 1).to_string();
                        return Ok((nodes, Stop::Branch { keyword, start }));
                    }
                    _ => nodes.push(self.mustache(depth)?),
                }
            } else {
                nodes.push(self.text());
            }
        }
    }

    fn text(&mut self) -> Node {
        let start = self.pos;
        let data = self.read_while(|b| b != b'<' && b != b'{');
        Node::new("Text", start as u32, self.pos as u32)
            .with("raw", data)
            .with("data", data)
    }

    fn comment(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.pos += 4;
        let Some(close) = self.rest().find("-->") else {
            return Err(self.error("unclosed-comment", "comment was left open", start));
        };
        let data = &self.source[self.pos..self.pos + close];
        self.pos += close + 3;
        Ok(Node::new("Comment", start as u32, self.pos as u32).with("data", data))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ELEMENTS
    // ═══════════════════════════════════════════════════════════════════════

    /// Parses one element. Top-level `<script>` and `<style>` are stored on
    /// the parser instead of returned.
    fn element(&mut self, depth: usize, parent: &'static str) -> PResult<Option<Node>> {
        let start = self.pos;
        self.pos += 1;
        let name = self
            .read_while(|b| !b.is_ascii_whitespace() && b != b'/' && b != b'>')
            .to_string();
        if name.is_empty() {
            return Err(self.error("expected-tag-name", "Expected a tag name", start + 1));
        }
        if depth == 0 && (name == "script" || name == "style") {
            self.top_level_block(&name, start)?;
            return Ok(None);
        }

        let mut attributes = self.attributes()?;
        let self_closing = self.eat("/>");
        if !self_closing {
            self.expect(">")?;
        }

        let kind = element_kind(&name, parent);
        let mut node = Node::new(kind, start as u32, 0).with("name", name.as_str());
        if name == "svelte:component" {
            let this = attributes
                .iter()
                .position(|a| a.is("Attribute") && a.str_field("name") == Some("this"));
            let expression = this
                .map(|i| attributes.remove(i))
                .and_then(|mut attribute| match attribute.remove("value") {
                    Some(Value::Nodes(mut values)) if values.len() == 1 && values[0].is("MustacheTag") => {
                        values.remove(0).take_child("expression")
                    }
                    _ => None,
                });
            let Some(expression) = expression else {
                return Err(self.error(
                    "missing-component-definition",
                    "<svelte:component> must have a 'this' attribute",
                    start,
                ));
            };
            node.set("expression", expression);
        }
        node.set("attributes", attributes);

        if self_closing || VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str()) {
            node.set("children", Vec::<Node>::new());
            node.end = self.pos as u32;
            return Ok(Some(node));
        }

        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            let close = format!("</{name}");
            let Some(found) = self.rest().find(&close) else {
                return Err(self.error("unclosed-element", format!("<{name}> was left open"), start));
            };
            let text_start = self.pos;
            self.pos += found;
            let data = &self.source[text_start..self.pos];
            let children = if data.is_empty() {
                Vec::new()
            } else {
                vec![Node::new("Text", text_start as u32, self.pos as u32)
                    .with("raw", data)
                    .with("data", data)]
            };
            node.set("children", children);
            self.close_tag(&name)?;
            node.end = self.pos as u32;
            return Ok(Some(node));
        }

        let (children, stop) = self.nodes(depth + 1, kind)?;
        node.set("children", children);
        match stop {
            Stop::CloseTag { name: closing, start: close_start } if closing == name => {
                self.pos = close_start;
                self.close_tag(&name)?;
                node.end = self.pos as u32;
                Ok(Some(node))
            }
            Stop::CloseTag { name: closing, start: close_start } => Err(self.error(
                "invalid-closing-tag",
                format!("</{closing}> attempted to close <{name}>"),
                close_start,
            )),
            _ => Err(self.error("unclosed-element", format!("<{name}> was left open"), start)),
        }
    }

    fn close_tag(&mut self, name: &str) -> PResult<()> {
        self.expect("</")?;
        self.expect(name)?;
        self.skip_spaces();
        self.expect(">")
    }

    fn top_level_block(&mut self, name: &str, start: usize) -> PResult<()> {
        let attributes = self.attributes()?;
        let self_closing = self.eat("/>");
        if !self_closing {
            self.expect(">")?;
        }
        let content_start = self.pos;
        if !self_closing {
            let close = format!("</{name}");
            let Some(found) = self.rest().find(&close) else {
                return Err(self.error(
                    &format!("unclosed-{name}"),
                    format!("<{name}> must have a closing tag"),
                    start,
                ));
            };
            self.pos += found;
        }
        let content_end = self.pos;
        if !self_closing {
            self.close_tag(name)?;
        }
        let end = self.pos as u32;

        if name == "style" {
            if self.css.is_some() {
                return Err(self.error(
                    "duplicate-style",
                    "You can only have one top-level <style> tag per component",
                    start,
                ));
            }
            let content = Value::Object(vec![
                ("start".to_string(), Value::Number(content_start as f64)),
                ("end".to_string(), Value::Number(content_end as f64)),
                (
                    "styles".to_string(),
                    Value::from(&self.source[content_start..content_end]),
                ),
            ]);
            self.css = Some(
                Node::new("Style", start as u32, end)
                    .with("attributes", attributes)
                    .with("content", content),
            );
            return Ok(());
        }

        let is_module = attributes.iter().any(|attribute| {
            attribute.str_field("name") == Some("context")
                && attribute
                    .children("value")
                    .first()
                    .and_then(|text| text.str_field("data"))
                    == Some("module")
        });
        let context = if is_module { "module" } else { "default" };
        let slot = if is_module { &self.module } else { &self.instance };
        if slot.is_some() {
            let level = if is_module { "module" } else { "instance" };
            return Err(self.error(
                "invalid-script",
                format!("A component can only have one {level}-level <script> element"),
                start,
            ));
        }
        let script = Node::new("Script", start as u32, end)
            .with("context", context)
            .with("attributes", attributes)
            .with(
                "content",
                Node::placeholder("Program", content_start as u32, content_end as u32),
            );
        if is_module {
            self.module = Some(script);
        } else {
            self.instance = Some(script);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ATTRIBUTES AND DIRECTIVES
    // ═══════════════════════════════════════════════════════════════════════

    fn attributes(&mut self) -> PResult<Vec<Node>> {
        let mut attributes = Vec::new();
        loop {
            self.skip_spaces();
            match self.peek() {
                None => return Err(self.error("unexpected-eof", "Unexpected end of input", self.pos)),
                Some(b'>') => return Ok(attributes),
                Some(b'/') if self.rest().starts_with("/>") => return Ok(attributes),
                Some(b'{') => attributes.push(self.brace_attribute()?),
                Some(_) => attributes.push(self.attribute()?),
            }
        }
    }

    /// `{...spread}` or `{shorthand}`.
    fn brace_attribute(&mut self) -> PResult<Node> {
        let start = self.pos;
        let inner = start + 1;
        let close = scan_balanced(self.bytes, inner, |p| self.bytes[p] == b'}');
        if close >= self.bytes.len() {
            return Err(self.error("unexpected-eof", "Expected }", start));
        }
        let (text_start, text_end) = self.trimmed(inner, close);
        self.pos = close + 1;
        let end = self.pos as u32;

        if self.source[text_start..text_end].starts_with("...") {
            let expression = self.expression(text_start + 3, text_end)?;
            return Ok(Node::new("Spread", start as u32, end).with("expression", expression));
        }

        let name = self.source[text_start..text_end].to_string();
        if !IDENTIFIER.is_match(&name) {
            return Err(self.error(
                "invalid-attribute-shorthand",
                "Attribute shorthand must be an identifier",
                text_start,
            ));
        }
        let expression = self.expression(text_start, text_end)?;
        let shorthand = Node::new("AttributeShorthand", text_start as u32, text_end as u32)
            .with("expression", expression);
        Ok(Node::new("Attribute", start as u32, end)
            .with("name", name)
            .with("value", vec![shorthand]))
    }

    fn attribute(&mut self) -> PResult<Node> {
        let start = self.pos;
        let name = self
            .read_while(|b| !b.is_ascii_whitespace() && !matches!(b, b'=' | b'/' | b'>' | b'"' | b'\'' | b'{'))
            .to_string();
        if name.is_empty() {
            return Err(self.error("invalid-attribute-name", "Expected an attribute name", start));
        }
        let value = if self.eat("=") {
            Some(self.attribute_value()?)
        } else {
            None
        };
        let end = self.pos;

        if let Some((prefix, rest)) = name.split_once(':') {
            if let Some(kind) = directive_kind(prefix) {
                return self.directive(kind, prefix, rest, start, end, value);
            }
        }
        let value = value.map_or(Value::Bool(true), Value::Nodes);
        Ok(Node::new("Attribute", start as u32, end as u32)
            .with("name", name)
            .with("value", value))
    }

    fn attribute_value(&mut self) -> PResult<Vec<Node>> {
        match self.peek() {
            Some(quote @ (b'"' | b'\'')) => {
                let open = self.pos;
                self.pos += 1;
                let mut chunks = Vec::new();
                loop {
                    match self.peek() {
                        None => {
                            return Err(self.error(
                                "unclosed-attribute-value",
                                "Attribute value was left open",
                                open,
                            ))
                        }
                        Some(b) if b == quote => {
                            self.pos += 1;
                            return Ok(chunks);
                        }
                        Some(b'{') => chunks.push(self.value_mustache()?),
                        Some(_) => {
                            let start = self.pos;
                            let data = self.read_while(|b| b != quote && b != b'{');
                            chunks.push(
                                Node::new("Text", start as u32, self.pos as u32)
                                    .with("raw", data)
                                    .with("data", data),
                            );
                        }
                    }
                }
            }
            Some(b'{') => Ok(vec![self.value_mustache()?]),
            _ => {
                let start = self.pos;
                let data = self.read_while(|b| {
                    !b.is_ascii_whitespace() && !matches!(b, b'>' | b'/' | b'"' | b'\'' | b'{' | b'}')
                });
                if data.is_empty() {
                    return Err(self.error("expected-attribute-value", "Expected a value", start));
                }
                Ok(vec![Node::new("Text", start as u32, self.pos as u32)
                    .with("raw", data)
                    .with("data", data)])
            }
        }
    }

    fn value_mustache(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.pos += 1;
        let expression = self.expression_to_brace()?;
        Ok(Node::new("MustacheTag", start as u32, self.pos as u32).with("expression", expression))
    }

    fn directive(
        &mut self,
        kind: &'static str,
        prefix: &str,
        rest: &str,
        start: usize,
        end: usize,
        value: Option<Vec<Node>>,
    ) -> PResult<Node> {
        let mut parts = rest.split('|');
        let name = parts.next().unwrap_or_default().to_string();
        let modifiers: Vec<String> = parts.map(str::to_string).collect();
        let name_start = start + prefix.len() + 1;

        let expression = match value {
            Some(mut chunks) => {
                let single = chunks.len() == 1 && chunks[0].is("MustacheTag");
                let expression = if single {
                    chunks.remove(0).take_child("expression")
                } else {
                    None
                };
                let Some(expression) = expression else {
                    return Err(self.error(
                        "invalid-directive-value",
                        "Directive value must be a JavaScript expression enclosed in curly braces",
                        start,
                    ));
                };
                if kind == "Let" {
                    self.sites.expressions.retain(|span| span.0 != expression.start);
                    self.pattern(expression.start as usize, expression.end as usize)?;
                }
                Some(expression)
            }
            None if matches!(kind, "Binding" | "Class") && !name.is_empty() => {
                let name_end = name_start + name.len();
                let parsed = self.parse_span(name_start, name_end, false)?;
                self.sites.expressions.push((name_start as u32, name_end as u32));
                Some(Node::placeholder(
                    parsed.expression.kind(),
                    name_start as u32,
                    end as u32,
                ))
            }
            None => {
                if kind == "Let" && !name.is_empty() {
                    self.sites.declared.push((name.clone(), name_start as u32));
                }
                None
            }
        };

        if kind == "Binding" {
            if let Some(expression) = &expression {
                let span_end = if expression.end as usize == end {
                    name_start + name.len()
                } else {
                    expression.end as usize
                };
                self.sites.bindings.push((expression.start, span_end as u32));
            }
        }

        let mut node = Node::new(kind, start as u32, end as u32)
            .with("name", name)
            .with("modifiers", modifiers)
            .with("expression", expression);
        if kind == "Transition" {
            node.set("intro", prefix != "out");
            node.set("outro", prefix != "in");
        }
        Ok(node)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MUSTACHE TAGS AND BLOCKS
    // ═══════════════════════════════════════════════════════════════════════

    fn mustache(&mut self, depth: usize) -> PResult<Node> {
        let start = self.pos;
        self.pos += 1;
        self.skip_spaces();

        if self.eat("#") {
            let keyword = self.word_at(self.pos);
            self.pos += keyword.len();
            return match keyword {
                "if" => self.if_block(start, depth),
                "each" => self.each_block(start, depth),
                "await" => self.await_block(start, depth),
                _ => Err(self.error(
                    "expected-block-type",
                    "Expected if, each or await",
                    self.pos,
                )),
            };
        }
        if self.eat("@html") {
            let expression = self.expression_to_brace()?;
            return Ok(Node::new("RawMustacheTag", start as u32, self.pos as u32)
                .with("expression", expression));
        }
        if self.eat("@debug") {
            return self.debug_tag(start);
        }

        let expression = self.expression_to_brace()?;
        Ok(Node::new("MustacheTag", start as u32, self.pos as u32).with("expression", expression))
    }

    fn debug_tag(&mut self, start: usize) -> PResult<Node> {
        let Some(close) = self.rest().find('}') else {
            return Err(self.error("unexpected-eof", "Expected }", start));
        };
        let source = self.source;
        let body_start = self.pos;
        let body_end = self.pos + close;
        let mut identifiers = Vec::new();
        if !source[body_start..body_end].trim().is_empty() {
            let mut segment_start = body_start;
            for (i, ch) in source[body_start..=body_end].char_indices() {
                if ch == ',' || body_start + i == body_end {
                    let segment_end = body_start + i;
                    let expression = self.expression(segment_start, segment_end)?;
                    if !expression.is("Identifier") {
                        return Err(self.error(
                            "invalid-debug-args",
                            "{@debug ...} arguments must be identifiers, not arbitrary expressions",
                            expression.start as usize,
                        ));
                    }
                    identifiers.push(expression);
                    segment_start = segment_end + 1;
                }
            }
        }
        self.pos = body_end + 1;
        Ok(Node::new("DebugTag", start as u32, self.pos as u32).with("identifiers", identifiers))
    }

    /// Consumes `{/keyword}` starting at its `{`.
    fn block_close(&mut self, keyword: &str, at: usize) -> PResult<()> {
        self.pos = at;
        self.expect("{")?;
        self.skip_spaces();
        self.expect("/")?;
        self.expect(keyword)?;
        self.skip_spaces();
        self.expect("}")
    }

    /// Consumes `{:keyword` starting at its `{`, leaving the cursor after the
    /// keyword.
    fn branch_open(&mut self, keyword: &str, at: usize) -> PResult<()> {
        self.pos = at;
        self.expect("{")?;
        self.skip_spaces();
        self.expect(":")?;
        self.expect(keyword)
    }

    fn unexpected_stop(&self, stop: Stop, block: &str, start: usize) -> CompileError {
        match stop {
            Stop::Eof => self.error(
                "unclosed-block",
                format!("Block {{#{block}}} was left open"),
                start,
            ),
            Stop::CloseTag { name, start } => self.error(
                "invalid-closing-tag",
                format!("</{name}> attempted to close an element that was not open"),
                start,
            ),
            Stop::BlockClose { keyword, start } => self.error(
                "invalid-block-close",
                format!("Expected {{/{block}}}, found {{/{keyword}}}"),
                start,
            ),
            Stop::Branch { keyword, start } => self.error(
                "invalid-branch",
                format!("{{:{keyword}}} can not appear inside {{#{block}}}"),
                start,
            ),
        }
    }

    fn if_block(&mut self, start: usize, depth: usize) -> PResult<Node> {
        let expression = self.expression_to_brace()?;
        let (mut node, close) = self.if_body(start, expression, false, depth)?;
        self.block_close("if", close)?;
        node.end = self.pos as u32;
        Ok(node)
    }

    /// Children and else branch of an if block. Returns the offset of the
    /// `{/if}` that closes the whole chain without consuming it.
    fn if_body(&mut self, start: usize, expression: Node, elseif: bool, depth: usize) -> PResult<(Node, usize)> {
        let (children, stop) = self.nodes(depth + 1, "IfBlock")?;
        let mut node = Node::new("IfBlock", start as u32, 0)
            .with("expression", expression)
            .with("children", children);
        if elseif {
            node.set("elseif", true);
        }

        let stop = match stop {
            Stop::Branch { keyword, start: branch } if keyword == "else" => {
                self.branch_open("else", branch)?;
                self.skip_spaces();
                if is_keyword_at(self.bytes, self.pos, "if") || self.word_at(self.pos) == "if" {
                    let nested_start = self.pos;
                    self.pos += 2;
                    let nested_expression = self.expression_to_brace()?;
                    let (nested, close) = self.if_body(nested_start, nested_expression, true, depth)?;
                    let else_block = Node::new("ElseBlock", branch as u32, close as u32)
                        .with("children", vec![nested]);
                    node.set("else", else_block);
                    Stop::BlockClose {
                        keyword: "if".to_string(),
                        start: close,
                    }
                } else {
                    self.expect("}")?;
                    let (else_children, stop) = self.nodes(depth + 1, "ElseBlock")?;
                    let else_end = match &stop {
                        Stop::BlockClose { start, .. } => *start,
                        _ => self.pos,
                    };
                    node.set(
                        "else",
                        Node::new("ElseBlock", branch as u32, else_end as u32)
                            .with("children", else_children),
                    );
                    stop
                }
            }
            other => other,
        };

        match stop {
            Stop::BlockClose { keyword, start: close } if keyword == "if" => {
                node.end = close as u32;
                Ok((node, close))
            }
            other => Err(self.unexpected_stop(other, "if", start)),
        }
    }

    fn each_block(&mut self, start: usize, depth: usize) -> PResult<Node> {
        let expression_start = self.pos;
        let bytes = self.bytes;
        let as_at = scan_balanced(bytes, expression_start, |p| {
            bytes[p] == b'}' || is_keyword_at(bytes, p, "as")
        });
        if as_at >= bytes.len() || bytes[as_at] == b'}' {
            return Err(self.error("expected-as", "Expected 'as'", as_at.min(bytes.len())));
        }
        let expression = self.expression(expression_start, as_at)?;
        self.pos = as_at + 2;

        let context_start = self.pos;
        let context_end = scan_balanced(bytes, context_start, |p| {
            matches!(bytes[p], b',' | b'(' | b'@' | b'}')
        });
        let context = self.pattern(context_start, context_end)?;
        self.pos = context_end;
        self.skip_spaces();

        let mut node = Node::new("EachBlock", start as u32, 0)
            .with("expression", expression)
            .with("context", context);

        if self.eat(",") {
            self.skip_spaces();
            let index_start = self.pos;
            let index = self.read_while(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$');
            if index.is_empty() {
                return Err(self.error("expected-name", "Expected an index name", index_start));
            }
            self.sites.declared.push((index.to_string(), index_start as u32));
            node.set("index", index);
            self.skip_spaces();
        }
        if self.eat("(") {
            let key_start = self.pos;
            let key_end = scan_balanced(bytes, key_start, |p| bytes[p] == b')');
            if key_end >= bytes.len() {
                return Err(self.error("unexpected-eof", "Expected )", key_start));
            }
            let key = self.expression(key_start, key_end)?;
            node.set("key", key);
            self.pos = key_end + 1;
            self.skip_spaces();
        } else if self.eat("@") {
            let key = self.read_while(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$');
            node.set("key", key);
            self.skip_spaces();
        }
        self.expect("}")?;

        let (children, stop) = self.nodes(depth + 1, "EachBlock")?;
        node.set("children", children);
        let stop = match stop {
            Stop::Branch { keyword, start: branch } if keyword == "else" => {
                self.branch_open("else", branch)?;
                self.skip_spaces();
                self.expect("}")?;
                let (else_children, stop) = self.nodes(depth + 1, "ElseBlock")?;
                let else_end = match &stop {
                    Stop::BlockClose { start, .. } => *start,
                    _ => self.pos,
                };
                node.set(
                    "else",
                    Node::new("ElseBlock", branch as u32, else_end as u32).with("children", else_children),
                );
                stop
            }
            other => other,
        };
        match stop {
            Stop::BlockClose { keyword, start: close } if keyword == "each" => {
                self.block_close("each", close)?;
                node.end = self.pos as u32;
                Ok(node)
            }
            other => Err(self.unexpected_stop(other, "each", start)),
        }
    }

    fn await_block(&mut self, start: usize, depth: usize) -> PResult<Node> {
        let expression_start = self.pos;
        let bytes = self.bytes;
        let header_stop = scan_balanced(bytes, expression_start, |p| {
            bytes[p] == b'}' || is_keyword_at(bytes, p, "then")
        });
        if header_stop >= bytes.len() {
            return Err(self.error("unexpected-eof", "Expected }", expression_start));
        }
        let expression = self.expression(expression_start, header_stop)?;
        self.pos = header_stop;

        let compact = bytes[header_stop] != b'}';
        let mut value = Value::Null;
        if compact {
            self.pos += 4;
            let value_end = scan_balanced(bytes, self.pos, |p| bytes[p] == b'}');
            value = self.block_value(self.pos, value_end)?;
            self.pos = value_end;
        }
        self.expect("}")?;

        let skipped = |kind: &str| {
            Node::new(kind, start as u32, start as u32)
                .with("children", Vec::<Node>::new())
                .with("skip", true)
        };
        let mut pending = skipped("PendingBlock");
        let mut then = skipped("ThenBlock");
        let mut catch = skipped("CatchBlock");
        let mut error = Value::Null;

        let mut section = if compact { "then" } else { "pending" };
        let mut section_start = self.pos;
        loop {
            let kind = match section {
                "pending" => "PendingBlock",
                "then" => "ThenBlock",
                _ => "CatchBlock",
            };
            let (children, stop) = self.nodes(depth + 1, kind)?;
            let section_end = match &stop {
                Stop::Branch { start, .. } | Stop::BlockClose { start, .. } => *start,
                _ => self.pos,
            };
            let block = Node::new(kind, section_start as u32, section_end as u32)
                .with("children", children)
                .with("skip", false);
            match section {
                "pending" => pending = block,
                "then" => then = block,
                _ => catch = block,
            }

            match stop {
                Stop::Branch { keyword, start: branch } if keyword == "then" && section == "pending" => {
                    self.branch_open("then", branch)?;
                    let value_end = scan_balanced(bytes, self.pos, |p| bytes[p] == b'}');
                    value = self.block_value(self.pos, value_end)?;
                    self.pos = value_end;
                    self.expect("}")?;
                    section = "then";
                    section_start = branch;
                }
                Stop::Branch { keyword, start: branch } if keyword == "catch" && section != "catch" => {
                    self.branch_open("catch", branch)?;
                    let value_end = scan_balanced(bytes, self.pos, |p| bytes[p] == b'}');
                    error = self.block_value(self.pos, value_end)?;
                    self.pos = value_end;
                    self.expect("}")?;
                    section = "catch";
                    section_start = branch;
                }
                Stop::BlockClose { keyword, start: close } if keyword == "await" => {
                    self.block_close("await", close)?;
                    break;
                }
                other => return Err(self.unexpected_stop(other, "await", start)),
            }
        }

        Ok(Node::new("AwaitBlock", start as u32, self.pos as u32)
            .with("expression", expression)
            .with("value", value)
            .with("error", error)
            .with("pending", pending)
            .with("then", then)
            .with("catch", catch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::OxcScriptParser;

    fn parse_ok(source: &str) -> Parsed {
        parse(source, &OxcScriptParser::default()).unwrap()
    }

    fn parse_err(source: &str) -> CompileError {
        parse(source, &OxcScriptParser::default()).unwrap_err()
    }

    fn first(parsed: &Parsed) -> &Node {
        &parsed.ast.html.children("children")[0]
    }

    #[test]
    fn test_element_with_mustache_child() {
        let parsed = parse_ok("<div>{x}</div>");
        let div = first(&parsed);
        assert_eq!(div.kind(), "Element");
        assert_eq!((div.start, div.end), (0, 14));
        let tag = &div.children("children")[0];
        assert_eq!(tag.kind(), "MustacheTag");
        let expression = tag.child("expression").unwrap();
        assert!(expression.is_placeholder());
        assert_eq!((expression.kind(), expression.start, expression.end), ("Identifier", 6, 7));
    }

    #[test]
    fn test_each_block_fields() {
        let parsed = parse_ok("{#each items as { id }, i (id)}{id}{:else}none{/each}");
        let each = first(&parsed);
        assert_eq!(each.kind(), "EachBlock");
        assert_eq!(each.child("context").unwrap().kind(), "ObjectPattern");
        assert_eq!(each.str_field("index"), Some("i"));
        assert_eq!(each.child("key").unwrap().kind(), "Identifier");
        assert_eq!(each.child("else").unwrap().kind(), "ElseBlock");
        let declared: Vec<&str> = parsed.sites.declared.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(declared, vec!["id", "i"]);
    }

    #[test]
    fn test_await_full_form() {
        let parsed = parse_ok("{#await p}wait{:then v}{v}{:catch e}{e}{/await}");
        let block = first(&parsed);
        assert_eq!(block.str_field("value"), Some("v"));
        assert_eq!(block.str_field("error"), Some("e"));
        assert!(!block.child("pending").unwrap().bool_field("skip"));
        let then = block.child("then").unwrap();
        assert_eq!(then.start, 14);
        assert_eq!(block.child("catch").unwrap().children("children").len(), 1);
    }

    #[test]
    fn test_await_compact_form_skips_pending() {
        let parsed = parse_ok("{#await p then v}{v}{/await}");
        let block = first(&parsed);
        assert!(block.child("pending").unwrap().bool_field("skip"));
        assert!(block.child("catch").unwrap().bool_field("skip"));
        assert!(!block.child("then").unwrap().bool_field("skip"));
    }

    #[test]
    fn test_else_if_chain_nests() {
        let parsed = parse_ok("{#if a}1{:else if b}2{:else}3{/if}");
        let block = first(&parsed);
        assert_eq!(block.end, 34);
        let nested = &block.child("else").unwrap().children("children")[0];
        assert!(nested.bool_field("elseif"));
        assert!(nested.child("else").is_some());
    }

    #[test]
    fn test_directives() {
        let parsed = parse_ok("<input bind:value on:input|once={go} class:on transition:fade>");
        let attributes = first(&parsed).children("attributes");
        let kinds: Vec<&str> = attributes.iter().map(|a| a.kind()).collect();
        assert_eq!(kinds, vec!["Binding", "EventHandler", "Class", "Transition"]);
        let binding = attributes[0].child("expression").unwrap();
        assert_eq!((binding.kind(), binding.start, binding.end), ("Identifier", 12, 17));
        let modifiers = attributes[1].get("modifiers").unwrap();
        assert_eq!(modifiers, &Value::Strings(vec!["once".to_string()]));
        assert!(attributes[3].bool_field("intro"));
        assert_eq!(parsed.sites.bindings, vec![(12, 17)]);
    }

    #[test]
    fn test_scripts_and_style_are_hoisted() {
        let parsed = parse_ok(
            "<script context=\"module\">export const a = 1;</script><script>let b;</script><style>p{}</style><p/>",
        );
        assert_eq!(parsed.ast.html.children("children").len(), 1);
        let module = parsed.ast.module.unwrap();
        assert_eq!(module.str_field("context"), Some("module"));
        let content = module.child("content").unwrap();
        assert!(content.is_placeholder());
        assert_eq!(content.start, 25);
        assert!(parsed.ast.instance.is_some());
        assert!(parsed.ast.css.is_some());
    }

    #[test]
    fn test_component_kinds() {
        let parsed = parse_ok("<Foo /><svelte:component this={Bar} /><svelte:head><title>x</title></svelte:head>");
        let children = parsed.ast.html.children("children");
        assert_eq!(children[0].kind(), "InlineComponent");
        assert_eq!(children[1].child("expression").unwrap().kind(), "Identifier");
        assert!(children[1].children("attributes").is_empty());
        assert_eq!(children[2].kind(), "Head");
        assert_eq!(children[2].children("children")[0].kind(), "Title");
    }

    #[test]
    fn test_mismatched_closing_tag() {
        let err = parse_err("<div></span>");
        assert_eq!(err.code, "invalid-closing-tag");
        assert_eq!(err.offset, 5);
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse_err("{#if a}");
        assert_eq!(err.code, "unclosed-block");
    }

    #[test]
    fn test_duplicate_instance_script() {
        let err = parse_err("<script></script><script></script>");
        assert_eq!(err.code, "invalid-script");
    }

    #[test]
    fn test_invalid_expression_is_parse_error() {
        let err = parse_err("<p>{a +}</p>");
        assert_eq!(err.code, "parse-error");
    }

    #[test]
    fn test_directive_value_must_be_mustache() {
        let err = parse_err("<div on:click=\"go\"></div>");
        assert_eq!(err.code, "invalid-directive-value");
    }

    #[test]
    fn test_debug_identifiers() {
        let parsed = parse_ok("{@debug a, b}");
        let tag = first(&parsed);
        assert_eq!(tag.children("identifiers").len(), 2);
        assert_eq!(tag.children("identifiers")[1].start, 11);
    }
}
