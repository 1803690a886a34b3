//! Markup token pass.
//!
//! Lexes the whole component once, turns the structural lexer tokens into
//! ESTree tokens and replaces the bare-string identifier fields left by the
//! compiler (component names, directive names, each index and key, await
//! values) with `Identifier` nodes positioned at their lexer tokens.

use regex::Regex;

use crate::errors::{Error, InternalError};
use crate::node::{Comment, CommentKind, Node, Token, TokenKind, Value};

use super::lexer::lex;
use super::token_collection::{IdentifierKind, LexerTokenCollection};
use super::visitor::{Action, Ancestry, Context, Handler, Pass, Phase, Selector};

lazy_static::lazy_static! {
    static ref IMPORTED_COMPONENT: Regex = Regex::new(r"^[A-Z][\w$]*(\.[\w$]+)*$").unwrap();
}

#[derive(Debug, Default)]
pub(crate) struct TagTokenizer {
    lexer_tokens: Option<LexerTokenCollection>,
    pub(crate) tokens: Vec<Token>,
    pub(crate) comments: Vec<Comment>,
}

fn internal_missing_lexer(offset: u32) -> Error {
    InternalError::MissingLexerToken { offset }.into()
}

impl TagTokenizer {
    fn collection(&self, offset: u32) -> Result<&LexerTokenCollection, Error> {
        self.lexer_tokens
            .as_ref()
            .ok_or_else(|| internal_missing_lexer(offset))
    }

    /// Replaces the string in `node[field]` with an `Identifier` node.
    /// `owner_start` is the offset the lookup starts from.
    fn expand(
        &mut self,
        node: &mut Node,
        field: &str,
        owner_start: u32,
        kind: IdentifierKind,
        ctx: &Context<'_>,
    ) -> Result<(), Error> {
        let name = match node.get(field) {
            Some(Value::String(name)) => name.clone(),
            Some(Value::Node(_)) => {
                return Err(InternalError::AlreadyExpanded {
                    kind: node.kind().to_string(),
                    field: field.to_string(),
                    offset: node.start,
                }
                .into())
            }
            _ => return Ok(()),
        };
        let token = self
            .collection(owner_start)?
            .find_identifier(ctx.index, owner_start, kind, &name)?;
        let (start, end) = (token.offset, token.end());
        self.tokens
            .push(Token::new(TokenKind::Identifier, name.as_str(), start, end));
        node.set(field, Node::new("Identifier", start, end).with("name", name));
        Ok(())
    }

    fn on_root(&mut self, _node: &mut Node, ctx: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        let lexed = lex(ctx.source, ctx.index)?;
        for token in &lexed {
            if let Some(kind) = token.kind.token_kind() {
                self.tokens
                    .push(Token::new(kind, token.value.as_str(), token.offset, token.end()));
            }
        }
        let collection = LexerTokenCollection::new(lexed);
        tracing::debug!(
            lexer_tokens = collection.len(),
            structural_tokens = self.tokens.len(),
            "template tokens collected"
        );
        self.lexer_tokens = Some(collection);
        Ok(Action::Keep)
    }

    fn on_text(&mut self, node: &mut Node, ctx: &Context<'_>, ancestry: &Ancestry) -> Result<Action, Error> {
        if ancestry.parent().is_some_and(|frame| frame.kind == "Attribute") {
            return Ok(Action::Keep);
        }
        let text = node.span_text(ctx.source);
        if !text.trim().is_empty() {
            self.tokens
                .push(Token::new(TokenKind::Text, text, node.start, node.end));
        }
        Ok(Action::Keep)
    }

    fn on_comment(&mut self, node: &mut Node, _: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        let data = node.str_field("data").unwrap_or_default();
        self.comments
            .push(Comment::new(CommentKind::Block, data, node.start, node.end));
        Ok(Action::Keep)
    }

    fn on_component(&mut self, node: &mut Node, ctx: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        let imported = node
            .str_field("name")
            .is_some_and(|name| IMPORTED_COMPONENT.is_match(name));
        if imported {
            let start = node.start;
            self.expand(node, "name", start, IdentifierKind::Component, ctx)?;
        }
        Ok(Action::Keep)
    }

    fn on_named_directive(&mut self, node: &mut Node, ctx: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        let start = node.start;
        let has_expression = node.get("expression").is_some_and(|value| !value.is_null());
        if node.is("Let") && has_expression {
            // The bindings live in the expression; the name only has to exist.
            let name = node.str_field("name").unwrap_or_default().to_string();
            self.collection(start)?
                .find_identifier(ctx.index, start, IdentifierKind::Directive, &name)?;
            return Ok(Action::Keep);
        }
        self.expand(node, "name", start, IdentifierKind::Directive, ctx)?;
        Ok(Action::Keep)
    }

    fn on_value_directive(&mut self, node: &mut Node, ctx: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        let start = node.start;
        let name = node.str_field("name").unwrap_or_default().to_string();
        let token = self
            .collection(start)?
            .find_identifier(ctx.index, start, IdentifierKind::Directive, &name)?;
        let (token_start, token_end) = (token.offset, token.end());

        match node.child_mut("expression") {
            Some(expression) if expression.is("Identifier") && expression.start == token_start => {
                // Shorthand `bind:value|mod`: the identifier is the name itself.
                expression.end = token_end;
            }
            _ => {
                self.tokens
                    .push(Token::new(TokenKind::String, name, token_start, token_end));
            }
        }
        Ok(Action::Keep)
    }

    fn on_each(&mut self, node: &mut Node, ctx: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        let start = node.start;
        self.expand(node, "index", start, IdentifierKind::EachIndex, ctx)?;
        if matches!(node.get("key"), Some(Value::String(_))) {
            self.expand(node, "key", start, IdentifierKind::EachKey, ctx)?;
        }
        Ok(Action::Keep)
    }

    fn on_await(&mut self, node: &mut Node, ctx: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        for field in ["pending", "then", "catch"] {
            if node.child(field).is_some_and(|block| block.bool_field("skip")) {
                node.remove(field);
            }
        }
        let compact = !node.has("pending");
        let await_start = node.start;

        // Destructured values stay placeholders for the expression pass.
        let value = node.remove("value").unwrap_or(Value::Null);
        if let Some(then) = node.child_mut("then") {
            let named = matches!(value, Value::String(_));
            then.set("value", value);
            if named {
                let start = if compact { await_start } else { then.start };
                self.expand(then, "value", start, IdentifierKind::AwaitThen, ctx)?;
            }
        }

        let error = node.remove("error").unwrap_or(Value::Null);
        if let Some(catch) = node.child_mut("catch") {
            let named = matches!(error, Value::String(_));
            catch.set("error", error);
            if named {
                let start = catch.start;
                self.expand(catch, "error", start, IdentifierKind::AwaitCatch, ctx)?;
            }
        }
        Ok(Action::Keep)
    }
}

impl Pass for TagTokenizer {
    const NAME: &'static str = "tag-tokenizer";
    const HANDLERS: &'static [Handler<Self>] = &[
        Handler {
            selector: Selector::Kinds(&["TemplateRoot"]),
            phase: Phase::Enter,
            run: TagTokenizer::on_root,
        },
        Handler {
            selector: Selector::Kinds(&["Text"]),
            phase: Phase::Enter,
            run: TagTokenizer::on_text,
        },
        Handler {
            selector: Selector::Kinds(&["Comment"]),
            phase: Phase::Enter,
            run: TagTokenizer::on_comment,
        },
        Handler {
            selector: Selector::Kinds(&["InlineComponent"]),
            phase: Phase::Enter,
            run: TagTokenizer::on_component,
        },
        Handler {
            selector: Selector::Kinds(&["Action", "Animation", "Let", "Transition"]),
            phase: Phase::Enter,
            run: TagTokenizer::on_named_directive,
        },
        Handler {
            selector: Selector::Kinds(&["Binding", "Class", "EventHandler"]),
            phase: Phase::Enter,
            run: TagTokenizer::on_value_directive,
        },
        Handler {
            selector: Selector::Kinds(&["EachBlock"]),
            phase: Phase::Enter,
            run: TagTokenizer::on_each,
        },
        Handler {
            selector: Selector::Kinds(&["AwaitBlock"]),
            phase: Phase::Enter,
            run: TagTokenizer::on_await,
        },
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParserOptions;
    use crate::converter::visitor::traverse;
    use crate::position::PositionIndex;
    use crate::script::OxcScriptParser;

    fn run(source: &str, mut root: Node) -> (Result<(), Error>, Node, TagTokenizer) {
        let index = PositionIndex::new(source);
        let parser = OxcScriptParser::default();
        let options = ParserOptions::default();
        let ctx = Context {
            source,
            index: &index,
            parser: &parser,
            options: &options,
        };
        let mut pass = TagTokenizer::default();
        let result = traverse(&mut pass, &mut root, &ctx);
        (result, root, pass)
    }

    fn root(html: Vec<Node>, end: u32) -> Node {
        Node::new("TemplateRoot", 0, end)
            .with("html", Node::new("Fragment", 0, end).with("children", html))
    }

    #[test]
    fn test_each_index_becomes_identifier() {
        let source = "{#each items as item, i}{/each}";
        let each = Node::new("EachBlock", 0, 31)
            .with("expression", Node::placeholder("Identifier", 7, 12))
            .with("context", Node::placeholder("Identifier", 16, 20))
            .with("index", "i")
            .with("children", Vec::<Node>::new());
        let (result, tree, pass) = run(source, root(vec![each], 31));
        result.unwrap();
        let each = &tree.child("html").unwrap().children("children")[0];
        let index = each.child("index").unwrap();
        assert_eq!((index.start, index.end), (22, 23));
        assert!(pass
            .tokens
            .iter()
            .any(|t| t.kind == TokenKind::Identifier && t.value == "i"));
    }

    #[test]
    fn test_expanding_twice_is_detected() {
        let source = "{#each items as item, i}{/each}";
        let each = Node::new("EachBlock", 0, 31)
            .with("index", Node::new("Identifier", 22, 23).with("name", "i"))
            .with("children", Vec::<Node>::new());
        let (result, _, _) = run(source, root(vec![each], 31));
        assert!(matches!(
            result,
            Err(Error::Internal(InternalError::AlreadyExpanded { .. }))
        ));
    }

    #[test]
    fn test_compact_await_value_moves_to_then_block() {
        let source = "{#await p then v}{v}{/await}";
        let await_block = Node::new("AwaitBlock", 0, 28)
            .with("expression", Node::placeholder("Identifier", 8, 9))
            .with("value", "v")
            .with("error", Value::Null)
            .with("pending", Node::new("PendingBlock", 0, 0).with("skip", true))
            .with("then", Node::new("ThenBlock", 17, 20).with("children", Vec::<Node>::new()))
            .with("catch", Node::new("CatchBlock", 20, 20).with("skip", true));
        let (result, tree, _) = run(source, root(vec![await_block], 28));
        result.unwrap();
        let block = &tree.child("html").unwrap().children("children")[0];
        assert!(!block.has("pending"));
        assert!(!block.has("catch"));
        assert!(!block.has("value"));
        let value = block.child("then").unwrap().child("value").unwrap();
        assert_eq!((value.start, value.end), (15, 16));
    }

    #[test]
    fn test_whitespace_text_has_no_token() {
        let source = "<p> </p>hi";
        let html = vec![
            Node::new("Element", 0, 8)
                .with("name", "p")
                .with("children", vec![Node::new("Text", 3, 4)]),
            Node::new("Text", 8, 10),
        ];
        let (result, _, pass) = run(source, root(html, 10));
        result.unwrap();
        let texts: Vec<&str> = pass
            .tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Text)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(texts, vec!["hi"]);
    }

    #[test]
    fn test_imported_component_pattern() {
        assert!(IMPORTED_COMPONENT.is_match("Foo"));
        assert!(IMPORTED_COMPONENT.is_match("Foo.Bar"));
        assert!(!IMPORTED_COMPONENT.is_match("svelte:self"));
    }
}
