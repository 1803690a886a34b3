//! Final shaping pass: one-shot visit marker, relabelling, locations and
//! the `TemplateRoot` to `Program` rewrite with its sort and span fix-up.

use crate::errors::{Error, InternalError};
use crate::node::{Comment, Node, Spanned, Token, Value};

use super::visitor::{Action, Ancestry, Context, Handler, Pass, Phase, Selector};

#[derive(Debug, Default)]
pub(crate) struct TreeNormalizer {
    pub(crate) tokens: Vec<Token>,
    pub(crate) comments: Vec<Comment>,
    pub(crate) css: Option<Node>,
    pub(crate) instance: Option<Node>,
    pub(crate) module: Option<Node>,
}

/// Sorts by start offset and rejects overlapping neighbours.
fn sort_disjoint<T: Spanned>(items: &mut [T], what: &'static str) -> Result<(), InternalError> {
    items.sort_by_key(|item| (item.span_start(), item.span_end()));
    for pair in items.windows(2) {
        if pair[0].span_end() > pair[1].span_start() {
            return Err(InternalError::Overlap {
                what,
                offset: pair[1].span_start(),
                previous_end: pair[0].span_end(),
            });
        }
    }
    Ok(())
}

/// Shorthand pairs share one span; the second half is dropped on enter and
/// rebuilt from the first on leave so the pair is only walked once.
const SHORTHAND_PAIRS: &[(&str, &str, &str)] = &[
    ("Property", "key", "value"),
    ("ImportSpecifier", "imported", "local"),
];

fn shorthand_fields(kind: &str) -> Option<(&'static str, &'static str)> {
    SHORTHAND_PAIRS
        .iter()
        .find(|(k, _, _)| *k == kind)
        .map(|(_, first, second)| (*first, *second))
}

impl TreeNormalizer {
    pub(crate) fn new(tokens: Vec<Token>, comments: Vec<Comment>) -> Self {
        Self {
            tokens,
            comments,
            ..Self::default()
        }
    }

    fn on_any(&mut self, node: &mut Node, _: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        if !node.mark_visited() {
            return Err(InternalError::DuplicateTraversal {
                kind: node.kind().to_string(),
                offset: node.start,
            }
            .into());
        }
        Ok(Action::Keep)
    }

    fn on_root(&mut self, node: &mut Node, _: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        if let Some(css) = node.child_mut("css") {
            css.set_kind("StyleElement");
        }
        for field in ["instance", "module"] {
            if let Some(script) = node.child_mut(field) {
                script.set_kind("ScriptElement");
            }
        }
        Ok(Action::Keep)
    }

    fn on_shorthand_enter(&mut self, node: &mut Node, _: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        let Some((first, second)) = shorthand_fields(node.kind()) else {
            return Ok(Action::Keep);
        };
        let same = match (node.child(first), node.child(second)) {
            (Some(a), Some(b)) => a.kind() == b.kind() && a.start == b.start && a.end == b.end,
            _ => false,
        };
        if same {
            node.remove(second);
        }
        Ok(Action::Keep)
    }

    fn on_shorthand_leave(&mut self, node: &mut Node, _: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        let Some((first, second)) = shorthand_fields(node.kind()) else {
            return Ok(Action::Keep);
        };
        if !node.has(second) {
            if let Some(copy) = node.child(first).cloned() {
                node.set(second, copy);
            }
        }
        Ok(Action::Keep)
    }

    fn on_leave(&mut self, node: &mut Node, ctx: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        node.loc = Some(ctx.index.location(node.start, node.end)?);
        Ok(Action::Keep)
    }

    fn on_root_leave(&mut self, node: &mut Node, ctx: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        let Some(mut program) = node.take_child("html") else {
            return Err(InternalError::StructuralInvariant {
                kind: node.kind().to_string(),
                offset: node.start,
                reason: "template root without a markup fragment".to_string(),
            }
            .into());
        };
        program.set_kind("Program");
        program.rename_field("children", "body");
        program.set("sourceType", ctx.options.source_type.as_str());

        self.css = node.take_child("css");
        self.instance = node.take_child("instance");
        self.module = node.take_child("module");

        let mut body = match program.remove("body") {
            Some(Value::Nodes(nodes)) => nodes,
            _ => Vec::new(),
        };
        for script in [&self.instance, &self.module].into_iter().flatten() {
            if let Some(content) = script.child("content") {
                body.extend(content.children("body").iter().cloned());
            }
        }
        sort_disjoint(&mut body, "statement")?;
        program.set("body", body);

        sort_disjoint(&mut self.tokens, "token")?;
        for token in &mut self.tokens {
            token.loc = Some(ctx.index.location(token.start, token.end)?);
        }
        sort_disjoint(&mut self.comments, "comment")?;
        for comment in &mut self.comments {
            comment.loc = Some(ctx.index.location(comment.start, comment.end)?);
        }

        program.start = self.tokens.first().map_or(0, |t| t.start);
        program.end = self
            .tokens
            .last()
            .map_or(ctx.index.source_len(), |t| t.end);
        program.loc = Some(ctx.index.location(program.start, program.end)?);

        tracing::debug!(
            statements = program.children("body").len(),
            tokens = self.tokens.len(),
            comments = self.comments.len(),
            "normalized program"
        );
        Ok(Action::Replace(program))
    }
}

impl Pass for TreeNormalizer {
    const NAME: &'static str = "tree-normalizer";
    const HANDLERS: &'static [Handler<Self>] = &[
        Handler {
            selector: Selector::Any,
            phase: Phase::Enter,
            run: TreeNormalizer::on_any,
        },
        Handler {
            selector: Selector::Kinds(&["TemplateRoot"]),
            phase: Phase::Enter,
            run: TreeNormalizer::on_root,
        },
        Handler {
            selector: Selector::Kinds(&["Property", "ImportSpecifier"]),
            phase: Phase::Enter,
            run: TreeNormalizer::on_shorthand_enter,
        },
        Handler {
            selector: Selector::Kinds(&["Property", "ImportSpecifier"]),
            phase: Phase::Leave,
            run: TreeNormalizer::on_shorthand_leave,
        },
        Handler {
            selector: Selector::Not(&["TemplateRoot"]),
            phase: Phase::Leave,
            run: TreeNormalizer::on_leave,
        },
        Handler {
            selector: Selector::Kinds(&["TemplateRoot"]),
            phase: Phase::Leave,
            run: TreeNormalizer::on_root_leave,
        },
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParserOptions;
    use crate::converter::visitor::traverse;
    use crate::node::TokenKind;
    use crate::position::PositionIndex;
    use crate::script::OxcScriptParser;

    fn run(source: &str, pass: &mut TreeNormalizer, root: &mut Node) -> Result<(), Error> {
        let index = PositionIndex::new(source);
        let parser = OxcScriptParser::default();
        let options = ParserOptions::default();
        let ctx = Context {
            source,
            index: &index,
            parser: &parser,
            options: &options,
        };
        traverse(pass, root, &ctx)
    }

    fn template_root(children: Vec<Node>, len: u32) -> Node {
        Node::new("TemplateRoot", 0, len)
            .with("html", Node::new("Fragment", 0, len).with("children", children))
            .with("css", Value::Null)
            .with("instance", Value::Null)
            .with("module", Value::Null)
    }

    #[test]
    fn test_root_becomes_program_spanning_tokens() {
        let source = " <br> ";
        let tokens = vec![
            Token::new(TokenKind::Punctuator, ">", 4, 5),
            Token::new(TokenKind::Punctuator, "<", 1, 2),
            Token::new(TokenKind::String, "br", 2, 4),
        ];
        let mut pass = TreeNormalizer::new(tokens, Vec::new());
        let mut root = template_root(vec![Node::new("Element", 1, 5).with("name", "br")], 6);
        run(source, &mut pass, &mut root).unwrap();
        assert_eq!(root.kind(), "Program");
        assert_eq!((root.start, root.end), (1, 5));
        assert_eq!(root.str_field("sourceType"), Some("module"));
        assert_eq!(root.children("body").len(), 1);
        assert!(root.children("body")[0].loc.is_some());
        let starts: Vec<u32> = pass.tokens.iter().map(|t| t.start).collect();
        assert_eq!(starts, vec![1, 2, 4]);
    }

    #[test]
    fn test_empty_program_spans_whole_source() {
        let source = "   ";
        let mut pass = TreeNormalizer::default();
        let mut root = template_root(Vec::new(), 3);
        run(source, &mut pass, &mut root).unwrap();
        assert_eq!((root.start, root.end), (0, 3));
    }

    #[test]
    fn test_overlapping_tokens_are_rejected() {
        let source = "abcdef";
        let tokens = vec![
            Token::new(TokenKind::Text, "abcd", 0, 4),
            Token::new(TokenKind::Text, "cdef", 2, 6),
        ];
        let mut pass = TreeNormalizer::new(tokens, Vec::new());
        let mut root = template_root(Vec::new(), 6);
        let err = run(source, &mut pass, &mut root).unwrap_err();
        assert!(matches!(
            err,
            Error::Internal(InternalError::Overlap { what: "token", .. })
        ));
    }

    #[test]
    fn test_second_traversal_is_detected() {
        let source = "<br>";
        let mut root = template_root(vec![Node::new("Element", 0, 4).with("name", "br")], 4);
        run(source, &mut TreeNormalizer::default(), &mut root).unwrap();
        let err = run(source, &mut TreeNormalizer::default(), &mut root).unwrap_err();
        assert!(matches!(
            err,
            Error::Internal(InternalError::DuplicateTraversal { .. })
        ));
    }

    #[test]
    fn test_shorthand_property_is_restored() {
        let source = "({a})";
        let key = Node::new("Identifier", 2, 3).with("name", "a");
        let mut property = Node::new("Property", 2, 3)
            .with("key", key.clone())
            .with("value", key)
            .with("shorthand", true);
        run(source, &mut TreeNormalizer::default(), &mut property).unwrap();
        assert_eq!(property.field_names(), vec!["key", "shorthand", "value"]);
        let value = property.child("value").unwrap();
        assert_eq!(value.str_field("name"), Some("a"));
        assert!(value.loc.is_some());
    }
}
