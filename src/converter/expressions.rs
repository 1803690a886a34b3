//! Expression embedding pass: every placeholder left by the compiler is
//! re-parsed with the script parser at its own offset and replaced by the
//! resulting subtree. Tokens and comments of each parse join the shared
//! streams.

use crate::errors::{Error, InternalError, SyntaxError, SyntaxOrigin};
use crate::keys::EXPRESSION_PARENTS;
use crate::node::{Comment, Node, Token};
use crate::script::ScriptError;

use super::visitor::{Action, Ancestry, Context, Handler, Pass, Phase, Selector};

#[derive(Debug, Default)]
pub(crate) struct ExpressionEmbedder {
    pub(crate) tokens: Vec<Token>,
    pub(crate) comments: Vec<Comment>,
    pub(crate) embedded: usize,
}

fn script_error(err: ScriptError, ctx: &Context<'_>) -> Error {
    match err.into_syntax_error(ctx.index) {
        Ok(syntax) => syntax.into(),
        Err(internal) => internal.into(),
    }
}

impl ExpressionEmbedder {
    fn embed(&mut self, node: &Node, ctx: &Context<'_>, assignable: bool) -> Result<Node, Error> {
        let parsed = ctx
            .parser
            .parse_expression_at(ctx.source, node.start, node.end, assignable)
            .map_err(|err| script_error(err, ctx))?;
        if parsed.expression.kind() != node.kind() {
            return Err(InternalError::ExpressionKindMismatch {
                offset: node.start,
                expected: node.kind().to_string(),
                found: parsed.expression.kind().to_string(),
            }
            .into());
        }
        self.tokens.extend(parsed.tokens);
        self.comments.extend(parsed.comments);
        self.embedded += 1;
        tracing::trace!(
            kind = node.kind(),
            start = node.start,
            end = node.end,
            assignable,
            "embedded expression"
        );
        Ok(parsed.expression)
    }

    fn replace(&mut self, node: &Node, ctx: &Context<'_>, assignable: bool) -> Result<Action, Error> {
        if !node.is_placeholder() {
            return Ok(Action::Keep);
        }
        Ok(Action::Replace(self.embed(node, ctx, assignable)?))
    }

    fn on_expression(&mut self, node: &mut Node, ctx: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        self.replace(node, ctx, false)
    }

    fn on_pattern(&mut self, node: &mut Node, ctx: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        self.replace(node, ctx, true)
    }

    /// `let:x={...}` targets are reported as expressions; they declare
    /// bindings, so they are re-parsed as patterns.
    fn on_let_expression(&mut self, node: &mut Node, ctx: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        if !node.is_placeholder() {
            return Ok(Action::Keep);
        }
        match node.kind() {
            "ObjectExpression" => node.set_kind("ObjectPattern"),
            "ArrayExpression" => node.set_kind("ArrayPattern"),
            "Identifier" => {}
            other => {
                let err = SyntaxError::at(
                    ctx.index,
                    node.start,
                    format!("`{other}` can not be used as a let: binding"),
                    SyntaxOrigin::Template,
                )?;
                return Err(err.into());
            }
        }
        self.replace(node, ctx, true)
    }

    fn on_script_content(&mut self, node: &mut Node, ctx: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
        if !node.is_placeholder() {
            return Ok(Action::Keep);
        }
        let parsed = ctx
            .parser
            .parse_program(ctx.source, node.start, node.end)
            .map_err(|err| script_error(err, ctx))?;
        self.tokens.extend(parsed.tokens);
        self.comments.extend(parsed.comments);
        Ok(Action::Replace(parsed.program))
    }
}

impl Pass for ExpressionEmbedder {
    const NAME: &'static str = "expression-embedder";
    const HANDLERS: &'static [Handler<Self>] = &[
        Handler {
            selector: Selector::Child {
                parents: EXPRESSION_PARENTS,
                field: "expression",
            },
            phase: Phase::Enter,
            run: ExpressionEmbedder::on_expression,
        },
        Handler {
            selector: Selector::Child {
                parents: &["Let"],
                field: "expression",
            },
            phase: Phase::Enter,
            run: ExpressionEmbedder::on_let_expression,
        },
        Handler {
            selector: Selector::Child {
                parents: &["EachBlock"],
                field: "context",
            },
            phase: Phase::Enter,
            run: ExpressionEmbedder::on_pattern,
        },
        Handler {
            selector: Selector::Child {
                parents: &["EachBlock"],
                field: "key",
            },
            phase: Phase::Enter,
            run: ExpressionEmbedder::on_expression,
        },
        Handler {
            selector: Selector::Child {
                parents: &["ThenBlock"],
                field: "value",
            },
            phase: Phase::Enter,
            run: ExpressionEmbedder::on_pattern,
        },
        Handler {
            selector: Selector::Child {
                parents: &["CatchBlock"],
                field: "error",
            },
            phase: Phase::Enter,
            run: ExpressionEmbedder::on_pattern,
        },
        Handler {
            selector: Selector::Child {
                parents: &["DebugTag"],
                field: "identifiers",
            },
            phase: Phase::Enter,
            run: ExpressionEmbedder::on_expression,
        },
        Handler {
            selector: Selector::Child {
                parents: &["Script", "ScriptElement"],
                field: "content",
            },
            phase: Phase::Enter,
            run: ExpressionEmbedder::on_script_content,
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

    fn run(source: &str, mut root: Node) -> (Result<(), Error>, Node, ExpressionEmbedder) {
        let index = PositionIndex::new(source);
        let parser = OxcScriptParser::default();
        let options = ParserOptions::default();
        let ctx = Context {
            source,
            index: &index,
            parser: &parser,
            options: &options,
        };
        let mut pass = ExpressionEmbedder::default();
        let result = traverse(&mut pass, &mut root, &ctx);
        (result, root, pass)
    }

    #[test]
    fn test_mustache_expression_is_embedded() {
        let source = "<p>{a.b}</p>";
        let tag = Node::new("MustacheTag", 3, 8)
            .with("expression", Node::placeholder("MemberExpression", 4, 7));
        let (result, tree, pass) = run(source, tag);
        result.unwrap();
        let expression = tree.child("expression").unwrap();
        assert_eq!(expression.kind(), "MemberExpression");
        assert_eq!(expression.child("object").unwrap().str_field("name"), Some("a"));
        assert_eq!(pass.tokens.len(), 3);
        assert_eq!(pass.embedded, 1);
    }

    #[test]
    fn test_kind_mismatch_is_internal() {
        let source = "{a}";
        let tag = Node::new("MustacheTag", 0, 3)
            .with("expression", Node::placeholder("CallExpression", 1, 2));
        let (result, _, _) = run(source, tag);
        assert!(matches!(
            result,
            Err(Error::Internal(InternalError::ExpressionKindMismatch { .. }))
        ));
    }

    #[test]
    fn test_let_object_is_parsed_as_pattern() {
        let source = "<Foo let:item={{ id }} />";
        let directive = Node::new("Let", 5, 22)
            .with("name", "item")
            .with("expression", Node::placeholder("ObjectExpression", 15, 21));
        let (result, tree, _) = run(source, directive);
        result.unwrap();
        assert_eq!(tree.child("expression").unwrap().kind(), "ObjectPattern");
    }

    #[test]
    fn test_let_call_is_rejected() {
        let source = "<Foo let:item={f()} />";
        let directive = Node::new("Let", 5, 19)
            .with("name", "item")
            .with("expression", Node::placeholder("CallExpression", 15, 18));
        let (result, _, _) = run(source, directive);
        let err = result.unwrap_err();
        assert_eq!(err.as_syntax().unwrap().offset, 15);
    }

    #[test]
    fn test_script_error_is_positioned() {
        let source = "{a +}";
        let tag = Node::new("MustacheTag", 0, 5)
            .with("expression", Node::placeholder("BinaryExpression", 1, 4));
        let (result, _, _) = run(source, tag);
        let err = result.unwrap_err();
        let syntax = err.as_syntax().unwrap();
        assert_eq!(syntax.origin, SyntaxOrigin::Script);
        assert_eq!(syntax.line, 1);
    }
}
