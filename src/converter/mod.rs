//! Template AST to ESTree conversion.
//!
//! Three passes run over one owned tree, always in this order:
//!
//! 1. [`TagTokenizer`]: markup tokens and identifier expansion.
//! 2. [`ExpressionEmbedder`]: placeholder re-parsing.
//! 3. [`TreeNormalizer`]: relabelling, locations, the final `Program`.

mod expressions;
pub(crate) mod lexer;
mod normalizer;
mod tag_tokenizer;
mod token_collection;
pub(crate) mod visitor;

use crate::compiler::TemplateAst;
use crate::config::ParserOptions;
use crate::errors::Error;
use crate::node::{Ast, Node};
use crate::position::PositionIndex;
use crate::script::ScriptParser;

use self::expressions::ExpressionEmbedder;
use self::normalizer::TreeNormalizer;
use self::tag_tokenizer::TagTokenizer;
use self::visitor::{traverse, Context};

/// The finished tree plus the original `<style>`/`<script>` elements kept
/// for rules that report against the tags themselves.
#[derive(Debug, Clone)]
pub struct Converted {
    pub ast: Ast,
    pub css: Option<Node>,
    pub instance: Option<Node>,
    pub module: Option<Node>,
}

pub fn convert(
    template: TemplateAst,
    source: &str,
    index: &PositionIndex,
    parser: &dyn ScriptParser,
    options: &ParserOptions,
) -> Result<Converted, Error> {
    let mut root = Node::new("TemplateRoot", 0, index.source_len())
        .with("html", template.html)
        .with("css", template.css)
        .with("instance", template.instance)
        .with("module", template.module);
    let ctx = Context {
        source,
        index,
        parser,
        options,
    };

    let mut tags = TagTokenizer::default();
    traverse(&mut tags, &mut root, &ctx)?;

    let mut embedder = ExpressionEmbedder::default();
    traverse(&mut embedder, &mut root, &ctx)?;
    tracing::debug!(expressions = embedder.embedded, "expressions embedded");

    let mut tokens = tags.tokens;
    tokens.append(&mut embedder.tokens);
    let mut comments = tags.comments;
    comments.append(&mut embedder.comments);

    let mut normalizer = TreeNormalizer::new(tokens, comments);
    traverse(&mut normalizer, &mut root, &ctx)?;

    Ok(Converted {
        ast: Ast {
            program: root,
            tokens: normalizer.tokens,
            comments: normalizer.comments,
        },
        css: normalizer.css,
        instance: normalizer.instance,
        module: normalizer.module,
    })
}
