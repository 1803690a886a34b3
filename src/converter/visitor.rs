//! Handler-table traversal shared by the converter passes.
//!
//! A pass declares a static table of `(selector, phase, handler)` entries.
//! [`traverse`] walks the tree in visitor-key order and runs every matching
//! entry on enter and on leave. Handlers mutate the node in place or return a
//! replacement.

use crate::config::ParserOptions;
use crate::errors::{Error, InternalError};
use crate::keys;
use crate::node::{Node, Value};
use crate::position::PositionIndex;
use crate::script::ScriptParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Enter,
    Leave,
}

/// Structural node predicate.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Selector {
    Any,
    Kinds(&'static [&'static str]),
    Not(&'static [&'static str]),
    /// A node held in `field` of a parent whose kind is one of `parents`.
    Child {
        parents: &'static [&'static str],
        field: &'static str,
    },
}

impl Selector {
    fn matches(&self, node: &Node, ancestry: &Ancestry) -> bool {
        match self {
            Selector::Any => true,
            Selector::Kinds(kinds) => kinds.contains(&node.kind()),
            Selector::Not(kinds) => !kinds.contains(&node.kind()),
            Selector::Child { parents, field } => ancestry
                .parent()
                .is_some_and(|frame| frame.field == *field && parents.contains(&frame.kind.as_str())),
        }
    }
}

pub(crate) enum Action {
    Keep,
    Replace(Node),
}

/// Read-only inputs shared by every pass over one file.
pub(crate) struct Context<'a> {
    pub source: &'a str,
    pub index: &'a PositionIndex,
    pub parser: &'a dyn ScriptParser,
    pub options: &'a ParserOptions,
}

#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub kind: String,
    pub field: String,
}

/// Kinds and field names on the path from the root to the current node.
#[derive(Debug, Default)]
pub(crate) struct Ancestry {
    frames: Vec<Frame>,
}

impl Ancestry {
    pub(crate) fn parent(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn is_inside(&self, kind: &str) -> bool {
        self.frames.iter().any(|frame| frame.kind == kind)
    }

    fn push(&mut self, kind: &str, field: &str) {
        self.frames.push(Frame {
            kind: kind.to_string(),
            field: field.to_string(),
        });
    }

    fn pop(&mut self) {
        self.frames.pop();
    }
}

pub(crate) type HandlerFn<P> =
    fn(&mut P, &mut Node, &Context<'_>, &Ancestry) -> Result<Action, Error>;

pub(crate) struct Handler<P: 'static> {
    pub selector: Selector,
    pub phase: Phase,
    pub run: HandlerFn<P>,
}

pub(crate) trait Pass: Sized + 'static {
    const NAME: &'static str;
    const HANDLERS: &'static [Handler<Self>];
}

/// Runs `pass` over the tree rooted at `root`.
pub(crate) fn traverse<P: Pass>(pass: &mut P, root: &mut Node, ctx: &Context<'_>) -> Result<(), Error> {
    let _span = tracing::debug_span!("pass", name = P::NAME).entered();
    let mut ancestry = Ancestry::default();
    visit(pass, root, ctx, &mut ancestry)?;
    if ancestry.depth() != 0 {
        return Err(InternalError::DanglingAncestry {
            depth: ancestry.depth(),
        }
        .into());
    }
    tracing::trace!(pass = P::NAME, "pass finished");
    Ok(())
}

fn visit<P: Pass>(
    pass: &mut P,
    node: &mut Node,
    ctx: &Context<'_>,
    ancestry: &mut Ancestry,
) -> Result<(), Error> {
    run_phase(pass, node, ctx, ancestry, Phase::Enter)?;

    for key in keys::traversal_keys(node) {
        ancestry.push(node.kind(), &key);
        match node.get_mut(&key) {
            Some(Value::Node(child)) => visit(pass, child, ctx, ancestry)?,
            Some(Value::Nodes(children)) => {
                for child in children.iter_mut() {
                    visit(pass, child, ctx, ancestry)?;
                }
            }
            Some(Value::Sparse(children)) => {
                for child in children.iter_mut().flatten() {
                    visit(pass, child, ctx, ancestry)?;
                }
            }
            _ => {}
        }
        ancestry.pop();
    }

    run_phase(pass, node, ctx, ancestry, Phase::Leave)
}

fn run_phase<P: Pass>(
    pass: &mut P,
    node: &mut Node,
    ctx: &Context<'_>,
    ancestry: &Ancestry,
    phase: Phase,
) -> Result<(), Error> {
    let mut replaced = false;
    for handler in P::HANDLERS.iter().filter(|h| h.phase == phase) {
        if !handler.selector.matches(node, ancestry) {
            continue;
        }
        match (handler.run)(pass, node, ctx, ancestry)? {
            Action::Keep => {}
            Action::Replace(replacement) => {
                if replaced {
                    return Err(InternalError::ConflictingReplacement {
                        kind: replacement.kind().to_string(),
                        offset: replacement.start,
                    }
                    .into());
                }
                replaced = true;
                *node = replacement;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::OxcScriptParser;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl Recorder {
        fn enter(&mut self, node: &mut Node, _: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
            self.events.push(format!("enter {}", node.kind()));
            Ok(Action::Keep)
        }

        fn leave(&mut self, node: &mut Node, _: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
            self.events.push(format!("leave {}", node.kind()));
            Ok(Action::Keep)
        }

        fn expression(&mut self, node: &mut Node, _: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
            self.events.push(format!("expression {}", node.kind()));
            Ok(Action::Replace(Node::new("Identifier", node.start, node.end).with("name", "y")))
        }
    }

    impl Pass for Recorder {
        const NAME: &'static str = "recorder";
        const HANDLERS: &'static [Handler<Self>] = &[
            Handler {
                selector: Selector::Not(&["Text"]),
                phase: Phase::Enter,
                run: Recorder::enter,
            },
            Handler {
                selector: Selector::Child {
                    parents: &["MustacheTag"],
                    field: "expression",
                },
                phase: Phase::Enter,
                run: Recorder::expression,
            },
            Handler {
                selector: Selector::Kinds(&["Element"]),
                phase: Phase::Leave,
                run: Recorder::leave,
            },
        ];
    }

    struct DoubleReplace;

    impl DoubleReplace {
        fn replace(&mut self, node: &mut Node, _: &Context<'_>, _: &Ancestry) -> Result<Action, Error> {
            Ok(Action::Replace(node.clone()))
        }
    }

    impl Pass for DoubleReplace {
        const NAME: &'static str = "double";
        const HANDLERS: &'static [Handler<Self>] = &[
            Handler {
                selector: Selector::Any,
                phase: Phase::Enter,
                run: DoubleReplace::replace,
            },
            Handler {
                selector: Selector::Kinds(&["Text"]),
                phase: Phase::Enter,
                run: DoubleReplace::replace,
            },
        ];
    }

    fn tree() -> Node {
        Node::new("Element", 0, 14).with(
            "children",
            vec![
                Node::new("Text", 5, 6),
                Node::new("MustacheTag", 6, 9).with("expression", Node::placeholder("Identifier", 7, 8)),
            ],
        )
    }

    #[test]
    fn test_handlers_run_in_document_order() {
        let source = "<div>a{x}</div>";
        let index = PositionIndex::new(source);
        let parser = OxcScriptParser::default();
        let options = ParserOptions::default();
        let ctx = Context {
            source,
            index: &index,
            parser: &parser,
            options: &options,
        };
        let mut root = tree();
        let mut recorder = Recorder::default();
        traverse(&mut recorder, &mut root, &ctx).unwrap();
        assert_eq!(
            recorder.events,
            vec![
                "enter Element",
                "enter MustacheTag",
                "enter Identifier",
                "expression Identifier",
                "leave Element",
            ]
        );
        let expression = root.children("children")[1].child("expression").unwrap();
        assert_eq!(expression.str_field("name"), Some("y"));
        assert!(!expression.is_placeholder());
    }

    #[test]
    fn test_two_replacements_of_one_node_are_rejected() {
        let source = "<div>a{x}</div>";
        let index = PositionIndex::new(source);
        let parser = OxcScriptParser::default();
        let options = ParserOptions::default();
        let ctx = Context {
            source,
            index: &index,
            parser: &parser,
            options: &options,
        };
        let mut root = tree();
        let err = traverse(&mut DoubleReplace, &mut root, &ctx).unwrap_err();
        assert!(matches!(
            err,
            Error::Internal(InternalError::ConflictingReplacement { .. })
        ));
    }
}
