use oxc_allocator::Allocator;
use oxc_ast::ast::Expression;
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::config::ParserOptions;

use super::estree::EstreeBuilder;
use super::tokens::tokenize;
use super::{slice, ParsedExpression, ParsedProgram, ScriptError, ScriptParser};

/// Binding patterns are parsed as the single parameter of `(<pattern>) => 0`.
const PATTERN_PREFIX: &str = "(";
const PATTERN_SUFFIX: &str = ") => 0";

/// [`ScriptParser`] backed by `oxc_parser`. Every call gets its own arena, so
/// nothing is shared between calls or files.
#[derive(Debug, Clone)]
pub struct OxcScriptParser {
    source_type: SourceType,
    module: bool,
}

/// The oxc source type matching the configured script flavour.
pub(crate) fn source_type(options: &ParserOptions) -> SourceType {
    SourceType::default()
        .with_module(options.is_module())
        .with_typescript(options.typescript)
}

impl OxcScriptParser {
    pub fn new(options: &ParserOptions) -> Self {
        Self {
            source_type: source_type(options),
            module: options.is_module(),
        }
    }

    fn source_type_name(&self) -> &'static str {
        if self.module {
            "module"
        } else {
            "script"
        }
    }
}

impl Default for OxcScriptParser {
    fn default() -> Self {
        Self::new(&ParserOptions::default())
    }
}

fn first_error<E: ToString>(errors: &[E], offset: u32) -> ScriptError {
    let message = errors
        .first()
        .map(ToString::to_string)
        .unwrap_or_else(|| "Unexpected token".to_string());
    ScriptError::new(message, offset)
}

impl ScriptParser for OxcScriptParser {
    fn parse_expression_at(
        &self,
        source: &str,
        start: u32,
        end: u32,
        assignable: bool,
    ) -> Result<ParsedExpression, ScriptError> {
        let text = slice(source, start, end)?;
        if text.trim().is_empty() {
            return Err(ScriptError::new("Expected an expression", start));
        }
        let (tokens, comments) = tokenize(text, start)?;
        let allocator = Allocator::default();

        let expression = if assignable {
            let wrapped = format!("{PATTERN_PREFIX}{text}{PATTERN_SUFFIX}");
            let parsed = Parser::new(&allocator, &wrapped, self.source_type)
                .parse_expression()
                .map_err(|errors| first_error(&errors, start))?;
            let Expression::ArrowFunctionExpression(arrow) = &parsed else {
                return Err(ScriptError::new("Expected a binding pattern", start));
            };
            let [param] = &arrow.params.items[..] else {
                return Err(ScriptError::new("Expected a single binding pattern", start));
            };
            EstreeBuilder::new(&wrapped, start as i64 - PATTERN_PREFIX.len() as i64)
                .binding_pattern(&param.pattern)
        } else {
            let parsed = Parser::new(&allocator, text, self.source_type)
                .parse_expression()
                .map_err(|errors| first_error(&errors, start))?;
            EstreeBuilder::new(text, start as i64).expression(&parsed)
        };

        tracing::trace!(
            start,
            end,
            assignable,
            kind = expression.kind(),
            "parsed template expression"
        );
        Ok(ParsedExpression {
            expression,
            tokens,
            comments,
        })
    }

    fn parse_program(
        &self,
        source: &str,
        start: u32,
        end: u32,
    ) -> Result<ParsedProgram, ScriptError> {
        let text = slice(source, start, end)?;
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, text, self.source_type).parse();
        if !ret.errors.is_empty() {
            return Err(first_error(&ret.errors, start));
        }
        if ret.panicked {
            return Err(ScriptError::new("Unrecoverable script syntax error", start));
        }

        let program =
            EstreeBuilder::new(text, start as i64).program(&ret.program, start, end, self.source_type_name());
        let (tokens, comments) = tokenize(text, start)?;
        tracing::debug!(
            start,
            end,
            statements = program.children("body").len(),
            tokens = tokens.len(),
            "parsed script block"
        );
        Ok(ParsedProgram {
            program,
            tokens,
            comments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::TokenKind;

    #[test]
    fn test_expression_offsets_are_absolute() {
        let source = "<div>{a + b}</div>";
        let parsed = OxcScriptParser::default()
            .parse_expression_at(source, 6, 11, false)
            .unwrap();
        assert_eq!(parsed.expression.kind(), "BinaryExpression");
        assert_eq!((parsed.expression.start, parsed.expression.end), (6, 11));
        assert_eq!(parsed.expression.child("right").unwrap().start, 10);
        assert_eq!(parsed.tokens.len(), 3);
    }

    #[test]
    fn test_pattern_mode_returns_patterns() {
        let source = "{#each items as { id, name }}";
        let parsed = OxcScriptParser::default()
            .parse_expression_at(source, 16, 28, true)
            .unwrap();
        assert_eq!(parsed.expression.kind(), "ObjectPattern");
        assert_eq!(parsed.expression.start, 16);
        let first = &parsed.expression.children("properties")[0];
        assert_eq!(first.child("value").unwrap().str_field("name"), Some("id"));
        assert_eq!(first.child("value").unwrap().start, 18);
    }

    #[test]
    fn test_parentheses_are_unwrapped() {
        let source = "{(a)}";
        let parsed = OxcScriptParser::default()
            .parse_expression_at(source, 1, 4, false)
            .unwrap();
        assert_eq!(parsed.expression.kind(), "Identifier");
        assert_eq!((parsed.expression.start, parsed.expression.end), (2, 3));
        assert_eq!(parsed.tokens[0].kind, TokenKind::Punctuator);
    }

    #[test]
    fn test_rest_parameter_becomes_rest_element() {
        let source = "{(a, ...rest) => rest}";
        let parsed = OxcScriptParser::default()
            .parse_expression_at(source, 1, 21, false)
            .unwrap();
        assert_eq!(parsed.expression.kind(), "ArrowFunctionExpression");
        let params = parsed.expression.children("params");
        assert_eq!(params.len(), 2);
        assert_eq!(params[1].kind(), "RestElement");
        assert_eq!(params[1].start, 5);
        let argument = params[1].child("argument").unwrap();
        assert_eq!((argument.str_field("name"), argument.start), (Some("rest"), 8));
    }

    #[test]
    fn test_invalid_expression_is_a_script_error() {
        let err = OxcScriptParser::default()
            .parse_expression_at("{a +}", 1, 4, false)
            .unwrap_err();
        assert_eq!(err.offset, 1);
    }

    #[test]
    fn test_program_body_is_converted() {
        let source = "<script>let a = 1; export let b;</script>";
        let parsed = OxcScriptParser::default()
            .parse_program(source, 8, 32)
            .unwrap();
        let body = parsed.program.children("body");
        assert_eq!(body.len(), 2);
        assert_eq!(body[0].kind(), "VariableDeclaration");
        assert_eq!(body[0].start, 8);
        assert_eq!(body[1].kind(), "ExportNamedDeclaration");
    }
}
