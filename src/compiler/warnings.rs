//! Compiler diagnostics that do not stop compilation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::InternalError;
use crate::node::{Node, Value};
use crate::position::PositionIndex;

use super::vars::Analysis;
use super::{TemplateAst, WarningPosition};

lazy_static::lazy_static! {
    /// Names a template may use without declaring them.
    pub static ref KNOWN_GLOBALS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        // Language globals
        s.insert("Array");
        s.insert("Boolean");
        s.insert("Date");
        s.insert("Error");
        s.insert("Infinity");
        s.insert("Intl");
        s.insert("JSON");
        s.insert("Map");
        s.insert("Math");
        s.insert("NaN");
        s.insert("Number");
        s.insert("Object");
        s.insert("Promise");
        s.insert("RegExp");
        s.insert("Set");
        s.insert("String");
        s.insert("Symbol");
        s.insert("decodeURIComponent");
        s.insert("encodeURIComponent");
        s.insert("isNaN");
        s.insert("parseFloat");
        s.insert("parseInt");
        s.insert("undefined");

        // Browser environment
        s.insert("alert");
        s.insert("console");
        s.insert("document");
        s.insert("globalThis");
        s.insert("localStorage");
        s.insert("location");
        s.insert("navigator");
        s.insert("window");
        s
    };
}

const DISTRACTING_ELEMENTS: &[&str] = &["blink", "marquee"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub code: String,
    pub message: String,
    pub start: WarningPosition,
    pub end: WarningPosition,
}

struct WarningSink<'s> {
    index: &'s PositionIndex,
    warnings: Vec<Warning>,
}

impl WarningSink<'_> {
    fn push(&mut self, code: &str, message: String, start: u32, end: u32) -> Result<(), InternalError> {
        self.warnings.push(Warning {
            code: code.to_string(),
            message,
            start: WarningPosition::at(self.index, start)?,
            end: WarningPosition::at(self.index, end)?,
        });
        Ok(())
    }

    fn element(&mut self, node: &Node) -> Result<(), InternalError> {
        let Some(name) = node.str_field("name") else {
            return Ok(());
        };
        let attributes = node.children("attributes");
        let attribute = |wanted: &str| {
            attributes
                .iter()
                .find(|a| a.is("Attribute") && a.str_field("name") == Some(wanted))
        };
        let has_spread = attributes.iter().any(|a| a.is("Spread"));

        if DISTRACTING_ELEMENTS.contains(&name) {
            self.push(
                "a11y-distracting-elements",
                format!("A11y: Avoid <{name}> elements"),
                node.start,
                node.end,
            )?;
        }
        if name == "img" && !has_spread && attribute("alt").is_none() {
            self.push(
                "a11y-missing-attribute",
                "A11y: <img> element should have an alt attribute".to_string(),
                node.start,
                node.end,
            )?;
        }
        if let Some(autofocus) = attribute("autofocus") {
            self.push(
                "a11y-autofocus",
                "A11y: Avoid using autofocus".to_string(),
                autofocus.start,
                autofocus.end,
            )?;
        }
        Ok(())
    }

    fn walk(&mut self, node: &Node) -> Result<(), InternalError> {
        if node.is("Element") {
            self.element(node)?;
        }
        for (key, value) in node.fields() {
            if key == "attributes" {
                continue;
            }
            match value {
                Value::Node(child) => self.walk(child)?,
                Value::Nodes(children) => {
                    for child in children {
                        self.walk(child)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

pub(crate) fn collect(
    index: &PositionIndex,
    ast: &TemplateAst,
    analysis: &Analysis,
) -> Result<Vec<Warning>, InternalError> {
    let mut sink = WarningSink {
        index,
        warnings: Vec::new(),
    };
    sink.walk(&ast.html)?;

    for variable in &analysis.vars {
        let unused = variable.export_name.is_some()
            && variable.writable
            && !variable.module
            && !variable.referenced
            && !variable.referenced_from_script;
        if !unused {
            continue;
        }
        if let Some(&(start, end)) = analysis.declarations.get(&variable.name) {
            sink.push(
                "unused-export-let",
                format!(
                    "Component has unused export property '{}'. If it is for external reference only, please consider using `export const {}`",
                    variable.name, variable.name
                ),
                start,
                end,
            )?;
        }
    }

    // Components without an instance script take their template names from the host.
    let undeclared = if ast.instance.is_some() {
        analysis.undeclared.as_slice()
    } else {
        &[]
    };
    for (name, offset) in undeclared {
        if KNOWN_GLOBALS.contains(name.as_str()) || name.starts_with("$$") {
            continue;
        }
        sink.push(
            "missing-declaration",
            format!("'{name}' is not defined"),
            *offset,
            offset + name.len() as u32,
        )?;
    }

    sink.warnings
        .sort_by_key(|w| (w.start.character, w.end.character));
    Ok(sink.warnings)
}

#[cfg(test)]
mod tests {
    use crate::compiler::{MarkupCompiler, TemplateCompiler};

    fn codes(source: &str) -> Vec<String> {
        MarkupCompiler::default()
            .compile(source)
            .unwrap()
            .warnings
            .into_iter()
            .map(|w| w.code)
            .collect()
    }

    #[test]
    fn test_img_without_alt() {
        assert_eq!(codes("<img src=\"a.png\">"), vec!["a11y-missing-attribute"]);
        assert!(codes("<img src=\"a.png\" alt=\"\">").is_empty());
        assert!(codes("<img {...props}>").iter().all(|c| c != "a11y-missing-attribute"));
    }

    #[test]
    fn test_autofocus_and_distracting_elements() {
        assert_eq!(
            codes("<marquee><input autofocus></marquee>"),
            vec!["a11y-distracting-elements", "a11y-autofocus"]
        );
    }

    #[test]
    fn test_unused_export_let() {
        assert_eq!(codes("<script>export let title;</script>"), vec!["unused-export-let"]);
        assert!(codes("<script>export let title;</script><h1>{title}</h1>").is_empty());
        assert!(codes("<script>export const title = 1;</script>").is_empty());
    }

    #[test]
    fn test_missing_declaration_skips_globals() {
        let output = MarkupCompiler::default()
            .compile("<script>let b;</script>\n<p>{Math.max(a, b)}</p>")
            .unwrap();
        assert_eq!(output.warnings.len(), 1);
        let warning = &output.warnings[0];
        assert_eq!(warning.code, "missing-declaration");
        assert_eq!(warning.message, "'a' is not defined");
        assert_eq!(warning.start.character, 37);
        assert_eq!((warning.start.line, warning.start.column), (2, 13));
    }

    #[test]
    fn test_scriptless_component_has_no_missing_declaration() {
        assert!(codes("<p>{a}</p>").is_empty());
    }
}
