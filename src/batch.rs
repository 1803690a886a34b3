//! Batch linting of a directory tree.
//!
//! Files are discovered with `walkdir` and processed in parallel with
//! `rayon`. Every file gets its own compiler, script parser, position index,
//! tree and scope manager; nothing is shared between workers.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::ParserOptions;
use crate::errors::{Error, InternalError, SyntaxError};
use crate::rules::processor::postprocess;
use crate::rules::{CompilerWarnings, CompilerWarningsOptions, Report, Rule};

fn default_extensions() -> Vec<String> {
    vec!["svelte".to_string()]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LintConfig {
    pub parser: ParserOptions,
    pub compiler_warnings: CompilerWarningsOptions,
    /// File extensions to lint, without the dot.
    pub extensions: Vec<String>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            parser: ParserOptions::default(),
            compiler_warnings: CompilerWarningsOptions::default(),
            extensions: default_extensions(),
        }
    }
}

impl LintConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug)]
pub enum FileOutcome {
    Reports(Vec<Report>),
    Syntax(SyntaxError),
    Internal(InternalError),
    Io(std::io::Error),
}

#[derive(Debug)]
pub struct FileResult {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

fn find_component_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|wanted| wanted == ext))
        })
        .collect();
    files.sort();
    files
}

/// Parses one component and runs the rules on it.
pub fn lint_source(source: &str, config: &LintConfig) -> Result<Vec<Report>, Error> {
    let result = crate::parse_for_eslint(source, &config.parser)?;
    let rule = CompilerWarnings::new(&config.compiler_warnings);
    Ok(postprocess(rule.check(&result.services)))
}

fn lint_file(path: &Path, config: &LintConfig) -> FileOutcome {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => return FileOutcome::Io(err),
    };
    let mut parser = config.parser.clone();
    parser.file_path = Some(path.to_string_lossy().to_string());
    let config = LintConfig {
        parser,
        ..config.clone()
    };
    match lint_source(&source, &config) {
        Ok(reports) => FileOutcome::Reports(reports),
        Err(Error::Syntax(err)) => {
            tracing::warn!(path = %path.display(), error = %err, "component failed to parse");
            FileOutcome::Syntax(err)
        }
        Err(Error::Internal(err)) => {
            tracing::error!(path = %path.display(), error = %err, "internal error while parsing component");
            FileOutcome::Internal(err)
        }
    }
}

/// Lints every component file under `root`, in path order.
pub fn lint_directory(root: &Path, config: &LintConfig) -> Vec<FileResult> {
    let files = find_component_files(root, &config.extensions);
    tracing::debug!(root = %root.display(), files = files.len(), "linting directory");
    files
        .into_par_iter()
        .map(|path| {
            let outcome = lint_file(&path, config);
            FileResult { path, outcome }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_config_defaults_and_camel_case() {
        let config = LintConfig::from_json_str(
            r#"{"compilerWarnings":{"ignore":["a11y-autofocus"]},"parser":{"typescript":true}}"#,
        )
        .unwrap();
        assert_eq!(config.extensions, vec!["svelte"]);
        assert!(config.parser.typescript);
        assert_eq!(config.compiler_warnings.ignore, vec!["a11y-autofocus"]);
    }

    #[test]
    fn test_lint_directory_separates_outcomes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.svelte"), "<img src=\"x.png\">").unwrap();
        fs::write(dir.path().join("b.svelte"), "<div>").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/c.svelte"), "<p>ok</p>").unwrap();
        fs::write(dir.path().join("notes.txt"), "<div>").unwrap();

        let results = lint_directory(dir.path(), &LintConfig::default());
        assert_eq!(results.len(), 3);

        match &results[0].outcome {
            FileOutcome::Reports(reports) => {
                assert_eq!(reports.len(), 1);
                assert_eq!(reports[0].rule_id, "svelte/compiler-warnings/a11y-missing-attribute");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        match &results[1].outcome {
            FileOutcome::Syntax(err) => assert!(err.message.starts_with("unclosed-element")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(matches!(&results[2].outcome, FileOutcome::Reports(r) if r.is_empty()));
    }

    #[test]
    fn test_ignored_warning_is_not_reported() {
        let config = LintConfig::from_json_str(r#"{"compilerWarnings":{"ignore":["a11y-missing-attribute"]}}"#)
            .unwrap();
        let reports = lint_source("<img src=\"x.png\">", &config).unwrap();
        assert!(reports.is_empty());
    }
}
