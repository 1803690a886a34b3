//! Lint rules that run on the parse result.

pub mod compiler_warnings;
pub mod processor;

use serde::{Deserialize, Serialize};

use crate::ParserServices;

pub use self::compiler_warnings::{CompilerWarnings, CompilerWarningsOptions};

/// One lint diagnostic. `line` is 1-based; `column` is whatever the
/// reporting rule positions it with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub rule_id: String,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

pub trait Rule {
    fn id(&self) -> &'static str;

    fn check(&self, services: &ParserServices) -> Vec<Report>;
}
