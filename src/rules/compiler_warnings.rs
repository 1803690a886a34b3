//! Relays compiler warnings as lint reports.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ParserServices;

use super::{Report, Rule};

pub const RULE_ID: &str = "svelte/compiler-warnings";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerWarningsOptions {
    /// Warning codes that are never reported.
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CompilerWarnings {
    ignore: HashSet<String>,
}

impl CompilerWarnings {
    pub fn new(options: &CompilerWarningsOptions) -> Self {
        Self {
            ignore: options.ignore.iter().cloned().collect(),
        }
    }
}

impl Rule for CompilerWarnings {
    fn id(&self) -> &'static str {
        RULE_ID
    }

    /// Positions come from the warning itself, never from the converted
    /// tree.
    fn check(&self, services: &ParserServices) -> Vec<Report> {
        services
            .warnings
            .iter()
            .filter(|warning| !self.ignore.contains(&warning.code))
            .map(|warning| Report {
                rule_id: RULE_ID.to_string(),
                message: format!("{}: {}", warning.code, warning.message),
                line: warning.start.line,
                column: warning.start.column,
            })
            .collect()
    }
}
