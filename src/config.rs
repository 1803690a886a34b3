//! Parser configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptSourceType {
    #[default]
    Module,
    Script,
}

impl ScriptSourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptSourceType::Module => "module",
            ScriptSourceType::Script => "script",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParserOptions {
    pub source_type: ScriptSourceType,
    /// Accept TypeScript syntax inside scripts and template expressions.
    pub typescript: bool,
    pub file_path: Option<String>,
}

impl ParserOptions {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_module(&self) -> bool {
        self.source_type == ScriptSourceType::Module
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_fields_are_missing() {
        let options = ParserOptions::from_json_str("{}").unwrap();
        assert_eq!(options, ParserOptions::default());
        assert!(options.is_module());
    }

    #[test]
    fn test_camel_case_fields() {
        let options =
            ParserOptions::from_json_str(r#"{"sourceType":"script","filePath":"App.svelte"}"#)
                .unwrap();
        assert_eq!(options.source_type, ScriptSourceType::Script);
        assert_eq!(options.file_path.as_deref(), Some("App.svelte"));
    }
}
