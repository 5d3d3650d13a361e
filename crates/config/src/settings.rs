// Formula editor settings
// Loaded from ~/.config/kpiform/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use kpiform_engine::editor::EditorOptions;
use kpiform_engine::formula::tree::UnknownFunctionPolicy;
use kpiform_engine::formula::validate::FormulaValidator;

const DEFAULT_FILE: &str = r#"{
    // Editor
    // Pad inserted metric tokens with a space on either side
    "editor.padTokens": true,
    // Refuse "+", "-", "*", "/" or "." typed next to another one
    "editor.rejectAdjacentOperators": true,
    "editor.allowDecimalPoint": true,

    // Formula
    // Functions with no calculation mapping: "reject" or "placeholder"
    "formula.unknownFunctions": "reject",

    // Output
    "output.pretty": false,

    // Metric catalog (JSON array of {"id", "displayLabel"}), null = none
    "catalog.path": null
}
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Editor
    #[serde(rename = "editor.padTokens")]
    pub pad_tokens: bool,

    #[serde(rename = "editor.rejectAdjacentOperators")]
    pub reject_adjacent_operators: bool,

    #[serde(rename = "editor.allowDecimalPoint")]
    pub allow_decimal_point: bool,

    // Formula
    #[serde(rename = "formula.unknownFunctions")]
    pub unknown_functions: UnknownFunctionPolicy,

    // Output
    #[serde(rename = "output.pretty")]
    pub pretty_output: bool,

    // Catalog
    #[serde(rename = "catalog.path")]
    pub catalog_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pad_tokens: true,
            reject_adjacent_operators: true,
            allow_decimal_point: true,
            unknown_functions: UnknownFunctionPolicy::Reject,
            pretty_output: false,
            catalog_path: None,
        }
    }
}

/// Drop `//` comment lines so the file can carry documentation.
fn strip_comments(contents: &str) -> String {
    contents
        .lines()
        .filter(|line| !line.trim().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kpiform");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load settings from `path`. A missing file gives defaults silently;
    /// an unreadable or malformed one gives defaults with a warning.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            log::debug!("no settings at {}, using defaults", path.display());
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Error parsing {}: {}", path.display(), e);
                    log::warn!("Using default settings");
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse settings JSON (comment lines allowed).
    pub fn parse(contents: &str) -> Result<Self, String> {
        serde_json::from_str(&strip_comments(contents)).map_err(|e| e.to_string())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Write the commented default settings file. Refuses to overwrite an
    /// existing file unless `force` is set.
    pub fn create_default_file(path: &Path, force: bool) -> Result<(), String> {
        if path.exists() && !force {
            return Err(format!("{} already exists", path.display()));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("creating {}: {}", parent.display(), e))?;
        }

        fs::write(path, DEFAULT_FILE).map_err(|e| format!("writing {}: {}", path.display(), e))
    }

    pub fn editor_options(&self) -> EditorOptions {
        EditorOptions {
            pad_tokens: self.pad_tokens,
            reject_adjacent_operators: self.reject_adjacent_operators,
            allow_decimal_point: self.allow_decimal_point,
        }
    }

    pub fn validator(&self) -> FormulaValidator {
        FormulaValidator::with_policy(self.unknown_functions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_file_parses_to_defaults() {
        assert_eq!(Settings::parse(DEFAULT_FILE).unwrap(), Settings::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let settings = Settings::parse(
            r#"{
                // lenient mode
                "formula.unknownFunctions": "placeholder",
                "output.pretty": true
            }"#,
        )
        .unwrap();
        assert_eq!(settings.unknown_functions, UnknownFunctionPolicy::Placeholder);
        assert!(settings.pretty_output);
        assert!(settings.pad_tokens);
        assert_eq!(settings.catalog_path, None);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let settings = Settings::parse(r#"{"grid.rowHeight": 24}"#).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_bad_policy_is_error() {
        assert!(Settings::parse(r#"{"formula.unknownFunctions": "ignore"}"#).is_err());
    }

    #[test]
    fn test_editor_options_mapping() {
        let settings = Settings {
            pad_tokens: false,
            allow_decimal_point: false,
            ..Settings::default()
        };
        let options = settings.editor_options();
        assert!(!options.pad_tokens);
        assert!(options.reject_adjacent_operators);
        assert!(!options.allow_decimal_point);
    }

    #[test]
    fn test_serialized_keys() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["formula.unknownFunctions"], "reject");
        assert_eq!(json["editor.padTokens"], true);
        assert!(json["catalog.path"].is_null());
    }
}
