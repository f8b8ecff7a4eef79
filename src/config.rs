//! Translator settings. Every key has a default so a config file may name only what it changes.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::path_de::from_str_with_path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslatorConfig {
    /// Original SV excerpts and per-block metrics as docstrings.
    pub verbose: bool,
    /// Mark runs of adjacent simple range/membership statements as one group.
    pub group_adjacent_ranges: bool,
    pub usage_scaffold: bool,
    pub scaffold_field_limit: usize,
    pub indent: String,
    /// Appended to identifiers that collide with Python keywords.
    pub reserved_suffix: String,
    pub jobs: usize,       // unit-level workers
    pub class_jobs: usize, // container-level workers inside one unit
    pub source_extensions: Vec<String>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            group_adjacent_ranges: false,
            usage_scaffold: true,
            scaffold_field_limit: 5,
            indent: "    ".to_string(),
            reserved_suffix: "_".to_string(),
            jobs: 1,
            class_jobs: 1,
            source_extensions: vec!["sv".to_string(), "svh".to_string()],
        }
    }
}

impl TranslatorConfig {
    pub fn from_json(src: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = from_str_with_path(src).map_err(|err| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        config.validate(path)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&src, path)
    }

    fn validate(self, path: &Path) -> Result<Self, ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if self.indent.is_empty() || self.indent.chars().any(|c| c != ' ' && c != '\t') {
            return Err(invalid("`indent` must be non-empty whitespace"));
        }
        if self.reserved_suffix.is_empty()
            || !self.reserved_suffix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(invalid("`reserved_suffix` must be a non-empty identifier suffix"));
        }
        Ok(self)
    }

    /// Worker counts of zero mean one.
    pub fn unit_workers(&self) -> usize {
        self.jobs.max(1)
    }
    pub fn class_workers(&self) -> usize {
        self.class_jobs.max(1)
    }

    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.source_extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = TranslatorConfig::from_json(r#"{"verbose": true, "jobs": 4}"#, Path::new("c.json")).unwrap();
        assert!(config.verbose);
        assert_eq!(config.jobs, 4);
        assert_eq!(config.scaffold_field_limit, 5);
        assert_eq!(config.reserved_suffix, "_");
    }

    #[test]
    fn bad_values_carry_their_path() {
        let err = TranslatorConfig::from_json(r#"{"class_jobs": -1}"#, Path::new("c.json")).unwrap_err();
        assert!(err.to_string().contains("class_jobs"), "{err}");
        let err = TranslatorConfig::from_json(r#"{"colour": true}"#, Path::new("c.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        let err = TranslatorConfig::from_json(r#"{"indent": "--"}"#, Path::new("c.json")).unwrap_err();
        assert!(err.to_string().contains("indent"));
    }

    #[test]
    fn source_extensions_match_case_insensitively() {
        let config = TranslatorConfig::default();
        assert!(config.is_source_file(Path::new("a/pkt.SV")));
        assert!(config.is_source_file(Path::new("defs.svh")));
        assert!(!config.is_source_file(Path::new("notes.txt")));
        assert_eq!(TranslatorConfig { jobs: 0, ..config }.unit_workers(), 1);
    }
}
