//! Settings of the config-graph tool itself.
//!
//! These control where module fragments are discovered and how the resolver guards itself;
//! they are not part of the documents being resolved.

use crate::format::OutputFormat;
use crate::parser::ParserOptions;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default recursion cap for base chains, submodule nesting and search re-resolution.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Tool settings, merged from defaults, project, user and environment tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Directories walked for module fragments and class declarations.
    #[serde(default)]
    pub modules: Vec<PathBuf>,

    /// Skip unreadable or malformed module files instead of failing (default: false).
    #[serde(default)]
    pub ignore_errors: bool,

    /// Maximum resolution depth (default: 64).
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Output format for resolved configs.
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            ignore_errors: false,
            max_depth: default_max_depth(),
            format: OutputFormat::default(),
        }
    }
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Settings {
    /// Load settings from a single YAML (or JSON) file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Handle empty or comment-only YAML files (which parse as null)
        let settings: Option<Settings> = serde_yaml::from_str(&content)?;
        Ok(settings.unwrap_or_default())
    }

    /// Options handed to the resolution engine.
    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            max_depth: self.max_depth,
        }
    }

    /// Resolve relative module directories against `base`.
    pub fn module_dirs(&self, base: &Path) -> Vec<PathBuf> {
        self.modules
            .iter()
            .map(|dir| {
                if dir.is_absolute() {
                    dir.clone()
                } else {
                    base.join(dir)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.modules.is_empty());
        assert!(!settings.ignore_errors);
        assert_eq!(settings.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(settings.format, OutputFormat::Json);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let settings: Settings = serde_yaml::from_str("modules: [configs]\n").unwrap();
        assert_eq!(settings.modules, vec![PathBuf::from("configs")]);
        assert_eq!(settings.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_module_dirs_relative_to_base() {
        let settings = Settings {
            modules: vec![PathBuf::from("configs"), PathBuf::from("/abs/dir")],
            ..Settings::default()
        };
        let dirs = settings.module_dirs(Path::new("/project"));
        assert_eq!(dirs[0], PathBuf::from("/project/configs"));
        assert_eq!(dirs[1], PathBuf::from("/abs/dir"));
    }

    #[test]
    fn test_empty_file_is_default() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config-graph.yaml");
        std::fs::write(&path, "# nothing here\n").unwrap();
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());
    }
}
