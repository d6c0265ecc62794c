//! Settings loader with tier-based merging.
//!
//! Loads settings from multiple tiers and merges them field-by-field.

use super::merge::deep_merge_all;
use super::types::Settings;
use crate::format::OutputFormat;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Project settings file names, in lookup order.
const PROJECT_FILES: [&str; 2] = ["config-graph.yaml", ".config-graph.yaml"];

/// Settings tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Built-in defaults (lowest priority)
    Defaults = 0,
    /// Project-level settings ($CWD/config-graph.yaml)
    Project = 1,
    /// User-level settings (~/.config-graph/config.yaml)
    User = 2,
    /// Environment variables (highest priority)
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Locations for each settings tier.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Project directory searched for `config-graph.yaml`
    pub project_dir: Option<PathBuf>,
    /// User-level settings directory
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover settings paths from environment and defaults.
    pub fn discover() -> Self {
        // User dir: CONFIG_GRAPH_USER_DIR or ~/.config-graph
        let user_dir = std::env::var("CONFIG_GRAPH_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".config-graph")));

        // Project dir: CONFIG_GRAPH_PROJECT_DIR or $CWD
        let project_dir = std::env::var("CONFIG_GRAPH_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from(".")));

        Self {
            project_dir,
            user_dir,
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }

    /// The first existing project settings file.
    pub fn project_file(&self) -> Option<PathBuf> {
        let dir = self.project_dir.as_ref()?;
        PROJECT_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// The user settings file, if it exists.
    pub fn user_file(&self) -> Option<PathBuf> {
        let path = self.user_dir.as_ref()?.join("config.yaml");
        path.exists().then_some(path)
    }
}

/// Settings loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Paths for each tier
    pub paths: ConfigPaths,
    /// Loaded settings
    settings: Settings,
    /// Settings files that contributed, lowest tier first
    sources: Vec<(ConfigTier, PathBuf)>,
}

impl ConfigLoader {
    /// Load settings from all tiers with proper merging.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover())
    }

    /// Load settings with explicit paths.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        // Check for explicit settings path override
        if let Ok(explicit_path) = std::env::var("CONFIG_GRAPH_CONFIG_PATH") {
            return Self::load_explicit(paths, PathBuf::from(explicit_path));
        }

        let mut values: Vec<Value> = Vec::new();
        let mut sources = Vec::new();

        // Tier 1: Defaults
        values.push(serde_json::to_value(Settings::default())?);

        // Tier 2: Project settings
        if let Some(file) = paths.project_file() {
            if let Some(value) = read_tier(&file) {
                values.push(value);
                sources.push((ConfigTier::Project, file));
            }
        }

        // Tier 3: User settings
        if let Some(file) = paths.user_file() {
            if let Some(value) = read_tier(&file) {
                values.push(value);
                sources.push((ConfigTier::User, file));
            }
        }

        let merged = deep_merge_all(values);
        let mut settings: Settings = serde_json::from_value(merged)?;

        // Tier 4: Environment variable overrides
        Self::apply_env_overrides(&mut settings);

        debug!(?sources, "settings loaded");
        Ok(Self {
            paths,
            settings,
            sources,
        })
    }

    /// Load a single settings file, bypassing the project and user tiers.
    pub fn load_explicit(paths: ConfigPaths, path: PathBuf) -> Result<Self> {
        let mut settings = Settings::load(&path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        Self::apply_env_overrides(&mut settings);
        Ok(Self {
            paths,
            settings,
            sources: vec![(ConfigTier::Project, path)],
        })
    }

    /// Apply environment variable overrides to settings.
    fn apply_env_overrides(settings: &mut Settings) {
        if let Some(modules) = std::env::var_os("CONFIG_GRAPH_MODULES") {
            settings.modules = std::env::split_paths(&modules).collect();
        }

        if let Ok(depth) = std::env::var("CONFIG_GRAPH_MAX_DEPTH") {
            match depth.parse() {
                Ok(depth) => settings.max_depth = depth,
                Err(_) => warn!(value = %depth, "ignoring invalid CONFIG_GRAPH_MAX_DEPTH"),
            }
        }

        if let Ok(format) = std::env::var("CONFIG_GRAPH_FORMAT") {
            match OutputFormat::from_str(&format) {
                Some(format) => settings.format = format,
                None => warn!(value = %format, "ignoring invalid CONFIG_GRAPH_FORMAT"),
            }
        }
    }

    /// Get the loaded settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get mutable access to the settings.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Consume the loader and return the settings.
    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Settings files that contributed, lowest tier first.
    pub fn sources(&self) -> &[(ConfigTier, PathBuf)] {
        &self.sources
    }

    /// Directory that relative module paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        self.sources
            .last()
            .and_then(|(_, path)| path.parent())
            .or(self.paths.project_dir.as_deref())
            .unwrap_or(Path::new("."))
    }
}

/// Read one tier's YAML file, warning and skipping it if it is malformed.
fn read_tier(file: &Path) -> Option<Value> {
    let content = match std::fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %file.display(), error = %e, "could not read settings file");
            return None;
        }
    };
    match serde_yaml::from_str::<Value>(&content) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %file.display(), error = %e, "could not parse settings file");
            None
        }
    }
}
