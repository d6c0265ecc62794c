//! Registry of config classes and raw module trees.
//!
//! The registry is an explicit context object: build one at startup, register classes and
//! load fragments into it, then hand it read-only to parsers. Tests build isolated instances.

use crate::error::{ConfigError, Result};
use crate::instantiate::{ConfigObject, instantiate};
use crate::schema::ConfigClass;
use crate::syntax::SUBMODULE_SIGIL;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Identifies a registered module: a type plus an optional variant name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleKey {
    #[serde(rename = "type")]
    pub type_name: String,
    pub variant: String,
}

impl ModuleKey {
    pub fn new(type_name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            variant: variant.into(),
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variant.is_empty() {
            write!(f, "{}", self.type_name)
        } else {
            write!(f, "{}{}{}", self.type_name, SUBMODULE_SIGIL, self.variant)
        }
    }
}

/// Provenance of a registered module.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModuleHelp {
    /// The module this one inherits from, if any.
    pub base: Option<ModuleKey>,
    /// Files that contributed to this module, base chain first.
    pub files: Vec<PathBuf>,
    pub description: Option<String>,
    /// Source annotation of the class declaration.
    pub position: Option<String>,
}

/// Process-wide store of classes and raw module trees.
#[derive(Debug, Default)]
pub struct Registry {
    classes: BTreeMap<ModuleKey, Arc<ConfigClass>>,
    raw: BTreeMap<ModuleKey, Value>,
    help: BTreeMap<ModuleKey, ModuleHelp>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class under its own key and store its default tree.
    pub fn register(&mut self, class: ConfigClass) -> Result<Arc<ConfigClass>> {
        let key = class.key().clone();
        if self.contains(&key) {
            return Err(ConfigError::RepeatRegister(key.to_string()));
        }
        let help = ModuleHelp {
            base: class.parent().cloned(),
            files: Vec::new(),
            description: class.description().map(str::to_string),
            position: class.position().map(str::to_string),
        };
        let class = Arc::new(class);
        self.raw.insert(key.clone(), class.default_tree());
        self.help.insert(key.clone(), help);
        self.classes.insert(key.clone(), Arc::clone(&class));
        debug!(module = %key, "registered class");
        Ok(class)
    }

    /// Store a raw fragment that is not backed by its own class.
    pub fn insert_raw(&mut self, key: ModuleKey, tree: Value, help: ModuleHelp) -> Result<()> {
        if self.contains(&key) {
            return Err(ConfigError::RepeatRegister(key.to_string()));
        }
        self.raw.insert(key.clone(), tree);
        self.help.insert(key, help);
        Ok(())
    }

    /// Look up a registered class.
    pub fn get(&self, type_name: &str, variant: &str) -> Result<Arc<ConfigClass>> {
        if !self.classes.keys().any(|k| k.type_name == type_name) {
            return Err(ConfigError::NoModuleFound(format!(
                "there is no registered type named '{}'",
                type_name
            )));
        }
        self.classes
            .get(&ModuleKey::new(type_name, variant))
            .cloned()
            .ok_or_else(|| {
                ConfigError::NoModuleFound(format!(
                    "type '{}' has no registered variant named '{}'",
                    type_name, variant
                ))
            })
    }

    /// The constructor of a registered class: build a checked object from a resolved tree.
    pub fn construct(&self, type_name: &str, variant: &str, tree: &Value) -> Result<ConfigObject> {
        let class = self.get(type_name, variant)?;
        instantiate(tree, &class, self)
    }

    /// Raw tree of a class default or a loaded fragment.
    pub fn raw(&self, type_name: &str, variant: &str) -> Option<&Value> {
        self.raw.get(&ModuleKey::new(type_name, variant))
    }

    /// True if at least one class is registered for `type_name`.
    pub fn has_classes(&self, type_name: &str) -> bool {
        self.classes.keys().any(|k| k.type_name == type_name)
    }

    pub fn contains(&self, key: &ModuleKey) -> bool {
        self.raw.contains_key(key)
    }

    pub fn help(&self, key: &ModuleKey) -> Option<&ModuleHelp> {
        self.help.get(key)
    }

    /// All variants known for a type, classes and loaded fragments alike.
    pub fn variants(&self, type_name: &str) -> Vec<&str> {
        self.raw
            .keys()
            .filter(|k| k.type_name == type_name)
            .map(|k| k.variant.as_str())
            .collect()
    }

    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.raw.keys().map(|k| k.type_name.as_str()).collect();
        types.dedup();
        types
    }

    /// Every module key with its description, sorted by type then variant.
    pub fn modules(&self) -> Vec<(ModuleKey, Option<String>)> {
        self.raw
            .keys()
            .map(|k| {
                let description = self.help.get(k).and_then(|h| h.description.clone());
                (k.clone(), description)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.classes.clear();
        self.raw.clear();
        self.help.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSchema;
    use serde_json::json;

    fn class(type_name: &str, variant: &str) -> ConfigClass {
        ConfigClass::builder(type_name, variant)
            .field(FieldSchema::int("x", 1).build().unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_module_key_display() {
        assert_eq!(ModuleKey::new("model", "bert").to_string(), "model@bert");
        assert_eq!(ModuleKey::new("model", "").to_string(), "model");
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = Registry::new();
        let registered = registry.register(class("model", "a")).unwrap();
        let found = registry.get("model", "a").unwrap();
        assert!(Arc::ptr_eq(&registered, &found));
        assert_eq!(
            registry.raw("model", "a"),
            Some(&json!({"x": 1, "_name": "a"}))
        );
    }

    #[test]
    fn test_repeat_register() {
        let mut registry = Registry::new();
        registry.register(class("model", "a")).unwrap();
        let err = registry.register(class("model", "a")).unwrap_err();
        assert!(matches!(err, ConfigError::RepeatRegister(_)));

        let err = registry
            .insert_raw(ModuleKey::new("model", "a"), json!({}), ModuleHelp::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::RepeatRegister(_)));
    }

    #[test]
    fn test_get_missing() {
        let mut registry = Registry::new();
        registry.register(class("model", "a")).unwrap();
        let err = registry.get("optim", "a").unwrap_err();
        assert!(err.to_string().contains("no registered type"));
        let err = registry.get("model", "b").unwrap_err();
        assert!(matches!(err, ConfigError::NoModuleFound(_)));
    }

    #[test]
    fn test_indexes_and_clear() {
        let mut registry = Registry::new();
        registry.register(class("model", "a")).unwrap();
        registry.register(class("model", "b")).unwrap();
        registry.register(class("optim", "")).unwrap();
        registry
            .insert_raw(
                ModuleKey::new("model", "c"),
                json!({"_base": "a"}),
                ModuleHelp::default(),
            )
            .unwrap();

        assert_eq!(registry.variants("model"), ["a", "b", "c"]);
        assert_eq!(registry.types(), ["model", "optim"]);
        assert_eq!(registry.len(), 4);
        // fragments have raw trees but no class
        assert!(registry.get("model", "c").is_err());

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get("model", "a").is_err());
    }
}
