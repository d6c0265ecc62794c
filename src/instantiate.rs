//! Checked objects built from resolved trees.
//!
//! Every leaf of a resolved module is run through its field's check, absent fields take
//! their defaults, and each slot becomes a child object of the class its `_name` (or slot
//! variant) selects. Types with no registered class at all are kept as generic objects.

use crate::error::{ConfigError, Result};
use crate::registry::{ModuleKey, Registry};
use crate::schema::{ConfigClass, FieldSchema, same_value};
use crate::syntax::{
    ANCHOR_KEY, BASE_KEY, GLOBAL_KEY, NAME_KEY, SEARCH_KEY, SUBMODULE_SIGIL, SlotKey, TAG_SIGIL,
    is_slot_key,
};
use crate::trace::SlotKeyIndex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Keys that steer resolution and never reach an object.
const CONTROL_KEYS: [&str; 5] = [BASE_KEY, NAME_KEY, SEARCH_KEY, GLOBAL_KEY, ANCHOR_KEY];

/// A resolved, validated module instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigObject {
    module: Option<ModuleKey>,
    values: BTreeMap<String, Value>,
    nested: BTreeMap<String, ConfigObject>,
    /// Keyed by full slot key (`@type[@variant][#tag]`).
    submodules: BTreeMap<String, ConfigObject>,
}

impl ConfigObject {
    fn empty(module: Option<ModuleKey>) -> Self {
        Self {
            module,
            values: BTreeMap::new(),
            nested: BTreeMap::new(),
            submodules: BTreeMap::new(),
        }
    }

    /// The class this object was built from; `None` for root documents.
    pub fn module(&self) -> Option<&ModuleKey> {
        self.module.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// The object of a nested field.
    pub fn nested(&self, name: &str) -> Option<&ConfigObject> {
        self.nested.get(name)
    }

    /// Look up a submodule by slot key, with or without the leading `@`.
    ///
    /// Unambiguous abbreviations work too: `#1` finds `@child@base#1`.
    pub fn submodule(&self, name: &str) -> Result<&ConfigObject> {
        let key = if name.starts_with(SUBMODULE_SIGIL) || name.starts_with(TAG_SIGIL) {
            name.to_string()
        } else {
            format!("{}{}", SUBMODULE_SIGIL, name)
        };
        if let Some(object) = self.submodules.get(&key) {
            return Ok(object);
        }
        let index = SlotKeyIndex::new(self.submodules.keys().map(String::as_str));
        let full = index.get(&key)?;
        self.submodules
            .get(full)
            .ok_or_else(|| ConfigError::key_not_found(format!("no submodule '{}'", key)))
    }

    pub fn submodules(&self) -> impl Iterator<Item = (&str, &ConfigObject)> {
        self.submodules.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Submodules whose slot names `type_name`, in key order.
    pub fn submodules_of_type(&self, type_name: &str) -> Vec<&ConfigObject> {
        self.submodules
            .iter()
            .filter(|(key, _)| SlotKey::parse(key).is_ok_and(|slot| slot.type_name == type_name))
            .map(|(_, object)| object)
            .collect()
    }

    /// Render back to a tree that resolves to an equal object.
    pub fn to_tree(&self) -> Value {
        let mut tree = Map::new();
        for (name, value) in &self.values {
            tree.insert(name.clone(), value.clone());
        }
        for (name, object) in &self.nested {
            tree.insert(name.clone(), object.to_tree());
        }
        for (key, object) in &self.submodules {
            tree.insert(key.clone(), object.to_tree());
        }
        if let Some(ref module) = self.module {
            if !module.variant.is_empty() {
                tree.insert(NAME_KEY.to_string(), Value::String(module.variant.clone()));
            }
        }
        Value::Object(tree)
    }
}

impl fmt::Display for ConfigObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string_pretty(&self.to_tree()).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// Build a checked object of `class` from a resolved module tree.
pub fn instantiate(tree: &Value, class: &ConfigClass, registry: &Registry) -> Result<ConfigObject> {
    let Value::Object(map) = tree else {
        return Err(ConfigError::invalid(format!(
            "the config of {} must be a map, got {}",
            class.key(),
            tree
        )));
    };
    let mut object = ConfigObject::empty(Some(class.key().clone()));
    let mut slots = Map::new();

    for (key, value) in map {
        if CONTROL_KEYS.contains(&key.as_str()) {
            continue;
        }
        if is_slot_key(key) {
            let child = instantiate_slot(key, value, registry).map_err(|e| e.within(key))?;
            object.submodules.insert(key.clone(), child);
            slots.insert(key.clone(), value.clone());
            continue;
        }
        let Some(field) = class.field(key) else {
            return Err(ConfigError::UnknownField {
                module: class.key().to_string(),
                field: key.clone(),
            });
        };
        set_field(&mut object, field, value.clone(), registry)?;
    }

    for field in class.fields() {
        if map.contains_key(field.name()) {
            continue;
        }
        if field.is_required() {
            return Err(ConfigError::ValueMissing {
                path: field.name().to_string(),
                rendered: serde_json::to_string_pretty(tree).unwrap_or_else(|_| tree.to_string()),
            });
        }
        set_field(&mut object, field, field.default().clone(), registry)?;
    }

    class.validate_submodules(&slots)?;
    class.valid_check(&object)?;
    Ok(object)
}

/// Build a generic object from a resolved root document.
///
/// Plain keys become values; slots are instantiated against their classes.
pub fn instantiate_root(tree: &Value, registry: &Registry) -> Result<ConfigObject> {
    generic(tree, None, registry)
}

fn generic(tree: &Value, module: Option<ModuleKey>, registry: &Registry) -> Result<ConfigObject> {
    let Value::Object(map) = tree else {
        return Err(ConfigError::invalid(format!(
            "a config document must be a map, got {}",
            tree
        )));
    };
    let mut object = ConfigObject::empty(module);
    for (key, value) in map {
        if CONTROL_KEYS.contains(&key.as_str()) {
            continue;
        }
        if is_slot_key(key) {
            let child = instantiate_slot(key, value, registry).map_err(|e| e.within(key))?;
            object.submodules.insert(key.clone(), child);
        } else {
            object.values.insert(key.clone(), value.clone());
        }
    }
    Ok(object)
}

fn set_field(
    object: &mut ConfigObject,
    field: &FieldSchema,
    value: Value,
    registry: &Registry,
) -> Result<()> {
    if let Some(message) = field.deprecated() {
        if !same_value(&value, field.default()) {
            warn!(field = field.name(), "deprecated field is set: {}", message);
        }
    }
    let (value, _) = field.check(value)?;
    match field.nested_schema() {
        Some(schema) if value.is_object() => {
            let nested = instantiate(&value, schema, registry).map_err(|e| e.within(field.name()))?;
            object.nested.insert(field.name().to_string(), nested);
        }
        _ => {
            object.values.insert(field.name().to_string(), value);
        }
    }
    Ok(())
}

fn instantiate_slot(key: &str, value: &Value, registry: &Registry) -> Result<ConfigObject> {
    let slot = SlotKey::parse(key)?;
    let Value::Object(map) = value else {
        return Err(ConfigError::invalid(format!(
            "the submodule is not resolved to a map, got {}",
            value
        )));
    };

    let name = map.get(NAME_KEY).and_then(Value::as_str);
    if !registry.has_classes(&slot.type_name) {
        let module = ModuleKey::new(slot.type_name.as_str(), name.unwrap_or_default());
        return generic(value, Some(module), registry);
    }

    let mut candidates: Vec<&str> = Vec::new();
    for candidate in [
        name,
        map.get(BASE_KEY).and_then(Value::as_str),
        slot.variant.as_deref(),
        Some(""),
    ]
    .into_iter()
    .flatten()
    {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    for candidate in &candidates {
        if let Ok(class) = registry.get(&slot.type_name, candidate) {
            return instantiate(value, &class, registry);
        }
    }
    // report the lookup the slot most likely meant
    let primary = candidates.first().copied().unwrap_or_default();
    let class = registry.get(&slot.type_name, primary)?;
    instantiate(value, &class, registry)
}
