//! Config classes: a named, ordered set of fields plus the submodule slots a module carries.

use super::field::FieldSchema;
use crate::error::{ConfigError, Result};
use crate::instantiate::ConfigObject;
use crate::registry::ModuleKey;
use crate::syntax::{
    ANCHOR_KEY, BASE_KEY, GLOBAL_KEY, NAME_KEY, RESERVED_FIELD_NAMES, SEARCH_KEY,
    SUBMODULE_SIGIL, SlotKey, check_name,
};
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;

/// Predicate over the whole submodule map of an instance.
pub type SlotValidator = Arc<dyn Fn(&Map<String, Value>) -> bool + Send + Sync>;

/// Class-level consistency check run after an instance is built.
pub type ClassCheck = Arc<dyn Fn(&ConfigObject) -> Result<()> + Send + Sync>;

/// Draft used for exported JSON Schemas.
pub const JSON_SCHEMA_DRAFT: &str = "https://json-schema.org/draft/2020-12/schema";

/// An immutable class definition.
#[derive(Clone)]
pub struct ConfigClass {
    key: ModuleKey,
    inline: bool,
    description: Option<String>,
    fields: Vec<FieldSchema>,
    submodules: Map<String, Value>,
    submodule_suggestions: Vec<String>,
    submodule_validator: Option<SlotValidator>,
    valid_check: Option<ClassCheck>,
    parent: Option<ModuleKey>,
    position: Option<String>,
}

impl fmt::Debug for ConfigClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigClass")
            .field("key", &self.key)
            .field("fields", &self.fields)
            .field("submodules", &self.submodules)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl ConfigClass {
    /// Start a class registered under `type_name@variant`. The variant may be empty.
    pub fn builder(type_name: &str, variant: &str) -> ClassBuilder {
        ClassBuilder::new(ModuleKey::new(type_name, variant), false)
    }

    /// Start an inline schema for a nested field. Inline schemas are never registered.
    pub fn inline(name: &str) -> ClassBuilder {
        ClassBuilder::new(ModuleKey::new(name, ""), true)
    }

    pub fn key(&self) -> &ModuleKey {
        &self.key
    }

    pub fn type_name(&self) -> &str {
        &self.key.type_name
    }

    pub fn variant(&self) -> &str {
        &self.key.variant
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Default submodule slots, keyed by full slot key (`@type[@variant][#tag]`).
    pub fn submodule_defaults(&self) -> &Map<String, Value> {
        &self.submodules
    }

    pub fn submodule_suggestions(&self) -> &[String] {
        &self.submodule_suggestions
    }

    /// The class this one was extended from, if any.
    pub fn parent(&self) -> Option<&ModuleKey> {
        self.parent.as_ref()
    }

    pub fn position(&self) -> Option<&str> {
        self.position.as_deref()
    }

    /// Default raw tree: field defaults, lazily-held submodule defaults and `_name`.
    ///
    /// Submodule defaults are kept as written (a variant name or a partial map); they are
    /// expanded by the parser, never at registration time.
    pub fn default_tree(&self) -> Value {
        let mut tree = Map::new();
        for field in &self.fields {
            tree.insert(field.name().to_string(), field.default().clone());
        }
        for (key, value) in &self.submodules {
            tree.insert(key.clone(), value.clone());
        }
        if !self.inline && !self.key.variant.is_empty() {
            tree.insert(NAME_KEY.to_string(), json!(self.key.variant));
        }
        Value::Object(tree)
    }

    /// Run the submodule-map validator, if any.
    pub fn validate_submodules(&self, submodules: &Map<String, Value>) -> Result<()> {
        match self.submodule_validator {
            Some(ref validator) if !validator(submodules) => Err(ConfigError::validate(
                "submodule",
                format!(
                    "{} does not pass the submodule validator of {}",
                    Value::Object(submodules.clone()),
                    self.key
                ),
            )),
            _ => Ok(()),
        }
    }

    /// Run the class-level check on a built instance.
    pub fn valid_check(&self, object: &ConfigObject) -> Result<()> {
        match self.valid_check {
            Some(ref check) => check(object),
            None => Ok(()),
        }
    }

    /// Property map shared by the root schema and nested field schemas.
    pub(crate) fn properties_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            properties.insert(field.name().to_string(), field.json_schema());
        }

        let mut slots: Vec<String> = self
            .submodule_suggestions
            .iter()
            .map(|s| slot_key(s))
            .collect();
        slots.extend(self.submodules.keys().cloned());
        for slot in slots {
            let mut schema = Map::new();
            schema.insert("type".into(), json!("object"));
            if let Some(base) = self.submodules.get(&slot).and_then(slot_base) {
                schema.insert("default".into(), json!({ BASE_KEY: base }));
            }
            properties.insert(slot, Value::Object(schema));
        }
        Value::Object(properties)
    }

    /// Render a JSON Schema (draft 2020-12) document for editors and documentation.
    pub fn json_schema(&self) -> Value {
        let mut properties = match self.properties_schema() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (name, description, json_type) in [
            (BASE_KEY, "The inherit base module name", "string"),
            (
                GLOBAL_KEY,
                "The global parameters, referenced anywhere with `~` or `_G`",
                "object",
            ),
            (ANCHOR_KEY, "The reference anchor", "string"),
            (SEARCH_KEY, "Search the parameters (cartesian product)", "object"),
        ] {
            properties.insert(
                name.to_string(),
                json!({"description": description, "type": json_type}),
            );
        }

        let mut schema = Map::new();
        schema.insert("$schema".into(), json!(JSON_SCHEMA_DRAFT));
        schema.insert("type".into(), json!("object"));
        if let Some(ref description) = self.description {
            schema.insert("description".into(), json!(description));
        }
        schema.insert("properties".into(), Value::Object(properties));
        Value::Object(schema)
    }
}

fn slot_key(name: &str) -> String {
    if name.starts_with(SUBMODULE_SIGIL) {
        name.to_string()
    } else {
        format!("{}{}", SUBMODULE_SIGIL, name)
    }
}

/// The explicit base of a slot default (`"variant"` or `{"_base": "variant"}`).
fn slot_base(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map
            .get(BASE_KEY)
            .or_else(|| map.get(NAME_KEY))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// Builder for [`ConfigClass`].
#[derive(Clone)]
pub struct ClassBuilder {
    class: ConfigClass,
}

impl ClassBuilder {
    fn new(key: ModuleKey, inline: bool) -> Self {
        Self {
            class: ConfigClass {
                key,
                inline,
                description: None,
                fields: Vec::new(),
                submodules: Map::new(),
                submodule_suggestions: Vec::new(),
                submodule_validator: None,
                valid_check: None,
                parent: None,
                position: None,
            },
        }
    }

    /// Inherit fields, submodule defaults and checks from `parent`.
    ///
    /// Fields added later with the same name replace the inherited ones in place.
    pub fn extends(mut self, parent: &ConfigClass) -> Self {
        let class = &mut self.class;
        for field in &parent.fields {
            upsert_field(&mut class.fields, field.clone());
        }
        for (key, value) in &parent.submodules {
            class.submodules.insert(key.clone(), value.clone());
        }
        class
            .submodule_suggestions
            .extend(parent.submodule_suggestions.iter().cloned());
        if parent.submodule_validator.is_some() {
            class.submodule_validator = parent.submodule_validator.clone();
        }
        if parent.valid_check.is_some() {
            class.valid_check = parent.valid_check.clone();
        }
        class.parent = Some(parent.key.clone());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.class.description = Some(description.into());
        self
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        upsert_field(&mut self.class.fields, field);
        self
    }

    /// Default for one submodule slot; the key may omit the leading `@`.
    pub fn submodule(mut self, key: &str, default: impl Into<Value>) -> Self {
        self.class.submodules.insert(slot_key(key), default.into());
        self
    }

    /// Submodule types offered by tooling even without a default.
    pub fn submodule_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.class
            .submodule_suggestions
            .extend(suggestions.into_iter().map(Into::into));
        self
    }

    pub fn submodule_validator(
        mut self,
        validator: impl Fn(&Map<String, Value>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.class.submodule_validator = Some(Arc::new(validator));
        self
    }

    pub fn valid_check(
        mut self,
        check: impl Fn(&ConfigObject) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.class.valid_check = Some(Arc::new(check));
        self
    }

    /// Source annotation shown by tooling.
    pub fn position(mut self, position: impl Into<String>) -> Self {
        self.class.position = Some(position.into());
        self
    }

    pub fn build(self) -> Result<ConfigClass> {
        let class = self.class;
        if !class.inline {
            check_name(&class.key.type_name)?;
            if !class.key.variant.is_empty() {
                check_name(&class.key.variant)?;
            }
        }
        for field in &class.fields {
            let name = field.name();
            if RESERVED_FIELD_NAMES.contains(&name) || name.starts_with(SUBMODULE_SIGIL) {
                return Err(ConfigError::AttrName(name.to_string()));
            }
        }
        for (key, value) in &class.submodules {
            SlotKey::parse(key)?;
            if !(value.is_string() || value.is_object()) {
                return Err(ConfigError::invalid(format!(
                    "the default of submodule '{}' in {} must be a variant name or a map, got {}",
                    key, class.key, value
                )));
            }
        }
        Ok(class)
    }
}

fn upsert_field(fields: &mut Vec<FieldSchema>, field: FieldSchema) {
    match fields.iter_mut().find(|f| f.name() == field.name()) {
        Some(existing) => *existing = field,
        None => fields.push(field),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_a() -> ConfigClass {
        ConfigClass::builder("module", "config_a")
            .describe("config a")
            .field(
                FieldSchema::float("epsilon", 1.0)
                    .minimum(0.0)
                    .build()
                    .unwrap(),
            )
            .field(FieldSchema::list("list_test", json!(["name"])).build().unwrap())
            .submodule("child#1", json!({"_base": "child_a", "i_am_child": "one"}))
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_tree() {
        let tree = config_a().default_tree();
        assert_eq!(
            tree,
            json!({
                "_name": "config_a",
                "epsilon": 1.0,
                "list_test": ["name"],
                "@child#1": {"_base": "child_a", "i_am_child": "one"}
            })
        );
    }

    #[test]
    fn test_extends_overrides_in_place() {
        let parent = config_a();
        let child = ConfigClass::builder("module", "config_a_1")
            .extends(&parent)
            .field(FieldSchema::float("epsilon", 2.0).build().unwrap())
            .field(FieldSchema::string("y", "name").build().unwrap())
            .build()
            .unwrap();

        let names: Vec<&str> = child.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, ["epsilon", "list_test", "y"]);
        assert_eq!(child.field("epsilon").unwrap().default(), &json!(2.0));
        assert_eq!(child.parent(), Some(parent.key()));
        assert!(child.submodule_defaults().contains_key("@child#1"));
        assert_eq!(child.default_tree()["_name"], "config_a_1");
    }

    #[test]
    fn test_reserved_field_names() {
        for name in ["_base", "_name", "_anchor", "_search", "_G", "submodule", "@x"] {
            let err = ConfigClass::builder("module", "a")
                .field(FieldSchema::int(name, 1).build().unwrap())
                .build()
                .unwrap_err();
            assert!(matches!(err, ConfigError::AttrName(_)), "{}", name);
        }
    }

    #[test]
    fn test_invalid_names() {
        assert!(matches!(
            ConfigClass::builder("1model", "").build().unwrap_err(),
            ConfigError::Name(_)
        ));
        assert!(matches!(
            ConfigClass::builder("model", "a.b").build().unwrap_err(),
            ConfigError::Name(_)
        ));
        assert!(ConfigClass::builder("model", "").build().is_ok());
    }

    #[test]
    fn test_variantless_class_has_no_name() {
        let class = ConfigClass::builder("optim", "")
            .field(FieldSchema::float("lr", 0.1).build().unwrap())
            .build()
            .unwrap();
        assert_eq!(class.default_tree(), json!({"lr": 0.1}));
    }

    #[test]
    fn test_json_schema() {
        let nested = ConfigClass::inline("NestedConfig")
            .field(FieldSchema::string("nest_key", "nest value").build().unwrap())
            .build()
            .unwrap();
        let class = ConfigClass::builder("module", "b")
            .describe("with nested")
            .field(FieldSchema::nested("nested", nested).build().unwrap())
            .submodule("child", "child_a")
            .submodule_suggestions(["encoder"])
            .build()
            .unwrap();

        let schema = class.json_schema();
        assert_eq!(schema["$schema"], JSON_SCHEMA_DRAFT);
        assert_eq!(schema["description"], "with nested");
        let properties = &schema["properties"];
        assert_eq!(properties["nested"]["type"], "object");
        assert_eq!(
            properties["nested"]["properties"]["nest_key"]["default"],
            "nest value"
        );
        assert_eq!(properties["@child"]["default"], json!({"_base": "child_a"}));
        assert_eq!(properties["@encoder"]["type"], "object");
        assert_eq!(properties["_search"]["type"], "object");
        assert_eq!(properties["_G"]["type"], "object");
    }
}
