//! Class declarations as data.
//!
//! A `*.schema.yaml` (or `.json`) document declares one class so that the CLI can register
//! classes without Rust code:
//!
//! ```yaml
//! type: model
//! variant: bert
//! extends: base
//! description: BERT encoder
//! fields:
//!   - { name: hidden, kind: int, default: 768, minimum: 1 }
//!   - { name: dropout, kind: float, default: 0.1, maximum: 1.0 }
//! submodule:
//!   "@tokenizer": wordpiece
//! ```

use super::class::ConfigClass;
use super::field::{FieldBuilder, FieldSchema, required};
use crate::error::{ConfigError, Result};
use crate::registry::{ModuleKey, Registry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Field kinds as spelled in declaration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSpecKind {
    Int,
    Float,
    Bool,
    #[serde(alias = "str")]
    String,
    Any,
    List,
    #[serde(alias = "dict")]
    Map,
    Nested,
    Enum,
}

/// One declared field. A missing `default` makes the field required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldSpecKind,
    #[serde(default = "required")]
    pub default: Value,
    #[serde(default)]
    pub help: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<Value>>,
    #[serde(default)]
    pub suggestions: Option<Vec<Value>>,
    #[serde(default)]
    pub additions: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub min_len: Option<usize>,
    #[serde(default)]
    pub max_len: Option<usize>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub deprecated: Option<String>,
    /// Fields of a `nested` kind.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

/// One declared class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub variant: String,
    /// Variant of the same type to inherit from.
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub submodule: Map<String, Value>,
    #[serde(default)]
    pub submodule_suggestions: Vec<String>,
}

impl FieldSpec {
    pub fn to_field(&self, position: Option<&str>) -> Result<FieldSchema> {
        let name = self.name.as_str();
        let default = self.default.clone();
        let mut builder: FieldBuilder = match self.kind {
            FieldSpecKind::Int => FieldSchema::int(name, default),
            FieldSpecKind::Float => FieldSchema::float(name, default),
            FieldSpecKind::Bool => FieldSchema::bool(name, default),
            FieldSpecKind::String => FieldSchema::string(name, default),
            FieldSpecKind::Any => FieldSchema::any(name, default),
            FieldSpecKind::List => FieldSchema::list(name, default),
            FieldSpecKind::Map => FieldSchema::map(name, default),
            FieldSpecKind::Nested => {
                let mut inline = ConfigClass::inline(name);
                for field in &self.fields {
                    inline = inline.field(field.to_field(position)?);
                }
                FieldSchema::nested(name, inline.build()?)
            }
            FieldSpecKind::Enum => {
                FieldSchema::enumeration(name, default, self.options.clone().unwrap_or_default())
            }
        };

        if let Some(ref help) = self.help {
            builder = builder.help(help.clone());
        }
        if let Some(ref options) = self.options {
            builder = builder.options(options.clone());
        }
        if let Some(ref suggestions) = self.suggestions {
            builder = builder.suggestions(suggestions.clone());
        }
        if let Some(ref additions) = self.additions {
            builder = builder.additions(additions.clone());
        }
        if let Some(minimum) = self.minimum {
            builder = builder.minimum(minimum);
        }
        if let Some(maximum) = self.maximum {
            builder = builder.maximum(maximum);
        }
        if let Some(min_len) = self.min_len {
            builder = builder.min_len(min_len);
        }
        if let Some(max_len) = self.max_len {
            builder = builder.max_len(max_len);
        }
        if let Some(ref pattern) = self.pattern {
            builder = builder.pattern(pattern.clone());
        }
        if let Some(ref message) = self.deprecated {
            builder = builder.deprecated(message.clone());
        }
        if let Some(position) = position {
            builder = builder.position(position);
        }
        builder.build()
    }
}

impl ClassSpec {
    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(&self.type_name, &self.variant)
    }

    /// The key of the class this one extends.
    pub fn parent_key(&self) -> Option<ModuleKey> {
        self.extends
            .as_ref()
            .map(|parent| ModuleKey::new(&self.type_name, parent))
    }

    /// Build the class, resolving `extends` against already registered classes.
    pub fn to_class(&self, registry: &Registry, position: Option<&str>) -> Result<ConfigClass> {
        let mut builder = ConfigClass::builder(&self.type_name, &self.variant);
        if let Some(ref parent) = self.extends {
            builder = builder.extends(&*registry.get(&self.type_name, parent)?);
        }
        if let Some(ref description) = self.description {
            builder = builder.describe(description.clone());
        }
        if let Some(position) = position {
            builder = builder.position(position);
        }
        for field in &self.fields {
            builder = builder.field(field.to_field(position)?);
        }
        for (key, value) in &self.submodule {
            builder = builder.submodule(key, value.clone());
        }
        builder = builder.submodule_suggestions(self.submodule_suggestions.iter().cloned());
        builder.build()
    }
}

/// Register declarations in dependency order.
///
/// Each pass registers every declaration whose parent is already registered; a pass that
/// registers nothing while declarations remain is a name error listing them.
pub fn register_specs(specs: Vec<(String, ClassSpec)>, registry: &mut Registry) -> Result<usize> {
    let mut pending = specs;
    let mut registered = 0;
    while !pending.is_empty() {
        let before = pending.len();
        let mut waiting = Vec::new();
        for (position, spec) in pending {
            let ready = spec
                .parent_key()
                .is_none_or(|parent| registry.get(&parent.type_name, &parent.variant).is_ok());
            if ready {
                let class = spec.to_class(registry, Some(&position))?;
                registry.register(class)?;
                debug!(module = %spec.key(), position = %position, "registered declared class");
                registered += 1;
            } else {
                waiting.push((position, spec));
            }
        }
        if waiting.len() == before {
            let unresolved: Vec<String> = waiting
                .iter()
                .map(|(position, spec)| format!("{} ({})", spec.key(), position))
                .collect();
            return Err(ConfigError::Name(format!(
                "unresolved class parents: {}",
                unresolved.join(", ")
            )));
        }
        pending = waiting;
    }
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;
    use serde_json::json;

    const BASE: &str = r#"
type: model
variant: base
description: base model
fields:
  - { name: hidden, kind: int, default: 128, minimum: 1 }
  - { name: name, kind: str }
  - name: head
    kind: nested
    fields:
      - { name: layers, kind: int, default: 2 }
submodule:
  "@tokenizer": wordpiece
"#;

    const LARGE: &str = r#"
type: model
variant: large
extends: base
fields:
  - { name: hidden, kind: int, default: 1024 }
"#;

    #[test]
    fn test_parse_spec() {
        let spec: ClassSpec = serde_yaml::from_str(BASE).unwrap();
        assert_eq!(spec.key(), ModuleKey::new("model", "base"));
        assert_eq!(spec.fields[1].default, json!("???"));

        let registry = Registry::new();
        let class = spec.to_class(&registry, Some("model.schema.yaml")).unwrap();
        assert!(class.field("name").unwrap().is_required());
        assert!(matches!(
            class.field("head").unwrap().kind(),
            FieldKind::Nested(_)
        ));
        assert_eq!(
            class.default_tree(),
            json!({
                "_name": "base",
                "hidden": 128,
                "name": "???",
                "head": {"layers": 2},
                "@tokenizer": "wordpiece"
            })
        );
        assert_eq!(class.position(), Some("model.schema.yaml"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: std::result::Result<ClassSpec, _> =
            serde_yaml::from_str("type: model\nfeilds: []\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_register_specs_in_dependency_order() {
        let base: ClassSpec = serde_yaml::from_str(BASE).unwrap();
        let large: ClassSpec = serde_yaml::from_str(LARGE).unwrap();
        let mut registry = Registry::new();

        // child listed first, registered on the second pass
        let count = register_specs(
            vec![("large".into(), large), ("base".into(), base)],
            &mut registry,
        )
        .unwrap();
        assert_eq!(count, 2);

        let class = registry.get("model", "large").unwrap();
        assert_eq!(class.field("hidden").unwrap().default(), &json!(1024));
        assert!(class.field("head").is_some());
        assert_eq!(
            registry.help(class.key()).unwrap().base,
            Some(ModuleKey::new("model", "base"))
        );
    }

    #[test]
    fn test_register_specs_unresolved_parent() {
        let large: ClassSpec = serde_yaml::from_str(LARGE).unwrap();
        let mut registry = Registry::new();
        let err = register_specs(vec![("large".into(), large)], &mut registry).unwrap_err();
        assert!(matches!(err, ConfigError::Name(_)));
        assert!(err.to_string().contains("model@large"));
    }
}
