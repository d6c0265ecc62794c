//! Field schemas: one declared config field, its default and its validation rules.

use super::class::ConfigClass;
use crate::error::{ConfigError, Result};
use crate::syntax::{MISSING, is_missing, is_reference_expr};
use regex_lite::Regex;
use serde_json::{Map, Number, Value, json};
use std::fmt;
use std::sync::Arc;

/// Custom predicate run after coercion and bounds.
pub type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Numeric bound used when a field declares none.
pub const DEFAULT_BOUND: f64 = 1e20;

/// What a field holds.
#[derive(Clone)]
pub enum FieldKind {
    Int,
    Float,
    Bool,
    Str,
    Any,
    List,
    Map,
    /// An inline (unregistered) schema.
    Nested(Arc<ConfigClass>),
    /// Any value from a closed option list.
    Enum,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::Str => "string",
            FieldKind::Any => "any",
            FieldKind::List => "list",
            FieldKind::Map => "map",
            FieldKind::Nested(_) => "nested",
            FieldKind::Enum => "enum",
        }
    }

    fn json_type(&self) -> Option<&'static str> {
        match self {
            FieldKind::Int => Some("integer"),
            FieldKind::Float => Some("number"),
            FieldKind::Bool => Some("boolean"),
            FieldKind::Str => Some("string"),
            FieldKind::List => Some("array"),
            FieldKind::Map | FieldKind::Nested(_) => Some("object"),
            FieldKind::Any | FieldKind::Enum => None,
        }
    }
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Nested(class) => write!(f, "Nested({})", class.key()),
            other => f.write_str(other.name()),
        }
    }
}

/// Outcome of a successful [`FieldSchema::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// The value was coerced and validated.
    Pass,
    /// The value bypassed validation (missing marker, pending reference, option or addition).
    Skip,
}

/// A single declared field.
#[derive(Clone)]
pub struct FieldSchema {
    name: String,
    kind: FieldKind,
    default: Value,
    help: Option<String>,
    options: Option<Vec<Value>>,
    suggestions: Option<Vec<Value>>,
    additions: Option<Vec<Value>>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    min_len: Option<usize>,
    max_len: Option<usize>,
    pattern: Option<(String, Regex)>,
    validator: Option<Validator>,
    deprecated: Option<String>,
    position: Option<String>,
}

impl fmt::Debug for FieldSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSchema")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("options", &self.options)
            .field("additions", &self.additions)
            .field("validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

impl FieldSchema {
    pub fn int(name: &str, default: impl Into<Value>) -> FieldBuilder {
        FieldBuilder::new(name, FieldKind::Int, default.into())
    }

    pub fn float(name: &str, default: impl Into<Value>) -> FieldBuilder {
        FieldBuilder::new(name, FieldKind::Float, default.into())
    }

    pub fn bool(name: &str, default: impl Into<Value>) -> FieldBuilder {
        FieldBuilder::new(name, FieldKind::Bool, default.into())
    }

    pub fn string(name: &str, default: impl Into<Value>) -> FieldBuilder {
        FieldBuilder::new(name, FieldKind::Str, default.into())
    }

    pub fn any(name: &str, default: impl Into<Value>) -> FieldBuilder {
        FieldBuilder::new(name, FieldKind::Any, default.into())
    }

    pub fn list(name: &str, default: impl Into<Value>) -> FieldBuilder {
        FieldBuilder::new(name, FieldKind::List, default.into())
    }

    pub fn map(name: &str, default: impl Into<Value>) -> FieldBuilder {
        FieldBuilder::new(name, FieldKind::Map, default.into())
    }

    /// An inline schema; its default is the schema's own default tree.
    pub fn nested(name: &str, schema: ConfigClass) -> FieldBuilder {
        let default = schema.default_tree();
        FieldBuilder::new(name, FieldKind::Nested(Arc::new(schema)), default)
    }

    pub fn enumeration(name: &str, default: impl Into<Value>, options: Vec<Value>) -> FieldBuilder {
        FieldBuilder::new(name, FieldKind::Enum, default.into()).options(options)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn default(&self) -> &Value {
        &self.default
    }

    /// True when the field has no default and must be supplied.
    pub fn is_required(&self) -> bool {
        is_missing(&self.default)
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn options(&self) -> Option<&[Value]> {
        self.options.as_deref()
    }

    pub fn suggestions(&self) -> Option<&[Value]> {
        self.suggestions.as_deref()
    }

    pub fn deprecated(&self) -> Option<&str> {
        self.deprecated.as_deref()
    }

    pub fn position(&self) -> Option<&str> {
        self.position.as_deref()
    }

    /// The inline schema of a nested field.
    pub fn nested_schema(&self) -> Option<&ConfigClass> {
        match &self.kind {
            FieldKind::Nested(schema) => Some(&**schema),
            _ => None,
        }
    }

    /// Validate and coerce a value for this field.
    ///
    /// The missing marker and unevaluated reference expressions are skipped, as are values
    /// listed in `additions`. A value found in `options` is accepted unchanged.
    pub fn check(&self, value: Value) -> Result<(Value, CheckStatus)> {
        if is_missing(&value) || value.as_str().is_some_and(is_reference_expr) {
            return Ok((value, CheckStatus::Skip));
        }
        if let Some(ref additions) = self.additions {
            if contains_value(additions, &value) {
                return Ok((value, CheckStatus::Skip));
            }
        }
        if let Some(ref options) = self.options {
            if !contains_value(options, &value) {
                return Err(ConfigError::validate(
                    &self.name,
                    format!("value {} is not one of {}", value, Value::from(options.clone())),
                ));
            }
            return Ok((value, CheckStatus::Skip));
        }

        let value = self.coerce(value)?;
        self.check_bounds(&value)?;
        if let Some(ref validator) = self.validator {
            if !validator(&value) {
                return Err(ConfigError::validate(
                    &self.name,
                    format!("value {} does not pass the validator", value),
                ));
            }
        }
        Ok((value, CheckStatus::Pass))
    }

    fn coerce(&self, value: Value) -> Result<Value> {
        match &self.kind {
            FieldKind::Int => to_int(&value).map(Value::from).ok_or_else(|| {
                ConfigError::value_type(&self.name, format!("cannot convert {} to int", value))
            }),
            FieldKind::Float => to_float(&value)
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| {
                    ConfigError::value_type(&self.name, format!("cannot convert {} to float", value))
                }),
            FieldKind::Str => match value {
                Value::String(_) => Ok(value),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                other => Err(ConfigError::value_type(
                    &self.name,
                    format!("cannot convert {} to string", other),
                )),
            },
            FieldKind::List if !value.is_array() => Err(ConfigError::validate(
                &self.name,
                format!("value {} is not a list", value),
            )),
            FieldKind::Map | FieldKind::Nested(_) if !value.is_object() => Err(
                ConfigError::validate(&self.name, format!("value {} is not a map", value)),
            ),
            _ => Ok(value),
        }
    }

    fn check_bounds(&self, value: &Value) -> Result<()> {
        if matches!(self.kind, FieldKind::Int | FieldKind::Float) {
            let minimum = self.minimum.unwrap_or(-DEFAULT_BOUND);
            let maximum = self.maximum.unwrap_or(DEFAULT_BOUND);
            if let Some(n) = value.as_f64() {
                if n < minimum || n > maximum {
                    return Err(ConfigError::out_of_range(
                        &self.name,
                        format!("value {} is not in range [{}, {}]", value, minimum, maximum),
                    ));
                }
            }
        }
        if let Some(s) = value.as_str() {
            let len = s.chars().count();
            if let Some(min_len) = self.min_len {
                if len < min_len {
                    return Err(ConfigError::out_of_range(
                        &self.name,
                        format!("the length of '{}' is less than {}", s, min_len),
                    ));
                }
            }
            if let Some(max_len) = self.max_len {
                if len > max_len {
                    return Err(ConfigError::out_of_range(
                        &self.name,
                        format!("the length of '{}' is greater than {}", s, max_len),
                    ));
                }
            }
            if let Some((ref source, ref regex)) = self.pattern {
                if !regex.is_match(s) {
                    return Err(ConfigError::validate(
                        &self.name,
                        format!("'{}' does not match the pattern '{}'", s, source),
                    ));
                }
            }
        }
        Ok(())
    }

    /// JSON Schema description of this field.
    pub fn json_schema(&self) -> Value {
        let mut schema = Map::new();
        if let Some(json_type) = self.kind.json_type() {
            schema.insert("type".into(), json!(json_type));
        }
        if let Some(ref help) = self.help {
            schema.insert("description".into(), json!(help));
        }
        if !self.is_required() {
            schema.insert("default".into(), self.default.clone());
        }
        if let Some(ref options) = self.options {
            schema.insert("enum".into(), Value::from(options.clone()));
        }
        if let Some(ref suggestions) = self.suggestions {
            schema.insert("examples".into(), Value::from(suggestions.clone()));
        }
        if let Some(ref additions) = self.additions {
            schema.insert("additions".into(), Value::from(additions.clone()));
        }
        if let Some(minimum) = self.minimum {
            schema.insert("minimum".into(), json!(minimum));
        }
        if let Some(maximum) = self.maximum {
            schema.insert("maximum".into(), json!(maximum));
        }
        if let Some(min_len) = self.min_len {
            schema.insert("minLength".into(), json!(min_len));
        }
        if let Some(max_len) = self.max_len {
            schema.insert("maxLength".into(), json!(max_len));
        }
        if let Some((ref source, _)) = self.pattern {
            schema.insert("pattern".into(), json!(source));
        }
        if let Some(ref message) = self.deprecated {
            schema.insert("deprecated".into(), json!(true));
            if !message.is_empty() {
                schema.insert("x-deprecation".into(), json!(message));
            }
        }
        if let FieldKind::Nested(ref nested) = self.kind {
            schema.insert("properties".into(), nested.properties_schema());
        }
        Value::Object(schema)
    }
}

/// Builder for [`FieldSchema`]; `build` enforces the options/additions exclusivity.
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    field: FieldSchema,
    pattern: Option<String>,
}

impl FieldBuilder {
    fn new(name: &str, kind: FieldKind, default: Value) -> Self {
        Self {
            field: FieldSchema {
                name: name.to_string(),
                kind,
                default,
                help: None,
                options: None,
                suggestions: None,
                additions: None,
                minimum: None,
                maximum: None,
                min_len: None,
                max_len: None,
                pattern: None,
                validator: None,
                deprecated: None,
                position: None,
            },
            pattern: None,
        }
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.field.help = Some(help.into());
        self
    }

    pub fn options(mut self, options: Vec<Value>) -> Self {
        self.field.options = Some(options);
        self
    }

    pub fn suggestions(mut self, suggestions: Vec<Value>) -> Self {
        self.field.suggestions = Some(suggestions);
        self
    }

    pub fn additions(mut self, additions: Vec<Value>) -> Self {
        self.field.additions = Some(additions);
        self
    }

    pub fn minimum(mut self, minimum: f64) -> Self {
        self.field.minimum = Some(minimum);
        self
    }

    pub fn maximum(mut self, maximum: f64) -> Self {
        self.field.maximum = Some(maximum);
        self
    }

    pub fn min_len(mut self, min_len: usize) -> Self {
        self.field.min_len = Some(min_len);
        self
    }

    pub fn max_len(mut self, max_len: usize) -> Self {
        self.field.max_len = Some(max_len);
        self
    }

    /// Regular expression the whole string must match.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn validator(mut self, validator: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.field.validator = Some(Arc::new(validator));
        self
    }

    /// Mark the field deprecated; an empty message is allowed.
    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.field.deprecated = Some(message.into());
        self
    }

    /// Source annotation shown by tooling, e.g. `models.schema.yaml:12`.
    pub fn position(mut self, position: impl Into<String>) -> Self {
        self.field.position = Some(position.into());
        self
    }

    pub fn build(self) -> Result<FieldSchema> {
        let mut field = self.field;
        if field.name.is_empty() {
            return Err(ConfigError::invalid("a field name can not be empty"));
        }
        if field.options.is_some() && field.additions.is_some() {
            return Err(ConfigError::invalid(format!(
                "field '{}': options and additions cannot be set at the same time, \
                 put every accepted value in the options instead",
                field.name
            )));
        }
        match field.kind {
            FieldKind::Bool => {
                // additions stay allowed next to the implicit options
                field.options.get_or_insert_with(|| vec![json!(true), json!(false)]);
            }
            FieldKind::Enum if field.options.as_ref().is_none_or(Vec::is_empty) => {
                return Err(ConfigError::invalid(format!(
                    "enum field '{}' needs at least one option",
                    field.name
                )));
            }
            _ => {}
        }
        if let Some(source) = self.pattern {
            let regex = Regex::new(&format!("^(?:{})$", source)).map_err(|e| {
                ConfigError::invalid(format!("field '{}': invalid pattern: {}", field.name, e))
            })?;
            field.pattern = Some((source, regex));
        }
        Ok(field)
    }
}

/// Structural equality where `1` and `1.0` are the same number.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| same_value(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| same_value(v, other)))
        }
        _ => a == b,
    }
}

fn contains_value(list: &[Value], value: &Value) -> bool {
    list.iter().any(|candidate| same_value(candidate, value))
}

fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The missing marker as a default value.
pub fn required() -> Value {
    Value::String(MISSING.to_string())
}
