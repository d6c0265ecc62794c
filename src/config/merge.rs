//! Deep merge of config trees.
//!
//! Two flavours share the same shape: `deep_merge` layers settings tiers and never fails,
//! `inherit_merge` lays a fragment over its `_base` and rejects a map meeting a scalar.
//! Arrays are replaced entirely, not concatenated.

use crate::error::{ConfigError, Result};
use crate::syntax::{BASE_KEY, NAME_KEY, is_missing, is_slot_key};
use serde_json::{Map, Value};

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans, nulls are replaced entirely
/// - If overlay is null, the base value is preserved (null means "not specified")
///
/// # Example
/// ```
/// use serde_json::json;
/// use config_graph::config::deep_merge;
///
/// let base = json!({
///     "modules": ["configs"],
///     "parser": { "max_depth": 64, "ignore_errors": false }
/// });
/// let overlay = json!({
///     "parser": { "max_depth": 16 },
///     "modules": ["more"]
/// });
/// let result = deep_merge(base, overlay);
/// assert_eq!(result["parser"]["max_depth"], 16);
/// assert_eq!(result["parser"]["ignore_errors"], false);
/// assert_eq!(result["modules"], json!(["more"]));
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        // Both are objects: merge recursively
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = if let Some(base_value) = base_map.remove(&key) {
                    deep_merge(base_value, overlay_value)
                } else {
                    overlay_value
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        // Overlay is null: preserve base (null means "not specified")
        (base, Value::Null) => base,
        // Any other case: overlay replaces base entirely
        (_, overlay) => overlay,
    }
}

/// Merge multiple values in order, with later values taking precedence.
///
/// Equivalent to folding `deep_merge` over the list.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}

/// Lay a config fragment over the tree it inherits from.
///
/// Override-by-key: nested maps merge recursively, any other value in `overlay` replaces
/// the base value. A map meeting a scalar at the same key is an error, except at submodule
/// slot keys (a slot may switch between its `"variant"` and `{...}` spellings) and where the
/// base holds null or the missing marker. A map without its own base that refines a slot
/// spelled `"variant"` keeps that variant as its `_base`.
pub fn inherit_merge(base: Value, overlay: Value) -> Result<Value> {
    merge_at(base, overlay, &mut Vec::new())
}

fn merge_at(base: Value, overlay: Value, path: &mut Vec<String>) -> Result<Value> {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = match base_map.remove(&key) {
                    Some(Value::String(variant))
                        if is_slot_key(&key) && refines_slot(&overlay_value) =>
                    {
                        let mut slot = Map::new();
                        slot.insert(BASE_KEY.to_string(), Value::String(variant));
                        path.push(key.clone());
                        let merged = merge_at(Value::Object(slot), overlay_value, path)?;
                        path.pop();
                        merged
                    }
                    Some(base_value)
                        if is_slot_key(&key) && !both_maps(&base_value, &overlay_value) =>
                    {
                        overlay_value
                    }
                    Some(base_value) => {
                        path.push(key.clone());
                        let merged = merge_at(base_value, overlay_value, path)?;
                        path.pop();
                        merged
                    }
                    None => overlay_value,
                };
                base_map.insert(key, merged_value);
            }
            Ok(Value::Object(base_map))
        }
        (base, overlay) if base.is_object() != overlay.is_object() => {
            if base.is_null() || is_missing(&base) {
                return Ok(overlay);
            }
            Err(ConfigError::MergeConflict {
                path: path.join("."),
                base_kind: kind_name(&base),
                override_kind: kind_name(&overlay),
            })
        }
        (_, overlay) => Ok(overlay),
    }
}

fn both_maps(a: &Value, b: &Value) -> bool {
    a.is_object() && b.is_object()
}

/// A slot map that names no variant of its own.
fn refines_slot(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| !map.contains_key(BASE_KEY) && !map.contains_key(NAME_KEY))
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_simple_objects() {
        let base = json!({"a": 1, "b": 2});
        let overlay = json!({"b": 3, "c": 4});
        let result = deep_merge(base, overlay);
        assert_eq!(result, json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_null_preserves_base() {
        let base = json!({"a": 1, "b": {"c": 2}});
        let overlay = json!({"a": null, "b": {"c": null}});
        let result = deep_merge(base, overlay);
        assert_eq!(result, json!({"a": 1, "b": {"c": 2}}));
    }

    #[test]
    fn test_merge_all() {
        let values = vec![json!({"a": 1}), json!({"b": 2}), json!({"a": 3, "c": 4})];
        let result = deep_merge_all(values);
        assert_eq!(result, json!({"a": 3, "b": 2, "c": 4}));
    }

    #[test]
    fn test_inherit_empty_overlay_is_identity() {
        let base = json!({"x": 1, "nested": {"k": "v"}, "items": [1, 2]});
        let result = inherit_merge(base.clone(), json!({})).unwrap();
        assert_eq!(result, base);
    }

    #[test]
    fn test_inherit_overrides_by_key() {
        let base = json!({
            "x": 1,
            "nested": {"keep": true, "change": 1}
        });
        let overlay = json!({
            "x": 8,
            "nested": {"change": 2},
            "y": "new"
        });
        let result = inherit_merge(base, overlay).unwrap();
        assert_eq!(
            result,
            json!({
                "x": 8,
                "nested": {"keep": true, "change": 2},
                "y": "new"
            })
        );
    }

    #[test]
    fn test_inherit_arrays_replaced() {
        let base = json!({"items": [1, 2, 3]});
        let result = inherit_merge(base, json!({"items": [4]})).unwrap();
        assert_eq!(result, json!({"items": [4]}));
    }

    #[test]
    fn test_inherit_null_overrides() {
        // Unlike settings tiers, an explicit null in a fragment is a real value
        let result = inherit_merge(json!({"a": 1}), json!({"a": null})).unwrap();
        assert_eq!(result, json!({"a": null}));
    }

    #[test]
    fn test_inherit_map_over_scalar_conflicts() {
        let base = json!({"outer": {"inner": {"k": 1}}});
        let err = inherit_merge(base, json!({"outer": {"inner": 5}})).unwrap_err();
        match err {
            ConfigError::MergeConflict { path, .. } => assert_eq!(path, "outer.inner"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_inherit_scalar_under_map_conflicts() {
        let err = inherit_merge(json!({"a": 1}), json!({"a": {"b": 2}})).unwrap_err();
        assert!(matches!(err, ConfigError::MergeConflict { .. }));
    }

    #[test]
    fn test_inherit_fills_null_and_missing_with_maps() {
        let base = json!({"a": null, "b": "???"});
        let result = inherit_merge(base, json!({"a": {"x": 1}, "b": {"y": 2}})).unwrap();
        assert_eq!(result, json!({"a": {"x": 1}, "b": {"y": 2}}));
    }

    #[test]
    fn test_inherit_slot_switches_spelling() {
        let base = json!({"@encoder": {"_base": "lstm", "hidden": 128}});
        let result = inherit_merge(base, json!({"@encoder": "gru"})).unwrap();
        assert_eq!(result, json!({"@encoder": "gru"}));

        let base = json!({"@encoder": "lstm"});
        let result = inherit_merge(base, json!({"@encoder": {"_base": "gru"}})).unwrap();
        assert_eq!(result, json!({"@encoder": {"_base": "gru"}}));

        let base = json!({"@encoder": "lstm"});
        let result = inherit_merge(base, json!({"@encoder": {"hidden": 64}})).unwrap();
        assert_eq!(result, json!({"@encoder": {"_base": "lstm", "hidden": 64}}));
    }
}
