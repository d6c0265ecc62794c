//! The resolution engine.
//!
//! [`Parser::parse`] turns one raw document into the list of fully expanded configs. Each
//! module is resolved in a fixed order: its base is resolved and merged under it, `_anchor`
//! is checked, the `submodule` map is flattened into `@` slot keys, every slot is resolved
//! recursively, the slot candidates are combined into a Cartesian product and each
//! combination fans out again over its `_search` grid. References are resolved once per
//! expanded tree at the outermost call, and the expanded list must hold no duplicates.

mod refs;
mod search;

use crate::config::{DEFAULT_MAX_DEPTH, inherit_merge};
use crate::error::{ConfigError, Result};
use crate::expr::{Evaluator, LambdaEvaluator};
use crate::instantiate::{ConfigObject, instantiate, instantiate_root};
use crate::registry::{ModuleKey, Registry};
use crate::schema::ConfigClass;
use crate::syntax::{
    ANCHOR_KEY, BASE_KEY, GLOBAL_ANCHOR, GLOBAL_KEY, NAME_KEY, PASSTHROUGH_KEYS, SEARCH_KEY,
    SELF_ANCHOR, SUBMODULE_KEY, SUBMODULE_SIGIL, SlotKey, is_missing, is_slot_key,
};
use crate::trace::Trace;
use itertools::Itertools;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Synthetic slot the whole document is wrapped under when parsing at the root.
const ROOT_SLOT: &str = "@__root__";

/// Limits of one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Maximum nesting of base chains, submodules and search re-resolution.
    pub max_depth: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Resolves raw documents against a read-only registry.
#[derive(Clone)]
pub struct Parser<'r> {
    registry: &'r Registry,
    evaluator: Arc<dyn Evaluator>,
    options: ParserOptions,
}

impl fmt::Debug for Parser<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("modules", &self.registry.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'r> Parser<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            evaluator: Arc::new(LambdaEvaluator::new()),
            options: ParserOptions::default(),
        }
    }

    /// Replace the transform-expression evaluator.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    /// Resolve a raw document into its fully expanded configs.
    ///
    /// With an empty `module_type` the document is a root document: it may carry `_G`, which
    /// is reachable from references as `~` or `_G`, and slots at any level. With a type, the
    /// document is resolved as one module of that type.
    pub fn parse(&self, raw: &Value, module_type: &str) -> Result<Vec<Value>> {
        let Value::Object(document) = raw else {
            return Err(ConfigError::invalid(format!(
                "a config document must be a map, got {}",
                raw
            )));
        };

        if !module_type.is_empty() {
            let expanded = self.resolve_module(raw, module_type, 0, true)?;
            let configs = expanded
                .into_iter()
                .map(|tree| refs::resolve(tree, false, self.evaluator.as_ref()))
                .collect::<Result<Vec<_>>>()?;
            check_duplicates(&configs)?;
            return Ok(configs);
        }

        let mut document = document.clone();
        let global = document
            .remove(GLOBAL_KEY)
            .unwrap_or_else(|| Value::Object(Map::new()));
        let mut wrapper = Map::new();
        wrapper.insert(ROOT_SLOT.to_string(), Value::Object(document));
        wrapper.insert(GLOBAL_KEY.to_string(), global);

        let expanded = self.resolve_module(&Value::Object(wrapper), "", 0, true)?;
        let mut configs = Vec::with_capacity(expanded.len());
        for tree in expanded {
            let mut resolved =
                refs::resolve(tree, true, self.evaluator.as_ref()).map_err(hide_root)?;
            let root = resolved
                .as_object_mut()
                .and_then(|map| map.remove(ROOT_SLOT))
                .ok_or_else(|| ConfigError::invalid("the document root was lost in expansion"))?;
            configs.push(root);
        }
        check_duplicates(&configs)?;
        debug!(configs = configs.len(), "parsed document");
        Ok(configs)
    }

    /// Resolve a document as one module of `class`, check it and build objects.
    ///
    /// A document that names no base inherits from the class's own defaults.
    pub fn parse_and_instantiate(
        &self,
        raw: &Value,
        class: &ConfigClass,
    ) -> Result<Vec<ConfigObject>> {
        let mut raw = raw.clone();
        if let Value::Object(ref mut map) = raw {
            let registered = self.registry.contains(class.key());
            let names_base = map.contains_key(BASE_KEY) || map.contains_key(NAME_KEY);
            if registered && !names_base && !class.variant().is_empty() {
                map.insert(BASE_KEY.to_string(), Value::String(class.variant().to_string()));
            }
        }
        let configs = self.parse(&raw, class.type_name())?;
        check_missing(&configs)?;
        configs
            .iter()
            .map(|config| instantiate(config, class, self.registry))
            .collect()
    }

    /// Resolve a root document, check it and build generic root objects.
    pub fn parse_root_and_instantiate(&self, raw: &Value) -> Result<Vec<ConfigObject>> {
        let configs = self.parse(raw, "")?;
        check_missing(&configs)?;
        configs
            .iter()
            .map(|config| instantiate_root(config, self.registry))
            .collect()
    }

    /// Resolve one module without references: base, anchors, slots, product and search.
    ///
    /// `inherit_search` is false while re-resolving a tree that already went through its
    /// search expansion; a `_search` inherited from the base is then dropped.
    fn resolve_module(
        &self,
        raw: &Value,
        type_name: &str,
        depth: usize,
        inherit_search: bool,
    ) -> Result<Vec<Value>> {
        if depth > self.options.max_depth {
            return Err(ConfigError::RecursionLimit(self.options.max_depth));
        }
        let Value::Object(raw) = raw else {
            return Err(ConfigError::invalid(format!(
                "the config of module '{}' must be a map, got {}",
                type_name, raw
            )));
        };
        // only the synthetic root wrapper carries the globals
        let is_wrapper = type_name.is_empty() && raw.contains_key(ROOT_SLOT);
        if raw.contains_key(GLOBAL_KEY) && !is_wrapper {
            return Err(ConfigError::invalid(format!(
                "the '{}' key is only supported in the root module",
                GLOBAL_KEY
            )));
        }
        let mut raw = raw.clone();

        let base_variant = take_base_variant(&mut raw)?;
        let mut base = self.base_tree(type_name, &base_variant, depth)?;
        check_base_anchor(&base, type_name, &base_variant)?;
        if !inherit_search {
            base.remove(SEARCH_KEY);
        }

        let anchor = match raw.remove(ANCHOR_KEY) {
            Some(value) => check_anchor(&value)?,
            None => SELF_ANCHOR.to_string(),
        };
        raw.insert(ANCHOR_KEY.to_string(), Value::String(anchor));

        flatten_submodules(&mut base)?;
        flatten_submodules(&mut raw)?;
        let mut merged = match inherit_merge(Value::Object(base), Value::Object(raw))? {
            Value::Object(map) => map,
            _ => return Err(ConfigError::invalid("merged module is not a map")),
        };

        let search = match merged.remove(SEARCH_KEY) {
            None => None,
            Some(Value::Object(search)) => Some(search),
            Some(other) => {
                return Err(ConfigError::invalid(format!(
                    "'{}' must be a map of paths to candidates, got {}",
                    SEARCH_KEY, other
                )));
            }
        };

        debug!(module = %ModuleKey::new(type_name, base_variant.as_str()), depth, "resolving module");

        let mut axes: Vec<(String, Vec<Value>)> = Vec::with_capacity(merged.len());
        for (key, value) in merged {
            let candidates = if is_slot_key(&key) && !PASSTHROUGH_KEYS.contains(&key.as_str()) {
                self.expand_slot(&key, value, depth, inherit_search)
                    .map_err(|e| e.within(&key))?
            } else {
                vec![value]
            };
            axes.push((key, candidates));
        }

        let mut results = Vec::new();
        for combination in cartesian(&axes) {
            let combined: Map<String, Value> = combination.into_iter().collect();
            match search {
                Some(ref search) => {
                    results.extend(self.expand_search(combined, search, type_name, depth)?)
                }
                None => results.push(Value::Object(combined)),
            }
        }
        check_duplicates(&results)?;
        Ok(results)
    }

    /// Resolve one slot value into its candidate trees.
    fn expand_slot(
        &self,
        key: &str,
        value: Value,
        depth: usize,
        inherit_search: bool,
    ) -> Result<Vec<Value>> {
        if is_missing(&value) {
            return Ok(vec![value]);
        }
        let slot = SlotKey::parse(key)?;
        let mut inherit_search = inherit_search;
        let mut child = match value {
            Value::String(variant) => {
                // a variant name is never an already expanded tree
                inherit_search = true;
                let mut child = Map::new();
                child.insert(BASE_KEY.to_string(), Value::String(variant));
                child
            }
            Value::Object(child) => child,
            other => {
                return Err(ConfigError::invalid(format!(
                    "a submodule must be a variant name or a map, got {}",
                    other
                )));
            }
        };
        if !child.contains_key(BASE_KEY) && !child.contains_key(NAME_KEY) {
            if let Some(variant) = slot.variant {
                child.insert(BASE_KEY.to_string(), Value::String(variant));
            }
        }
        self.resolve_module(&Value::Object(child), &slot.type_name, depth + 1, inherit_search)
    }

    /// The tree a module inherits from.
    ///
    /// A registered tree that names another variant as its base is resolved first and must
    /// expand to exactly one config; any other registered tree is used as written.
    fn base_tree(&self, type_name: &str, variant: &str, depth: usize) -> Result<Map<String, Value>> {
        let key = ModuleKey::new(type_name, variant);
        let Some(raw) = self.registry.raw(type_name, variant) else {
            if variant.is_empty() {
                return Ok(Map::new());
            }
            return Err(ConfigError::NoModuleFound(format!(
                "there is no registered module named '{}'",
                key
            )));
        };
        let Value::Object(map) = raw else {
            return Err(ConfigError::invalid(format!(
                "the registered config of '{}' is not a map",
                key
            )));
        };
        let inherits = [BASE_KEY, NAME_KEY]
            .into_iter()
            .filter_map(|k| map.get(k).and_then(Value::as_str))
            .next()
            .is_some_and(|base| !base.is_empty() && base != variant);
        if !inherits {
            return Ok(map.clone());
        }

        let key_text = key.to_string();
        let mut resolved = self
            .resolve_module(raw, type_name, depth + 1, true)
            .map_err(|e| e.within(&key_text))?;
        if resolved.len() != 1 {
            return Err(ConfigError::invalid(format!(
                "the base module '{}' expands to {} configs, a base must not search",
                key,
                resolved.len()
            )));
        }
        match resolved.pop() {
            Some(Value::Object(map)) => Ok(map),
            _ => Err(ConfigError::invalid(format!(
                "the base module '{}' did not resolve to a map",
                key
            ))),
        }
    }
}

/// Remove `_base` and return the variant to inherit from (`_base`, else `_name`, else empty).
fn take_base_variant(raw: &mut Map<String, Value>) -> Result<String> {
    if let Some(base) = raw.remove(BASE_KEY) {
        return match base {
            Value::String(variant) => Ok(variant),
            Value::Null => Ok(String::new()),
            other => Err(ConfigError::invalid(format!(
                "'{}' must be a variant name, got {}",
                BASE_KEY, other
            ))),
        };
    }
    match raw.get(NAME_KEY) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(name)) => Ok(name.clone()),
        Some(other) => Err(ConfigError::invalid(format!(
            "'{}' must be a variant name, got {}",
            NAME_KEY, other
        ))),
    }
}

fn check_anchor(value: &Value) -> Result<String> {
    let Some(anchor) = value.as_str() else {
        return Err(ConfigError::invalid(format!(
            "'{}' must be a string, got {}",
            ANCHOR_KEY, value
        )));
    };
    let reserved = anchor == GLOBAL_ANCHOR || anchor == GLOBAL_KEY;
    let dollar_chain = anchor.starts_with('$') && anchor != SELF_ANCHOR;
    if anchor.is_empty() || anchor.contains('.') || reserved || dollar_chain {
        return Err(ConfigError::invalid(format!(
            "'{}' is not a valid anchor name",
            anchor
        )));
    }
    Ok(anchor.to_string())
}

fn check_base_anchor(base: &Map<String, Value>, type_name: &str, variant: &str) -> Result<()> {
    match base.get(ANCHOR_KEY) {
        None => Ok(()),
        Some(Value::String(anchor)) if anchor == SELF_ANCHOR => Ok(()),
        Some(anchor) => Err(ConfigError::invalid(format!(
            "the base module '{}' declares the anchor {}, a base can only use '{}'",
            ModuleKey::new(type_name, variant),
            anchor,
            SELF_ANCHOR
        ))),
    }
}

/// Re-express a `submodule` map as top-level `@` keys.
fn flatten_submodules(map: &mut Map<String, Value>) -> Result<()> {
    let Some(submodules) = map.remove(SUBMODULE_KEY) else {
        return Ok(());
    };
    let Value::Object(submodules) = submodules else {
        return Err(ConfigError::invalid(format!(
            "'{}' must be a map of submodules, got {}",
            SUBMODULE_KEY, submodules
        )));
    };
    for (key, value) in submodules {
        let key = if key.starts_with(SUBMODULE_SIGIL) {
            key
        } else {
            format!("{}{}", SUBMODULE_SIGIL, key)
        };
        if map.contains_key(&key) {
            return Err(ConfigError::invalid(format!(
                "submodule '{}' is declared both in '{}' and as a key",
                key, SUBMODULE_KEY
            )));
        }
        map.insert(key, value);
    }
    Ok(())
}

/// Cartesian product of named axes; the first axis varies slowest. No axes make one empty point.
fn cartesian<K: Clone, V: Clone>(axes: &[(K, Vec<V>)]) -> Vec<Vec<(K, V)>> {
    axes.iter()
        .map(|(key, candidates)| candidates.iter().map(move |c| (key.clone(), c.clone())))
        .multi_cartesian_product()
        .collect()
}

/// Report reference cycles with document paths, not wrapper paths.
fn hide_root(err: ConfigError) -> ConfigError {
    match err {
        ConfigError::CircularReference(targets) => {
            let prefix = format!("{}.", ROOT_SLOT);
            ConfigError::CircularReference(targets.replace(&prefix, ""))
        }
        other => other,
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Fail if two configs are structurally identical.
pub fn check_duplicates(configs: &[Value]) -> Result<()> {
    let mut seen = HashSet::new();
    let repeated: Vec<&Value> = configs
        .iter()
        .filter(|config| !seen.insert(config.to_string()))
        .collect();
    if repeated.is_empty() {
        return Ok(());
    }
    for config in configs {
        error!("{}", pretty(config));
    }
    Err(ConfigError::ParserConfigRepeat {
        count: repeated.len(),
        rendered: repeated
            .iter()
            .map(|config| pretty(config))
            .collect::<Vec<_>>()
            .join("\n"),
    })
}

/// Fail on the first value still holding the missing marker.
pub fn check_missing(configs: &[Value]) -> Result<()> {
    for config in configs {
        if let Some(trace) = find_missing(config, &Trace::root()) {
            return Err(ConfigError::ValueMissing {
                path: trace.to_string(),
                rendered: pretty(config),
            });
        }
    }
    Ok(())
}

fn find_missing(value: &Value, trace: &Trace) -> Option<Trace> {
    match value {
        value if is_missing(value) => Some(trace.clone()),
        Value::Object(map) => map
            .iter()
            .find_map(|(key, child)| find_missing(child, &trace.child(key.as_str()))),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, child)| find_missing(child, &trace.child(i.to_string()))),
        _ => None,
    }
}
