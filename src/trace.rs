//! Dotted key paths ("traces") into config trees.
//!
//! A trace addresses a value by map keys and list indices. Slot keys may be written in an
//! abbreviated form (`#1` for `@child@base#1`) as long as the abbreviation is unambiguous
//! within its map.

use crate::error::{ConfigError, Result};
use crate::syntax::{SUBMODULE_SIGIL, TAG_SIGIL};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// An absolute path of key segments from a tree root.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Trace(Vec<String>);

impl Trace {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Split dotted text. A `.` directly after another `.` starts the next segment
    /// instead of separating, so `a..b` is `["a", ".b"]`.
    pub fn parse(text: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        for c in text.chars() {
            if c == '.' && !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            } else {
                current.push(c);
            }
        }
        if !current.is_empty() {
            segments.push(current);
        }
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn join(&self, other: &Trace) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// True if `self` is a strict prefix of `other`.
    pub fn is_ancestor_of(&self, other: &Trace) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Parse a list index segment: digits with an optional leading `-` (counted from the end).
pub fn parse_index(segment: &str, len: usize) -> Result<usize> {
    let (negative, digits) = match segment.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, segment),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::key_not_found(format!(
            "list index must be an integer, got '{}'",
            segment
        )));
    }
    let index: usize = digits
        .parse()
        .map_err(|_| ConfigError::key_not_found(format!("list index '{}' is too large", segment)))?;
    let resolved = if negative {
        len.checked_sub(index)
    } else {
        Some(index)
    };
    match resolved {
        Some(i) if i < len => Ok(i),
        _ => Err(ConfigError::key_not_found(format!(
            "list index {} is out of range for a list of length {}",
            segment, len
        ))),
    }
}

/// Resolve a trace written by a user (possibly with abbreviated slot keys or negative list
/// indices) into the canonical trace of an existing value in `root`.
pub fn canonicalize(trace: &Trace, root: &Value) -> Result<Trace> {
    let mut current = root;
    let mut canonical = Vec::with_capacity(trace.len());
    for segment in trace.segments() {
        match current {
            Value::Array(items) => {
                let index = parse_index(segment, items.len())
                    .map_err(|e| not_found(trace, &e.to_string()))?;
                canonical.push(index.to_string());
                current = &items[index];
            }
            Value::Object(map) => {
                let key = resolve_key(map, segment).map_err(|e| not_found(trace, &e.to_string()))?;
                current = &map[key.as_str()];
                canonical.push(key);
            }
            _ => {
                return Err(not_found(
                    trace,
                    &format!("'{}' is not a container", canonical.join(".")),
                ));
            }
        }
    }
    Ok(Trace(canonical))
}

fn not_found(trace: &Trace, reason: &str) -> ConfigError {
    ConfigError::key_not_found(format!(
        "can not find the trace '{}' in config: {}",
        trace, reason
    ))
}

/// Find the real key in `map` for `segment`, allowing unique slot-key abbreviations.
pub fn resolve_key(map: &Map<String, Value>, segment: &str) -> Result<String> {
    if map.contains_key(segment) {
        return Ok(segment.to_string());
    }
    let index = SlotKeyIndex::new(map.keys().map(String::as_str));
    index.get(segment).map(str::to_string)
}

/// Look up a canonical trace.
pub fn get<'a>(root: &'a Value, trace: &Trace) -> Result<&'a Value> {
    let mut current = root;
    for segment in trace.segments() {
        current = match current {
            Value::Array(items) => {
                let index = parse_index(segment, items.len())?;
                &items[index]
            }
            Value::Object(map) => map
                .get(segment)
                .ok_or_else(|| not_found(trace, &format!("no key '{}'", segment)))?,
            _ => return Err(not_found(trace, "path runs through a scalar")),
        };
    }
    Ok(current)
}

/// Replace the value at an existing canonical trace.
pub fn set(root: &mut Value, trace: &Trace, value: Value) -> Result<()> {
    let Some((last, parents)) = trace.segments().split_last() else {
        *root = value;
        return Ok(());
    };
    let mut current = root;
    for segment in parents {
        current = match current {
            Value::Array(items) => {
                let index = parse_index(segment, items.len())?;
                &mut items[index]
            }
            Value::Object(map) => map
                .get_mut(segment)
                .ok_or_else(|| not_found(trace, &format!("no key '{}'", segment)))?,
            _ => return Err(not_found(trace, "path runs through a scalar")),
        };
    }
    match current {
        Value::Array(items) => {
            let index = parse_index(last, items.len())?;
            items[index] = value;
        }
        Value::Object(map) => {
            map.insert(last.clone(), value);
        }
        _ => return Err(not_found(trace, "path runs through a scalar")),
    }
    Ok(())
}

/// Unambiguous short names for the slot keys of one map.
///
/// A key like `@A@B#c` is split into its components `@A`, `@B`, `#c`. Every sub-sequence
/// of components, each written in full or reduced to its sigil, is a candidate short name
/// (`@A`, `#c`, `@@B`, `@A@#c`, ...). Candidates that are real keys, that end in a sigil,
/// that carry no name characters, or that match more than one key are dropped.
#[derive(Debug, Clone)]
pub struct SlotKeyIndex {
    keys: Vec<String>,
    lookup: HashMap<String, String>,
}

impl SlotKeyIndex {
    pub fn new<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        let keys: Vec<String> = keys.into_iter().map(str::to_string).collect();
        let originals: BTreeSet<&str> = keys.iter().map(String::as_str).collect();
        let mut lookup: HashMap<String, String> =
            keys.iter().map(|k| (k.clone(), k.clone())).collect();
        let mut counts: HashMap<String, usize> = HashMap::new();

        for key in keys.iter().filter(|k| k.starts_with(SUBMODULE_SIGIL)) {
            for candidate in abbreviations(key) {
                if originals.contains(candidate.as_str()) {
                    continue;
                }
                let count = counts.entry(candidate.clone()).or_insert(0);
                *count += 1;
                if *count > 1 {
                    lookup.remove(&candidate);
                } else {
                    lookup.insert(candidate, key.clone());
                }
            }
        }
        Self { keys, lookup }
    }

    pub fn get(&self, short: &str) -> Result<&str> {
        self.lookup.get(short).map(String::as_str).ok_or_else(|| {
            ConfigError::key_not_found(format!(
                "key '{}' is missing or ambiguous in {:?}",
                short, self.keys
            ))
        })
    }
}

fn is_sigil(c: char) -> bool {
    c == SUBMODULE_SIGIL || c == TAG_SIGIL
}

/// Split a slot key into sigil-led components: `@A@B#c` -> `["@A", "@B", "#c"]`.
fn components(key: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for c in key.chars() {
        if is_sigil(c) && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn abbreviations(key: &str) -> BTreeSet<String> {
    let mut prefixes: BTreeSet<String> = BTreeSet::from([String::new()]);
    for part in components(key) {
        let sigil: String = part.chars().take(1).collect();
        let mut extended = BTreeSet::new();
        for prefix in &prefixes {
            extended.insert(format!("{}{}", prefix, part));
            extended.insert(format!("{}{}", prefix, sigil));
        }
        prefixes.extend(extended);
    }
    prefixes
        .into_iter()
        .filter(|p| p.chars().any(|c| !is_sigil(c)))
        .filter(|p| !p.ends_with(is_sigil))
        .collect()
}
