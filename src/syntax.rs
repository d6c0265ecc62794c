//! Reserved syntax of the config language.
//!
//! Keys starting with `@` declare submodule slots (`@type[@variant][#tag]`), and a handful of
//! underscore keys drive inheritance, anchors, search grids and the global namespace.

use crate::error::{ConfigError, Result};
use std::fmt;

/// Marker for a required value with no default.
pub const MISSING: &str = "???";

pub const SUBMODULE_SIGIL: char = '@';
pub const TAG_SIGIL: char = '#';

pub const BASE_KEY: &str = "_base";
pub const NAME_KEY: &str = "_name";
pub const ANCHOR_KEY: &str = "_anchor";
pub const SEARCH_KEY: &str = "_search";
pub const GLOBAL_KEY: &str = "_G";
pub const SUBMODULE_KEY: &str = "submodule";

/// Prefix of a transform expression inside a string value.
pub const LAMBDA_MARKER: &str = "@lambda";

/// Anchor meaning "the module this value lives in".
pub const SELF_ANCHOR: &str = "$";
/// Short alias of the global namespace.
pub const GLOBAL_ANCHOR: &str = "~";

/// Input placeholder for expressions that take no data.
pub const NO_INPUT: &str = "_";

/// Keys that pass through submodule expansion untouched.
pub const PASSTHROUGH_KEYS: [&str; 5] = [BASE_KEY, NAME_KEY, SEARCH_KEY, ANCHOR_KEY, SUBMODULE_KEY];

/// Names a config class field may not take.
pub const RESERVED_FIELD_NAMES: [&str; 10] = [
    BASE_KEY,
    NAME_KEY,
    SEARCH_KEY,
    ANCHOR_KEY,
    GLOBAL_KEY,
    SUBMODULE_KEY,
    "_module_name",
    "_from_dict",
    "_to_dict",
    "_json_schema",
];

/// Check that a type or variant name is a valid identifier.
///
/// Leading letter or underscore, then letters, digits, underscores or hyphens.
pub fn check_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Name(format!("module name '{}' is invalid", name)))
    }
}

/// True for the required-value marker.
pub fn is_missing(value: &serde_json::Value) -> bool {
    value.as_str() == Some(MISSING)
}

/// True for keys that declare a submodule slot.
pub fn is_slot_key(key: &str) -> bool {
    key.starts_with(SUBMODULE_SIGIL)
}

/// True for a string that will be replaced during reference resolution.
///
/// Covers transform expressions (`@a.b @lambda x: x`, `@lambda _: 1`) and bare references
/// (`@anchor.path`). Field checks skip these until resolution completes.
pub fn is_reference_expr(value: &str) -> bool {
    let value = value.trim();
    if !value.starts_with(SUBMODULE_SIGIL) {
        return false;
    }
    if value.contains(LAMBDA_MARKER) {
        return true;
    }
    is_bare_reference(value)
}

/// `@anchor.path` with no whitespace and at least one path segment after the anchor.
pub(crate) fn is_bare_reference(value: &str) -> bool {
    let Some(body) = value.strip_prefix(SUBMODULE_SIGIL) else {
        return false;
    };
    if body.is_empty() || body.contains(char::is_whitespace) || body.contains(SUBMODULE_SIGIL) {
        return false;
    }
    match body.split_once('.') {
        Some((anchor, rest)) => !anchor.is_empty() && !rest.is_empty(),
        None => false,
    }
}

/// A parsed slot key: `@type[@variant][#tag]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotKey {
    pub type_name: String,
    pub variant: Option<String>,
    pub tag: Option<String>,
}

impl SlotKey {
    pub fn parse(key: &str) -> Result<Self> {
        let body = key.trim().trim_start_matches(SUBMODULE_SIGIL);
        let (head, tag) = match body.split_once(TAG_SIGIL) {
            Some((head, tag)) => (head, Some(tag.to_string())),
            None => (body, None),
        };
        let mut parts = head.split(SUBMODULE_SIGIL);
        let type_name = parts.next().unwrap_or_default().to_string();
        let variant = parts.next().map(str::to_string);
        if parts.next().is_some() || type_name.is_empty() {
            return Err(ConfigError::invalid(format!(
                "the module key '{}' is not valid, should be like '@type[@variant][#tag]'",
                key
            )));
        }
        Ok(Self {
            type_name,
            variant: variant.filter(|v| !v.is_empty()),
            tag,
        })
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SUBMODULE_SIGIL, self.type_name)?;
        if let Some(ref variant) = self.variant {
            write!(f, "{}{}", SUBMODULE_SIGIL, variant)?;
        }
        if let Some(ref tag) = self.tag {
            write!(f, "{}{}", TAG_SIGIL, tag)?;
        }
        Ok(())
    }
}
