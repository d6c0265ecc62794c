//! Module directories on disk.
//!
//! A module directory holds fragment files named `type@variant.{json,jsonc,json5,yaml,yml}` (or
//! `type.{...}` for the default variant) and class declarations named
//! `*.schema.{json,yaml,yml}`. Files and directories starting with `_` are skipped.

use super::Loader;
use crate::error::{ConfigError, Result};
use crate::registry::{ModuleKey, Registry};
use crate::schema::{ClassSpec, register_specs};
use crate::syntax::{BASE_KEY, NAME_KEY, SUBMODULE_SIGIL, check_name};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const EXTENSIONS: [&str; 5] = ["json", "jsonc", "json5", "yaml", "yml"];
const SCHEMA_SUFFIX: &str = ".schema";

/// Every document file under `dir`, sorted. A missing directory holds nothing.
pub fn module_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    let io_error = |source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        let skipped = path
            .file_name()
            .map(|name| name.to_string_lossy().starts_with('_'))
            .unwrap_or(true);
        if skipped {
            continue;
        }
        if path.is_dir() {
            walk(&path, files)?;
        } else if path
            .extension()
            .is_some_and(|ext| EXTENSIONS.iter().any(|known| ext == *known))
        {
            files.push(path);
        }
    }
    Ok(())
}

/// True for class declaration files (`*.schema.json` and friends).
pub fn is_class_file(path: &Path) -> bool {
    path.file_stem()
        .is_some_and(|stem| stem.to_string_lossy().ends_with(SCHEMA_SUFFIX))
}

/// Read a JSON, JSON5 (`.jsonc`/`.json5`, comments and trailing commas) or YAML document.
/// An empty document reads as an empty map.
pub fn read_document(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };
    if content.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let value: Value = match extension.as_str() {
        "json" => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
        "jsonc" | "json5" => json5::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
        _ => serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
    };
    Ok(match value {
        Value::Null => Value::Object(Default::default()),
        other => other,
    })
}

/// The module key a fragment file registers under, from its stem `type[@variant]`.
pub fn key_from_path(path: &Path) -> Result<ModuleKey> {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let parts: Vec<&str> = stem.split(SUBMODULE_SIGIL).collect();
    let (type_name, variant) = match parts.as_slice() {
        [type_name] => (*type_name, ""),
        [type_name, variant] => (*type_name, *variant),
        _ => {
            return Err(ConfigError::Name(format!(
                "module file '{}' must be named 'type' or 'type@variant'",
                path.display()
            )));
        }
    };
    check_name(type_name)?;
    if !variant.is_empty() {
        check_name(variant)?;
    }
    Ok(ModuleKey::new(type_name, variant))
}

/// The base a fragment inherits from: its `_base`, else a `_name` naming another variant.
fn base_of(tree: &Value, key: &ModuleKey) -> ModuleKey {
    let variant = [BASE_KEY, NAME_KEY]
        .into_iter()
        .filter_map(|k| tree.get(k).and_then(Value::as_str))
        .next()
        .filter(|v| !v.is_empty() && *v != key.variant)
        .unwrap_or_default();
    ModuleKey::new(key.type_name.as_str(), variant)
}

/// Register every class declaration under `dir`, parents before children.
pub fn load_class_specs(dir: &Path, registry: &mut Registry, ignore_errors: bool) -> Result<usize> {
    let mut specs = Vec::new();
    for path in module_files(dir)?.into_iter().filter(|p| is_class_file(p)) {
        let spec = read_document(&path).and_then(|document| {
            serde_json::from_value::<ClassSpec>(document).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                message: e.to_string(),
            })
        });
        match spec {
            Ok(spec) => specs.push((path.display().to_string(), spec)),
            Err(e) if ignore_errors => {
                warn!(path = %path.display(), error = %e, "skipping class declaration");
            }
            Err(e) => return Err(e),
        }
    }
    let count = register_specs(specs, registry)?;
    info!(dir = %dir.display(), classes = count, "registered class declarations");
    Ok(count)
}

impl Loader<'_> {
    /// Read every fragment under `dir` into the loader.
    ///
    /// Fragments whose base is not registered yet are stashed until
    /// [`Loader::resolve_all`] runs.
    pub fn load_dir(&mut self, dir: &Path, ignore_errors: bool) -> Result<usize> {
        let mut count = 0;
        for path in module_files(dir)?.into_iter().filter(|p| !is_class_file(p)) {
            match self.load_file(&path) {
                Ok(()) => count += 1,
                Err(e) if ignore_errors => {
                    warn!(path = %path.display(), error = %e, "skipping module file");
                }
                Err(e) => return Err(e),
            }
        }
        debug!(dir = %dir.display(), fragments = count, "read module directory");
        Ok(count)
    }

    fn load_file(&mut self, path: &Path) -> Result<()> {
        let key = key_from_path(path)?;
        let tree = read_document(path)?;
        if !tree.is_object() {
            return Err(ConfigError::Parse {
                path: path.to_path_buf(),
                message: format!("a module fragment must be a map, got {}", tree),
            });
        }
        let base = base_of(&tree, &key);
        self.stash(tree, path, base, key)
    }
}
