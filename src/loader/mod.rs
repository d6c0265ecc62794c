//! Cross-file base resolution.
//!
//! Fragments arrive in arbitrary order. A fragment whose base is registered (or that has
//! no base) is stored at once; the others are stashed. [`Loader::resolve_all`] then retries
//! the stash until a full pass stores nothing, so chains resolve regardless of file order.
//! Whatever is left names a missing base or a circular chain.

mod files;

pub use files::{is_class_file, key_from_path, load_class_specs, module_files, read_document};

use crate::error::{ConfigError, Result};
use crate::registry::{ModuleHelp, ModuleKey, Registry};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
struct Stashed {
    tree: Value,
    path: PathBuf,
    base: ModuleKey,
}

/// Feeds raw fragments into a registry in base-dependency order.
#[derive(Debug)]
pub struct Loader<'a> {
    registry: &'a mut Registry,
    stashed: BTreeMap<ModuleKey, Stashed>,
    stored: usize,
}

impl<'a> Loader<'a> {
    pub fn new(registry: &'a mut Registry) -> Self {
        Self {
            registry,
            stashed: BTreeMap::new(),
            stored: 0,
        }
    }

    /// Offer one fragment registered as `key` and inheriting from `base`.
    ///
    /// A base with an empty variant means the fragment has no base.
    pub fn stash(
        &mut self,
        tree: Value,
        path: impl AsRef<Path>,
        base: ModuleKey,
        key: ModuleKey,
    ) -> Result<()> {
        if self.registry.contains(&key) || self.stashed.contains_key(&key) {
            return Err(ConfigError::RepeatRegister(key.to_string()));
        }
        let path = path.as_ref().to_path_buf();
        if base.variant.is_empty() || self.registry.contains(&base) {
            self.store(key, tree, path, base)
        } else {
            debug!(module = %key, base = %base, "stashed until its base is registered");
            self.stashed.insert(key, Stashed { tree, path, base });
            Ok(())
        }
    }

    /// Store every stashed fragment whose base became available, until nothing moves.
    ///
    /// Returns the number of fragments stored by this loader so far.
    pub fn resolve_all(&mut self) -> Result<usize> {
        loop {
            let ready: Vec<ModuleKey> = self
                .stashed
                .iter()
                .filter(|(_, stashed)| self.registry.contains(&stashed.base))
                .map(|(key, _)| key.clone())
                .collect();
            if ready.is_empty() {
                break;
            }
            for key in ready {
                if let Some(stashed) = self.stashed.remove(&key) {
                    self.store(key, stashed.tree, stashed.path, stashed.base)?;
                }
            }
        }

        if !self.stashed.is_empty() {
            let unresolved: Vec<String> = self
                .stashed
                .iter()
                .map(|(key, stashed)| {
                    format!("{} (base {}, {})", key, stashed.base, stashed.path.display())
                })
                .collect();
            return Err(ConfigError::Name(format!(
                "the bases of these modules are missing or circular: {}",
                unresolved.join(", ")
            )));
        }
        info!(stored = self.stored, modules = self.registry.len(), "module fragments resolved");
        Ok(self.stored)
    }

    /// Keys still waiting for their base.
    pub fn pending(&self) -> Vec<&ModuleKey> {
        self.stashed.keys().collect()
    }

    fn store(&mut self, key: ModuleKey, tree: Value, path: PathBuf, base: ModuleKey) -> Result<()> {
        let inherited = if base.variant.is_empty() {
            None
        } else {
            self.registry.help(&base).cloned()
        };
        let mut help = ModuleHelp {
            base: (!base.variant.is_empty()).then_some(base),
            ..ModuleHelp::default()
        };
        if let Some(inherited) = inherited {
            help.files = inherited.files;
            help.description = inherited.description;
        }
        help.files.push(path);
        self.registry.insert_raw(key.clone(), tree, help)?;
        self.stored += 1;
        debug!(module = %key, "stored module fragment");
        Ok(())
    }
}

/// Load every module directory into `registry`: class declarations first, then fragments.
///
/// Returns the number of fragments stored.
pub fn load_modules(registry: &mut Registry, dirs: &[PathBuf], ignore_errors: bool) -> Result<usize> {
    for dir in dirs {
        load_class_specs(dir, registry, ignore_errors)?;
    }
    let mut loader = Loader::new(registry);
    for dir in dirs {
        loader.load_dir(dir, ignore_errors)?;
    }
    loader.resolve_all()
}
