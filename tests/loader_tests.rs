//! Integration tests for module directory loading.
//!
//! Writes module directories into temp dirs and checks that:
//! - class declarations register before fragments
//! - fragments resolve their bases regardless of file order
//! - loaded modules resolve through the parser like registered classes

use config_graph::error::ConfigError;
use config_graph::loader::load_modules;
use config_graph::parser::Parser;
use config_graph::registry::{ModuleKey, Registry};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const MODEL_SCHEMA: &str = r#"
type: model
variant: base
description: base model
fields:
  - { name: hidden, kind: int, default: 768, minimum: 1 }
  - { name: dropout, kind: float, default: 0.1, maximum: 1.0 }
"#;

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// A module directory with one class, a fragment chain written child-first, a class-less
/// fragment and a skipped draft.
fn create_module_dir() -> TempDir {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    write(dir, "model.schema.yaml", MODEL_SCHEMA);
    write(dir, "a/model@xl.json", r#"{"_base": "large", "hidden": 2048}"#);
    write(dir, "b/model@large.yaml", "_base: base\nhidden: 1024\n");
    write(dir, "optim@adam.yml", "lr: 0.001\nbetas: [0.9, 0.999]\n");
    write(dir, "_draft.yaml", "this: [is not valid");
    temp
}

#[test]
fn test_load_modules_resolves_chains() {
    let temp = create_module_dir();
    let mut registry = Registry::new();
    let stored = load_modules(&mut registry, &[temp.path().to_path_buf()], false).unwrap();
    assert_eq!(stored, 3);

    assert!(registry.get("model", "base").is_ok());
    assert!(registry.contains(&ModuleKey::new("model", "xl")));
    assert_eq!(registry.variants("model"), ["base", "large", "xl"]);
    assert_eq!(registry.variants("optim"), ["adam"]);

    let help = registry.help(&ModuleKey::new("model", "xl")).unwrap();
    assert_eq!(help.base, Some(ModuleKey::new("model", "large")));
    assert_eq!(help.description.as_deref(), Some("base model"));
    let files: Vec<String> = help
        .files
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files, ["model@large.yaml", "model@xl.json"]);
}

#[test]
fn test_loaded_modules_resolve() {
    let temp = create_module_dir();
    let mut registry = Registry::new();
    load_modules(&mut registry, &[temp.path().to_path_buf()], false).unwrap();
    let parser = Parser::new(&registry);

    let document = serde_json::json!({
        "@model": "xl",
        "@optim": {"_base": "adam", "lr": 0.01},
    });
    let objects = parser.parse_root_and_instantiate(&document).unwrap();
    assert_eq!(objects.len(), 1);

    let model = objects[0].submodule("@model").unwrap();
    assert_eq!(model.get_i64("hidden"), Some(2048));
    assert_eq!(model.get_f64("dropout"), Some(0.1));
    assert_eq!(model.module(), Some(&ModuleKey::new("model", "base")));

    // no class for optim: the object keeps the values as written
    let optim = objects[0].submodule("@optim").unwrap();
    assert_eq!(optim.get_f64("lr"), Some(0.01));
    assert_eq!(optim.get("betas"), Some(&serde_json::json!([0.9, 0.999])));
}

#[test]
fn test_fragment_checked_against_class() {
    let temp = create_module_dir();
    write(temp.path(), "model@huge.yaml", "_base: base\nhidden: 0\n");
    let mut registry = Registry::new();
    load_modules(&mut registry, &[temp.path().to_path_buf()], false).unwrap();
    let parser = Parser::new(&registry);

    // fragments are stored raw; the bound is enforced when an object is built
    let document = serde_json::json!({"@model": "huge"});
    assert_eq!(parser.parse(&document, "").unwrap().len(), 1);
    let err = parser.parse_root_and_instantiate(&document).unwrap_err();
    assert!(matches!(err, ConfigError::ValueOutOfRange { .. }));
}

#[test]
fn test_multiple_dirs() {
    let first = create_module_dir();
    let second = TempDir::new().unwrap();
    write(second.path(), "model@tiny.json", r#"{"_base": "xl", "hidden": 8}"#);

    let mut registry = Registry::new();
    let dirs = [second.path().to_path_buf(), first.path().to_path_buf()];
    assert_eq!(load_modules(&mut registry, &dirs, false).unwrap(), 4);
    assert!(registry.contains(&ModuleKey::new("model", "tiny")));
}

#[test]
fn test_missing_base_is_name_error() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "model@orphan.yaml", "_base: nowhere\n");
    let mut registry = Registry::new();
    let err = load_modules(&mut registry, &[temp.path().to_path_buf()], false).unwrap_err();
    assert!(matches!(err, ConfigError::Name(_)));
    assert!(err.to_string().contains("model@orphan"));
}

#[test]
fn test_repeat_key_across_dirs() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    write(first.path(), "optim@sgd.yaml", "lr: 0.1\n");
    write(second.path(), "optim@sgd.json", r#"{"lr": 0.2}"#);

    let mut registry = Registry::new();
    let dirs = [first.path().to_path_buf(), second.path().to_path_buf()];
    let err = load_modules(&mut registry, &dirs, false).unwrap_err();
    assert!(matches!(err, ConfigError::RepeatRegister(_)));
}

#[test]
fn test_ignore_errors_skips_broken_files() {
    let temp = create_module_dir();
    write(temp.path(), "optim@broken.yaml", "lr: [0.1\n");

    let mut registry = Registry::new();
    let err = load_modules(&mut registry, &[temp.path().to_path_buf()], false).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));

    let mut registry = Registry::new();
    let stored = load_modules(&mut registry, &[temp.path().to_path_buf()], true).unwrap();
    assert_eq!(stored, 3);
    assert!(!registry.contains(&ModuleKey::new("optim", "broken")));
}

#[test]
fn test_missing_dir_holds_nothing() {
    let temp = TempDir::new().unwrap();
    let mut registry = Registry::new();
    let dirs = [temp.path().join("does-not-exist")];
    assert_eq!(load_modules(&mut registry, &dirs, false).unwrap(), 0);
    assert!(registry.is_empty());
}
