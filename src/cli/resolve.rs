//! Resolve subcommand for config-graph CLI
//!
//! Reads one document, expands it against the loaded modules, validates every expanded
//! config and prints them.

use crate::config::Settings;
use crate::format::{OutputFormat, format_configs};
use crate::instantiate::instantiate_root;
use crate::loader::read_document;
use crate::parser::{Parser, check_missing};
use crate::registry::Registry;
use crate::syntax::SUBMODULE_SIGIL;
use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::info;

/// Arguments for the resolve subcommand
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Config document to resolve (JSON or YAML)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Resolve the document as one module of this type instead of a root document
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub module_type: Option<String>,

    /// Output format (default: from settings)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,
}

/// Resolve, check and render the document named by `args`.
pub fn run(args: &ResolveArgs, registry: &Registry, settings: &Settings) -> Result<String> {
    let document = read_document(&args.file)?;
    let module_type = args.module_type.as_deref().unwrap_or_default();
    let parser = Parser::new(registry).with_options(settings.parser_options());

    let configs = parser
        .parse(&document, module_type)
        .with_context(|| format!("failed to resolve {}", args.file.display()))?;
    check_missing(&configs)?;
    for config in &configs {
        validate(config, module_type, registry)?;
    }

    info!(file = %args.file.display(), configs = configs.len(), "resolved document");
    format_configs(&configs, args.format.unwrap_or(settings.format))
}

/// Build the objects of one config and drop them; only the checks matter here.
fn validate(config: &Value, module_type: &str, registry: &Registry) -> Result<()> {
    if module_type.is_empty() {
        instantiate_root(config, registry)?;
        return Ok(());
    }
    // a typed config is checked as the only slot of a root
    let mut root = Map::new();
    root.insert(format!("{}{}", SUBMODULE_SIGIL, module_type), config.clone());
    instantiate_root(&Value::Object(root), registry)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ConfigClass, FieldSchema};
    use tempfile::TempDir;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        let class = ConfigClass::builder("model", "small")
            .field(FieldSchema::int("size", 2).maximum(100.0).build().unwrap())
            .build()
            .unwrap();
        registry.register(class).unwrap();
        registry
    }

    #[test]
    fn test_run_resolves_search() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("exp.json");
        std::fs::write(
            &file,
            r#"{"@model": {"_base": "small", "_search": {"size": [4, 8]}}}"#,
        )
        .unwrap();
        let args = ResolveArgs {
            file,
            module_type: None,
            format: Some(OutputFormat::Json),
        };
        let output = run(&args, &registry(), &Settings::default()).unwrap();
        let rendered: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(
            rendered,
            serde_json::json!([
                {"@model": {"_name": "small", "size": 4}},
                {"@model": {"_name": "small", "size": 8}},
            ])
        );
    }

    #[test]
    fn test_run_rejects_invalid_value() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("exp.yaml");
        std::fs::write(&file, "_base: small\nsize: 1000\n").unwrap();
        let args = ResolveArgs {
            file,
            module_type: Some("model".into()),
            format: None,
        };
        let err = run(&args, &registry(), &Settings::default()).unwrap_err();
        assert!(err.to_string().contains("size"));
    }
}
