//! List and schema subcommands for config-graph CLI

use crate::format::format_modules_markdown;
use crate::registry::Registry;
use anyhow::Result;
use clap::Args;

/// Arguments for the schema subcommand
#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Module type
    #[arg(value_name = "TYPE")]
    pub type_name: String,

    /// Variant name (default: the type's unnamed variant)
    #[arg(value_name = "VARIANT", default_value = "")]
    pub variant: String,
}

/// Markdown listing of registered modules.
pub fn list(registry: &Registry, type_name: Option<&str>) -> String {
    let modules: Vec<_> = registry
        .modules()
        .into_iter()
        .filter(|(key, _)| type_name.is_none_or(|t| key.type_name == t))
        .collect();
    format_modules_markdown(&modules)
}

/// Pretty JSON Schema of one registered class.
pub fn schema(registry: &Registry, args: &SchemaArgs) -> Result<String> {
    let class = registry.get(&args.type_name, &args.variant)?;
    Ok(serde_json::to_string_pretty(&class.json_schema())?)
}
