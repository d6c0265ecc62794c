//! CLI command definitions for config-graph
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod inspect;
pub mod resolve;

use clap::{Parser, Subcommand};
use inspect::SchemaArgs;
use resolve::ResolveArgs;
use std::path::PathBuf;

/// Resolve declarative config documents against registered modules
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to settings file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Extra module directory, on top of the settings (repeatable)
    #[arg(short, long = "modules", value_name = "DIR", global = true)]
    pub modules: Vec<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a config document into its expanded configs
    Resolve(ResolveArgs),

    /// List registered modules, optionally of one type
    List {
        /// Only list variants of this type
        #[arg(value_name = "TYPE")]
        type_name: Option<String>,
    },

    /// Print the JSON Schema of a registered class
    Schema(SchemaArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolve() {
        let cli = Cli::parse_from([
            "config-graph",
            "-m",
            "configs",
            "resolve",
            "exp.yaml",
            "--type",
            "model",
            "--format",
            "yaml",
        ]);
        assert_eq!(cli.modules, [PathBuf::from("configs")]);
        assert_eq!(cli.log, "2");
        match cli.command {
            Command::Resolve(args) => {
                assert_eq!(args.file, PathBuf::from("exp.yaml"));
                assert_eq!(args.module_type.as_deref(), Some("model"));
                assert_eq!(args.format, Some(crate::format::OutputFormat::Yaml));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_schema_default_variant() {
        let cli = Cli::parse_from(["config-graph", "schema", "model", "-v"]);
        assert!(cli.verbose);
        match cli.command {
            Command::Schema(args) => {
                assert_eq!(args.type_name, "model");
                assert_eq!(args.variant, "");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
