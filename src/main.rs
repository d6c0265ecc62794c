//! config-graph
//!
//! Resolves declarative config documents (inheritance, submodules, references and search
//! grids) against the modules found in the configured module directories.

use anyhow::{Context, Result};
use clap::Parser;
use config_graph::cli::{Cli, Command, inspect, resolve};
use config_graph::config::ConfigLoader;
use config_graph::error::ConfigError;
use config_graph::loader::load_modules;
use config_graph::logging::{self, LogTarget};
use config_graph::registry::Registry;
use serde_json::Value;
use std::process::ExitCode;
use tracing::debug;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            match error_code(&e) {
                Some(code) => eprintln!("error[{}]: {:#}", code, e),
                None => eprintln!("error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<String> {
    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    // If explicit settings path given, set it as env var for ConfigLoader to pick up
    // SAFETY: This is safe at program startup before any other threads are spawned
    if let Some(config_path) = &cli.config {
        unsafe {
            std::env::set_var("CONFIG_GRAPH_CONFIG_PATH", config_path);
        }
    }
    let loader = ConfigLoader::load()?;
    let settings = loader.settings();

    // settings directories are relative to the settings file, flags to the working directory
    let mut dirs = settings.module_dirs(loader.base_dir());
    dirs.extend(cli.modules.iter().cloned());
    debug!(?dirs, "loading module directories");
    let mut registry = Registry::new();
    load_modules(&mut registry, &dirs, settings.ignore_errors)
        .context("failed to load module directories")?;

    match cli.command {
        Command::Resolve(ref args) => resolve::run(args, &registry, settings),
        Command::List { ref type_name } => Ok(inspect::list(&registry, type_name.as_deref())),
        Command::Schema(ref args) => inspect::schema(&registry, args),
    }
}

/// Machine-readable code of the first engine error in the chain.
fn error_code(err: &anyhow::Error) -> Option<String> {
    let code = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<ConfigError>())?
        .code();
    match serde_json::to_value(code).ok()? {
        Value::String(code) => Some(code),
        _ => None,
    }
}
