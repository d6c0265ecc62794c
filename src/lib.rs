//! Config Graph Library
//!
//! A declarative configuration language and its resolver: fragments inherit from registered
//! modules, compose submodules by type, reference each other through anchors and fan out
//! over search grids. This module exports the core components for the CLI and for tests.

pub mod cli;
pub mod config;
pub mod error;
pub mod expr;
pub mod format;
pub mod instantiate;
pub mod loader;
pub mod logging;
pub mod parser;
pub mod registry;
pub mod schema;
pub mod syntax;
pub mod trace;
