//! Settings of the tool and the tree-merge primitives shared with the resolver.
//!
//! Settings are consolidated from tiers with field-by-field merging:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `./config-graph.yaml` (or `./.config-graph.yaml`)
//! 3. **User** - `~/.config-graph/config.yaml`
//! 4. **Environment** - overrides below
//!
//! ## Environment Variables
//! - `CONFIG_GRAPH_CONFIG_PATH` - Explicit settings file (overrides all tiers)
//! - `CONFIG_GRAPH_MODULES` - Module directories, as a path list
//! - `CONFIG_GRAPH_MAX_DEPTH` - Resolution depth limit
//! - `CONFIG_GRAPH_FORMAT` - Output format of the CLI (`json` or `yaml`)

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier};
pub use merge::{deep_merge, deep_merge_all, inherit_merge};
pub use types::{DEFAULT_MAX_DEPTH, Settings};
