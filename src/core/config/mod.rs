pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration loaded from `tasktree.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for `Flow.While` loops that set no `MaxIterations`.
    #[serde(default = "default_while_iteration_cap")]
    pub while_iteration_cap: u64,

    /// Base directory for relative `CWD` values of `Run.CliExecute`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_cwd: Option<PathBuf>,

    /// Log expanded parameters at debug level when a task starts
    #[serde(default)]
    pub log_params: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            while_iteration_cap: default_while_iteration_cap(),
            default_cwd: None,
            log_params: false,
        }
    }
}

fn default_while_iteration_cap() -> u64 {
    10_000
}
