#![allow(clippy::result_large_err)]

use super::{ConfigValidator, EngineConfig};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "tasktree.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `<workspace>/tasktree.toml`, falling back to defaults when the
    /// file is absent. Environment variables override file values.
    pub fn load_from_workspace(workspace_path: &Path) -> Result<EngineConfig, AppError> {
        let config_path = workspace_path.join(CONFIG_FILE_NAME);
        let mut config = Self::load_from_file(&config_path)?.unwrap_or_default();
        Self::apply_env_overrides(&mut config)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Returns Ok(None) if the file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<EngineConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
            .with_code("TT-CFG-001")
        })?;

        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("TT-CFG-001")
        })?;

        Ok(Some(config))
    }

    fn apply_env_overrides(config: &mut EngineConfig) -> Result<(), AppError> {
        if let Ok(cap) = env::var("TASKTREE_WHILE_ITERATION_CAP") {
            config.while_iteration_cap = cap.trim().parse::<u64>().map_err(|_| {
                AppError::new(
                    ErrorCategory::ValidationError,
                    format!(
                        "TASKTREE_WHILE_ITERATION_CAP must be a positive integer, got '{}'",
                        cap
                    ),
                )
                .with_code("TT-CFG-001")
            })?;
        }

        if let Ok(cwd) = env::var("TASKTREE_DEFAULT_CWD") {
            config.default_cwd = if cwd.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(cwd))
            };
        }

        if let Ok(log_params) = env::var("TASKTREE_LOG_PARAMS") {
            if let Ok(log_params) = log_params.trim().parse::<bool>() {
                config.log_params = log_params;
            }
        }

        Ok(())
    }

    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "TASKTREE_WHILE_ITERATION_CAP - Bound for While loops without MaxIterations (default: 10000)",
            "TASKTREE_DEFAULT_CWD - Base directory for relative Run.CliExecute CWD values",
            "TASKTREE_LOG_PARAMS - Log expanded task parameters at debug level (true/false)",
            "TASKTREE_LOG_LEVEL - Override the log level directive",
        ]
    }
}
