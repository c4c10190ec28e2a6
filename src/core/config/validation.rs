#![allow(clippy::result_large_err)]

use super::EngineConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &EngineConfig) -> Result<(), AppError> {
        if config.while_iteration_cap == 0 {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "while_iteration_cap must be >= 1",
            )
            .with_code("TT-CFG-001"));
        }

        if let Some(cwd) = &config.default_cwd {
            if cwd.as_os_str().is_empty() {
                return Err(AppError::new(
                    ErrorCategory::ValidationError,
                    "default_cwd cannot be empty",
                )
                .with_code("TT-CFG-001"));
            }
        }

        Ok(())
    }
}
