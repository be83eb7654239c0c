#![allow(clippy::result_large_err)]

use super::{AmplifierConfig, ValidatorKind};
use crate::core::error::AppError;
use crate::core::pipeline::render::{device_names, device_profile};
use crate::core::types::ErrorCategory;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules
    pub fn validate(config: &AmplifierConfig) -> Result<(), AppError> {
        if !(0.0..=1.0).contains(&config.compare.threshold) {
            return Err(invalid("compare.threshold must be between 0.0 and 1.0"));
        }

        if !(0.0..=100.0).contains(&config.compare.pass_ratio) {
            return Err(invalid("compare.pass_ratio must be between 0.0 and 100.0"));
        }

        if device_profile(&config.render.device).is_none() {
            return Err(invalid(format!(
                "render.device '{}' is unknown; supported devices are {}",
                config.render.device,
                device_names().join(", ")
            )));
        }

        if config.validator.kind == ValidatorKind::Command
            && config.validator.command.trim().is_empty()
        {
            return Err(invalid(
                "validator.command cannot be empty when validator.kind is command",
            ));
        }

        if config.output.root.as_os_str().is_empty() {
            return Err(invalid("output.root cannot be empty"));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::ConfigurationError, message).with_code("AMP-CFG-005")
}
