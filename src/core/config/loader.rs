#![allow(clippy::result_large_err)]

use super::{AmplifierConfig, ConfigValidator, DEFAULT_CONFIG_FILE};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with precedence defaults < file < environment.
    ///
    /// An explicit path must exist. Without one, `amplifier.toml` in the working
    /// directory is used when present.
    pub fn load(explicit: Option<&Path>) -> Result<AmplifierConfig, AppError> {
        let config_file = match explicit {
            Some(path) => Some(Self::load_from_file(path)?.ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ConfigurationError,
                    format!("Config file {} does not exist", path.display()),
                )
                .with_code("AMP-CFG-004")
            })?),
            None => Self::load_from_file(&Self::default_path())?,
        };

        let mut config = config_file.unwrap_or_default();
        Self::apply_env_overrides(&mut config);
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Load config from a specific file path.
    /// Returns Ok(None) if the file doesn't exist.
    pub fn load_from_file(path: &Path) -> Result<Option<AmplifierConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: AmplifierConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("AMP-CFG-004")
        })?;

        Ok(Some(config))
    }

    /// Environment variables take precedence over config file values. Values that do not
    /// parse are ignored with a warning.
    fn apply_env_overrides(config: &mut AmplifierConfig) {
        if let Ok(root) = env::var("AMPLIFIER_OUTPUT_ROOT") {
            config.output.root = PathBuf::from(root);
        }

        if let Ok(device) = env::var("AMPLIFIER_DEVICE") {
            config.render.device = device;
        }

        if let Ok(provider) = env::var("AMPLIFIER_RENDER_PROVIDER") {
            match provider.parse() {
                Ok(provider) => config.render.provider = provider,
                Err(err) => tracing::warn!("ignoring AMPLIFIER_RENDER_PROVIDER: {}", err),
            }
        }

        if let Ok(port) = env::var("AMPLIFIER_PREVIEW_PORT") {
            match port.parse::<u16>() {
                Ok(port) => config.render.preview_port = port,
                Err(_) => tracing::warn!("ignoring AMPLIFIER_PREVIEW_PORT '{}'", port),
            }
        }

        if let Ok(kind) = env::var("AMPLIFIER_VALIDATOR") {
            match kind.parse() {
                Ok(kind) => config.validator.kind = kind,
                Err(err) => tracing::warn!("ignoring AMPLIFIER_VALIDATOR: {}", err),
            }
        }

        if let Ok(command) = env::var("AMPLIFIER_VALIDATOR_COMMAND") {
            config.validator.command = command;
        }

        if let Ok(threshold) = env::var("AMPLIFIER_COMPARE_THRESHOLD") {
            match threshold.parse::<f64>() {
                Ok(threshold) => config.compare.threshold = threshold,
                Err(_) => tracing::warn!("ignoring AMPLIFIER_COMPARE_THRESHOLD '{}'", threshold),
            }
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "AMPLIFIER_OUTPUT_ROOT - Override the output root directory (default: output)",
            "AMPLIFIER_DEVICE - Override the emulated device (default: Pixel 2)",
            "AMPLIFIER_RENDER_PROVIDER - Override the render provider (static/chromium)",
            "AMPLIFIER_PREVIEW_PORT - Override the local preview server port (default: 8080)",
            "AMPLIFIER_VALIDATOR - Override the validator kind (command/none)",
            "AMPLIFIER_VALIDATOR_COMMAND - Override the validator program (default: amphtml-validator)",
            "AMPLIFIER_COMPARE_THRESHOLD - Override the per-pixel comparison threshold (default: 0.1)",
            "AMPLIFIER_LOG_LEVEL - Override the default log level",
        ]
    }
}
