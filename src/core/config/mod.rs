pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;

use crate::core::pipeline::compare::{DEFAULT_PASS_RATIO, DEFAULT_THRESHOLD};
use crate::core::pipeline::render::DEFAULT_DEVICE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File name looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "amplifier.toml";

/// Tool configuration loaded from amplifier.toml. The `[logging]` table of the same
/// file is read by the logging module.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AmplifierConfig {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub validator: ValidatorConfig,

    #[serde(default)]
    pub compare: CompareConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Directory holding one subdirectory per converted page
    #[serde(default = "default_output_root")]
    pub root: PathBuf,

    /// Insert the development notice into the final document
    #[serde(default = "default_true")]
    pub watermark: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenderProviderKind {
    /// HTTP fetch without a browser engine
    #[default]
    Static,
    /// Headless Chromium, requires the `chromium` feature
    Chromium,
}

impl std::str::FromStr for RenderProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(RenderProviderKind::Static),
            "chromium" => Ok(RenderProviderKind::Chromium),
            _ => Err(format!(
                "invalid render.provider '{}'; supported values are static, chromium",
                value
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderConfig {
    #[serde(default)]
    pub provider: RenderProviderKind,

    /// Emulated device profile name
    #[serde(default = "default_device")]
    pub device: String,

    #[serde(default = "default_true")]
    pub headless: bool,

    /// Port of the local preview server; 0 picks a free port
    #[serde(default = "default_preview_port")]
    pub preview_port: u16,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidatorKind {
    #[default]
    Command,
    None,
}

impl std::str::FromStr for ValidatorKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "command" => Ok(ValidatorKind::Command),
            "none" => Ok(ValidatorKind::None),
            _ => Err(format!(
                "invalid validator.kind '{}'; supported values are command, none",
                value
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidatorConfig {
    #[serde(default)]
    pub kind: ValidatorKind,

    /// Program run with the document on stdin
    #[serde(default = "default_validator_command")]
    pub command: String,

    #[serde(default = "default_validator_args")]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompareConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Per-pixel colour distance tolerated, 0..1
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Mismatch percentage at or under which the comparison passes
    #[serde(default = "default_pass_ratio")]
    pub pass_ratio: f64,
}

fn default_true() -> bool {
    true
}

fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

fn default_preview_port() -> u16 {
    8080
}

fn default_validator_command() -> String {
    "amphtml-validator".to_string()
}

fn default_validator_args() -> Vec<String> {
    vec!["--format=json".to_string(), "-".to_string()]
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_pass_ratio() -> f64 {
    DEFAULT_PASS_RATIO
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            root: default_output_root(),
            watermark: true,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            provider: RenderProviderKind::default(),
            device: default_device(),
            headless: true,
            preview_port: default_preview_port(),
        }
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig {
            kind: ValidatorKind::default(),
            command: default_validator_command(),
            args: default_validator_args(),
        }
    }
}

impl Default for CompareConfig {
    fn default() -> Self {
        CompareConfig {
            enabled: false,
            threshold: default_threshold(),
            pass_ratio: default_pass_ratio(),
        }
    }
}
