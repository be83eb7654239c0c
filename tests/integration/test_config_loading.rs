use amplifier::core::config::{ConfigLoader, RenderProviderKind, ValidatorKind};
use amplifier::core::ErrorCategory;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_amplifier_env() {
    for v in &[
        "AMPLIFIER_OUTPUT_ROOT",
        "AMPLIFIER_DEVICE",
        "AMPLIFIER_RENDER_PROVIDER",
        "AMPLIFIER_PREVIEW_PORT",
        "AMPLIFIER_VALIDATOR",
        "AMPLIFIER_VALIDATOR_COMMAND",
        "AMPLIFIER_COMPARE_THRESHOLD",
        "AMPLIFIER_LOG_LEVEL",
    ] {
        env::remove_var(v);
    }
}

#[test]
#[serial]
fn test_config_file_and_environment() {
    clear_amplifier_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("amplifier.toml");
    fs::write(
        &path,
        r#"
[output]
root = "converted"
watermark = false

[render]
device = "iPhone X"
preview_port = 9100

[validator]
command = "validate-amp"
args = ["--json"]

[compare]
enabled = true
pass_ratio = 2.5
"#,
    )
    .unwrap();

    env::set_var("AMPLIFIER_COMPARE_THRESHOLD", "0.25");
    env::set_var("AMPLIFIER_OUTPUT_ROOT", "/tmp/amp-out");
    let config = ConfigLoader::load(Some(&path)).unwrap();
    clear_amplifier_env();

    assert_eq!(config.output.root, PathBuf::from("/tmp/amp-out"));
    assert!(!config.output.watermark);
    assert_eq!(config.render.device, "iPhone X");
    assert_eq!(config.render.preview_port, 9100);
    assert_eq!(config.render.provider, RenderProviderKind::Static);
    assert_eq!(config.validator.kind, ValidatorKind::Command);
    assert_eq!(config.validator.command, "validate-amp");
    assert_eq!(config.validator.args, vec!["--json"]);
    assert!(config.compare.enabled);
    assert_eq!(config.compare.threshold, 0.25);
    assert_eq!(config.compare.pass_ratio, 2.5);
}

#[test]
#[serial]
fn test_environment_values_are_validated() {
    clear_amplifier_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("amplifier.toml");
    fs::write(&path, "").unwrap();

    env::set_var("AMPLIFIER_DEVICE", "Nokia 3310");
    let result = ConfigLoader::load(Some(&path));
    clear_amplifier_env();

    let err = result.unwrap_err();
    assert_eq!(err.category, ErrorCategory::ConfigurationError);
    assert_eq!(err.code, "AMP-CFG-005");
}

#[test]
#[serial]
fn test_logging_table_does_not_disturb_tool_config() {
    clear_amplifier_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("amplifier.toml");
    fs::write(
        &path,
        "[logging]\ndefault_level = \"info\"\nconsole_output = \"none\"\n",
    )
    .unwrap();

    let config = ConfigLoader::load(Some(&path)).unwrap();
    assert_eq!(config.render.device, "Pixel 2");
    assert!(config.output.watermark);
}
