use amplifier::core::pipeline::compare::encode_png;
use image::{Rgba, RgbaImage};
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn amplifier() -> Command {
    let mut command = Command::new(assert_cmd::cargo::cargo_bin!("amplifier"));
    command.env_remove("AMPLIFIER_LOG_LEVEL");
    command
}

#[test]
fn test_help_lists_commands() {
    let output = amplifier().arg("--help").output().expect("should run");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    for command in ["convert", "compare", "validate", "steps"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_convert_without_url_prints_usage() {
    let temp_dir = TempDir::new().unwrap();
    let output = amplifier()
        .current_dir(temp_dir.path())
        .arg("convert")
        .output()
        .expect("should run");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.to_lowercase().contains("usage"));
    assert!(!temp_dir.path().join("output").exists());
}

#[test]
fn test_steps_prints_builtin_steps() {
    let output = amplifier().arg("steps").output().expect("should run");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Make relative URLs absolute"));
}

#[test]
fn test_steps_rejects_malformed_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.yaml");
    fs::write(&path, "- name: [unterminated\n").unwrap();

    let output = amplifier()
        .arg("steps")
        .arg(&path)
        .output()
        .expect("should run");
    assert!(!output.status.success());
}

#[test]
fn test_compare_identical_screenshots_passes() {
    let temp_dir = TempDir::new().unwrap();
    let image = RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255]));
    let png = encode_png(&image).unwrap();
    let before = temp_dir.path().join("before.png");
    let after = temp_dir.path().join("after.png");
    let diff = temp_dir.path().join("diff.png");
    fs::write(&before, &png).unwrap();
    fs::write(&after, &png).unwrap();

    let output = amplifier()
        .current_dir(temp_dir.path())
        .arg("compare")
        .arg(&before)
        .arg(&after)
        .arg("--diff")
        .arg(&diff)
        .output()
        .expect("should run");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(predicate::str::contains("0.00%").eval(&stdout));
    assert!(predicate::str::contains("Visual comparison: PASS").eval(&stdout));
    assert!(diff.exists());
}
