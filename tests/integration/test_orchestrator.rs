#[path = "../common/mod.rs"]
mod common;

use amplifier::core::pipeline::actions::CustomActionRegistry;
use amplifier::core::pipeline::schema::{Action, ActionSpec, InsertParams, Step};
use amplifier::core::pipeline::{Orchestrator, RunOptions};
use amplifier::core::RunStatus;
use common::{FakeRender, FakeValidator};
use std::fs;
use tempfile::TempDir;

const SOURCE: &str = "<html><head><title>t</title></head><body><p>hello</p></body></html>";

fn options(temp_dir: &TempDir, url: &str) -> RunOptions {
    let mut options = RunOptions::new(url);
    options.output_root = temp_dir.path().to_path_buf();
    options.output_name = Some("run".to_string());
    options
}

fn insert_step(selector: &str, value: &str) -> Step {
    Step {
        name: "insert".to_string(),
        actions: vec![ActionSpec::new(Action::Insert(InsertParams {
            selector: Some(selector.to_string()),
            value: Some(value.to_string()),
        }))],
        skip: false,
    }
}

#[tokio::test]
async fn test_missing_url_does_no_work() {
    let temp_dir = TempDir::new().unwrap();
    let render = FakeRender::new(SOURCE);
    let validator = FakeValidator::passing();
    let custom = CustomActionRegistry::with_builtins();

    let outcome = Orchestrator::new(&render, &validator, &custom)
        .run(&[], &options(&temp_dir, " "))
        .await;

    assert_eq!(outcome.status, RunStatus::CompleteWithErrors);
    assert_eq!(outcome.error.unwrap().code, "AMP-CFG-001");
    assert!(render.log().lock().unwrap().opened.is_empty());
    assert_eq!(validator.calls(), 0);
}

#[tokio::test]
async fn test_load_failure_reports_errors() {
    let temp_dir = TempDir::new().unwrap();
    let render = FakeRender::new(SOURCE).failing();
    let validator = FakeValidator::passing();
    let custom = CustomActionRegistry::with_builtins();

    let outcome = Orchestrator::new(&render, &validator, &custom)
        .run(&[], &options(&temp_dir, "http://x.test/"))
        .await;

    assert_eq!(outcome.status, RunStatus::CompleteWithErrors);
    assert_eq!(outcome.error.unwrap().code, "AMP-LOAD-001");
}

#[tokio::test]
async fn test_session_closed_after_fatal_validation_error() {
    let temp_dir = TempDir::new().unwrap();
    let render = FakeRender::new(SOURCE);
    let validator = FakeValidator::unavailable();
    let custom = CustomActionRegistry::with_builtins();

    let outcome = Orchestrator::new(&render, &validator, &custom)
        .run(&[], &options(&temp_dir, "http://x.test/"))
        .await;

    assert_eq!(outcome.status, RunStatus::CompleteWithErrors);
    assert_eq!(outcome.error.unwrap().code, "AMP-VAL-001");
    assert_eq!(render.log().lock().unwrap().closed, 1);
}

#[tokio::test]
async fn test_watermark_can_be_disabled() {
    let temp_dir = TempDir::new().unwrap();
    let render = FakeRender::new(SOURCE);
    let validator = FakeValidator::passing();
    let custom = CustomActionRegistry::with_builtins();
    let mut options = options(&temp_dir, "http://x.test/");
    options.watermark = false;

    Orchestrator::new(&render, &validator, &custom)
        .run(&[insert_step("body", "<p>more</p>")], &options)
        .await;

    let final_html =
        fs::read_to_string(temp_dir.path().join("run").join("output-final.html")).unwrap();
    assert!(!final_html.contains("TO REMOVE"));
    assert!(final_html.contains("<p>more</p>"));
}

#[tokio::test]
async fn test_compare_identical_renderings() {
    let temp_dir = TempDir::new().unwrap();
    let render = FakeRender::new(SOURCE).with_screenshots(40, 20);
    let validator = FakeValidator::passing();
    let custom = CustomActionRegistry::with_builtins();
    let mut options = options(&temp_dir, "http://x.test/");
    options.compare = true;

    let outcome = Orchestrator::new(&render, &validator, &custom)
        .run(&[insert_step("body", "<p>more</p>")], &options)
        .await;

    assert_eq!(outcome.status, RunStatus::Complete);
    assert_eq!(outcome.mismatch_percent, Some(0.0));
    let output = temp_dir.path().join("run");
    assert!(output.join("steps/step-0.png").exists());
    assert!(output.join("steps/step-1.png").exists());
    assert!(output.join("output-final.png").exists());
    assert!(output.join("output-difference.png").exists());
    assert!(!output.join("output-replace.html").exists());
}

#[tokio::test]
async fn test_compare_without_screenshots_is_a_warning() {
    let temp_dir = TempDir::new().unwrap();
    let render = FakeRender::new(SOURCE);
    let validator = FakeValidator::passing();
    let custom = CustomActionRegistry::with_builtins();
    let mut options = options(&temp_dir, "http://x.test/");
    options.compare = true;

    let outcome = Orchestrator::new(&render, &validator, &custom)
        .run(&[], &options)
        .await;

    assert_eq!(outcome.status, RunStatus::Complete);
    assert_eq!(outcome.mismatch_percent, None);
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let render = FakeRender::new(SOURCE);
    let validator = FakeValidator::passing();
    let custom = CustomActionRegistry::with_builtins();
    let orchestrator = Orchestrator::new(&render, &validator, &custom);

    let mut first = options(&temp_dir, "http://a.test/");
    first.output_name = Some("a".to_string());
    let mut second = options(&temp_dir, "http://b.test/");
    second.output_name = Some("b".to_string());
    let steps = vec![insert_step("body", "<p>$DOMAIN</p>")];

    let (a, b) = futures::join!(orchestrator.run(&steps, &first), orchestrator.run(&steps, &second));
    assert_eq!(a.status, RunStatus::Complete);
    assert_eq!(b.status, RunStatus::Complete);

    let a_html = fs::read_to_string(temp_dir.path().join("a/output-final.html")).unwrap();
    let b_html = fs::read_to_string(temp_dir.path().join("b/output-final.html")).unwrap();
    assert!(a_html.contains("<p>a.test</p>"));
    assert!(!a_html.contains("b.test"));
    assert!(b_html.contains("<p>b.test</p>"));
    assert_eq!(render.log().lock().unwrap().closed, 2);
}
