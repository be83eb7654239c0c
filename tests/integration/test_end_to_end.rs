#[path = "../common/mod.rs"]
mod common;

use amplifier::core::pipeline::actions::CustomActionRegistry;
use amplifier::core::pipeline::schema::default_steps;
use amplifier::core::pipeline::{Orchestrator, RunOptions};
use amplifier::core::RunStatus;
use common::{diagnostic, FakeRender, FakeValidator};
use std::fs;
use tempfile::TempDir;

const SOURCE: &str = r#"<html><head></head><body><img src="/a.png"></body></html>"#;

fn options(temp_dir: &TempDir, url: &str) -> RunOptions {
    let mut options = RunOptions::new(url);
    options.output_root = temp_dir.path().to_path_buf();
    options.output_name = Some("page".to_string());
    options
}

#[tokio::test]
async fn test_default_steps_convert_images() {
    let temp_dir = TempDir::new().unwrap();
    let render = FakeRender::new(SOURCE).with_image_size(640, 480);
    let validator = FakeValidator::passing();
    let custom = CustomActionRegistry::with_builtins();
    let steps = default_steps().unwrap();

    let orchestrator = Orchestrator::new(&render, &validator, &custom);
    let outcome = orchestrator
        .run(&steps, &options(&temp_dir, "http://x.test/index.html"))
        .await;

    assert_eq!(outcome.status, RunStatus::Complete);
    assert!(outcome.error.is_none());

    let output = temp_dir.path().join("page");
    let step_one = fs::read_to_string(output.join("steps/step-1.html")).unwrap();
    assert!(step_one.contains(r#"src="http://x.test/a.png""#));

    let final_html = fs::read_to_string(output.join("output-final.html")).unwrap();
    assert!(!final_html.to_lowercase().contains("<img"));
    assert!(final_html.contains("<amp-img"));
    assert!(final_html.contains(r#"src="http://x.test/a.png""#));
    assert!(final_html.contains(r#"width="640""#));
    assert!(final_html.contains(r#"layout="fixed""#));
    assert!(final_html.contains("<!-- TO REMOVE: -->"));
    assert!(final_html.contains(r#"<link rel="canonical" href="http://x.test/index.html">"#));
}

#[tokio::test]
async fn test_default_steps_clean_up_page() {
    let temp_dir = TempDir::new().unwrap();
    let source = concat!(
        "<html><head><title>t</title></head><body>\n",
        "<noscript><p>enable js</p></noscript>\n",
        "<img src=\"//cdn.test/b.png\" sizes=\"50vw\">\n",
        "<div onclick=\"go()\">x</div>\n",
        "</body></html>"
    );
    let render = FakeRender::new(source).with_image_size(100, 50);
    let validator = FakeValidator::with_rule(|html| {
        if html.contains("onclick") {
            vec![diagnostic("The attribute 'onclick' may not appear in tag 'div'.")]
        } else {
            Vec::new()
        }
    });
    let custom = CustomActionRegistry::with_builtins();
    let steps = default_steps().unwrap();

    let outcome = Orchestrator::new(&render, &validator, &custom)
        .run(&steps, &options(&temp_dir, "http://x.test/index.html"))
        .await;
    assert_eq!(outcome.status, RunStatus::Complete);

    let final_html =
        fs::read_to_string(temp_dir.path().join("page").join("output-final.html")).unwrap();
    assert!(!final_html.contains("enable js"));
    assert!(final_html.contains(r#"src="https://cdn.test/b.png""#));
    assert!(!final_html.contains("sizes="));
    assert!(final_html.contains(r#"width="100""#));
    assert!(final_html.contains(r#"layout="fixed""#));
    assert!(!final_html.contains("onclick"));
    assert!(outcome.diagnostics.is_empty());
}

#[tokio::test]
async fn test_step_zero_artifacts_hold_loaded_page() {
    let temp_dir = TempDir::new().unwrap();
    let render = FakeRender::new(SOURCE);
    let validator = FakeValidator::passing();
    let custom = CustomActionRegistry::with_builtins();

    let orchestrator = Orchestrator::new(&render, &validator, &custom);
    let outcome = orchestrator
        .run(&[], &options(&temp_dir, "http://x.test/"))
        .await;

    assert_eq!(outcome.status, RunStatus::Complete);
    let output = temp_dir.path().join("page");
    assert_eq!(
        fs::read_to_string(output.join("steps/step-0.html")).unwrap(),
        SOURCE
    );
    assert!(output.join("steps/step-0-log.txt").exists());
    assert!(output.join("output-final-log.txt").exists());
    // Static-like sessions cannot rasterize, so no images are written.
    assert!(!output.join("steps/step-0.png").exists());
    assert!(!output.join("output-final.png").exists());
    // One call for the loaded page and one for the final document.
    assert_eq!(validator.calls(), 2);
}

#[tokio::test]
async fn test_previous_output_is_cleared() {
    let temp_dir = TempDir::new().unwrap();
    let stale = temp_dir.path().join("page").join("stale.txt");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "old").unwrap();

    let render = FakeRender::new(SOURCE);
    let validator = FakeValidator::passing();
    let custom = CustomActionRegistry::with_builtins();
    Orchestrator::new(&render, &validator, &custom)
        .run(&[], &options(&temp_dir, "http://x.test/"))
        .await;

    assert!(!stale.exists());
}
