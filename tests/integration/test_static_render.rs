#[path = "../common/mod.rs"]
mod common;

use amplifier::core::pipeline::actions::CustomActionRegistry;
use amplifier::core::pipeline::render::{
    device_profile, RenderError, RenderProvider, StaticRenderProvider,
};
use amplifier::core::pipeline::schema::{Action, ActionSpec, InlineStylesParams, Step};
use amplifier::core::pipeline::{Orchestrator, RunOptions};
use amplifier::core::RunStatus;
use common::{solid_png, FakeValidator};
use image::Rgba;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE: &str = r#"<html><head><link rel="stylesheet" href="/style.css"></head><body><img src="/img.png"><p class="lead">hi</p></body></html>"#;

async fn site() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/style.css"))
        .respond_with(ResponseTemplate::new(200).set_body_string(".lead{color:red}"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img.png"))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(solid_png(3, 2, Rgba([0, 0, 0, 255]))),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_static_session_loads_page_and_styles() {
    let server = site().await;
    let provider = StaticRenderProvider::new();
    let device = device_profile("Pixel 2").unwrap();

    let mut session = provider
        .open(&format!("{}/page", server.uri()), &device)
        .await
        .unwrap();

    assert_eq!(session.content().await.unwrap(), PAGE);
    let stylesheets = session.take_stylesheets();
    assert_eq!(stylesheets.len(), 1);
    assert!(stylesheets[0].0.ends_with("/style.css"));
    assert_eq!(stylesheets[0].1, ".lead{color:red}");
    assert!(session.take_stylesheets().is_empty());

    assert_eq!(session.image_sizes("img").await.unwrap(), vec![Some((3, 2))]);
    assert!(matches!(
        session.screenshot(true).await,
        Err(RenderError::Unsupported(_))
    ));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_page_is_a_navigation_error() {
    let server = site().await;
    let provider = StaticRenderProvider::new();
    let device = device_profile("Pixel 2").unwrap();

    let result = provider
        .open(&format!("{}/missing", server.uri()), &device)
        .await;
    assert!(matches!(result, Err(RenderError::Navigation { .. })));
}

#[tokio::test]
async fn test_captured_styles_are_inlined() {
    let server = site().await;
    let temp_dir = TempDir::new().unwrap();
    let provider = StaticRenderProvider::new();
    let validator = FakeValidator::passing();
    let custom = CustomActionRegistry::with_builtins();

    let mut options = RunOptions::new(format!("{}/page", server.uri()));
    options.output_root = temp_dir.path().to_path_buf();
    options.output_name = Some("site".to_string());
    let steps = vec![Step {
        name: "inline".to_string(),
        actions: vec![ActionSpec::new(Action::InlineExternalStyles(
            InlineStylesParams {
                selector: Some("head".to_string()),
                ..InlineStylesParams::default()
            },
        ))],
        skip: false,
    }];

    let outcome = Orchestrator::new(&provider, &validator, &custom)
        .run(&steps, &options)
        .await;

    assert_eq!(outcome.status, RunStatus::Complete);
    let final_html =
        fs::read_to_string(temp_dir.path().join("site").join("output-final.html")).unwrap();
    assert!(final_html.contains(".lead{color:red}"));
}
