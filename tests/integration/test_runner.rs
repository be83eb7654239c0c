#[path = "../common/mod.rs"]
mod common;

use amplifier::core::pipeline::actions::CustomActionRegistry;
use amplifier::core::pipeline::schema::{
    Action, ActionSpec, CustomParams, DiagnosticReplaceParams, InsertParams, PurgeStylesParams,
    ReplaceParams, Step,
};
use amplifier::core::pipeline::{Document, EnvVars, FsArtifactStore, RunContext, StepRunner};
use common::{diagnostic, FakeRender, FakeValidator};
use std::fs;
use tempfile::TempDir;

const SOURCE: &str = "<html><head><style>.used{color:red}.gone{color:blue}</style></head><body><p class=\"used\">hello</p></body></html>";

fn insert(selector: &str, value: &str) -> ActionSpec {
    ActionSpec::new(Action::Insert(InsertParams {
        selector: Some(selector.to_string()),
        value: Some(value.to_string()),
    }))
}

fn step(name: &str, actions: Vec<ActionSpec>, skip: bool) -> Step {
    Step {
        name: name.to_string(),
        actions,
        skip,
    }
}

fn run_context() -> RunContext {
    RunContext::new(
        "http://x.test/",
        EnvVars::from_url("http://x.test/", None).unwrap(),
    )
}

#[tokio::test]
async fn test_skipped_and_empty_steps_leave_no_trace() {
    let temp_dir = TempDir::new().unwrap();
    let store = FsArtifactStore::new(temp_dir.path());
    let validator = FakeValidator::passing();
    let custom = CustomActionRegistry::with_builtins();
    let mut session = FakeRender::new(SOURCE).session();
    let mut document = Document::parse(SOURCE);
    let mut run = run_context();

    let steps = vec![
        step("skipped", vec![insert("body", "<p>skipped</p>")], true),
        step("empty", Vec::new(), false),
        step("runs", vec![insert("body", "<p>ran</p>")], false),
    ];
    let summary = StepRunner::new(&validator, &store, &custom)
        .run(&steps, &mut document, &mut run, &mut session)
        .await
        .unwrap();

    assert_eq!(summary.steps.len(), 1);
    assert_eq!(summary.steps[0].number, 3);
    assert_eq!(summary.steps[0].succeeded, 1);
    assert!(!temp_dir.path().join("steps/step-1.html").exists());
    assert!(!temp_dir.path().join("steps/step-2.html").exists());
    assert!(temp_dir.path().join("steps/step-3.html").exists());
    assert!(temp_dir.path().join("steps/step-3-log.txt").exists());

    let html = document.to_html();
    assert!(html.contains("<p>ran</p>"));
    assert!(!html.contains("skipped"));
    // One revalidation after the action and one for the step snapshot.
    assert_eq!(validator.calls(), 2);
}

#[tokio::test]
async fn test_failed_action_is_recovered() {
    let temp_dir = TempDir::new().unwrap();
    let store = FsArtifactStore::new(temp_dir.path());
    let validator = FakeValidator::passing();
    let custom = CustomActionRegistry::with_builtins();
    let mut session = FakeRender::new(SOURCE).session();
    let mut document = Document::parse(SOURCE);
    let mut run = run_context();

    let broken = ActionSpec::new(Action::Replace(ReplaceParams {
        selector: Some("body".to_string()),
        regex: Some("(unclosed".to_string()),
        replace: Some("x".to_string()),
    }))
    .with_log("Broken pattern");
    let steps = vec![step(
        "mixed",
        vec![broken, insert("table", "<tr></tr>"), insert("body", "<p>after</p>")],
        false,
    )];

    let summary = StepRunner::new(&validator, &store, &custom)
        .run(&steps, &mut document, &mut run, &mut session)
        .await
        .unwrap();

    assert_eq!(summary.steps[0].succeeded, 1);
    assert_eq!(summary.steps[0].failed, 2);
    assert_eq!(summary.failed_actions(), 2);
    assert!(document.to_html().contains("<p>after</p>"));
    assert!(session.html.contains("<p>after</p>"));
}

#[tokio::test]
async fn test_findings_drive_the_next_action() {
    let temp_dir = TempDir::new().unwrap();
    let store = FsArtifactStore::new(temp_dir.path());
    let validator = FakeValidator::with_rule(|html| {
        if html.contains("<blink") {
            vec![diagnostic("The tag 'blink' is disallowed.")]
        } else {
            Vec::new()
        }
    });
    let custom = CustomActionRegistry::with_builtins();
    let source = "<html><head></head><body><blink>hi</blink></body></html>";
    let mut session = FakeRender::new(source).session();
    let mut document = Document::parse(source);
    let mut run = run_context();
    run.diagnostics = amplifier::core::pipeline::Diagnostics::new(vec![diagnostic(
        "The tag 'blink' is disallowed.",
    )]);

    let to_div = ActionSpec::new(Action::ReplaceBasedOnAmpErrors(DiagnosticReplaceParams {
        selector: Some("body".to_string()),
        amp_error_regex: Some("The tag '([^']*)' is disallowed".to_string()),
        regex: Some("<($1)\\b((?s:.*?))</$1>".to_string()),
        replace: Some("<div data-original-tag=\"$1\"$2</div>".to_string()),
    }));
    let summary = StepRunner::new(&validator, &store, &custom)
        .run(&[step("tags", vec![to_div], false)], &mut document, &mut run, &mut session)
        .await
        .unwrap();

    assert_eq!(summary.steps[0].diagnostics, 0);
    assert!(run.diagnostics.is_empty());
    assert!(document
        .to_html()
        .contains("<div data-original-tag=\"blink\">hi</div>"));
    let log = fs::read_to_string(temp_dir.path().join("steps/step-1-log.txt")).unwrap();
    assert!(log.is_empty());
}

#[tokio::test]
async fn test_css_artifacts_written_on_request() {
    let temp_dir = TempDir::new().unwrap();
    let store = FsArtifactStore::new(temp_dir.path());
    let validator = FakeValidator::passing();
    let custom = CustomActionRegistry::with_builtins();
    let mut session = FakeRender::new(SOURCE).session();
    let mut document = Document::parse(SOURCE);
    let mut run = run_context();

    let purge = ActionSpec::new(Action::RemoveUnusedStyles(PurgeStylesParams {
        selector: Some("style".to_string()),
        minify: Some(true),
        output_css: Some(true),
    }));
    StepRunner::new(&validator, &store, &custom)
        .run(&[step("css", vec![purge], false)], &mut document, &mut run, &mut session)
        .await
        .unwrap();

    let optimized =
        fs::read_to_string(temp_dir.path().join("steps/step-1-optimized-css.css")).unwrap();
    let unused = fs::read_to_string(temp_dir.path().join("steps/step-1-unused-css.css")).unwrap();
    assert!(optimized.contains(".used"));
    assert!(unused.contains(".gone"));
}

#[tokio::test]
async fn test_action_reads_markup_from_earlier_action_in_same_step() {
    let temp_dir = TempDir::new().unwrap();
    let store = FsArtifactStore::new(temp_dir.path());
    let validator = FakeValidator::passing();
    let custom = CustomActionRegistry::with_builtins();
    let render = FakeRender::new(SOURCE).with_image_size(40, 30);
    let mut session = render.session();
    let mut document = Document::parse(SOURCE);
    let mut run = run_context();

    let measure = ActionSpec::new(Action::CustomFunc(CustomParams {
        selector: Some("img".to_string()),
        function: Some("measureImages".to_string()),
    }));
    let steps = vec![step(
        "images",
        vec![insert("body", "<img src=\"/a.png\">"), measure],
        false,
    )];
    let summary = StepRunner::new(&validator, &store, &custom)
        .run(&steps, &mut document, &mut run, &mut session)
        .await
        .unwrap();

    assert_eq!(summary.steps[0].succeeded, 2);
    let img = document.select_first("img").unwrap().unwrap();
    assert_eq!(document.attribute(img, "width"), Some("40"));
    assert_eq!(document.attribute(img, "height"), Some("30"));
    // Each action reloads the session, then the step snapshot does once more.
    assert_eq!(render.log().lock().unwrap().set_content, 3);
}
