#[path = "../common/mod.rs"]
mod common;

use amplifier::core::pipeline::actions::{
    self, ActionContext, ActionOutcome, CustomAction, CustomActionRegistry, CustomCall,
};
use amplifier::core::pipeline::document::{Document, EditPlan};
use amplifier::core::pipeline::env::EnvVars;
use amplifier::core::pipeline::schema::{
    Action, ActionSpec, AttributeParams, CustomParams, InsertParams, MoveParams, ReplaceParams,
    SelectorParams,
};
use amplifier::core::pipeline::validation::Diagnostics;
use amplifier::core::pipeline::RunContext;
use amplifier::core::ActionError;
use async_trait::async_trait;
use common::{diagnostic, FakeRender};

fn run_context() -> RunContext {
    RunContext::new(
        "http://x.test/",
        EnvVars::from_url("http://x.test/", None).unwrap(),
    )
}

async fn execute_with(
    spec: &ActionSpec,
    document: &mut Document,
    run: &RunContext,
    custom: &CustomActionRegistry,
) -> Result<ActionOutcome, ActionError> {
    let mut session = FakeRender::new(&document.to_html())
        .with_image_size(32, 16)
        .session();
    let mut ctx = ActionContext {
        run,
        session: &mut session,
        custom,
    };
    actions::execute(spec, document, &mut ctx).await
}

async fn execute(spec: &ActionSpec, document: &mut Document) -> Result<ActionOutcome, ActionError> {
    execute_with(spec, document, &run_context(), &CustomActionRegistry::with_builtins()).await
}

#[tokio::test]
async fn test_no_match_leaves_tree_unchanged() {
    let source = "<html><head></head><body><p class=\"a\">x</p></body></html>";
    let specs = vec![
        ActionSpec::new(Action::ReplaceOrInsert(ReplaceParams {
            selector: Some("section".to_string()),
            regex: Some("x".to_string()),
            replace: Some("y".to_string()),
        })),
        ActionSpec::new(Action::Replace(ReplaceParams {
            selector: Some("table".to_string()),
            regex: Some("x".to_string()),
            replace: Some("y".to_string()),
        })),
        ActionSpec::new(Action::Insert(InsertParams {
            selector: Some("footer".to_string()),
            value: Some("<p>z</p>".to_string()),
        })),
        ActionSpec::new(Action::Move(MoveParams {
            selector: Some("aside".to_string()),
            dest_selector: Some("body".to_string()),
        })),
    ];

    for spec in specs {
        let mut document = Document::parse(source);
        let before = document.to_html();
        let err = execute(&spec, &mut document).await.unwrap_err();
        assert!(
            matches!(err, ActionError::NoMatch { .. }),
            "{} gave {:?}",
            spec.label(),
            err
        );
        assert_eq!(document.to_html(), before);
    }
}

#[tokio::test]
async fn test_attribute_actions_accept_zero_matches() {
    let mut document = Document::parse("<html><body><p>x</p></body></html>");
    let before = document.to_html();
    let spec = ActionSpec::new(Action::SetAttribute(AttributeParams {
        selector: Some("section".to_string()),
        attribute: Some("id".to_string()),
        value: Some("s".to_string()),
    }));

    execute(&spec, &mut document).await.unwrap();
    assert_eq!(document.to_html(), before);
}

#[tokio::test]
async fn test_replace_count_sums_matches_across_elements() {
    let mut document =
        Document::parse("<html><body><p>Foo foo</p><p>FOO</p><p>bar</p></body></html>");
    let spec = ActionSpec::new(Action::Replace(ReplaceParams {
        selector: Some("p".to_string()),
        regex: Some("foo".to_string()),
        replace: Some("baz".to_string()),
    }));

    let outcome = execute(&spec, &mut document).await.unwrap();
    assert_eq!(outcome.message, "3 replaced");
    assert_eq!(document.to_html().matches("baz").count(), 3);
}

#[tokio::test]
async fn test_disallowed_attributes_removed_regardless_of_case() {
    let mut document = Document::parse(
        "<html><body><div ONCLICK=\"go()\" Data-X=\"1\">a</div><span onclick=\"x\">b</span></body></html>",
    );
    let mut run = run_context();
    run.diagnostics = Diagnostics::new(vec![
        diagnostic("The attribute 'onclick' may not appear in tag 'div'."),
        diagnostic("The attribute 'data-x' may not appear in tag 'div'."),
    ]);
    let spec = ActionSpec::new(Action::RemoveDisallowedAttributes(SelectorParams::default()));

    execute_with(&spec, &mut document, &run, &CustomActionRegistry::with_builtins())
        .await
        .unwrap();

    let html = document.to_html().to_lowercase();
    assert!(!html.contains("onclick"));
    assert!(!html.contains("data-x"));
    assert!(html.contains("<div>a</div>"));
}

#[tokio::test]
async fn test_measure_images_sets_dimensions() {
    let mut document = Document::parse("<html><body><img src=\"a.png\"><img src=\"b.png\"></body></html>");
    let spec = ActionSpec::new(Action::CustomFunc(CustomParams {
        selector: Some("img".to_string()),
        function: Some("measureImages".to_string()),
    }));

    let outcome = execute(&spec, &mut document).await.unwrap();
    assert_eq!(outcome.message, "measured 2 images");
    let ids = document.select("img").unwrap();
    for id in ids {
        assert_eq!(document.attribute(id, "width"), Some("32"));
        assert_eq!(document.attribute(id, "height"), Some("16"));
    }
}

#[tokio::test]
async fn test_unknown_custom_action() {
    let mut document = Document::parse("<html><body></body></html>");
    let spec = ActionSpec::new(Action::CustomFunc(CustomParams {
        selector: Some("body".to_string()),
        function: Some("resizeEverything".to_string()),
    }));

    let err = execute(&spec, &mut document).await.unwrap_err();
    assert!(matches!(err, ActionError::UnknownCustomAction(name) if name == "resizeEverything"));
}

struct TagMatches;

#[async_trait(?Send)]
impl CustomAction for TagMatches {
    fn name(&self) -> &'static str {
        "tagMatches"
    }

    async fn run(
        &self,
        document: &mut Document,
        call: CustomCall<'_>,
        _ctx: &mut ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let mut plan = EditPlan::new();
        for (index, id) in call.matches.iter().enumerate() {
            plan.set_attribute(*id, "data-index", &index.to_string());
        }
        document.apply(plan);
        Ok(ActionOutcome::message(format!(
            "tagged {} for {}",
            call.matches.len(),
            call.selector
        )))
    }
}

#[tokio::test]
async fn test_registered_custom_action_runs_over_matches() {
    let mut builder = CustomActionRegistry::builder();
    builder.register(TagMatches);
    let custom = builder.build();
    let mut document = Document::parse("<html><body><li>a</li><li>b</li></body></html>");
    let spec = ActionSpec::new(Action::CustomFunc(CustomParams {
        selector: Some("li".to_string()),
        function: Some("tagMatches".to_string()),
    }));

    let outcome = execute_with(&spec, &mut document, &run_context(), &custom)
        .await
        .unwrap();
    assert_eq!(outcome.message, "tagged 2 for li");
    assert!(document
        .to_html()
        .contains("<li data-index=\"0\">a</li><li data-index=\"1\">b</li>"));
}

#[test]
fn test_env_substitution_only_touches_tokens() {
    let env = EnvVars::new(vec![("$HOST".to_string(), "http://x.test".to_string())]);
    let spec = ActionSpec::new(Action::Replace(ReplaceParams {
        selector: Some("body".to_string()),
        regex: Some("src=\"/a.png\"".to_string()),
        replace: Some("src=\"$HOST/a.png\"".to_string()),
    }))
    .with_log("absolute");

    let substituted = env.apply(&spec).unwrap();
    let Action::Replace(params) = &substituted.action else {
        panic!("action kind changed");
    };
    assert_eq!(params.replace.as_deref(), Some("src=\"http://x.test/a.png\""));
    assert_eq!(params.selector.as_deref(), Some("body"));
    assert_eq!(params.regex.as_deref(), Some("src=\"/a.png\""));
    assert_eq!(substituted.log.as_deref(), Some("absolute"));
}
