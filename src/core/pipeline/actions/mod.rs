//! Action executor.
//!
//! Each action kind is one function over the document. Dispatch is a closed match on
//! [`Action`], so adding a kind without an implementation fails to compile.

pub mod attributes;
pub mod custom;
pub mod rewrite;
pub mod structure;
pub mod styles;

use crate::core::error::ActionError;
use crate::core::pipeline::context::RunContext;
use crate::core::pipeline::document::Document;
use crate::core::pipeline::render::RenderSession;
use crate::core::pipeline::schema::{Action, ActionSpec};
use ego_tree::NodeId;

pub use custom::{
    CustomAction, CustomActionRegistry, CustomActionRegistryBuilder, CustomCall, MeasureImages,
};

/// What an action did, for the console and the step artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub message: String,
    pub optimized_css: Option<String>,
    pub unused_css: Option<String>,
}

impl ActionOutcome {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Collaborators an action may use besides the document.
pub struct ActionContext<'a> {
    pub run: &'a RunContext,
    pub session: &'a mut dyn RenderSession,
    pub custom: &'a CustomActionRegistry,
}

/// Apply one action. On error the document is left as it was.
pub async fn execute(
    spec: &ActionSpec,
    document: &mut Document,
    ctx: &mut ActionContext<'_>,
) -> Result<ActionOutcome, ActionError> {
    match &spec.action {
        Action::SetAttribute(params) => attributes::set_attribute(document, params),
        Action::RemoveAttribute(params) => attributes::remove_attribute(document, params),
        Action::RemoveDisallowedAttributes(_) => {
            attributes::remove_disallowed_attributes(document, &ctx.run.diagnostics)
        }
        Action::Replace(params) => rewrite::replace(document, params),
        Action::ReplaceOrInsert(params) => rewrite::replace_or_insert(document, params),
        Action::ReplaceBasedOnAmpErrors(params) => {
            rewrite::replace_based_on_diagnostics(document, params, &ctx.run.diagnostics)
        }
        Action::Insert(params) => structure::insert(document, params),
        Action::AppendAfter(params) => structure::append_after(document, params),
        Action::Move(params) => structure::move_elements(document, params),
        Action::MergeContent(params) => structure::merge_content(document, params),
        Action::InlineExternalStyles(params) => {
            styles::inline_external_styles(document, params, &ctx.run.styles)
        }
        Action::RemoveUnusedStyles(params) => styles::remove_unused_styles(document, params),
        Action::CustomFunc(params) => custom::run(document, params, ctx).await,
    }
}

/// Every element matching `selector`; an empty match is a [`ActionError::NoMatch`].
pub(crate) fn select_some(document: &Document, selector: &str) -> Result<Vec<NodeId>, ActionError> {
    let matches = document.select(selector)?;
    if matches.is_empty() {
        return Err(ActionError::no_match(selector));
    }
    Ok(matches)
}

/// First element matching `selector`, or [`ActionError::NoMatch`].
pub(crate) fn select_one(document: &Document, selector: &str) -> Result<NodeId, ActionError> {
    document
        .select_first(selector)?
        .ok_or_else(|| ActionError::no_match(selector))
}
