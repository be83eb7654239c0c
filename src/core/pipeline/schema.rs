#![allow(clippy::result_large_err)]

use crate::core::error::{ActionError, AppError};
use crate::core::types::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_STEPS: &str = include_str!("default_steps.yaml");

/// Named group of actions applied in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub skip: bool,
}

impl Step {
    /// Skipped steps and steps without actions do no work at all.
    pub fn is_runnable(&self) -> bool {
        !self.skip && !self.actions.is_empty()
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One action entry in a step file. The kind-specific fields live beside `actionType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    #[serde(flatten)]
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    /// Milliseconds to wait before the action runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_after_loaded: Option<u64>,
}

impl ActionSpec {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            log: None,
            wait_after_loaded: None,
        }
    }

    pub fn with_log(mut self, log: &str) -> Self {
        self.log = Some(log.to_string());
        self
    }

    /// Label printed next to the action outcome.
    pub fn label(&self) -> &str {
        self.log.as_deref().unwrap_or(self.action.kind())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "actionType", rename_all = "camelCase")]
pub enum Action {
    SetAttribute(AttributeParams),
    RemoveAttribute(AttributeParams),
    Replace(ReplaceParams),
    ReplaceOrInsert(ReplaceParams),
    #[serde(alias = "insertBottom")]
    Insert(InsertParams),
    AppendAfter(InsertParams),
    Move(MoveParams),
    MergeContent(MoveParams),
    InlineExternalStyles(InlineStylesParams),
    RemoveUnusedStyles(PurgeStylesParams),
    ReplaceBasedOnAmpErrors(DiagnosticReplaceParams),
    #[serde(alias = "removeAttributesFromDiagnostics")]
    RemoveDisallowedAttributes(SelectorParams),
    CustomFunc(CustomParams),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::SetAttribute(_) => "setAttribute",
            Action::RemoveAttribute(_) => "removeAttribute",
            Action::Replace(_) => "replace",
            Action::ReplaceOrInsert(_) => "replaceOrInsert",
            Action::Insert(_) => "insert",
            Action::AppendAfter(_) => "appendAfter",
            Action::Move(_) => "move",
            Action::MergeContent(_) => "mergeContent",
            Action::InlineExternalStyles(_) => "inlineExternalStyles",
            Action::RemoveUnusedStyles(_) => "removeUnusedStyles",
            Action::ReplaceBasedOnAmpErrors(_) => "replaceBasedOnAmpErrors",
            Action::RemoveDisallowedAttributes(_) => "removeDisallowedAttributes",
            Action::CustomFunc(_) => "customFunc",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(
        default,
        alias = "targetSelector",
        skip_serializing_if = "Option::is_none"
    )]
    pub dest_selector: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineStylesParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,
    /// Marker attributes set on the new style element, `name` or `name=value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_domains: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeStylesParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,
    #[serde(default, alias = "outputCSS", skip_serializing_if = "Option::is_none")]
    pub output_css: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReplaceParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Pattern run against each diagnostic message; its captures fill `$1`..`$9` in `regex`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amp_error_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Name of a registered custom action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// Unwrap a lazily validated field.
pub fn required<'a>(
    value: &'a Option<String>,
    action: &'static str,
    field: &'static str,
) -> Result<&'a str, ActionError> {
    value
        .as_deref()
        .ok_or(ActionError::MissingField { action, field })
}

/// Built-in step list shipped with the binary.
pub fn default_steps() -> Result<Vec<Step>, AppError> {
    parse_steps(DEFAULT_STEPS, StepFormat::Yaml)
}

/// Raw YAML of the built-in step list.
pub fn default_steps_source() -> &'static str {
    DEFAULT_STEPS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFormat {
    Yaml,
    Json,
}

impl StepFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => StepFormat::Json,
            _ => StepFormat::Yaml,
        }
    }
}

pub fn parse_steps(content: &str, format: StepFormat) -> Result<Vec<Step>, AppError> {
    let parsed = match format {
        StepFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        StepFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|reason| {
        AppError::new(
            ErrorCategory::SerializationError,
            format!("Failed to parse steps: {}", reason),
        )
        .with_code("AMP-CFG-003")
    })
}

/// Load a step file, picking YAML or JSON by extension.
pub fn load_steps(path: &Path) -> Result<Vec<Step>, AppError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::new(
            ErrorCategory::IoError,
            format!("Failed to read steps file {}: {}", path.display(), e),
        )
        .with_code("AMP-CFG-003")
    })?;
    parse_steps(&content, StepFormat::from_path(path))
        .map_err(|e| e.with_context(path.display().to_string()))
}
