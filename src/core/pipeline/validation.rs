#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use indexmap::IndexSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const DISALLOWED_TAG_PATTERN: &str = r"The tag '([^']*)' is disallowed";
const INVALID_ATTRIBUTE_PATTERN: &str = r"The attribute '([^']*)' may not appear in tag";

/// One validator finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub line: u32,
    pub col: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_url: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, col {}: {}", self.line, self.col, self.message)?;
        if let Some(ref url) = self.spec_url {
            write!(f, " (see {})", url)?;
        }
        Ok(())
    }
}

/// Findings for one HTML snapshot, in validator order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(items: Vec<Diagnostic>) -> Self {
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// One formatted line per finding, as written to the step logs.
    pub fn to_log(&self) -> String {
        self.items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub diagnostics: Diagnostics,
}

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, html: &str) -> Result<Diagnostics, AppError>;
}

/// Validator that accepts every document.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullValidator;

#[async_trait]
impl Validator for NullValidator {
    async fn validate(&self, _html: &str) -> Result<Diagnostics, AppError> {
        Ok(Diagnostics::default())
    }
}

/// Runs an external checker with the document on stdin and parses its JSON report.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    program: String,
    args: Vec<String>,
}

impl Default for CommandValidator {
    fn default() -> Self {
        Self::new(
            "amphtml-validator",
            vec!["--format=json".to_string(), "-".to_string()],
        )
    }
}

impl CommandValidator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    async fn run(&self, html: &str) -> Result<String, AppError> {
        tracing::debug!(program = %self.program, args = ?self.args, "running validator");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                AppError::new(
                    ErrorCategory::ValidatorError,
                    format!("failed to start validator '{}': {}", self.program, err),
                )
                .with_code("AMP-VAL-001")
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            AppError::new(ErrorCategory::ValidatorError, "validator stdin unavailable")
                .with_code("AMP-VAL-001")
        })?;
        let input = html.as_bytes().to_vec();
        let writer = async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        };
        let (written, output) = tokio::join!(writer, child.wait_with_output());

        let output = output.map_err(|err| {
            AppError::new(
                ErrorCategory::ValidatorError,
                format!("validator did not finish: {}", err),
            )
            .with_code("AMP-VAL-001")
        })?;
        if let Err(err) = written {
            tracing::debug!(error = %err, "validator closed stdin early");
        }

        // A failing document exits non-zero; only an empty report is an error.
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut err = AppError::new(
                ErrorCategory::ValidatorError,
                format!(
                    "validator produced no report (exit code {})",
                    output.status.code().unwrap_or(-1)
                ),
            )
            .with_code("AMP-VAL-001");
            err.add_context("stderr", stderr.trim());
            return Err(err);
        }
        Ok(stdout)
    }
}

#[async_trait]
impl Validator for CommandValidator {
    async fn validate(&self, html: &str) -> Result<Diagnostics, AppError> {
        let stdout = self.run(html).await?;
        let report = parse_report(&stdout)?;
        Ok(report.diagnostics)
    }
}

#[derive(Deserialize)]
struct RawReport {
    status: ValidationStatus,
    #[serde(default)]
    errors: Vec<RawFinding>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFinding {
    #[serde(default)]
    line: u32,
    #[serde(default)]
    col: u32,
    #[serde(default)]
    message: String,
    #[serde(default)]
    spec_url: Option<String>,
}

/// Parse a JSON report. Accepts either a bare `{status, errors}` object or one keyed by
/// input name (`{"-": {...}}`).
pub fn parse_report(json: &str) -> Result<ValidationReport, AppError> {
    let value: Value = serde_json::from_str(json.trim()).map_err(|err| {
        AppError::new(
            ErrorCategory::ValidatorError,
            format!("unreadable validator report: {}", err),
        )
        .with_code("AMP-VAL-002")
    })?;

    let body = if value.get("status").is_some() {
        value
    } else {
        value
            .as_object()
            .and_then(|map| map.values().next().cloned())
            .ok_or_else(|| {
                AppError::new(ErrorCategory::ValidatorError, "empty validator report")
                    .with_code("AMP-VAL-002")
            })?
    };

    let raw: RawReport = serde_json::from_value(body).map_err(|err| {
        AppError::new(
            ErrorCategory::ValidatorError,
            format!("unexpected validator report shape: {}", err),
        )
        .with_code("AMP-VAL-002")
    })?;

    let diagnostics = raw
        .errors
        .into_iter()
        .map(|finding| Diagnostic {
            line: finding.line,
            col: finding.col,
            message: finding.message,
            spec_url: finding.spec_url.filter(|url| !url.is_empty()),
        })
        .collect();

    Ok(ValidationReport {
        status: raw.status,
        diagnostics: Diagnostics::new(diagnostics),
    })
}

/// Wraps a validator and reuses the last result when the same markup is validated twice.
pub struct CachingValidator<V> {
    inner: V,
    last: Mutex<Option<(String, Diagnostics)>>,
}

impl<V: Validator> CachingValidator<V> {
    pub fn new(inner: V) -> Self {
        Self {
            inner,
            last: Mutex::new(None),
        }
    }

    fn cached(&self, digest: &str) -> Option<Diagnostics> {
        let guard = self.last.lock().ok()?;
        match guard.as_ref() {
            Some((cached, diagnostics)) if cached == digest => Some(diagnostics.clone()),
            _ => None,
        }
    }

    fn remember(&self, digest: String, diagnostics: &Diagnostics) {
        if let Ok(mut guard) = self.last.lock() {
            *guard = Some((digest, diagnostics.clone()));
        }
    }
}

#[async_trait]
impl<V: Validator> Validator for CachingValidator<V> {
    async fn validate(&self, html: &str) -> Result<Diagnostics, AppError> {
        let digest = hex::encode(Sha256::digest(html.as_bytes()));
        if let Some(diagnostics) = self.cached(&digest) {
            return Ok(diagnostics);
        }
        let diagnostics = self.inner.validate(html).await?;
        self.remember(digest, &diagnostics);
        Ok(diagnostics)
    }
}

#[async_trait]
impl Validator for Box<dyn Validator> {
    async fn validate(&self, html: &str) -> Result<Diagnostics, AppError> {
        self.as_ref().validate(html).await
    }
}

/// First capture of `pattern` across all findings, deduplicated in first-seen order.
fn extract_names(diagnostics: &Diagnostics, pattern: &str) -> IndexSet<String> {
    let Ok(regex) = Regex::new(pattern) else {
        return IndexSet::new();
    };
    diagnostics
        .iter()
        .filter_map(|diagnostic| {
            regex
                .captures(&diagnostic.message)
                .and_then(|captures| captures.get(1))
                .map(|name| name.as_str().to_string())
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Attribute names from "The attribute 'X' may not appear in tag" findings.
pub fn find_attributes_declared_invalid(diagnostics: &Diagnostics) -> IndexSet<String> {
    extract_names(diagnostics, INVALID_ATTRIBUTE_PATTERN)
}

/// Tag names from "The tag 'X' is disallowed" findings.
pub fn find_tags_declared_disallowed(diagnostics: &Diagnostics) -> IndexSet<String> {
    extract_names(diagnostics, DISALLOWED_TAG_PATTERN)
}
