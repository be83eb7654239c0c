use crate::core::types::{ErrorCategory, ErrorSeverity};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
    pub context: HashMap<String, String>,
    pub occurred_at: DateTime<Utc>,
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        let severity = match category {
            ErrorCategory::ActionError | ErrorCategory::ComparisonError => ErrorSeverity::Warning,
            ErrorCategory::ConfigurationError
            | ErrorCategory::ValidatorError
            | ErrorCategory::RenderError
            | ErrorCategory::ArtifactError
            | ErrorCategory::SerializationError
            | ErrorCategory::IoError
            | ErrorCategory::InternalError => ErrorSeverity::Error,
            ErrorCategory::Unknown => ErrorSeverity::Info,
        };
        AppError {
            category,
            severity,
            code: format!("ERR-{}", uuid::Uuid::new_v4()),
            message: message.into(),
            context: HashMap::new(),
            occurred_at: Utc::now(),
            source: None,
        }
    }

    pub fn with_source<T: Into<String>>(
        category: ErrorCategory,
        message: T,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        let mut error = AppError::new(category, message);
        error.source = Some(anyhow::anyhow!(source));
        error
    }

    pub fn with_context<T: Into<String>>(mut self, context: T) -> Self {
        self.context.insert("context".to_string(), context.into());
        self
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn add_context(&mut self, key: &str, value: &str) {
        self.context.insert(key.to_string(), value.to_string());
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        if !self.context.is_empty() {
            write!(f, " (Context: {:?})", self.context)?;
        }
        if let Some(ref source) = self.source {
            write!(f, "\nCaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError {
            category: ErrorCategory::InternalError,
            severity: ErrorSeverity::Error,
            code: "ANYHOW_ERROR".to_string(),
            message: e.to_string(),
            context: HashMap::new(),
            occurred_at: Utc::now(),
            source: Some(e),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError {
            category: ErrorCategory::IoError,
            severity: ErrorSeverity::Error,
            code: "IO_ERROR".to_string(),
            message: e.to_string(),
            context: HashMap::new(),
            occurred_at: Utc::now(),
            source: Some(anyhow::anyhow!(e)),
        }
    }
}

/// Failure of a single action. Always recovered by the step runner.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("No matched element(s): {selector}")]
    NoMatch { selector: String },
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("Invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
    #[error("Missing required field '{field}' for {action}")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },
    #[error("No custom action registered as '{0}'")]
    UnknownCustomAction(String),
    #[error("Render session error: {0}")]
    Render(String),
    #[error("{0}")]
    Custom(String),
}

impl ActionError {
    pub fn no_match(selector: &str) -> Self {
        ActionError::NoMatch {
            selector: selector.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ActionError::NoMatch { .. } => "AMP-ACT-001",
            ActionError::InvalidSelector { .. } => "AMP-ACT-002",
            ActionError::InvalidRegex { .. } => "AMP-ACT-003",
            ActionError::MissingField { .. } => "AMP-ACT-004",
            ActionError::UnknownCustomAction(_) => "AMP-ACT-005",
            ActionError::Render(_) => "AMP-ACT-006",
            ActionError::Custom(_) => "AMP-ACT-007",
        }
    }
}

impl From<ActionError> for AppError {
    fn from(e: ActionError) -> Self {
        let code = e.code();
        AppError::new(ErrorCategory::ActionError, e.to_string()).with_code(code)
    }
}
