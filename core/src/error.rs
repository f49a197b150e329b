use serde::Serialize;
use utoipa::ToSchema;

/// Structured error response shared by the API and the CLI.
/// Every error carries enough context for the caller to decide what to do next.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "store_unavailable")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const INVALID_ASSESSMENT_INPUT: &str = "invalid_assessment_input";
    pub const INVALID_SETTINGS: &str = "invalid_settings";
    pub const STORE_UNAVAILABLE: &str = "store_unavailable";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Errors raised by the crisis core.
///
/// Notifier failures never leave the escalation orchestrator as errors; the
/// `NotifierUnavailable` variant exists for callers that talk to a notifier
/// port directly.
#[derive(Debug, thiserror::Error)]
pub enum CrisisError {
    #[error("invalid assessment input at `{field}`: {message}")]
    InvalidAssessmentInput { field: String, message: String },

    #[error("invalid settings at `{field}`: {message}")]
    InvalidSettings { field: String, message: String },

    #[error("{step} notifier unavailable: {message}")]
    NotifierUnavailable { step: String, message: String },

    #[error("event store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("content cipher failed: {0}")]
    Cipher(String),
}

impl CrisisError {
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        CrisisError::InvalidAssessmentInput {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_settings(field: impl Into<String>, message: impl Into<String>) -> Self {
        CrisisError::InvalidSettings {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Machine code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            CrisisError::InvalidAssessmentInput { .. } => codes::INVALID_ASSESSMENT_INPUT,
            CrisisError::InvalidSettings { .. } => codes::INVALID_SETTINGS,
            CrisisError::NotifierUnavailable { .. } => codes::INTERNAL_ERROR,
            CrisisError::StoreUnavailable(_) | CrisisError::Cipher(_) => {
                codes::STORE_UNAVAILABLE
            }
        }
    }
}
