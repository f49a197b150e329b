use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use beacon_core::error::{self, ApiError, CrisisError};

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        code: &'static str,
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Event or settings store could not be reached (503)
    StoreUnavailable(String),
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                code,
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: code.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::StoreUnavailable(message) => {
                tracing::error!(request_id = %request_id, "store unavailable: {}", message);
                (StatusCode::SERVICE_UNAVAILABLE, store_unavailable(request_id))
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = %request_id, "internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

fn store_unavailable(request_id: String) -> ApiError {
    ApiError {
        error: error::codes::STORE_UNAVAILABLE.to_string(),
        message: "Crisis event storage is temporarily unavailable".to_string(),
        field: None,
        received: None,
        request_id,
        docs_hint: Some(
            "Retry the request. If you are in crisis right now, call or text 988 or dial 911."
                .to_string(),
        ),
    }
}

impl From<CrisisError> for AppError {
    fn from(err: CrisisError) -> Self {
        let code = err.code();
        match err {
            CrisisError::InvalidAssessmentInput { field, message } => AppError::Validation {
                code,
                message,
                field: Some(field),
                received: None,
                docs_hint: Some(
                    "Structured factors accept mood_scores (non-empty, 1-10), journal_keywords \
                     (strings), chat_analysis / behavior_patterns / protective_factors (objects of \
                     booleans) and previous_incidents (integer)."
                        .to_string(),
                ),
            },
            CrisisError::InvalidSettings { field, message } => AppError::Validation {
                code,
                message,
                field: Some(field),
                received: None,
                docs_hint: Some(
                    "Settings accept sensitivity (0-1), auto_escalation_enabled (boolean), \
                     custom_keywords (list of strings) and notification_preferences."
                        .to_string(),
                ),
            },
            CrisisError::StoreUnavailable(message) | CrisisError::Cipher(message) => {
                AppError::StoreUnavailable(message)
            }
            other @ CrisisError::NotifierUnavailable { .. } => {
                AppError::Internal(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crisis_errors_map_to_http_statuses() {
        let cases = [
            (
                CrisisError::invalid_input("mood_scores", "must not be empty"),
                StatusCode::BAD_REQUEST,
            ),
            (
                CrisisError::invalid_settings("sensitivity", "out of range"),
                StatusCode::BAD_REQUEST,
            ),
            (
                CrisisError::StoreUnavailable("pool timed out".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                CrisisError::Cipher("bad tag".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn validation_keeps_the_domain_code() {
        match AppError::from(CrisisError::invalid_settings("sensitivity", "out of range")) {
            AppError::Validation { code, field, .. } => {
                assert_eq!(code, error::codes::INVALID_SETTINGS);
                assert_eq!(field.as_deref(), Some("sensitivity"));
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
    }
}
