use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use beacon_core::analytics::{CrisisAnalytics, Timeframe};
use beacon_core::error::{ApiError, codes};
use beacon_core::events::{HistoryResponse, NewCrisisEvent};
use beacon_core::patterns::PatternAnalysis;
use beacon_core::service::RecordedEvent;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::{AppJson, UserId};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/crisis/events", post(record_event))
        .route("/v1/crisis/history", get(get_history))
        .route("/v1/crisis/analytics", get(get_analytics))
        .route("/v1/crisis/patterns", get(identify_patterns))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct HistoryParams {
    /// Maximum number of events, newest first (default and ceiling: the history cap)
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct AnalyticsParams {
    /// day, week, month (default), quarter, year or all
    #[serde(default)]
    pub timeframe: Option<String>,
}

/// Record an assessed event
///
/// Idempotent on `id`: replaying an event that is already stored returns 200
/// with `created: false`.
#[utoipa::path(
    post,
    path = "/v1/crisis/events",
    request_body = NewCrisisEvent,
    params(
        ("x-user-id" = Uuid, Header, description = "Caller's user id")
    ),
    responses(
        (status = 201, description = "Event recorded", body = RecordedEvent),
        (status = 200, description = "Event already recorded", body = RecordedEvent),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 503, description = "Event store unavailable", body = ApiError)
    ),
    tag = "events"
)]
pub async fn record_event(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    AppJson(req): AppJson<NewCrisisEvent>,
) -> Result<impl IntoResponse, AppError> {
    if req.user_id != user_id {
        return Err(AppError::Validation {
            code: codes::VALIDATION_FAILED,
            message: "user_id must match the x-user-id header".to_string(),
            field: Some("user_id".to_string()),
            received: Some(serde_json::Value::String(req.user_id.to_string())),
            docs_hint: Some("Events can only be recorded for the calling user.".to_string()),
        });
    }

    let recorded = state.service.record_event(req).await?;
    let status = if recorded.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(recorded)))
}

/// Crisis history, newest first, with content decrypted
#[utoipa::path(
    get,
    path = "/v1/crisis/history",
    params(
        HistoryParams,
        ("x-user-id" = Uuid, Header, description = "Caller's user id")
    ),
    responses(
        (status = 200, description = "History", body = HistoryResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 503, description = "Event store unavailable", body = ApiError)
    ),
    tag = "events"
)]
pub async fn get_history(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, AppError> {
    if params.limit == Some(0) {
        return Err(AppError::Validation {
            code: codes::VALIDATION_FAILED,
            message: "limit must be at least 1".to_string(),
            field: Some("limit".to_string()),
            received: Some(serde_json::json!(0)),
            docs_hint: Some(format!(
                "Omit limit to get up to {} events.",
                state.service.history_cap()
            )),
        });
    }
    Ok(Json(state.service.get_history(user_id, params.limit).await?))
}

/// Aggregate statistics and prevention recommendations over a timeframe
#[utoipa::path(
    get,
    path = "/v1/crisis/analytics",
    params(
        AnalyticsParams,
        ("x-user-id" = Uuid, Header, description = "Caller's user id")
    ),
    responses(
        (status = 200, description = "Analytics", body = CrisisAnalytics),
        (status = 400, description = "Unknown timeframe", body = ApiError),
        (status = 503, description = "Event store unavailable", body = ApiError)
    ),
    tag = "events"
)]
pub async fn get_analytics(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(params): Query<AnalyticsParams>,
) -> Result<Json<CrisisAnalytics>, AppError> {
    let timeframe = match params.timeframe.as_deref() {
        None => Timeframe::default(),
        Some(raw) => Timeframe::parse(raw).ok_or_else(|| AppError::Validation {
            code: codes::VALIDATION_FAILED,
            message: format!("unknown timeframe '{raw}'"),
            field: Some("timeframe".to_string()),
            received: Some(serde_json::Value::String(raw.to_string())),
            docs_hint: Some("Use day, week, month, quarter, year or all.".to_string()),
        })?,
    };
    Ok(Json(state.service.get_analytics(user_id, timeframe).await?))
}

/// Trend, time-of-day and frequency patterns over the stored history
#[utoipa::path(
    get,
    path = "/v1/crisis/patterns",
    params(
        ("x-user-id" = Uuid, Header, description = "Caller's user id")
    ),
    responses(
        (status = 200, description = "Pattern analysis", body = PatternAnalysis),
        (status = 503, description = "Event store unavailable", body = ApiError)
    ),
    tag = "events"
)]
pub async fn identify_patterns(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<PatternAnalysis>, AppError> {
    Ok(Json(state.service.identify_patterns(user_id).await?))
}
