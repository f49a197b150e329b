use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use beacon_core::aggregator::{RiskFactors, StructuredAssessment};
use beacon_core::assessment::CrisisAssessment;
use beacon_core::error::ApiError;
use beacon_core::lexicon::{ScoringContext, TimeOfDay};
use beacon_core::service::{ConnectRequest, ConnectResponse, TextAssessmentRequest};
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::{AppJson, UserId};
use crate::state::AppState;

/// IANA zone of the writer, used when the body carries no `time_of_day`.
pub const TIMEZONE_HEADER: &str = "x-timezone";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/crisis/assess", post(assess_text))
        .route("/v1/crisis/assess/structured", post(assess_structured))
        .route("/v1/crisis/assess-and-connect", post(assess_and_connect))
}

/// Derive the part of day from the caller's zone when the context leaves it out.
/// An unreadable zone leaves `time_of_day` unset.
fn fill_time_of_day(context: &mut ScoringContext, headers: &HeaderMap, now: DateTime<Utc>) {
    if context.time_of_day.is_some() {
        return;
    }
    let Some(raw) = headers.get(TIMEZONE_HEADER) else {
        return;
    };

    let zone = raw
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<Tz>().ok());
    match zone {
        Some(tz) => {
            context.time_of_day = Some(TimeOfDay::from_hour(now.with_timezone(&tz).hour()));
        }
        None => {
            tracing::warn!(
                header = ?raw,
                "ignoring unknown x-timezone, assessing without time of day"
            );
        }
    }
}

/// Score free text for crisis risk
///
/// Uses the caller's sensitivity and custom keywords, and their stored
/// history for trend. Never fails because a store is down; it falls back to
/// default settings and no trend.
#[utoipa::path(
    post,
    path = "/v1/crisis/assess",
    request_body = TextAssessmentRequest,
    params(
        ("x-user-id" = Uuid, Header, description = "Caller's user id"),
        (
            "x-timezone" = Option<String>,
            Header,
            description = "IANA zone used to derive time_of_day; ignored when unknown"
        )
    ),
    responses(
        (status = 200, description = "Assessment", body = CrisisAssessment),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "assessment"
)]
pub async fn assess_text(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    headers: HeaderMap,
    AppJson(mut req): AppJson<TextAssessmentRequest>,
) -> Json<CrisisAssessment> {
    fill_time_of_day(&mut req.context, &headers, state.service.now());
    let assessment = state.service.assess_text(user_id, &req).await;
    tracing::debug!(
        user_id = %user_id,
        risk_level = %assessment.risk_level,
        indicators = assessment.indicators.len(),
        "text assessed"
    );
    Json(assessment)
}

/// Score structured risk factors
///
/// Accepts mood scores, journal keywords, chat analysis flags, behaviour
/// patterns, protective factors and previous incidents.
#[utoipa::path(
    post,
    path = "/v1/crisis/assess/structured",
    request_body = RiskFactors,
    responses(
        (
            status = 200,
            description = "Assessment with contributing factors",
            body = StructuredAssessment
        ),
        (status = 400, description = "Invalid factors", body = ApiError)
    ),
    tag = "assessment"
)]
pub async fn assess_structured(
    State(state): State<AppState>,
    AppJson(factors): AppJson<Value>,
) -> Result<Json<StructuredAssessment>, AppError> {
    Ok(Json(state.service.assess_structured(&factors)?))
}

/// Assess text, escalate when warranted, and record the event
///
/// Escalation runs even when the event store is down. The response is 201
/// when the event was recorded and 503 (with the full body) when it was not.
#[utoipa::path(
    post,
    path = "/v1/crisis/assess-and-connect",
    request_body = ConnectRequest,
    params(
        ("x-user-id" = Uuid, Header, description = "Caller's user id"),
        (
            "x-timezone" = Option<String>,
            Header,
            description = "IANA zone used to derive time_of_day; ignored when unknown"
        )
    ),
    responses(
        (status = 201, description = "Assessed and recorded", body = ConnectResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (
            status = 503,
            description = "Assessed (and escalated if needed) but not recorded",
            body = ConnectResponse
        )
    ),
    tag = "assessment"
)]
pub async fn assess_and_connect(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    headers: HeaderMap,
    AppJson(mut req): AppJson<ConnectRequest>,
) -> impl IntoResponse {
    fill_time_of_day(&mut req.context, &headers, state.service.now());
    let response = state.service.assess_and_connect(user_id, req).await;

    let status = if response.persistence.is_recorded() {
        StatusCode::CREATED
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
