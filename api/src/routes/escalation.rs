use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use beacon_core::error::ApiError;
use beacon_core::escalation::{EscalationOutcome, EscalationRequest};
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::{AppJson, UserId};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/crisis/escalate", post(trigger_escalation))
}

/// Run the escalation sequence
///
/// Always answers 200 with an outcome once the request is valid: a step that
/// could not be completed is reported in `steps_attempted` together with
/// direct-dial fallback guidance.
#[utoipa::path(
    post,
    path = "/v1/crisis/escalate",
    request_body = EscalationRequest,
    params(
        ("x-user-id" = Uuid, Header, description = "Caller's user id")
    ),
    responses(
        (status = 200, description = "Escalation outcome", body = EscalationOutcome),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "escalation"
)]
pub async fn trigger_escalation(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    AppJson(mut req): AppJson<EscalationRequest>,
) -> Result<Json<EscalationOutcome>, AppError> {
    req.user_id = user_id;
    tracing::info!(
        user_id = %user_id,
        risk_level = %req.risk_level,
        contacts = req.emergency_contacts.len(),
        "escalation requested"
    );
    Ok(Json(state.service.trigger_escalation(req).await))
}
