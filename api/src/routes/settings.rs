use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use beacon_core::error::ApiError;
use beacon_core::settings::UserCrisisSettings;
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::{AppJson, UserId};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/crisis/settings", get(get_settings).patch(update_settings))
}

/// Current crisis settings (defaults when never saved)
#[utoipa::path(
    get,
    path = "/v1/crisis/settings",
    params(
        ("x-user-id" = Uuid, Header, description = "Caller's user id")
    ),
    responses(
        (status = 200, description = "Settings", body = UserCrisisSettings),
        (status = 503, description = "Settings store unavailable", body = ApiError)
    ),
    tag = "settings"
)]
pub async fn get_settings(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<UserCrisisSettings>, AppError> {
    Ok(Json(state.service.get_settings(user_id).await?))
}

/// Partially update crisis settings
///
/// Unknown fields and out-of-range values reject the whole patch; nothing is
/// written in that case.
#[utoipa::path(
    patch,
    path = "/v1/crisis/settings",
    request_body = Object,
    params(
        ("x-user-id" = Uuid, Header, description = "Caller's user id")
    ),
    responses(
        (status = 200, description = "Settings after the update", body = UserCrisisSettings),
        (status = 400, description = "Invalid settings", body = ApiError),
        (status = 503, description = "Settings store unavailable", body = ApiError)
    ),
    tag = "settings"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    AppJson(patch): AppJson<Value>,
) -> Result<Json<UserCrisisSettings>, AppError> {
    Ok(Json(state.service.update_settings(user_id, &patch).await?))
}
