use axum::Router;

use crate::state::AppState;

pub mod assessment;
pub mod escalation;
pub mod events;
pub mod health;
pub mod settings;

/// Every route, bound to its state. Layers and docs are added by `main`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(assessment::router())
        .merge(escalation::router())
        .merge(events::router())
        .merge(settings::router())
        .with_state(state)
}
