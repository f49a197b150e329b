use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use beacon_core::store::{
    ContentCipher, EventStore, InMemoryEventStore, InMemorySettingsStore, SettingsStore,
};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod cipher;
mod config;
mod error;
mod extract;
mod middleware;
mod notifiers;
mod routes;
mod state;
mod store;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Beacon Crisis API",
        version = "0.1.0",
        description = "Crisis risk assessment, escalation and history for journaling and chat apps."
    ),
    paths(
        routes::health::health_check,
        routes::assessment::assess_text,
        routes::assessment::assess_structured,
        routes::assessment::assess_and_connect,
        routes::escalation::trigger_escalation,
        routes::events::record_event,
        routes::events::get_history,
        routes::events::get_analytics,
        routes::events::identify_patterns,
        routes::settings::get_settings,
        routes::settings::update_settings,
    ),
    components(schemas(
        HealthResponse,
        beacon_core::error::ApiError,
        beacon_core::risk::RiskLevel,
        beacon_core::assessment::CrisisAssessment,
        beacon_core::assessment::Indicator,
        beacon_core::assessment::IndicatorCategory,
        beacon_core::lexicon::ScoringContext,
        beacon_core::lexicon::TimeOfDay,
        beacon_core::lexicon::Language,
        beacon_core::aggregator::RiskFactors,
        beacon_core::aggregator::ChatAnalysis,
        beacon_core::aggregator::BehaviorPatterns,
        beacon_core::aggregator::ProtectiveFactors,
        beacon_core::aggregator::FactorContribution,
        beacon_core::aggregator::StructuredAssessment,
        beacon_core::escalation::EscalationRequest,
        beacon_core::escalation::EscalationOutcome,
        beacon_core::escalation::EscalationStep,
        beacon_core::escalation::EscalationLevel,
        beacon_core::escalation::StepResult,
        beacon_core::escalation::ContactError,
        beacon_core::escalation::Contact,
        beacon_core::escalation::ContactKind,
        beacon_core::escalation::Location,
        beacon_core::events::NewCrisisEvent,
        beacon_core::events::CrisisEventView,
        beacon_core::events::HistoryResponse,
        beacon_core::analytics::CrisisAnalytics,
        beacon_core::analytics::Timeframe,
        beacon_core::analytics::ResolutionMethod,
        beacon_core::patterns::PatternAnalysis,
        beacon_core::patterns::Trend,
        beacon_core::patterns::TimeWindow,
        beacon_core::patterns::TimeOfDayPattern,
        beacon_core::patterns::FrequencyPattern,
        beacon_core::settings::UserCrisisSettings,
        beacon_core::settings::NotificationPreferences,
        beacon_core::service::TextAssessmentRequest,
        beacon_core::service::ConnectRequest,
        beacon_core::service::ConnectResponse,
        beacon_core::service::Persistence,
        beacon_core::service::RecordedEvent,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Log a start-up failure and exit.
fn fatal(message: impl std::fmt::Display) -> ! {
    tracing::error!("{}", message);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "beacon_api=debug,beacon_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = config::AppConfig::from_env().unwrap_or_else(|e| fatal(e));

    // Stores: Postgres when configured, otherwise in-process
    let (events, settings): (Arc<dyn EventStore>, Arc<dyn SettingsStore>) =
        match &config.database_url {
            Some(database_url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(20)
                    .connect(database_url)
                    .await
                    .unwrap_or_else(|e| fatal(format!("failed to connect to database: {e}")));

                sqlx::migrate!("../migrations")
                    .run(&pool)
                    .await
                    .unwrap_or_else(|e| fatal(format!("failed to run migrations: {e}")));

                let events: Arc<dyn EventStore> =
                    Arc::new(store::PgEventStore::new(pool.clone(), config.history_cap));
                let settings: Arc<dyn SettingsStore> = Arc::new(store::PgSettingsStore::new(pool));
                (events, settings)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, crisis history is kept in memory only");
                let events: Arc<dyn EventStore> =
                    Arc::new(InMemoryEventStore::new(config.history_cap));
                let settings: Arc<dyn SettingsStore> = Arc::new(InMemorySettingsStore::new());
                (events, settings)
            }
        };

    let content_cipher: Arc<dyn ContentCipher> = match &config.content_key {
        Some(secret) => Arc::new(cipher::AesGcmCipher::from_secret(secret)),
        None => {
            tracing::warn!(
                "BEACON_CONTENT_KEY not set, stored content will be unreadable after a restart"
            );
            Arc::new(cipher::AesGcmCipher::ephemeral())
        }
    };

    let client = notifiers::http_client(config.step_timeout)
        .unwrap_or_else(|e| fatal(format!("failed to build HTTP client: {e}")));
    for (name, url) in [
        ("hotline", &config.hotline_url),
        ("emergency services", &config.emergency_url),
        ("contact messaging", &config.contact_url),
    ] {
        if url.is_none() {
            tracing::warn!(
                "no {} endpoint configured, escalation will fall back to direct-dial guidance",
                name
            );
        }
    }

    let app_state = state::AppState::new(&config, events, settings, content_cipher, client);

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::app(app_state))
        .layer(axum::middleware::from_fn(middleware::security_headers::apply))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(middleware::cors::build_cors_layer()),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Beacon API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| fatal(format!("failed to bind {addr}: {e}")));
    if let Err(e) = axum::serve(listener, app).await {
        fatal(format!("server error: {e}"));
    }
}

#[cfg(test)]
mod tests {
    use utoipa::OpenApi;

    use super::ApiDoc;

    #[test]
    fn openapi_lists_every_crisis_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/v1/crisis/assess",
            "/v1/crisis/assess/structured",
            "/v1/crisis/assess-and-connect",
            "/v1/crisis/escalate",
            "/v1/crisis/events",
            "/v1/crisis/history",
            "/v1/crisis/analytics",
            "/v1/crisis/patterns",
            "/v1/crisis/settings",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
