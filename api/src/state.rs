use std::sync::Arc;

use beacon_core::clock::{Clock, SystemClock};
use beacon_core::escalation::EscalationOrchestrator;
use beacon_core::service::CrisisService;
use beacon_core::store::{ContentCipher, EventStore, SettingsStore};

use crate::config::AppConfig;
use crate::notifiers::{
    HttpContactNotifier, HttpEmergencyNotifier, HttpHotlineNotifier, NotifierClient,
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CrisisService>,
}

impl AppState {
    /// Wire the crisis service from its stores, the content cipher and the
    /// configured notifier endpoints.
    pub fn new(
        config: &AppConfig,
        events: Arc<dyn EventStore>,
        settings: Arc<dyn SettingsStore>,
        cipher: Arc<dyn ContentCipher>,
        client: NotifierClient,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let orchestrator = EscalationOrchestrator::new(
            Arc::new(HttpHotlineNotifier::new(
                client.clone(),
                config.hotline_url.clone(),
            )),
            Arc::new(HttpEmergencyNotifier::new(
                client.clone(),
                config.emergency_url.clone(),
            )),
            Arc::new(HttpContactNotifier::new(client, config.contact_url.clone())),
            config.escalation_config(),
            clock.clone(),
        );
        let service = CrisisService::new(
            orchestrator,
            events,
            settings,
            cipher,
            clock,
            config.service_config(),
        );
        Self {
            service: Arc::new(service),
        }
    }
}
