//! Entry points used by the HTTP layer. Wires the scorer, aggregator,
//! orchestrator and stores together; holds no per-user state of its own.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::aggregator::{RiskAggregator, RiskFactors, StructuredAssessment};
use crate::analytics::{self, CrisisAnalytics, Timeframe};
use crate::assessment::CrisisAssessment;
use crate::clock::Clock;
use crate::error::CrisisError;
use crate::escalation::{
    Contact, EscalationOrchestrator, EscalationOutcome, EscalationRequest, Location,
};
use crate::events::{CrisisEvent, CrisisEventView, HistoryResponse, NewCrisisEvent};
use crate::lexicon::{Language, LexicalScorer, ScoringContext};
use crate::patterns::{self, PatternAnalysis};
use crate::risk::RiskLevel;
use crate::settings::{NotificationPreferences, SettingsPatch, UserCrisisSettings};
use crate::store::{ContentCipher, EventStore, SettingsStore};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Minimum level at which assess-and-connect escalates on its own
    pub escalation_threshold: RiskLevel,
    pub default_language: Language,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: RiskLevel::High,
            default_language: Language::En,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TextAssessmentRequest {
    pub text: String,
    #[serde(default)]
    pub context: ScoringContext,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConnectRequest {
    pub text: String,
    #[serde(default)]
    pub context: ScoringContext,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub emergency_contacts: Vec<Contact>,
    /// Store the entry text (encrypted) with the event
    #[serde(default)]
    pub store_content: bool,
}

/// Whether the event behind a combined call reached the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Persistence {
    Recorded { event_id: Uuid },
    Failed { event_id: Uuid, reason: String },
}

impl Persistence {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Persistence::Recorded { .. })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectResponse {
    pub assessment: CrisisAssessment,
    /// Absent when risk stayed under the threshold or auto-escalation is off
    pub escalation: Option<EscalationOutcome>,
    pub persistence: Persistence,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecordedEvent {
    pub event_id: Uuid,
    /// False when an event with this id already existed
    pub created: bool,
}

pub struct CrisisService {
    scorer: LexicalScorer,
    aggregator: RiskAggregator,
    orchestrator: EscalationOrchestrator,
    events: Arc<dyn EventStore>,
    settings: Arc<dyn SettingsStore>,
    cipher: Arc<dyn ContentCipher>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
    settings_write: Mutex<()>,
}

impl CrisisService {
    pub fn new(
        orchestrator: EscalationOrchestrator,
        events: Arc<dyn EventStore>,
        settings: Arc<dyn SettingsStore>,
        cipher: Arc<dyn ContentCipher>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        let scorer = LexicalScorer::new(config.default_language);
        Self {
            scorer,
            aggregator: RiskAggregator::new(scorer),
            orchestrator,
            events,
            settings,
            cipher,
            clock,
            config,
            settings_write: Mutex::new(()),
        }
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub fn history_cap(&self) -> usize {
        self.events.cap()
    }

    pub async fn ping(&self) -> Result<(), CrisisError> {
        self.events.ping().await
    }

    /// Score text with the user's settings and stored trend.
    pub async fn assess_text(
        &self,
        user_id: Uuid,
        request: &TextAssessmentRequest,
    ) -> CrisisAssessment {
        self.assess_text_inner(user_id, &request.text, &request.context)
            .await
            .0
    }

    async fn assess_text_inner(
        &self,
        user_id: Uuid,
        text: &str,
        context: &ScoringContext,
    ) -> (CrisisAssessment, Language, UserCrisisSettings) {
        let settings = self.settings_or_default(user_id).await;
        let history = match self.events.history(user_id, None).await {
            Ok(history) => history,
            Err(err) => {
                tracing::error!(
                    user_id = %user_id,
                    error = %err,
                    "history unavailable, assessing without trend"
                );
                Vec::new()
            }
        };

        let lexical = self
            .scorer
            .score_with(text, context, &settings.scoring_options());
        let language = lexical.language;
        let assessment = if text.trim().is_empty() {
            CrisisAssessment::none()
        } else {
            self.aggregator
                .combine_text(lexical, &patterns::analyze(&history))
        };
        (assessment, language, settings)
    }

    pub fn assess_structured(&self, factors: &Value) -> Result<StructuredAssessment, CrisisError> {
        let factors = RiskFactors::from_value(factors)?;
        Ok(self.aggregator.assess(&factors))
    }

    /// Run the escalation sequence for an explicit request. Contacts the
    /// user opted out of are dropped first.
    pub async fn trigger_escalation(&self, mut request: EscalationRequest) -> EscalationOutcome {
        let settings = self.settings_or_default(request.user_id).await;
        request.emergency_contacts = filter_contacts(
            request.emergency_contacts,
            &settings.notification_preferences,
        );
        self.orchestrator.escalate(request).await
    }

    /// Assess, escalate when warranted, and record the event. Escalation runs
    /// even when the store is down; the persistence status says what happened.
    pub async fn assess_and_connect(
        &self,
        user_id: Uuid,
        request: ConnectRequest,
    ) -> ConnectResponse {
        let (assessment, language, settings) = self
            .assess_text_inner(user_id, &request.text, &request.context)
            .await;

        let new_event = NewCrisisEvent {
            id: None,
            user_id,
            timestamp: None,
            assessment: assessment.clone(),
            escalation: None,
            content: request.store_content.then(|| request.text.clone()),
        };
        let event_id = Uuid::now_v7();
        let mut persistence = match self.record_with_id(event_id, new_event).await {
            Ok(_) => Persistence::Recorded { event_id },
            Err(err) => {
                tracing::error!(
                    user_id = %user_id,
                    event_id = %event_id,
                    error = %err,
                    "failed to record crisis event"
                );
                Persistence::Failed {
                    event_id,
                    reason: err.to_string(),
                }
            }
        };

        let should_escalate = settings.auto_escalation_enabled
            && assessment.risk_level >= self.config.escalation_threshold;
        let escalation = if should_escalate {
            let outcome = self
                .orchestrator
                .escalate(EscalationRequest {
                    user_id,
                    risk_level: assessment.risk_level,
                    triggers: request.triggers,
                    location: request.location,
                    emergency_contacts: filter_contacts(
                        request.emergency_contacts,
                        &settings.notification_preferences,
                    ),
                    language: Some(language),
                })
                .await;

            if persistence.is_recorded() {
                if let Err(err) = self
                    .events
                    .attach_escalation(user_id, event_id, outcome.clone())
                    .await
                {
                    tracing::error!(
                        user_id = %user_id,
                        event_id = %event_id,
                        error = %err,
                        "failed to attach escalation outcome"
                    );
                    persistence = Persistence::Failed {
                        event_id,
                        reason: err.to_string(),
                    };
                }
            }
            Some(outcome)
        } else {
            tracing::debug!(
                user_id = %user_id,
                risk_level = %assessment.risk_level,
                auto_escalation = settings.auto_escalation_enabled,
                "escalation not triggered"
            );
            None
        };

        ConnectResponse {
            assessment,
            escalation,
            persistence,
        }
    }

    /// Seal and append an event. Idempotent on the event id.
    pub async fn record_event(&self, event: NewCrisisEvent) -> Result<RecordedEvent, CrisisError> {
        let event_id = event.id.unwrap_or_else(Uuid::now_v7);
        let created = self.record_with_id(event_id, event).await?;
        Ok(RecordedEvent { event_id, created })
    }

    async fn record_with_id(
        &self,
        event_id: Uuid,
        event: NewCrisisEvent,
    ) -> Result<bool, CrisisError> {
        let encrypted_content = match &event.content {
            Some(content) => self.cipher.encrypt(content.as_bytes())?,
            None => Vec::new(),
        };
        let sealed = CrisisEvent {
            id: event_id,
            user_id: event.user_id,
            timestamp: event.timestamp.unwrap_or_else(|| self.clock.now()),
            assessment: event.assessment,
            escalation: event.escalation,
            encrypted_content,
        };
        let created = self.events.append(sealed).await?;
        tracing::info!(
            user_id = %event.user_id,
            event_id = %event_id,
            created,
            "crisis event recorded"
        );
        Ok(created)
    }

    pub async fn get_settings(&self, user_id: Uuid) -> Result<UserCrisisSettings, CrisisError> {
        Ok(self.settings.load(user_id).await?.unwrap_or_default())
    }

    /// Validate then apply. A rejected patch leaves the stored settings untouched.
    pub async fn update_settings(
        &self,
        user_id: Uuid,
        patch: &Value,
    ) -> Result<UserCrisisSettings, CrisisError> {
        let patch = SettingsPatch::from_value(patch)?;
        let _guard = self.settings_write.lock().await;
        let current = self.get_settings(user_id).await?;
        let next = patch.apply(&current);
        if next != current {
            self.settings.save(user_id, &next).await?;
            tracing::info!(user_id = %user_id, "crisis settings updated");
        }
        Ok(next)
    }

    pub async fn get_history(
        &self,
        user_id: Uuid,
        limit: Option<usize>,
    ) -> Result<HistoryResponse, CrisisError> {
        let events = self.events.history(user_id, limit).await?;
        let events = events
            .into_iter()
            .map(|event| self.open(event))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HistoryResponse {
            events,
            cap: self.events.cap(),
        })
    }

    pub async fn get_analytics(
        &self,
        user_id: Uuid,
        timeframe: Timeframe,
    ) -> Result<CrisisAnalytics, CrisisError> {
        let history = self.events.history(user_id, None).await?;
        Ok(analytics::compute(&history, timeframe, self.clock.now()))
    }

    pub async fn identify_patterns(&self, user_id: Uuid) -> Result<PatternAnalysis, CrisisError> {
        let history = self.events.history(user_id, None).await?;
        Ok(patterns::analyze(&history))
    }

    fn open(&self, event: CrisisEvent) -> Result<CrisisEventView, CrisisError> {
        let content = if event.encrypted_content.is_empty() {
            None
        } else {
            let plaintext = self.cipher.decrypt(&event.encrypted_content)?;
            Some(
                String::from_utf8(plaintext)
                    .map_err(|_| {
                        CrisisError::Cipher("decrypted content is not UTF-8".to_string())
                    })?,
            )
        };
        Ok(CrisisEventView {
            id: event.id,
            user_id: event.user_id,
            timestamp: event.timestamp,
            assessment: event.assessment,
            escalation: event.escalation,
            content,
        })
    }

    async fn settings_or_default(&self, user_id: Uuid) -> UserCrisisSettings {
        match self.get_settings(user_id).await {
            Ok(settings) => settings,
            Err(err) => {
                tracing::error!(
                    user_id = %user_id,
                    error = %err,
                    "settings unavailable, using defaults"
                );
                UserCrisisSettings::default()
            }
        }
    }
}

fn filter_contacts(contacts: Vec<Contact>, preferences: &NotificationPreferences) -> Vec<Contact> {
    let before = contacts.len();
    let allowed: Vec<Contact> = contacts
        .into_iter()
        .filter(|c| preferences.allows(c.kind))
        .collect();
    if allowed.len() < before {
        tracing::debug!(
            skipped = before - allowed.len(),
            "contacts excluded by notification preferences"
        );
    }
    allowed
}
