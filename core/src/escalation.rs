//! Escalation orchestration.
//!
//! Three notification steps run in a fixed order: hotline, emergency services,
//! personal contacts. A failing step never stops the next one; every step that
//! was attempted is reported, and `escalate` always returns an outcome.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{FutureExt, StreamExt, stream};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::clock::Clock;
use crate::lexicon::Language;
use crate::risk::RiskLevel;

pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONTACT_CONCURRENCY: usize = 4;
pub const DEFAULT_HOTLINE_NUMBER: &str = "988";
pub const DEFAULT_EMERGENCY_NUMBER: &str = "911";

pub const HOTLINE_FALLBACK_RESOURCES: &[&str] = &["crisis_text_line", "local_crisis_centers"];

/// Triggers that together mark an imminent crisis.
const IMMINENT_TRIGGER_SET: &[&str] = &["suicidal_plan", "means_available", "timeline_immediate"];
const IMMINENT_MARKER: &str = "imminent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStep {
    Hotline,
    EmergencyServices,
    ContactNotification,
}

impl std::fmt::Display for EscalationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscalationStep::Hotline => write!(f, "hotline"),
            EscalationStep::EmergencyServices => write!(f, "emergency_services"),
            EscalationStep::ContactNotification => write!(f, "contact_notification"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    Immediate,
    Supportive,
    Routine,
}

/// Progress through the escalation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationStage {
    NotStarted,
    HotlineAttempted,
    EmergencyAttempted,
    ContactsAttempted,
    Done,
}

impl EscalationStage {
    pub fn next(self) -> Option<Self> {
        match self {
            EscalationStage::NotStarted => Some(EscalationStage::HotlineAttempted),
            EscalationStage::HotlineAttempted => Some(EscalationStage::EmergencyAttempted),
            EscalationStage::EmergencyAttempted => Some(EscalationStage::ContactsAttempted),
            EscalationStage::ContactsAttempted => Some(EscalationStage::Done),
            EscalationStage::Done => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContactError {
    pub contact_id: String,
    pub message: String,
}

/// Result of one attempted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StepResult {
    pub step: EscalationStep,
    pub succeeded: bool,
    pub detail: String,
    #[serde(default)]
    pub fallback_resources: Vec<String>,
    /// Direct action the person can take when the step failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications_sent: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ContactError>,
}

impl StepResult {
    fn success(step: EscalationStep, detail: impl Into<String>) -> Self {
        Self {
            step,
            succeeded: true,
            detail: detail.into(),
            fallback_resources: Vec::new(),
            fallback_instruction: None,
            session_id: None,
            dispatch_id: None,
            notifications_sent: None,
            errors: Vec::new(),
        }
    }

    fn failure(
        step: EscalationStep,
        detail: impl Into<String>,
        fallback_resources: Vec<String>,
        fallback_instruction: String,
    ) -> Self {
        Self {
            succeeded: false,
            fallback_resources,
            fallback_instruction: Some(fallback_instruction),
            ..Self::success(step, detail)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EscalationOutcome {
    /// In execution order; steps whose preconditions were not met are absent
    pub steps_attempted: Vec<StepResult>,
    /// Every attempted step succeeded (false when nothing was attempted)
    pub overall_success: bool,
    /// At least one attempted step succeeded and at least one failed
    pub partial_success: bool,
    pub escalation_level: EscalationLevel,
    /// Direct-dial numbers and resource names for anything that did not get through
    pub fallback_guidance: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl EscalationOutcome {
    pub fn step(&self, step: EscalationStep) -> Option<&StepResult> {
        self.steps_attempted.iter().find(|s| s.step == step)
    }

    pub fn succeeded_steps(&self) -> impl Iterator<Item = EscalationStep> + '_ {
        self.steps_attempted
            .iter()
            .filter(|s| s.succeeded)
            .map(|s| s.step)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    #[default]
    EmergencyContact,
    Therapist,
    FamilyMember,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub kind: ContactKind,
}

impl Contact {
    /// A contact is reachable when it has an email or a phone number with at
    /// least seven digits.
    fn validate(&self) -> Result<(), NotifierError> {
        let phone_problem = match &self.phone {
            Some(phone) if is_dialable(phone) => return Ok(()),
            Some(phone) => Some(format!("invalid phone number '{phone}'")),
            None => None,
        };
        match (&self.email, phone_problem) {
            (Some(email), _) if email.contains('@') => Ok(()),
            (Some(email), Some(problem)) => Err(NotifierError::InvalidRecipient(format!(
                "{problem}, invalid email '{email}'"
            ))),
            (Some(email), None) => Err(NotifierError::InvalidRecipient(format!(
                "invalid email '{email}'"
            ))),
            (None, Some(problem)) => Err(NotifierError::InvalidRecipient(problem)),
            (None, None) => Err(NotifierError::InvalidRecipient(
                "contact has neither phone nor email".to_string(),
            )),
        }
    }
}

fn is_dialable(phone: &str) -> bool {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    digits >= 7
        && phone
            .chars()
            .all(|c| c.is_ascii_digit() || " +-().".contains(c))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EscalationRequest {
    /// Filled from the caller's identity by the HTTP layer
    #[serde(default)]
    pub user_id: Uuid,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub emergency_contacts: Vec<Contact>,
    #[serde(default)]
    pub language: Option<Language>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Immediate,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotlineRequest {
    pub user_id: Uuid,
    pub language: Language,
    pub urgency: Urgency,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HotlineSession {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergencyRequest {
    pub user_id: Uuid,
    pub risk_level: RiskLevel,
    pub triggers: Vec<String>,
    pub location: Option<Location>,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmergencyDispatch {
    pub dispatch_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactMessage {
    pub user_id: Uuid,
    pub contact: Contact,
    pub risk_level: RiskLevel,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContactReceipt {
    pub message_id: String,
}

/// Transport-level failure reported by a notifier port.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotifierError {
    #[error("service unreachable: {0}")]
    Unreachable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait HotlineNotifier: Send + Sync {
    async fn connect(&self, request: HotlineRequest) -> Result<HotlineSession, NotifierError>;
}

#[async_trait]
pub trait EmergencyNotifier: Send + Sync {
    async fn dispatch(&self, request: EmergencyRequest)
    -> Result<EmergencyDispatch, NotifierError>;
}

#[async_trait]
pub trait ContactNotifier: Send + Sync {
    async fn notify(&self, message: ContactMessage) -> Result<ContactReceipt, NotifierError>;
}

#[derive(Debug, Clone)]
pub struct EscalationConfig {
    /// Upper bound for a single notifier call
    pub step_timeout: Duration,
    /// Contacts notified at once
    pub contact_concurrency: usize,
    pub hotline_number: String,
    pub emergency_number: String,
    pub default_language: Language,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            step_timeout: DEFAULT_STEP_TIMEOUT,
            contact_concurrency: DEFAULT_CONTACT_CONCURRENCY,
            hotline_number: DEFAULT_HOTLINE_NUMBER.to_string(),
            emergency_number: DEFAULT_EMERGENCY_NUMBER.to_string(),
            default_language: Language::En,
        }
    }
}

/// Stateless per invocation; cheap to clone.
#[derive(Clone)]
pub struct EscalationOrchestrator {
    hotline: Arc<dyn HotlineNotifier>,
    emergency: Arc<dyn EmergencyNotifier>,
    contacts: Arc<dyn ContactNotifier>,
    config: Arc<EscalationConfig>,
    clock: Arc<dyn Clock>,
}

impl EscalationOrchestrator {
    pub fn new(
        hotline: Arc<dyn HotlineNotifier>,
        emergency: Arc<dyn EmergencyNotifier>,
        contacts: Arc<dyn ContactNotifier>,
        config: EscalationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            hotline,
            emergency,
            contacts,
            config: Arc::new(config),
            clock,
        }
    }

    /// Run the escalation sequence. Never fails.
    ///
    /// The work runs on its own task: if the caller stops waiting, notifier
    /// calls already in flight still complete or time out.
    pub async fn escalate(&self, request: EscalationRequest) -> EscalationOutcome {
        let started_at = self.clock.now();
        let this = self.clone();
        let task_request = request.clone();
        match tokio::spawn(async move { this.run(task_request).await }).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(
                    user_id = %request.user_id,
                    error = %err,
                    "escalation task aborted, returning fallback guidance"
                );
                self.aborted_outcome(&request, started_at)
            }
        }
    }

    async fn run(&self, request: EscalationRequest) -> EscalationOutcome {
        let started_at = self.clock.now();
        tracing::info!(
            user_id = %request.user_id,
            risk_level = %request.risk_level,
            contacts = request.emergency_contacts.len(),
            "escalation started"
        );

        let mut steps = Vec::with_capacity(3);
        let mut stage = EscalationStage::NotStarted;
        while let Some(next) = stage.next() {
            match next {
                EscalationStage::HotlineAttempted if should_call_hotline(&request) => {
                    steps.push(self.attempt_hotline(&request).await);
                }
                EscalationStage::EmergencyAttempted if needs_emergency_services(&request) => {
                    steps.push(self.attempt_emergency(&request).await);
                }
                EscalationStage::ContactsAttempted if should_notify_contacts(&request) => {
                    steps.push(self.attempt_contacts(&request).await);
                }
                _ => {}
            }
            tracing::debug!(user_id = %request.user_id, stage = ?next, "escalation stage reached");
            stage = next;
        }

        let outcome = self.assemble(request.risk_level, steps, started_at);
        tracing::info!(
            user_id = %request.user_id,
            overall_success = outcome.overall_success,
            partial_success = outcome.partial_success,
            escalation_level = ?outcome.escalation_level,
            "escalation finished"
        );
        outcome
    }

    fn language(&self, request: &EscalationRequest) -> Language {
        request.language.unwrap_or(self.config.default_language)
    }

    async fn attempt_hotline(&self, request: &EscalationRequest) -> StepResult {
        let urgency = if request.risk_level == RiskLevel::Critical {
            Urgency::Immediate
        } else {
            Urgency::Urgent
        };
        let call = self.hotline.connect(HotlineRequest {
            user_id: request.user_id,
            language: self.language(request),
            urgency,
        });

        match bounded(self.config.step_timeout, call).await {
            Ok(session) => StepResult {
                session_id: Some(session.session_id.clone()),
                ..StepResult::success(
                    EscalationStep::Hotline,
                    format!("connected to crisis hotline (session {})", session.session_id),
                )
            },
            Err(err) => {
                tracing::warn!(
                    user_id = %request.user_id,
                    step = "hotline",
                    error = %err,
                    "escalation step failed"
                );
                StepResult::failure(
                    EscalationStep::Hotline,
                    err.to_string(),
                    HOTLINE_FALLBACK_RESOURCES
                        .iter()
                        .map(|r| r.to_string())
                        .collect(),
                    format!("call or text {} directly", self.config.hotline_number),
                )
            }
        }
    }

    async fn attempt_emergency(&self, request: &EscalationRequest) -> StepResult {
        let call = self.emergency.dispatch(EmergencyRequest {
            user_id: request.user_id,
            risk_level: request.risk_level,
            triggers: request.triggers.clone(),
            location: request.location,
            language: self.language(request),
        });

        match bounded(self.config.step_timeout, call).await {
            Ok(dispatch) => StepResult {
                dispatch_id: Some(dispatch.dispatch_id.clone()),
                ..StepResult::success(
                    EscalationStep::EmergencyServices,
                    format!("emergency services notified (dispatch {})", dispatch.dispatch_id),
                )
            },
            Err(err) => {
                tracing::warn!(
                    user_id = %request.user_id,
                    step = "emergency_services",
                    error = %err,
                    "escalation step failed"
                );
                StepResult::failure(
                    EscalationStep::EmergencyServices,
                    err.to_string(),
                    vec![self.config.hotline_number.clone()],
                    format!("dial {} directly", self.config.emergency_number),
                )
            }
        }
    }

    async fn attempt_contacts(&self, request: &EscalationRequest) -> StepResult {
        let language = self.language(request);
        let total = request.emergency_contacts.len();

        let mut results: Vec<(usize, String, Result<ContactReceipt, NotifierError>)> =
            stream::iter(request.emergency_contacts.clone().into_iter().enumerate())
                .map(|(index, contact)| {
                    let message = ContactMessage {
                        user_id: request.user_id,
                        contact: contact.clone(),
                        risk_level: request.risk_level,
                        language,
                    };
                    async move {
                        let result = match contact.validate() {
                            Ok(()) => {
                                bounded(self.config.step_timeout, self.contacts.notify(message))
                                    .await
                            }
                            Err(err) => Err(err),
                        };
                        (index, contact.id, result)
                    }
                })
                .buffer_unordered(self.config.contact_concurrency.max(1))
                .collect()
                .await;
        results.sort_by_key(|(index, _, _)| *index);

        let mut sent = 0u32;
        let mut errors = Vec::new();
        for (_, contact_id, result) in results {
            match result {
                Ok(_) => sent += 1,
                Err(err) => {
                    tracing::warn!(
                        user_id = %request.user_id,
                        contact_id = %contact_id,
                        error = %err,
                        "contact notification failed"
                    );
                    errors.push(ContactError {
                        contact_id,
                        message: err.to_string(),
                    });
                }
            }
        }

        let detail = format!("notified {sent} of {total} contacts");
        let mut step = if sent > 0 {
            StepResult::success(EscalationStep::ContactNotification, detail)
        } else {
            StepResult::failure(
                EscalationStep::ContactNotification,
                detail,
                vec![self.config.hotline_number.clone()],
                "reach out to a trusted person directly".to_string(),
            )
        };
        step.notifications_sent = Some(sent);
        step.errors = errors;
        step
    }

    fn assemble(
        &self,
        risk_level: RiskLevel,
        steps: Vec<StepResult>,
        started_at: DateTime<Utc>,
    ) -> EscalationOutcome {
        let any_succeeded = steps.iter().any(|s| s.succeeded);
        let any_failed = steps.iter().any(|s| !s.succeeded);
        let overall_success = !steps.is_empty() && !any_failed;
        let partial_success = any_succeeded && any_failed;

        let urgent_steps: Vec<&StepResult> = steps
            .iter()
            .filter(|s| {
                matches!(
                    s.step,
                    EscalationStep::Hotline | EscalationStep::EmergencyServices
                )
            })
            .collect();
        let escalation_level = if urgent_steps.iter().any(|s| s.succeeded)
            || (risk_level == RiskLevel::Critical && !urgent_steps.is_empty())
        {
            EscalationLevel::Immediate
        } else if risk_level >= RiskLevel::Moderate {
            EscalationLevel::Supportive
        } else {
            EscalationLevel::Routine
        };

        let mut guidance: Vec<String> = Vec::new();
        for step in steps.iter().filter(|s| !s.succeeded) {
            if let Some(instruction) = &step.fallback_instruction {
                push_unique(&mut guidance, instruction.clone());
            }
            for resource in &step.fallback_resources {
                push_unique(&mut guidance, resource.clone());
            }
        }
        if !overall_success && risk_level >= RiskLevel::Moderate {
            push_unique(
                &mut guidance,
                format!("call or text {} directly", self.config.hotline_number),
            );
            push_unique(&mut guidance, "crisis_text_line".to_string());
        }
        if risk_level == RiskLevel::Critical && !overall_success {
            push_unique(
                &mut guidance,
                format!("dial {} directly", self.config.emergency_number),
            );
        }

        EscalationOutcome {
            steps_attempted: steps,
            overall_success,
            partial_success,
            escalation_level,
            fallback_guidance: guidance,
            started_at,
            completed_at: self.clock.now(),
        }
    }

    /// Outcome used when the escalation task itself died: every step that
    /// would have run is reported failed with its fallback.
    fn aborted_outcome(
        &self,
        request: &EscalationRequest,
        started_at: DateTime<Utc>,
    ) -> EscalationOutcome {
        let detail = "escalation task aborted";
        let mut steps = Vec::new();
        if should_call_hotline(request) {
            steps.push(StepResult::failure(
                EscalationStep::Hotline,
                detail,
                HOTLINE_FALLBACK_RESOURCES
                    .iter()
                    .map(|r| r.to_string())
                    .collect(),
                format!("call or text {} directly", self.config.hotline_number),
            ));
        }
        if needs_emergency_services(request) {
            steps.push(StepResult::failure(
                EscalationStep::EmergencyServices,
                detail,
                vec![self.config.hotline_number.clone()],
                format!("dial {} directly", self.config.emergency_number),
            ));
        }
        if should_notify_contacts(request) {
            let mut step = StepResult::failure(
                EscalationStep::ContactNotification,
                detail,
                vec![self.config.hotline_number.clone()],
                "reach out to a trusted person directly".to_string(),
            );
            step.notifications_sent = Some(0);
            steps.push(step);
        }
        self.assemble(request.risk_level, steps, started_at)
    }
}

fn should_call_hotline(request: &EscalationRequest) -> bool {
    request.risk_level >= RiskLevel::High
}

fn should_notify_contacts(request: &EscalationRequest) -> bool {
    !request.emergency_contacts.is_empty() && request.risk_level >= RiskLevel::Moderate
}

/// Critical risk, an explicit `imminent` marker, or plan + means + immediate timeline.
pub fn needs_emergency_services(request: &EscalationRequest) -> bool {
    if request.risk_level == RiskLevel::Critical {
        return true;
    }
    let triggers: Vec<String> = request
        .triggers
        .iter()
        .map(|t| t.trim().to_ascii_lowercase())
        .collect();
    triggers.iter().any(|t| t == IMMINENT_MARKER)
        || IMMINENT_TRIGGER_SET
            .iter()
            .all(|required| triggers.iter().any(|t| t == required))
}

/// Apply the per-call timeout and turn a panicking notifier into a failure.
async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, NotifierError>
where
    F: Future<Output = Result<T, NotifierError>>,
{
    match tokio::time::timeout(limit, AssertUnwindSafe(call).catch_unwind()).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(NotifierError::Unreachable("notifier panicked".to_string())),
        Err(_) => Err(NotifierError::Timeout(limit)),
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::TimeZone;

    use super::*;
    use crate::clock::ManualClock;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Behavior {
        Succeed,
        Fail,
        Panic,
        Hang,
    }

    /// One fake standing in for all three ports; records call order.
    pub(crate) struct FakeNotifier {
        pub hotline: Behavior,
        pub emergency: Behavior,
        pub contact: Behavior,
        pub rejected_contacts: Vec<String>,
        pub calls: Mutex<Vec<String>>,
        pub finished: AtomicBool,
        pub delay: Option<Duration>,
    }

    impl FakeNotifier {
        pub(crate) fn new(hotline: Behavior, emergency: Behavior, contact: Behavior) -> Self {
            Self {
                hotline,
                emergency,
                contact,
                rejected_contacts: Vec::new(),
                calls: Mutex::new(Vec::new()),
                finished: AtomicBool::new(false),
                delay: None,
            }
        }

        pub(crate) fn reachable() -> Self {
            Self::new(Behavior::Succeed, Behavior::Succeed, Behavior::Succeed)
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        async fn act(&self, label: String, behavior: Behavior) -> Result<String, NotifierError> {
            self.calls.lock().unwrap().push(label.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let result = match behavior {
                Behavior::Succeed => Ok(format!("{label}-1")),
                Behavior::Fail => Err(NotifierError::Unreachable(format!("{label} down"))),
                Behavior::Panic => panic!("{label} exploded"),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(format!("{label}-late"))
                }
            };
            self.finished.store(true, Ordering::SeqCst);
            result
        }
    }

    #[async_trait]
    impl HotlineNotifier for FakeNotifier {
        async fn connect(&self, _request: HotlineRequest) -> Result<HotlineSession, NotifierError> {
            self.act("hotline".into(), self.hotline)
                .await
                .map(|session_id| HotlineSession { session_id })
        }
    }

    #[async_trait]
    impl EmergencyNotifier for FakeNotifier {
        async fn dispatch(
            &self,
            _request: EmergencyRequest,
        ) -> Result<EmergencyDispatch, NotifierError> {
            self.act("emergency".into(), self.emergency)
                .await
                .map(|dispatch_id| EmergencyDispatch { dispatch_id })
        }
    }

    #[async_trait]
    impl ContactNotifier for FakeNotifier {
        async fn notify(&self, message: ContactMessage) -> Result<ContactReceipt, NotifierError> {
            let label = format!("contact:{}", message.contact.id);
            if self.rejected_contacts.contains(&message.contact.id) {
                self.calls.lock().unwrap().push(label);
                return Err(NotifierError::Rejected("carrier refused".into()));
            }
            self.act(label, self.contact)
                .await
                .map(|message_id| ContactReceipt { message_id })
        }
    }

    pub(crate) fn orchestrator(fake: Arc<FakeNotifier>) -> EscalationOrchestrator {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 1, 22, 15, 0).unwrap());
        EscalationOrchestrator::new(
            fake.clone(),
            fake.clone(),
            fake,
            EscalationConfig::default(),
            Arc::new(clock),
        )
    }

    /// Outcome with the given steps, as if produced by a real run.
    pub(crate) fn outcome_with(
        steps: &[(EscalationStep, bool)],
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> EscalationOutcome {
        let steps: Vec<StepResult> = steps
            .iter()
            .map(|(step, succeeded)| {
                if *succeeded {
                    StepResult::success(*step, "ok")
                } else {
                    StepResult::failure(*step, "down", Vec::new(), "call directly".into())
                }
            })
            .collect();
        let any_ok = steps.iter().any(|s| s.succeeded);
        let any_failed = steps.iter().any(|s| !s.succeeded);
        EscalationOutcome {
            overall_success: !steps.is_empty() && !any_failed,
            partial_success: any_ok && any_failed,
            steps_attempted: steps,
            escalation_level: EscalationLevel::Immediate,
            fallback_guidance: Vec::new(),
            started_at,
            completed_at,
        }
    }

    pub(crate) fn contact(id: &str, phone: &str) -> Contact {
        Contact {
            id: id.to_string(),
            name: format!("Contact {id}"),
            phone: Some(phone.to_string()),
            email: None,
            relationship: Some("sibling".into()),
            kind: ContactKind::EmergencyContact,
        }
    }

    fn imminent_request() -> EscalationRequest {
        EscalationRequest {
            user_id: Uuid::now_v7(),
            risk_level: RiskLevel::Critical,
            triggers: vec![
                "suicidal_plan".into(),
                "means_available".into(),
                "timeline_immediate".into(),
            ],
            location: Some(Location {
                lat: 40.7128,
                lng: -74.006,
            }),
            emergency_contacts: vec![contact("c1", "+1 555 010 0101")],
            language: None,
        }
    }

    #[tokio::test]
    async fn all_reachable_critical_escalation_succeeds_immediately() {
        let fake = Arc::new(FakeNotifier::reachable());
        let outcome = orchestrator(fake.clone()).escalate(imminent_request()).await;

        assert!(outcome.overall_success);
        assert!(!outcome.partial_success);
        assert_eq!(outcome.escalation_level, EscalationLevel::Immediate);
        assert_eq!(outcome.steps_attempted.len(), 3);
        assert!(outcome.steps_attempted.iter().all(|s| s.succeeded));
        assert!(outcome.fallback_guidance.is_empty());
        assert_eq!(
            outcome.step(EscalationStep::Hotline).unwrap().session_id.as_deref(),
            Some("hotline-1")
        );
        assert_eq!(
            outcome
                .step(EscalationStep::ContactNotification)
                .unwrap()
                .notifications_sent,
            Some(1)
        );
    }

    #[tokio::test]
    async fn steps_run_in_canonical_order() {
        let fake = Arc::new(FakeNotifier::reachable());
        orchestrator(fake.clone()).escalate(imminent_request()).await;
        assert_eq!(fake.calls(), vec!["hotline", "emergency", "contact:c1"]);
    }

    #[tokio::test]
    async fn failed_hotline_does_not_stop_later_steps() {
        let fake = Arc::new(FakeNotifier::new(
            Behavior::Fail,
            Behavior::Succeed,
            Behavior::Succeed,
        ));
        let outcome = orchestrator(fake.clone()).escalate(imminent_request()).await;

        assert!(outcome.partial_success);
        assert!(!outcome.overall_success);
        let hotline = outcome.step(EscalationStep::Hotline).unwrap();
        assert!(!hotline.succeeded);
        assert_eq!(
            hotline.fallback_resources,
            vec!["crisis_text_line", "local_crisis_centers"]
        );
        assert_eq!(
            hotline.fallback_instruction.as_deref(),
            Some("call or text 988 directly")
        );
        assert!(outcome.step(EscalationStep::EmergencyServices).unwrap().succeeded);
        assert!(outcome.step(EscalationStep::ContactNotification).unwrap().succeeded);
        assert_eq!(outcome.escalation_level, EscalationLevel::Immediate);
        assert!(
            outcome
                .fallback_guidance
                .contains(&"crisis_text_line".to_string())
        );
    }

    #[tokio::test]
    async fn panicking_notifier_becomes_a_failed_step() {
        let fake = Arc::new(FakeNotifier::new(
            Behavior::Panic,
            Behavior::Succeed,
            Behavior::Succeed,
        ));
        let outcome = orchestrator(fake).escalate(imminent_request()).await;

        let hotline = outcome.step(EscalationStep::Hotline).unwrap();
        assert!(!hotline.succeeded);
        assert!(hotline.detail.contains("panicked"));
        assert!(outcome.partial_success);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_notifier_times_out_without_blocking_others() {
        let fake = Arc::new(FakeNotifier::new(
            Behavior::Hang,
            Behavior::Succeed,
            Behavior::Succeed,
        ));
        let outcome = orchestrator(fake).escalate(imminent_request()).await;

        let hotline = outcome.step(EscalationStep::Hotline).unwrap();
        assert!(!hotline.succeeded);
        assert!(hotline.detail.starts_with("timed out"));
        assert!(outcome.step(EscalationStep::EmergencyServices).unwrap().succeeded);
        assert!(outcome.step(EscalationStep::ContactNotification).unwrap().succeeded);
    }

    #[tokio::test]
    async fn total_failure_still_returns_direct_dial_guidance() {
        let fake = Arc::new(FakeNotifier::new(
            Behavior::Fail,
            Behavior::Fail,
            Behavior::Fail,
        ));
        let outcome = orchestrator(fake).escalate(imminent_request()).await;

        assert!(!outcome.overall_success);
        assert!(!outcome.partial_success);
        assert_eq!(outcome.steps_attempted.len(), 3);
        assert_eq!(outcome.escalation_level, EscalationLevel::Immediate);
        assert!(outcome.fallback_guidance.contains(&"dial 911 directly".to_string()));
        assert!(outcome.fallback_guidance.contains(&"988".to_string()));
        assert!(
            outcome
                .fallback_guidance
                .contains(&"call or text 988 directly".to_string())
        );
    }

    #[tokio::test]
    async fn moderate_risk_only_notifies_contacts() {
        let fake = Arc::new(FakeNotifier::reachable());
        let mut request = imminent_request();
        request.risk_level = RiskLevel::Moderate;
        request.triggers.clear();

        let outcome = orchestrator(fake.clone()).escalate(request).await;
        assert_eq!(fake.calls(), vec!["contact:c1"]);
        assert_eq!(outcome.steps_attempted.len(), 1);
        assert!(outcome.overall_success);
        assert_eq!(outcome.escalation_level, EscalationLevel::Supportive);
    }

    #[tokio::test]
    async fn nothing_attempted_is_neither_success_nor_partial() {
        let fake = Arc::new(FakeNotifier::reachable());
        let request = EscalationRequest {
            user_id: Uuid::now_v7(),
            risk_level: RiskLevel::Low,
            triggers: Vec::new(),
            location: None,
            emergency_contacts: vec![contact("c1", "555-010-0101")],
            language: None,
        };

        let outcome = orchestrator(fake.clone()).escalate(request).await;
        assert!(outcome.steps_attempted.is_empty());
        assert!(!outcome.overall_success);
        assert!(!outcome.partial_success);
        assert_eq!(outcome.escalation_level, EscalationLevel::Routine);
        assert!(outcome.fallback_guidance.is_empty());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn high_risk_without_imminent_triggers_skips_emergency_services() {
        let fake = Arc::new(FakeNotifier::reachable());
        let mut request = imminent_request();
        request.risk_level = RiskLevel::High;
        request.triggers = vec!["suicidal_plan".into()];
        request.emergency_contacts.clear();

        let outcome = orchestrator(fake.clone()).escalate(request).await;
        assert_eq!(fake.calls(), vec!["hotline"]);
        assert_eq!(outcome.escalation_level, EscalationLevel::Immediate);
    }

    #[tokio::test]
    async fn imminent_marker_triggers_emergency_services_below_critical() {
        let mut request = imminent_request();
        request.risk_level = RiskLevel::High;
        assert!(needs_emergency_services(&request));

        request.triggers = vec!["Imminent".into()];
        assert!(needs_emergency_services(&request));

        request.triggers = vec!["suicidal_plan".into(), "means_available".into()];
        assert!(!needs_emergency_services(&request));
    }

    #[tokio::test]
    async fn contact_failures_are_independent() {
        let mut fake = FakeNotifier::reachable();
        fake.rejected_contacts = vec!["c3".into()];
        let fake = Arc::new(fake);
        let mut request = imminent_request();
        request.emergency_contacts = vec![
            contact("c1", "+1 555 010 0101"),
            contact("c2", "12"),
            contact("c3", "+1 555 010 0103"),
        ];

        let outcome = orchestrator(fake).escalate(request).await;
        let step = outcome.step(EscalationStep::ContactNotification).unwrap();
        assert!(step.succeeded);
        assert_eq!(step.notifications_sent, Some(1));
        let failed: Vec<&str> = step.errors.iter().map(|e| e.contact_id.as_str()).collect();
        assert_eq!(failed, vec!["c2", "c3"]);
        assert!(step.errors[0].message.contains("invalid phone number"));
        assert!(outcome.overall_success);
    }

    #[tokio::test]
    async fn bad_phone_falls_back_to_email() {
        let fake = Arc::new(FakeNotifier::reachable());
        let mut sister = contact("c1", "ext. 12");
        sister.email = Some("sister@example.com".into());
        let mut unreachable = contact("c2", "ext. 34");
        unreachable.email = Some("not-an-address".into());
        let mut request = imminent_request();
        request.risk_level = RiskLevel::Moderate;
        request.triggers.clear();
        request.emergency_contacts = vec![sister, unreachable];

        let outcome = orchestrator(fake.clone()).escalate(request).await;
        let step = outcome.step(EscalationStep::ContactNotification).unwrap();
        assert!(step.succeeded);
        assert_eq!(step.notifications_sent, Some(1));
        assert_eq!(fake.calls(), vec!["contact:c1"]);
        assert_eq!(step.errors.len(), 1);
        assert_eq!(step.errors[0].contact_id, "c2");
        assert!(step.errors[0].message.contains("invalid phone number 'ext. 34'"));
        assert!(step.errors[0].message.contains("invalid email 'not-an-address'"));
    }

    #[test]
    fn contact_validation_accepts_either_channel() {
        let mut by_email = contact("c1", "12");
        by_email.email = Some("friend@example.com".into());
        assert!(by_email.validate().is_ok());

        let mut by_phone = contact("c2", "(555) 010-0101");
        by_phone.email = Some("broken".into());
        assert!(by_phone.validate().is_ok());

        let mut neither = contact("c3", "1");
        neither.phone = None;
        assert_eq!(
            neither.validate(),
            Err(NotifierError::InvalidRecipient(
                "contact has neither phone nor email".into()
            ))
        );
    }

    #[tokio::test]
    async fn failed_high_risk_hotline_is_supportive_not_immediate() {
        let fake = Arc::new(FakeNotifier::new(
            Behavior::Fail,
            Behavior::Succeed,
            Behavior::Succeed,
        ));
        let mut request = imminent_request();
        request.risk_level = RiskLevel::High;
        request.triggers.clear();

        let outcome = orchestrator(fake).escalate(request).await;
        assert_eq!(outcome.escalation_level, EscalationLevel::Supportive);
        assert!(outcome.partial_success);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_caller_does_not_cancel_in_flight_notifications() {
        let mut fake = FakeNotifier::reachable();
        fake.delay = Some(Duration::from_secs(1));
        let fake = Arc::new(fake);
        let orchestrator = orchestrator(fake.clone());

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            orchestrator.escalate(imminent_request()),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(!fake.finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(fake.finished.load(Ordering::SeqCst));
        assert_eq!(fake.calls(), vec!["hotline", "emergency", "contact:c1"]);
    }

    #[test]
    fn stages_advance_to_done() {
        let mut stage = EscalationStage::NotStarted;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(
            seen,
            vec![
                EscalationStage::NotStarted,
                EscalationStage::HotlineAttempted,
                EscalationStage::EmergencyAttempted,
                EscalationStage::ContactsAttempted,
                EscalationStage::Done,
            ]
        );
    }
}
