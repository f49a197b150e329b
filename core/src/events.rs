use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::assessment::CrisisAssessment;
use crate::escalation::EscalationOutcome;

/// A finalized assessment for one user. Append-only: the only later change
/// is attaching an escalation outcome that arrives after the event was written.
///
/// `encrypted_content` is an opaque blob produced by the content cipher; the
/// store never sees plaintext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisEvent {
    /// UUIDv7 unless the caller supplied one
    pub id: Uuid,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub assessment: CrisisAssessment,
    pub escalation: Option<EscalationOutcome>,
    #[serde(skip)]
    pub encrypted_content: Vec<u8>,
}

/// Request to record an event.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewCrisisEvent {
    /// Caller-generated id for idempotent retries
    #[serde(default)]
    pub id: Option<Uuid>,
    pub user_id: Uuid,
    /// When the assessed entry was written (defaults to now)
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub assessment: CrisisAssessment,
    #[serde(default)]
    pub escalation: Option<EscalationOutcome>,
    /// Plaintext entry; encrypted before it reaches the store
    #[serde(default)]
    pub content: Option<String>,
}

/// An event as returned to its owner, with content decrypted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CrisisEventView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub assessment: CrisisAssessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Response for history reads.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    /// Newest first
    pub events: Vec<CrisisEventView>,
    /// Maximum number of events retained per user
    pub cap: usize,
}
