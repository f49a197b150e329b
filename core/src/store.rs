//! Persistence ports and their in-memory implementations.
//!
//! The in-memory stores are the default when no database is configured and
//! the store used by tests. Each user's history sits behind its own lock so
//! appends for one user serialize while other users proceed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::CrisisError;
use crate::escalation::EscalationOutcome;
use crate::events::CrisisEvent;
use crate::settings::UserCrisisSettings;

pub const DEFAULT_HISTORY_CAP: usize = 100;

/// Capped, append-only per-user event log.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append unless an event with the same id is already stored for the
    /// user. Returns `true` when the event was inserted. The oldest events
    /// are evicted once the cap is exceeded.
    async fn append(&self, event: CrisisEvent) -> Result<bool, CrisisError>;

    /// Attach a late escalation outcome. Fails when the event is unknown or
    /// already has an outcome.
    async fn attach_escalation(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        outcome: EscalationOutcome,
    ) -> Result<(), CrisisError>;

    /// Newest first, at most `limit` (and never more than the cap).
    async fn history(&self, user_id: Uuid, limit: Option<usize>)
    -> Result<Vec<CrisisEvent>, CrisisError>;

    fn cap(&self) -> usize;

    async fn ping(&self) -> Result<(), CrisisError> {
        Ok(())
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self, user_id: Uuid) -> Result<Option<UserCrisisSettings>, CrisisError>;
    async fn save(&self, user_id: Uuid, settings: &UserCrisisSettings) -> Result<(), CrisisError>;
}

/// Encryption collaborator for event content. Stores only ever see the
/// sealed blob.
pub trait ContentCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CrisisError>;
    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CrisisError>;
}

type UserLog = Arc<Mutex<VecDeque<CrisisEvent>>>;

#[derive(Debug)]
pub struct InMemoryEventStore {
    cap: usize,
    logs: RwLock<HashMap<Uuid, UserLog>>,
}

impl InMemoryEventStore {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            logs: RwLock::new(HashMap::new()),
        }
    }

    async fn log_for(&self, user_id: Uuid) -> UserLog {
        if let Some(log) = self.logs.read().await.get(&user_id) {
            return log.clone();
        }
        self.logs
            .write()
            .await
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }

    async fn existing_log(&self, user_id: Uuid) -> Option<UserLog> {
        self.logs.read().await.get(&user_id).cloned()
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: CrisisEvent) -> Result<bool, CrisisError> {
        let log = self.log_for(event.user_id).await;
        let mut log = log.lock().await;
        if log.iter().any(|existing| existing.id == event.id) {
            return Ok(false);
        }
        log.push_back(event);
        while log.len() > self.cap {
            if let Some(evicted) = log.pop_front() {
                tracing::debug!(
                    user_id = %evicted.user_id,
                    event_id = %evicted.id,
                    "evicted oldest crisis event"
                );
            }
        }
        Ok(true)
    }

    async fn attach_escalation(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        outcome: EscalationOutcome,
    ) -> Result<(), CrisisError> {
        let log = self
            .existing_log(user_id)
            .await
            .ok_or_else(|| CrisisError::StoreUnavailable(format!("event {event_id} not found")))?;
        let mut log = log.lock().await;
        let event = log
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| CrisisError::StoreUnavailable(format!("event {event_id} not found")))?;
        if event.escalation.is_some() {
            return Err(CrisisError::StoreUnavailable(format!(
                "event {event_id} already has an escalation outcome"
            )));
        }
        event.escalation = Some(outcome);
        Ok(())
    }

    async fn history(
        &self,
        user_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<CrisisEvent>, CrisisError> {
        let Some(log) = self.existing_log(user_id).await else {
            return Ok(Vec::new());
        };
        let log = log.lock().await;
        let limit = limit.unwrap_or(self.cap).min(self.cap);
        Ok(log.iter().rev().take(limit).cloned().collect())
    }

    fn cap(&self) -> usize {
        self.cap
    }
}

#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    settings: RwLock<HashMap<Uuid, UserCrisisSettings>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<UserCrisisSettings>, CrisisError> {
        Ok(self.settings.read().await.get(&user_id).cloned())
    }

    async fn save(&self, user_id: Uuid, settings: &UserCrisisSettings) -> Result<(), CrisisError> {
        self.settings.write().await.insert(user_id, settings.clone());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::escalation::EscalationLevel;
    use crate::patterns::tests::event_at;
    use crate::risk::RiskLevel;

    /// Reversible stand-in so tests can check that content went through the cipher.
    #[derive(Debug, Default)]
    pub(crate) struct ReversingCipher;

    impl ContentCipher for ReversingCipher {
        fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CrisisError> {
            Ok(plaintext.iter().rev().copied().collect())
        }

        fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CrisisError> {
            Ok(blob.iter().rev().copied().collect())
        }
    }

    fn user_event(user_id: Uuid, minute: i64) -> CrisisEvent {
        let start = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        let mut event = event_at(start + Duration::minutes(minute), RiskLevel::Moderate);
        event.user_id = user_id;
        event
    }

    fn outcome() -> EscalationOutcome {
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 12, 5, 0).unwrap();
        EscalationOutcome {
            steps_attempted: Vec::new(),
            overall_success: false,
            partial_success: false,
            escalation_level: EscalationLevel::Routine,
            fallback_guidance: Vec::new(),
            started_at: at,
            completed_at: at,
        }
    }

    #[tokio::test]
    async fn overflow_evicts_the_oldest_event() {
        let store = InMemoryEventStore::new(3);
        let user = Uuid::now_v7();
        let events: Vec<CrisisEvent> = (0..4).map(|m| user_event(user, m)).collect();
        for event in &events {
            assert!(store.append(event.clone()).await.unwrap());
        }

        let history = store.history(user, None).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|e| e.id != events[0].id));
        assert_eq!(history[0].id, events[3].id);
        assert_eq!(history[2].id, events[1].id);
    }

    #[tokio::test]
    async fn append_is_idempotent_on_id() {
        let store = InMemoryEventStore::default();
        let user = Uuid::now_v7();
        let event = user_event(user, 0);
        assert!(store.append(event.clone()).await.unwrap());
        assert!(!store.append(event).await.unwrap());
        assert_eq!(store.history(user, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_is_per_user_and_limited() {
        let store = InMemoryEventStore::default();
        let (alice, bob) = (Uuid::now_v7(), Uuid::now_v7());
        for m in 0..5 {
            store.append(user_event(alice, m)).await.unwrap();
        }
        store.append(user_event(bob, 0)).await.unwrap();

        assert_eq!(store.history(alice, Some(2)).await.unwrap().len(), 2);
        assert_eq!(store.history(bob, None).await.unwrap().len(), 1);
        assert!(store.history(Uuid::now_v7(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn escalation_attaches_once() {
        let store = InMemoryEventStore::default();
        let user = Uuid::now_v7();
        let event = user_event(user, 0);
        let id = event.id;
        store.append(event).await.unwrap();

        store.attach_escalation(user, id, outcome()).await.unwrap();
        assert!(store.history(user, None).await.unwrap()[0].escalation.is_some());

        let again = store.attach_escalation(user, id, outcome()).await;
        assert!(matches!(again, Err(CrisisError::StoreUnavailable(_))));
        let unknown = store.attach_escalation(user, Uuid::now_v7(), outcome()).await;
        assert!(matches!(unknown, Err(CrisisError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn concurrent_appends_keep_the_cap() {
        let store = Arc::new(InMemoryEventStore::new(10));
        let user = Uuid::now_v7();
        let handles: Vec<_> = (0..50)
            .map(|m| {
                let store = store.clone();
                tokio::spawn(async move { store.append(user_event(user, m)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.history(user, None).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn settings_round_trip_per_user() {
        let store = InMemorySettingsStore::new();
        let user = Uuid::now_v7();
        assert!(store.load(user).await.unwrap().is_none());

        let settings = UserCrisisSettings {
            sensitivity: 0.9,
            ..UserCrisisSettings::default()
        };
        store.save(user, &settings).await.unwrap();
        assert_eq!(store.load(user).await.unwrap(), Some(settings));
        assert!(store.load(Uuid::now_v7()).await.unwrap().is_none());
    }
}
