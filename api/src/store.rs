//! Postgres implementations of the event and settings stores.

use async_trait::async_trait;
use beacon_core::error::CrisisError;
use beacon_core::escalation::EscalationOutcome;
use beacon_core::events::CrisisEvent;
use beacon_core::settings::UserCrisisSettings;
use beacon_core::store::{EventStore, SettingsStore};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

fn unavailable(err: sqlx::Error) -> CrisisError {
    tracing::error!("crisis store query failed: {:?}", err);
    CrisisError::StoreUnavailable(err.to_string())
}

fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, CrisisError> {
    serde_json::to_value(value)
        .map_err(|e| CrisisError::StoreUnavailable(format!("failed to encode row: {e}")))
}

#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    cap: usize,
}

impl PgEventStore {
    pub fn new(pool: PgPool, cap: usize) -> Self {
        Self {
            pool,
            cap: cap.max(1),
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, event: CrisisEvent) -> Result<bool, CrisisError> {
        let assessment = encode(&event.assessment)?;
        let escalation = event.escalation.as_ref().map(encode).transpose()?;

        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        // Serializes appends per user so the cap check and eviction see a stable log.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(event.user_id)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO crisis_events
                (id, user_id, occurred_at, assessment, escalation, encrypted_content)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, id) DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(event.timestamp)
        .bind(&assessment)
        .bind(&escalation)
        .bind(&event.encrypted_content)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?
        .rows_affected()
            == 1;

        if inserted {
            let evicted = sqlx::query(
                r#"
                DELETE FROM crisis_events
                WHERE user_id = $1
                  AND seq NOT IN (
                      SELECT seq FROM crisis_events
                      WHERE user_id = $1
                      ORDER BY seq DESC
                      LIMIT $2
                  )
                "#,
            )
            .bind(event.user_id)
            .bind(self.cap as i64)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?
            .rows_affected();
            if evicted > 0 {
                tracing::debug!(user_id = %event.user_id, evicted, "evicted oldest crisis events");
            }
        }

        tx.commit().await.map_err(unavailable)?;
        Ok(inserted)
    }

    async fn attach_escalation(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        outcome: EscalationOutcome,
    ) -> Result<(), CrisisError> {
        let outcome = encode(&outcome)?;
        let updated = sqlx::query(
            r#"
            UPDATE crisis_events SET escalation = $3
            WHERE user_id = $1 AND id = $2 AND escalation IS NULL
            "#,
        )
        .bind(user_id)
        .bind(event_id)
        .bind(&outcome)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?
        .rows_affected();

        if updated == 0 {
            return Err(CrisisError::StoreUnavailable(format!(
                "event {event_id} not found or already has an escalation outcome"
            )));
        }
        Ok(())
    }

    async fn history(
        &self,
        user_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<CrisisEvent>, CrisisError> {
        let limit = limit.unwrap_or(self.cap).min(self.cap) as i64;
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, user_id, occurred_at, assessment, escalation, encrypted_content
            FROM crisis_events
            WHERE user_id = $1
            ORDER BY seq DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    fn cap(&self) -> usize {
        self.cap
    }

    async fn ping(&self) -> Result<(), CrisisError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(unavailable)
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    user_id: Uuid,
    occurred_at: DateTime<Utc>,
    assessment: serde_json::Value,
    escalation: Option<serde_json::Value>,
    encrypted_content: Vec<u8>,
}

impl EventRow {
    fn into_event(self) -> Result<CrisisEvent, CrisisError> {
        let corrupt = |e: serde_json::Error| {
            CrisisError::StoreUnavailable(format!("event {} is unreadable: {e}", self.id))
        };
        Ok(CrisisEvent {
            id: self.id,
            user_id: self.user_id,
            timestamp: self.occurred_at,
            assessment: serde_json::from_value(self.assessment.clone()).map_err(corrupt)?,
            escalation: self
                .escalation
                .clone()
                .map(serde_json::from_value)
                .transpose()
                .map_err(corrupt)?,
            encrypted_content: self.encrypted_content.clone(),
        })
    }
}

#[derive(Clone)]
pub struct PgSettingsStore {
    pool: PgPool,
}

impl PgSettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<UserCrisisSettings>, CrisisError> {
        let row = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT settings FROM crisis_settings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.map(|value| {
            serde_json::from_value(value).map_err(|e| {
                CrisisError::StoreUnavailable(format!("settings for {user_id} are unreadable: {e}"))
            })
        })
        .transpose()
    }

    async fn save(&self, user_id: Uuid, settings: &UserCrisisSettings) -> Result<(), CrisisError> {
        let value = encode(settings)?;
        sqlx::query(
            r#"
            INSERT INTO crisis_settings (user_id, settings, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (user_id) DO UPDATE SET settings = EXCLUDED.settings, updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(&value)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use beacon_core::CrisisAssessment;
    use serde_json::json;

    use super::*;

    fn row(assessment: serde_json::Value) -> EventRow {
        EventRow {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            occurred_at: Utc::now(),
            assessment,
            escalation: None,
            encrypted_content: vec![1, 2, 3],
        }
    }

    #[test]
    fn rows_decode_into_events() {
        let assessment = CrisisAssessment::from_score(12.0, Vec::new());
        let event = row(serde_json::to_value(&assessment).unwrap())
            .into_event()
            .unwrap();
        assert_eq!(event.assessment, assessment);
        assert_eq!(event.encrypted_content, vec![1, 2, 3]);
        assert!(event.escalation.is_none());
    }

    #[test]
    fn corrupt_rows_surface_as_store_errors() {
        let err = row(json!({ "risk_level": "severe" })).into_event().unwrap_err();
        assert!(matches!(err, CrisisError::StoreUnavailable(_)));
    }
}
