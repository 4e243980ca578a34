//! Idempotency set repository (backend only)

use chrono::{DateTime, Utc};
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::{DbResult, ProcessedGateEventRow};

pub struct ProcessedRepo;

impl ProcessedRepo {
    /// Force-insert the event id. Returns `false` when the id was already
    /// present - the caller then acks without reapplying side effects.
    ///
    /// Run inside the per-event transaction: the unique primary key is the
    /// mutual-exclusion device for event application.
    pub async fn force_insert(
        exec: impl SqliteExecutor<'_>,
        event_id: Uuid,
        event_type: &str,
        received_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "INSERT INTO processed_gate_events (event_id, event_type, received_at) \
             VALUES (?, ?, ?)",
        )
        .bind(event_id)
        .bind(event_type)
        .bind(received_at)
        .execute(exec)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db))
                if db.kind() == sqlx::error::ErrorKind::UniqueViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether an event id has been applied
    pub async fn contains(exec: impl SqliteExecutor<'_>, event_id: Uuid) -> DbResult<bool> {
        let row = sqlx::query_as::<_, ProcessedGateEventRow>(
            "SELECT event_id, event_type, received_at FROM processed_gate_events WHERE event_id = ?",
        )
        .bind(event_id)
        .fetch_optional(exec)
        .await?;

        Ok(row.is_some())
    }

    /// Size of the idempotency set
    pub async fn count(exec: impl SqliteExecutor<'_>) -> DbResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM processed_gate_events")
            .fetch_one(exec)
            .await?;

        Ok(count)
    }
}
