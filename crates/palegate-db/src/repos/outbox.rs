//! Durable replication outbox repository (gate only)

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use palegate_types::EventType;

use crate::{DbResult, OutboxEventRow};

/// Errors stored on a row are clipped to this length
const MAX_STORED_ERROR_LEN: usize = 2000;

pub struct OutboxRepo;

impl OutboxRepo {
    /// Append one event with a freshly generated id. The id is the
    /// idempotency key: stable across retries, unique across logical events.
    pub async fn emit(
        exec: impl SqliteExecutor<'_>,
        event_type: EventType,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> DbResult<Uuid> {
        let event_id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO gate_outbox_events (event_id, event_type, payload, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(event_id)
        .bind(event_type)
        .bind(Json(payload))
        .bind(now)
        .execute(exec)
        .await?;

        Ok(event_id)
    }

    /// Unsent rows that are due, oldest first
    pub async fn claim_due(
        exec: impl SqliteExecutor<'_>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> DbResult<Vec<OutboxEventRow>> {
        let rows = sqlx::query_as::<_, OutboxEventRow>(
            r#"
            SELECT event_id, event_type, payload, created_at, sent_at,
                   attempt_count, last_attempt_at, next_retry_at, last_error
            FROM gate_outbox_events
            WHERE sent_at IS NULL
              AND (next_retry_at IS NULL OR next_retry_at <= ?)
            ORDER BY created_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(exec)
        .await?;

        Ok(rows)
    }

    /// Record a backend ack. `sent_at` never transitions back to null, so
    /// the update is guarded on rows still unsent.
    pub async fn mark_acked(
        exec: impl SqliteExecutor<'_>,
        event_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE gate_outbox_events SET sent_at = ?, last_error = '' \
             WHERE event_id = ? AND sent_at IS NULL",
        )
        .bind(sent_at)
        .bind(event_id)
        .execute(exec)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a permanent rejection. The row is marked sent so it never
    /// loops, with the receiver's reason kept for operators.
    pub async fn mark_rejected(
        exec: impl SqliteExecutor<'_>,
        event_id: Uuid,
        error: &str,
        sent_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let message = clip(&format!("rejected: {error}"));
        let result = sqlx::query(
            "UPDATE gate_outbox_events \
             SET sent_at = ?, last_error = ?, last_attempt_at = ? \
             WHERE event_id = ? AND sent_at IS NULL",
        )
        .bind(sent_at)
        .bind(message)
        .bind(sent_at)
        .bind(event_id)
        .execute(exec)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Push a row to its next attempt after a transport failure
    pub async fn schedule_retry(
        exec: impl SqliteExecutor<'_>,
        event_id: Uuid,
        now: DateTime<Utc>,
        next_retry_at: DateTime<Utc>,
        error: &str,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE gate_outbox_events \
             SET attempt_count = attempt_count + 1, last_attempt_at = ?, \
                 next_retry_at = ?, last_error = ? \
             WHERE event_id = ?",
        )
        .bind(now)
        .bind(next_retry_at)
        .bind(clip(error))
        .bind(event_id)
        .execute(exec)
        .await?;

        Ok(())
    }

    /// Find one row by id
    pub async fn find_by_id(
        exec: impl SqliteExecutor<'_>,
        event_id: Uuid,
    ) -> DbResult<Option<OutboxEventRow>> {
        let row = sqlx::query_as::<_, OutboxEventRow>(
            r#"
            SELECT event_id, event_type, payload, created_at, sent_at,
                   attempt_count, last_attempt_at, next_retry_at, last_error
            FROM gate_outbox_events
            WHERE event_id = ?
            "#,
        )
        .bind(event_id)
        .fetch_optional(exec)
        .await?;

        Ok(row)
    }

    /// Every row, oldest first (tests and diagnostics)
    pub async fn find_all(exec: impl SqliteExecutor<'_>) -> DbResult<Vec<OutboxEventRow>> {
        let rows = sqlx::query_as::<_, OutboxEventRow>(
            r#"
            SELECT event_id, event_type, payload, created_at, sent_at,
                   attempt_count, last_attempt_at, next_retry_at, last_error
            FROM gate_outbox_events
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(exec)
        .await?;

        Ok(rows)
    }

    /// Rows still awaiting an ack
    pub async fn count_unsent(exec: impl SqliteExecutor<'_>) -> DbResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM gate_outbox_events WHERE sent_at IS NULL")
                .fetch_one(exec)
                .await?;

        Ok(count)
    }

    /// Rows dropped as permanently rejected (operator audit)
    pub async fn find_rejected(exec: impl SqliteExecutor<'_>) -> DbResult<Vec<OutboxEventRow>> {
        let rows = sqlx::query_as::<_, OutboxEventRow>(
            r#"
            SELECT event_id, event_type, payload, created_at, sent_at,
                   attempt_count, last_attempt_at, next_retry_at, last_error
            FROM gate_outbox_events
            WHERE last_error LIKE 'rejected: %'
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(exec)
        .await?;

        Ok(rows)
    }
}

fn clip(message: &str) -> String {
    if message.len() <= MAX_STORED_ERROR_LEN {
        return message.to_string();
    }
    let mut end = MAX_STORED_ERROR_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}
