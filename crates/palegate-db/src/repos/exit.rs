//! Exit log repository

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use palegate_types::ExitFlag;

use crate::{DbResult, ExitLogRow, NewExitLog};

/// Replica fields applied by the backend ingestion path
#[derive(Debug, Clone)]
pub struct ExitReplica {
    pub id: Uuid,
    pub roll: String,
    pub entry_id: Option<Uuid>,
    pub exit_flag: ExitFlag,
    pub laptop: Option<String>,
    pub extra: Vec<Value>,
    pub device_meta: Map<String, Value>,
    pub scanned_at: DateTime<Utc>,
}

pub struct ExitRepo;

impl ExitRepo {
    /// Insert an exit row; exits are never mutated after insert
    pub async fn insert(exec: impl SqliteExecutor<'_>, new: &NewExitLog) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO exit_logs
                (id, roll, entry_id, exit_flag, laptop, extra, device_meta,
                 source, os, device_id, created_at, scanned_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.id)
        .bind(&new.roll)
        .bind(new.entry_id)
        .bind(new.exit_flag)
        .bind(&new.laptop)
        .bind(Json(&new.extra))
        .bind(Json(&new.device_meta))
        .bind(&new.source)
        .bind(&new.os)
        .bind(&new.device_id)
        .bind(new.created_at)
        .bind(new.scanned_at)
        .execute(exec)
        .await?;

        Ok(())
    }

    /// Find an exit by its id
    pub async fn find_by_id(
        exec: impl SqliteExecutor<'_>,
        id: Uuid,
    ) -> DbResult<Option<ExitLogRow>> {
        let row = sqlx::query_as::<_, ExitLogRow>(
            r#"
            SELECT id, roll, entry_id, exit_flag, laptop, extra, device_meta,
                   source, os, device_id, created_at, scanned_at
            FROM exit_logs
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(exec)
        .await?;

        Ok(row)
    }

    /// Exits referencing an entry (duplicate-exit detection)
    pub async fn exists_for_entry(exec: impl SqliteExecutor<'_>, entry_id: Uuid) -> DbResult<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM exit_logs WHERE entry_id = ?")
                .bind(entry_id)
                .fetch_one(exec)
                .await?;

        Ok(count > 0)
    }

    /// All exits referencing an entry
    pub async fn find_for_entry(
        exec: impl SqliteExecutor<'_>,
        entry_id: Uuid,
    ) -> DbResult<Vec<ExitLogRow>> {
        let rows = sqlx::query_as::<_, ExitLogRow>(
            r#"
            SELECT id, roll, entry_id, exit_flag, laptop, extra, device_meta,
                   source, os, device_id, created_at, scanned_at
            FROM exit_logs
            WHERE entry_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(entry_id)
        .fetch_all(exec)
        .await?;

        Ok(rows)
    }

    /// Last-writer-wins apply of a replicated exit event
    pub async fn upsert_replica(
        exec: impl SqliteExecutor<'_>,
        replica: &ExitReplica,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO exit_logs
                (id, roll, entry_id, exit_flag, laptop, extra, device_meta, created_at, scanned_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                roll = excluded.roll,
                entry_id = excluded.entry_id,
                scanned_at = excluded.scanned_at,
                exit_flag = excluded.exit_flag,
                laptop = excluded.laptop,
                extra = excluded.extra,
                device_meta = excluded.device_meta
            "#,
        )
        .bind(replica.id)
        .bind(&replica.roll)
        .bind(replica.entry_id)
        .bind(replica.exit_flag)
        .bind(&replica.laptop)
        .bind(Json(&replica.extra))
        .bind(Json(&replica.device_meta))
        .bind(now)
        .bind(replica.scanned_at)
        .execute(exec)
        .await?;

        Ok(())
    }

    /// Exits in a window, oldest first (repair replay)
    pub async fn list_range(
        exec: impl SqliteExecutor<'_>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        roll: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<ExitLogRow>> {
        let rows = sqlx::query_as::<_, ExitLogRow>(
            r#"
            SELECT id, roll, entry_id, exit_flag, laptop, extra, device_meta,
                   source, os, device_id, created_at, scanned_at
            FROM exit_logs
            WHERE (? IS NULL OR created_at >= ?)
              AND (? IS NULL OR created_at <= ?)
              AND (? IS NULL OR roll = ?)
            ORDER BY created_at ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(since)
        .bind(since)
        .bind(until)
        .bind(until)
        .bind(roll)
        .bind(roll)
        .bind(limit)
        .bind(offset)
        .fetch_all(exec)
        .await?;

        Ok(rows)
    }

    /// Exits scanned since a moment (dashboard)
    pub async fn count_scanned_since(
        exec: impl SqliteExecutor<'_>,
        since: DateTime<Utc>,
    ) -> DbResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM exit_logs WHERE scanned_at >= ?")
                .bind(since)
                .fetch_one(exec)
                .await?;

        Ok(count)
    }

    /// Totals per exit flag (dashboard)
    pub async fn flag_totals(exec: impl SqliteExecutor<'_>) -> DbResult<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT exit_flag, COUNT(*) FROM exit_logs GROUP BY exit_flag")
                .fetch_all(exec)
                .await?;

        Ok(rows)
    }
}
