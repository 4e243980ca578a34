//! Entry log repository

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use palegate_types::{EntryFlag, EntryStatus};

use crate::{DbResult, EntryLogRow, NewEntryLog};

/// Replica fields applied by the backend ingestion path.
///
/// Only the last-writer-wins columns are touched on conflict; `created_at`
/// and the device columns keep their first-seen values.
#[derive(Debug, Clone)]
pub struct EntryReplica {
    pub id: Uuid,
    pub roll: String,
    pub status: EntryStatus,
    pub entry_flag: EntryFlag,
    pub laptop: Option<String>,
    pub extra: Vec<Value>,
    pub scanned_at: DateTime<Utc>,
}

pub struct EntryRepo;

impl EntryRepo {
    /// Insert a fully-specified entry row
    pub async fn insert(exec: impl SqliteExecutor<'_>, new: &NewEntryLog) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO entry_logs
                (id, roll, status, entry_flag, laptop, extra, device_meta,
                 source, os, device_id, created_at, scanned_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.id)
        .bind(&new.roll)
        .bind(new.status)
        .bind(new.entry_flag)
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

    /// Find an entry by its id
    pub async fn find_by_id(
        exec: impl SqliteExecutor<'_>,
        id: Uuid,
    ) -> DbResult<Option<EntryLogRow>> {
        let row = sqlx::query_as::<_, EntryLogRow>(
            r#"
            SELECT id, roll, status, entry_flag, laptop, extra, device_meta,
                   source, os, device_id, created_at, scanned_at
            FROM entry_logs
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(exec)
        .await?;

        Ok(row)
    }

    /// All still-open (ENTERED) entries for a roll, oldest first
    pub async fn find_open_by_roll(
        exec: impl SqliteExecutor<'_>,
        roll: &str,
    ) -> DbResult<Vec<EntryLogRow>> {
        let rows = sqlx::query_as::<_, EntryLogRow>(
            r#"
            SELECT id, roll, status, entry_flag, laptop, extra, device_meta,
                   source, os, device_id, created_at, scanned_at
            FROM entry_logs
            WHERE roll = ? AND status = 'ENTERED'
            ORDER BY created_at ASC
            "#,
        )
        .bind(roll)
        .fetch_all(exec)
        .await?;

        Ok(rows)
    }

    /// Most recent open entry for a roll (emergency exit resolution)
    pub async fn find_latest_open_by_roll(
        exec: impl SqliteExecutor<'_>,
        roll: &str,
    ) -> DbResult<Option<EntryLogRow>> {
        let row = sqlx::query_as::<_, EntryLogRow>(
            r#"
            SELECT id, roll, status, entry_flag, laptop, extra, device_meta,
                   source, os, device_id, created_at, scanned_at
            FROM entry_logs
            WHERE roll = ? AND status = 'ENTERED'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(roll)
        .fetch_optional(exec)
        .await?;

        Ok(row)
    }

    /// Open entries older than the cutoff (midnight closer input)
    pub async fn find_stale_open(
        exec: impl SqliteExecutor<'_>,
        cutoff: DateTime<Utc>,
    ) -> DbResult<Vec<EntryLogRow>> {
        let rows = sqlx::query_as::<_, EntryLogRow>(
            r#"
            SELECT id, roll, status, entry_flag, laptop, extra, device_meta,
                   source, os, device_id, created_at, scanned_at
            FROM entry_logs
            WHERE status = 'ENTERED' AND created_at <= ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(exec)
        .await?;

        Ok(rows)
    }

    /// Bulk-expire every open entry of a roll (forced-entry displacement).
    /// Callers must snapshot the affected rows *before* this update.
    pub async fn expire_open_for_roll(
        exec: impl SqliteExecutor<'_>,
        roll: &str,
        scanned_at: DateTime<Utc>,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE entry_logs SET status = 'EXPIRED', scanned_at = ? \
             WHERE roll = ? AND status = 'ENTERED'",
        )
        .bind(scanned_at)
        .bind(roll)
        .execute(exec)
        .await?;

        Ok(result.rows_affected())
    }

    /// Expire one entry (expired-token presentation, midnight closer)
    pub async fn mark_expired(
        exec: impl SqliteExecutor<'_>,
        id: Uuid,
        scanned_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result =
            sqlx::query("UPDATE entry_logs SET status = 'EXPIRED', scanned_at = ? WHERE id = ?")
                .bind(scanned_at)
                .bind(id)
                .execute(exec)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Close an entry at exit time. `scanned_at` records the entry scan and
    /// is deliberately left untouched.
    pub async fn mark_exited(exec: impl SqliteExecutor<'_>, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query("UPDATE entry_logs SET status = 'EXITED' WHERE id = ?")
            .bind(id)
            .execute(exec)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Ensure a skeletal PENDING row exists so an early EXIT replica can hold
    /// its foreign key; a later ENTRY replica fills it in.
    pub async fn get_or_create_pending(
        exec: impl SqliteExecutor<'_>,
        id: Uuid,
        roll: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO entry_logs (id, roll, status, extra, device_meta, created_at)
            VALUES (?, ?, 'PENDING', '[]', '{}', ?)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(roll)
        .bind(now)
        .execute(exec)
        .await?;

        Ok(())
    }

    /// Last-writer-wins apply of a replicated entry event
    pub async fn upsert_replica(
        exec: impl SqliteExecutor<'_>,
        replica: &EntryReplica,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO entry_logs
                (id, roll, status, entry_flag, laptop, extra, device_meta, created_at, scanned_at)
            VALUES (?, ?, ?, ?, ?, ?, '{}', ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                roll = excluded.roll,
                scanned_at = excluded.scanned_at,
                status = excluded.status,
                entry_flag = excluded.entry_flag,
                laptop = excluded.laptop,
                extra = excluded.extra
            "#,
        )
        .bind(replica.id)
        .bind(&replica.roll)
        .bind(replica.status)
        .bind(replica.entry_flag)
        .bind(&replica.laptop)
        .bind(Json(&replica.extra))
        .bind(now)
        .bind(replica.scanned_at)
        .execute(exec)
        .await?;

        Ok(())
    }

    /// Entries in a window, oldest first (repair replay)
    pub async fn list_range(
        exec: impl SqliteExecutor<'_>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        roll: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<EntryLogRow>> {
        let rows = sqlx::query_as::<_, EntryLogRow>(
            r#"
            SELECT id, roll, status, entry_flag, laptop, extra, device_meta,
                   source, os, device_id, created_at, scanned_at
            FROM entry_logs
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

    /// Materialised entries created since a moment (dashboard)
    pub async fn count_created_since(
        exec: impl SqliteExecutor<'_>,
        since: DateTime<Utc>,
    ) -> DbResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM entry_logs \
             WHERE created_at >= ? AND status IN ('ENTERED', 'EXITED', 'EXPIRED')",
        )
        .bind(since)
        .fetch_one(exec)
        .await?;

        Ok(count)
    }

    /// People currently inside (status ENTERED)
    pub async fn count_open(exec: impl SqliteExecutor<'_>) -> DbResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM entry_logs WHERE status = 'ENTERED'")
                .fetch_one(exec)
                .await?;

        Ok(count)
    }

    /// Totals per entry flag (dashboard)
    pub async fn flag_totals(exec: impl SqliteExecutor<'_>) -> DbResult<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT entry_flag, COUNT(*) FROM entry_logs \
             WHERE entry_flag IS NOT NULL GROUP BY entry_flag",
        )
        .fetch_all(exec)
        .await?;

        Ok(rows)
    }
}
