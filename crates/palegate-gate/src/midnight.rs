//! Midnight closer
//!
//! Scheduled daily: closes stale ENTERED entries with a synthetic AUTO_EXIT
//! and feeds the resulting events into the ordinary replication outbox. Each
//! entry is its own transaction, so one failure never aborts the rest.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use palegate_db::{EntryLogRow, EntryRepo, ExitRepo, GateStore, NewExitLog};
use palegate_types::{EventType, ExitFlag};
use tracing::{error, info};

use crate::error::GateResult;
use crate::outbox;

/// Default staleness threshold in hours
pub const DEFAULT_STALE_HOURS: i64 = 20;

/// Summary of one closer run
#[derive(Debug, Clone, Default)]
pub struct MidnightReport {
    pub examined: usize,
    pub exits_created: usize,
    pub entries_expired: usize,
    pub failed: usize,
    pub dry_run: bool,
}

pub struct MidnightCloser {
    store: GateStore,
}

impl MidnightCloser {
    pub fn new(store: GateStore) -> Self {
        Self { store }
    }

    /// Close every ENTERED entry with `created_at <= now - hours`
    pub async fn run(&self, hours: i64, dry_run: bool) -> GateResult<MidnightReport> {
        let ts = Utc::now();
        let cutoff = ts - Duration::hours(hours);

        let stale = EntryRepo::find_stale_open(self.store.pool(), cutoff).await?;
        let mut report = MidnightReport {
            examined: stale.len(),
            dry_run,
            ..Default::default()
        };

        if stale.is_empty() {
            info!("auto_exit: no stale entries found");
            return Ok(report);
        }

        info!(count = stale.len(), hours, "auto_exit: found stale entries");

        if dry_run {
            for entry in stale.iter().take(10) {
                info!(entry_id = %entry.id, roll = %entry.roll, "auto_exit: would close");
            }
            if stale.len() > 10 {
                info!(more = stale.len() - 10, "auto_exit: additional entries omitted");
            }
            return Ok(report);
        }

        for entry in &stale {
            match self.close_one(entry, ts).await {
                Ok(()) => {
                    report.exits_created += 1;
                    report.entries_expired += 1;
                }
                Err(e) => {
                    error!(entry_id = %entry.id, error = %e, "auto_exit: error processing entry");
                    report.failed += 1;
                }
            }
        }

        info!(
            exits = report.exits_created,
            expired = report.entries_expired,
            failed = report.failed,
            "auto_exit: done"
        );
        Ok(report)
    }

    async fn close_one(&self, entry: &EntryLogRow, ts: DateTime<Utc>) -> GateResult<()> {
        let mut tx = self
            .store
            .pool()
            .begin()
            .await
            .map_err(palegate_db::DbError::from)?;

        let mut device_meta = serde_json::Map::new();
        device_meta.insert("source".to_string(), json!("midnight_job"));
        device_meta.insert("closedAt".to_string(), json!(ts));

        let exit = NewExitLog {
            id: Uuid::new_v4(),
            roll: entry.roll.clone(),
            entry_id: Some(entry.id),
            exit_flag: ExitFlag::AutoExit,
            laptop: entry.laptop.clone(),
            extra: entry.extra.0.clone(),
            device_meta,
            source: None,
            os: None,
            device_id: None,
            created_at: ts,
            scanned_at: Some(ts),
        };
        ExitRepo::insert(&mut *tx, &exit).await?;
        outbox::emit(&mut *tx, EventType::Exit, &outbox::exit_recorded(&exit), ts).await?;

        EntryRepo::mark_expired(&mut *tx, entry.id, ts).await?;
        let body = outbox::entry_expired_seen(
            entry.id,
            Some(&entry.roll),
            ts,
            entry.entry_flag,
            entry.laptop.as_deref(),
            &entry.extra.0,
        );
        outbox::emit(&mut *tx, EventType::EntryExpiredSeen, &body, ts).await?;

        tx.commit().await.map_err(palegate_db::DbError::from)?;
        Ok(())
    }
}
