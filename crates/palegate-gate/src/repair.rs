//! Repair replayer
//!
//! Operator-invoked disaster recovery: re-emits the entire local log (entry
//! logs first, then exit logs) in the ordinary sync wire format, using each
//! *row's own UUID* as the `eventId`. Rows the backend already holds dedupe
//! into no-ops; anything it missed converges.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use palegate_db::{EntryLogRow, EntryRepo, ExitLogRow, ExitRepo, GateStore};
use palegate_types::{EntryEventBody, EventType, ExitEventBody};

use crate::config::GateConfig;
use crate::error::{GateError, GateResult};
use crate::sync::post_events;

/// Optional bounds on what gets replayed
#[derive(Debug, Clone, Default)]
pub struct RepairFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub roll: Option<String>,
}

/// Summary of one replay run
#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    pub entries_sent: usize,
    pub entries_acked: usize,
    pub exits_sent: usize,
    pub exits_acked: usize,
    pub rejected: usize,
}

pub struct RepairReplayer {
    store: GateStore,
    client: reqwest::Client,
    url: String,
    api_key: String,
    batch_size: usize,
}

impl RepairReplayer {
    pub fn new(store: GateStore, config: &GateConfig) -> GateResult<Self> {
        let url = config
            .backend_sync_url
            .clone()
            .ok_or_else(|| GateError::Config("BACKEND_SYNC_URL is not set".to_string()))?;
        let api_key = config
            .gate_api_key
            .clone()
            .ok_or_else(|| GateError::Config("GATE_API_KEY is not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.sync_timeout_seconds))
            .build()?;

        Ok(Self {
            store,
            client,
            url,
            api_key,
            batch_size: config.sync_batch_size,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Replay the filtered log to the backend
    pub async fn run(&self, filter: &RepairFilter) -> GateResult<RepairReport> {
        let mut report = RepairReport::default();

        let mut offset = 0i64;
        loop {
            let batch = EntryRepo::list_range(
                self.store.pool(),
                filter.since,
                filter.until,
                filter.roll.as_deref(),
                self.batch_size as i64,
                offset,
            )
            .await?;
            if batch.is_empty() {
                break;
            }

            let events: Vec<Value> = batch.iter().map(replay_entry_event).collect();
            let resp = post_events(&self.client, &self.url, &self.api_key, &events).await?;
            if !resp.rejected.is_empty() {
                warn!(
                    rejected = resp.rejected.len(),
                    first = ?resp.rejected.first(),
                    "repair entries: some events rejected"
                );
                report.rejected += resp.rejected.len();
            }
            info!(sent = batch.len(), acked = resp.acked_event_ids.len(), "repair entries: batch");
            report.entries_sent += batch.len();
            report.entries_acked += resp.acked_event_ids.len();
            offset += batch.len() as i64;
        }

        let mut offset = 0i64;
        loop {
            let batch = ExitRepo::list_range(
                self.store.pool(),
                filter.since,
                filter.until,
                filter.roll.as_deref(),
                self.batch_size as i64,
                offset,
            )
            .await?;
            if batch.is_empty() {
                break;
            }

            let events: Vec<Value> = batch.iter().map(replay_exit_event).collect();
            let resp = post_events(&self.client, &self.url, &self.api_key, &events).await?;
            if !resp.rejected.is_empty() {
                warn!(
                    rejected = resp.rejected.len(),
                    first = ?resp.rejected.first(),
                    "repair exits: some events rejected"
                );
                report.rejected += resp.rejected.len();
            }
            info!(sent = batch.len(), acked = resp.acked_event_ids.len(), "repair exits: batch");
            report.exits_sent += batch.len();
            report.exits_acked += resp.acked_event_ids.len();
            offset += batch.len() as i64;
        }

        info!(
            entries = report.entries_sent,
            exits = report.exits_sent,
            rejected = report.rejected,
            "repair: done"
        );
        Ok(report)
    }
}

/// The row's own id doubles as the deterministic eventId
fn replay_entry_event(row: &EntryLogRow) -> Value {
    let ts = row.scanned_at.unwrap_or(row.created_at);
    let body = EntryEventBody {
        entry_id: row.id,
        roll: row.roll.clone(),
        scanned_at: Some(ts),
        status: row.status,
        entry_flag: row.entry_flag,
        laptop: row.laptop.clone(),
        extra: row.extra.0.clone(),
        device_meta: row.device_meta.0.clone(),
        device_id: row.device_id.clone(),
        source: row.source.clone(),
        os: row.os.clone(),
    };

    envelope(serde_json::to_value(&body), row.id, EventType::Entry)
}

fn replay_exit_event(row: &ExitLogRow) -> Value {
    let ts = row.scanned_at.unwrap_or(row.created_at);
    let body = ExitEventBody {
        exit_id: row.id,
        entry_id: row.entry_id,
        roll: row.roll.clone(),
        scanned_at: Some(ts),
        exit_flag: row.exit_flag,
        laptop: row.laptop.clone(),
        extra: row.extra.0.clone(),
        device_meta: row.device_meta.0.clone(),
        device_id: row.device_id.clone(),
        source: row.source.clone(),
        os: row.os.clone(),
    };

    envelope(serde_json::to_value(&body), row.id, EventType::Exit)
}

fn envelope(
    body: Result<Value, serde_json::Error>,
    event_id: uuid::Uuid,
    event_type: EventType,
) -> Value {
    let mut payload = body.unwrap_or_else(|_| json!({}));
    if let Value::Object(ref mut map) = payload {
        map.insert("eventId".to_string(), json!(event_id));
        map.insert("type".to_string(), json!(event_type));
    }
    payload
}
