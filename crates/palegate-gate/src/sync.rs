//! Outbox replication worker
//!
//! A single cooperative task alternating a claim query, an HTTP POST and a
//! sleep. Delivery is at-least-once: rows are only marked sent on an ack (or
//! an explicit reject), and transport failures push the whole batch onto an
//! exponential backoff schedule.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use palegate_db::{GateStore, OutboxEventRow, OutboxRepo};
use palegate_types::{SyncRequest, SyncResponse, GATE_API_KEY_HEADER};

use crate::config::GateConfig;
use crate::error::{GateError, GateResult};

/// Per-row retry delay cap: 5 minutes
const MAX_BACKOFF_SECS: f64 = 300.0;

/// What one non-empty tick did
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub batch: usize,
    pub acked: usize,
    pub rejected: usize,
    /// True when the batch hit a transport failure and was rescheduled
    pub retried: bool,
}

/// The gate -> backend replication worker
pub struct SyncWorker {
    store: GateStore,
    client: reqwest::Client,
    url: String,
    api_key: String,
    batch_size: usize,
    interval: Duration,
}

impl SyncWorker {
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
            .timeout(Duration::from_secs(config.sync_timeout_seconds))
            .build()?;

        Ok(Self {
            store,
            client,
            url,
            api_key,
            batch_size: config.sync_batch_size,
            interval: Duration::from_secs(config.sync_interval_seconds),
        })
    }

    /// Override the batch size (`--batch-size`); must stay at or below the
    /// server's `SYNC_MAX_EVENTS` or the whole batch bounces with 413.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Override the sleep between empty ticks (`--sleep`)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run forever; sleeping between empty batches is the natural
    /// suspension point for shutdown.
    pub async fn run(&self) -> GateResult<()> {
        loop {
            if self.run_once().await?.is_none() {
                tokio::time::sleep(self.interval).await;
            }
        }
    }

    /// One tick: claim a due batch, ship it, record the outcome.
    /// Returns `None` when the outbox had nothing due.
    pub async fn run_once(&self) -> GateResult<Option<TickOutcome>> {
        let now = Utc::now();

        // Short claim transaction; SQLite serialises writers, and a batch
        // double-claimed by a racing worker is deduplicated by the backend.
        let batch = {
            let mut tx = self
                .store
                .pool()
                .begin()
                .await
                .map_err(palegate_db::DbError::from)?;
            let rows = OutboxRepo::claim_due(&mut *tx, now, self.batch_size as i64).await?;
            tx.commit().await.map_err(palegate_db::DbError::from)?;
            rows
        };

        if batch.is_empty() {
            return Ok(None);
        }

        let events: Vec<Value> = batch.iter().map(stamp_envelope).collect();

        match post_events(&self.client, &self.url, &self.api_key, &events).await {
            Ok(resp) => {
                let sent_at = Utc::now();
                let mut acked = 0;
                for event_id in &resp.acked_event_ids {
                    if OutboxRepo::mark_acked(self.store.pool(), *event_id, sent_at).await? {
                        acked += 1;
                    }
                }

                let mut rejected = 0;
                for reject in &resp.rejected {
                    let Some(event_id) = reject
                        .event_id
                        .as_deref()
                        .and_then(|raw| Uuid::parse_str(raw).ok())
                    else {
                        continue;
                    };
                    // Rejects are permanent: retrying them would loop.
                    OutboxRepo::mark_rejected(self.store.pool(), event_id, &reject.error, sent_at)
                        .await?;
                    rejected += 1;
                }

                info!(batch = batch.len(), acked, rejected, "synced batch");
                Ok(Some(TickOutcome {
                    batch: batch.len(),
                    acked,
                    rejected,
                    retried: false,
                }))
            }
            Err(err) => {
                let message = err.to_string();
                warn!(batch = batch.len(), error = %message, "sync failed; scheduling retry");

                let retry_at = Utc::now();
                let delays: Vec<u64> = {
                    let mut rng = rand::thread_rng();
                    batch
                        .iter()
                        .map(|row| backoff_seconds(row.attempt_count as u32 + 1, &mut rng))
                        .collect()
                };
                for (row, delay) in batch.iter().zip(delays) {
                    OutboxRepo::schedule_retry(
                        self.store.pool(),
                        row.event_id,
                        retry_at,
                        retry_at + chrono::Duration::seconds(delay as i64),
                        &message,
                    )
                    .await?;
                }

                Ok(Some(TickOutcome {
                    batch: batch.len(),
                    acked: 0,
                    rejected: 0,
                    retried: true,
                }))
            }
        }
    }
}

/// POST a batch to the sync endpoint. Shared with the repair replayer.
pub(crate) async fn post_events(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    events: &[Value],
) -> GateResult<SyncResponse> {
    let response = client
        .post(url)
        .header(GATE_API_KEY_HEADER, api_key)
        .json(&SyncRequest {
            events: events.to_vec(),
        })
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GateError::Backend {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json::<SyncResponse>().await?)
}

/// Stamp the row's stable id and type onto its stored payload snapshot
fn stamp_envelope(row: &OutboxEventRow) -> Value {
    let mut payload = row.payload.0.clone();
    if let Value::Object(ref mut map) = payload {
        map.insert("eventId".to_string(), json!(row.event_id));
        map.insert("type".to_string(), json!(row.event_type));
    }
    payload
}

/// Exponential backoff with jitter: `min(300, 2^min(n,10) + U[0,2])`
fn backoff_seconds<R: Rng>(attempt_count: u32, rng: &mut R) -> u64 {
    let base = 1u64 << attempt_count.min(10);
    let jitter: f64 = rng.gen_range(0.0..2.0);
    (base as f64 + jitter).min(MAX_BACKOFF_SECS) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use palegate_types::EventType;

    #[test]
    fn backoff_grows_then_caps() {
        let mut rng = rand::thread_rng();

        for _ in 0..50 {
            let first = backoff_seconds(1, &mut rng);
            assert!((2..4).contains(&first), "attempt 1 gave {first}");

            let fifth = backoff_seconds(5, &mut rng);
            assert!((32..34).contains(&fifth), "attempt 5 gave {fifth}");

            // Exponent is clamped at 10 and the total at 300s.
            let deep = backoff_seconds(40, &mut rng);
            assert_eq!(deep, 300);
        }
    }

    #[test]
    fn envelope_carries_row_identity() {
        let row = OutboxEventRow {
            event_id: Uuid::new_v4(),
            event_type: EventType::EntryExpiredSeen,
            payload: sqlx::types::Json(json!({"roll": "R1"})),
            created_at: Utc::now(),
            sent_at: None,
            attempt_count: 0,
            last_attempt_at: None,
            next_retry_at: None,
            last_error: String::new(),
        };

        let stamped = stamp_envelope(&row);
        assert_eq!(stamped["eventId"], json!(row.event_id));
        assert_eq!(stamped["type"], "ENTRY_EXPIRED_SEEN");
        assert_eq!(stamped["roll"], "R1");
    }
}
