//! Gate -> backend sync wire protocol
//!
//! `POST {sync-url}` with header `X-GATE-API-KEY`, body `{"events": [...]}`.
//! Incoming events are validated field by field at the receiver, so the
//! request side stays loosely typed (`serde_json::Value`); the response is
//! fully typed in both directions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Header carrying the shared gate credential
pub const GATE_API_KEY_HEADER: &str = "X-GATE-API-KEY";

/// Default client-side batch size (`SYNC_BATCH_SIZE`)
pub const DEFAULT_SYNC_BATCH_SIZE: usize = 200;

/// Default seconds between empty-batch ticks (`SYNC_INTERVAL_SECONDS`)
pub const DEFAULT_SYNC_INTERVAL_SECONDS: u64 = 5;

/// Default outbound request timeout (`SYNC_TIMEOUT_SECONDS`)
pub const DEFAULT_SYNC_TIMEOUT_SECONDS: u64 = 10;

/// Default server-side cap on events per request (`SYNC_MAX_EVENTS`)
pub const DEFAULT_SYNC_MAX_EVENTS: usize = 500;

/// Request body for the sync endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub events: Vec<Value>,
}

/// One event the receiver refused; the batch-mates still proceed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedEvent {
    /// Echo of the raw id, when one was present at all
    pub event_id: Option<String>,
    pub error: String,
}

/// Response body of the sync endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub acked_event_ids: Vec<Uuid>,
    pub rejected: Vec<RejectedEvent>,
    pub server_time: DateTime<Utc>,
}
