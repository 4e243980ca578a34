//! Outbox event payload bodies
//!
//! Each body is a self-contained snapshot of the row state it describes. The
//! `eventId` and `type` envelope fields are *not* part of the body: they are
//! stamped from the owning outbox row at send time, so a replayed row always
//! carries the same idempotency key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{EntryFlag, EntryStatus, ExitFlag};

/// Body of an `ENTRY` or `ENTRY_EXPIRED_SEEN` event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryEventBody {
    pub entry_id: Uuid,
    pub roll: String,
    pub scanned_at: Option<DateTime<Utc>>,
    pub status: EntryStatus,
    pub entry_flag: Option<EntryFlag>,
    pub laptop: Option<String>,
    #[serde(default)]
    pub extra: Vec<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub device_meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

/// Body of an `EXIT` event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitEventBody {
    pub exit_id: Uuid,
    pub entry_id: Option<Uuid>,
    pub roll: String,
    pub scanned_at: Option<DateTime<Utc>>,
    pub exit_flag: ExitFlag,
    pub laptop: Option<String>,
    #[serde(default)]
    pub extra: Vec<Value>,
    #[serde(default)]
    pub device_meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}
