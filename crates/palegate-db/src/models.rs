//! Database models - mapped from the SQLite tables

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use palegate_types::{EntryFlag, EntryStatus, EventType, ExitFlag};

// ============================================================================
// User
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserRow {
    pub roll: String,
}

// ============================================================================
// Entry log
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EntryLogRow {
    pub id: Uuid,
    pub roll: String,
    pub status: EntryStatus,
    pub entry_flag: Option<EntryFlag>,
    pub laptop: Option<String>,
    pub extra: Json<Vec<Value>>,
    pub device_meta: Json<Map<String, Value>>,
    pub source: Option<String>,
    pub os: Option<String>,
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scanned_at: Option<DateTime<Utc>>,
}

/// Insert parameters for a gate-materialised entry row
#[derive(Debug, Clone)]
pub struct NewEntryLog {
    pub id: Uuid,
    pub roll: String,
    pub status: EntryStatus,
    pub entry_flag: Option<EntryFlag>,
    pub laptop: Option<String>,
    pub extra: Vec<Value>,
    pub device_meta: Map<String, Value>,
    pub source: Option<String>,
    pub os: Option<String>,
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scanned_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Exit log
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExitLogRow {
    pub id: Uuid,
    pub roll: String,
    pub entry_id: Option<Uuid>,
    pub exit_flag: ExitFlag,
    pub laptop: Option<String>,
    pub extra: Json<Vec<Value>>,
    pub device_meta: Json<Map<String, Value>>,
    pub source: Option<String>,
    pub os: Option<String>,
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scanned_at: Option<DateTime<Utc>>,
}

/// Insert parameters for an exit row
#[derive(Debug, Clone)]
pub struct NewExitLog {
    pub id: Uuid,
    pub roll: String,
    pub entry_id: Option<Uuid>,
    pub exit_flag: ExitFlag,
    pub laptop: Option<String>,
    pub extra: Vec<Value>,
    pub device_meta: Map<String, Value>,
    pub source: Option<String>,
    pub os: Option<String>,
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scanned_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Outbox (gate only)
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OutboxEventRow {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub payload: Json<Value>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub attempt_count: i64,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: String,
}

// ============================================================================
// Processed gate events (backend only)
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProcessedGateEventRow {
    pub event_id: Uuid,
    /// Raw wire string; unknown kinds are still recorded verbatim
    pub event_type: String,
    pub received_at: DateTime<Utc>,
}
