//! Outbox event emission
//!
//! Builds the self-contained payload snapshot for each state change and
//! appends it to `gate_outbox_events`. Emission always happens on the same
//! transaction as the mutation it describes: either both commit or neither.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Map;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use palegate_db::{EntryLogRow, NewEntryLog, NewExitLog, OutboxRepo};
use palegate_types::{EntryEventBody, EntryStatus, EventType, ExitEventBody};

use crate::error::GateResult;

/// Serialize a body and append it as one outbox row
pub async fn emit<T: Serialize>(
    exec: impl SqliteExecutor<'_>,
    event_type: EventType,
    body: &T,
    now: DateTime<Utc>,
) -> GateResult<Uuid> {
    let payload = serde_json::to_value(body)?;
    let event_id = OutboxRepo::emit(exec, event_type, &payload, now).await?;
    Ok(event_id)
}

/// ENTRY body for a freshly materialised entry row
pub fn entry_recorded(new: &NewEntryLog) -> EntryEventBody {
    EntryEventBody {
        entry_id: new.id,
        roll: new.roll.clone(),
        scanned_at: new.scanned_at,
        status: new.status,
        entry_flag: new.entry_flag,
        laptop: new.laptop.clone(),
        extra: new.extra.clone(),
        device_meta: new.device_meta.clone(),
        device_id: new.device_id.clone(),
        source: new.source.clone(),
        os: new.os.clone(),
    }
}

/// ENTRY body for a row displaced to EXPIRED by a forced entry.
/// Carries the row's original flag; the expiry itself is conveyed by the
/// status field.
pub fn entry_displaced(row: &EntryLogRow) -> EntryEventBody {
    EntryEventBody {
        entry_id: row.id,
        roll: row.roll.clone(),
        scanned_at: None,
        status: EntryStatus::Expired,
        entry_flag: row.entry_flag,
        laptop: row.laptop.clone(),
        extra: row.extra.0.clone(),
        device_meta: Map::new(),
        device_id: row.device_id.clone(),
        source: None,
        os: None,
    }
}

/// ENTRY body announcing a status transition on an existing row
pub fn entry_transition(row: &EntryLogRow, status: EntryStatus) -> EntryEventBody {
    EntryEventBody {
        entry_id: row.id,
        roll: row.roll.clone(),
        scanned_at: row.scanned_at,
        status,
        entry_flag: row.entry_flag,
        laptop: row.laptop.clone(),
        extra: row.extra.0.clone(),
        device_meta: Map::new(),
        device_id: row.device_id.clone(),
        source: None,
        os: None,
    }
}

/// ENTRY_EXPIRED_SEEN body for an expired credential presented at the gate
pub fn entry_expired_seen(
    entry_id: Uuid,
    roll: Option<&str>,
    scanned_at: DateTime<Utc>,
    entry_flag: Option<palegate_types::EntryFlag>,
    laptop: Option<&str>,
    extra: &[serde_json::Value],
) -> EntryEventBody {
    EntryEventBody {
        entry_id,
        roll: roll.unwrap_or_default().to_string(),
        scanned_at: Some(scanned_at),
        status: EntryStatus::Expired,
        entry_flag,
        laptop: laptop.map(str::to_string),
        extra: extra.to_vec(),
        device_meta: Map::new(),
        device_id: None,
        source: None,
        os: None,
    }
}

/// EXIT body for a new exit row
pub fn exit_recorded(new: &NewExitLog) -> ExitEventBody {
    ExitEventBody {
        exit_id: new.id,
        entry_id: new.entry_id,
        roll: new.roll.clone(),
        scanned_at: new.scanned_at,
        exit_flag: new.exit_flag,
        laptop: new.laptop.clone(),
        extra: new.extra.clone(),
        device_meta: new.device_meta.clone(),
        device_id: new.device_id.clone(),
        source: new.source.clone(),
        os: new.os.clone(),
    }
}
