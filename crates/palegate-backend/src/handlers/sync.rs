//! Gate -> backend sync receiver
//!
//! Accepts `{"events": [...]}` batches. Each event is applied in its own
//! transaction, keyed on the force-insert into `processed_gate_events`: the
//! insert either succeeds (this request owns the side effects) or collides
//! (someone already applied it, so it is acked untouched). Client-data
//! problems land in `rejected[]` while batch-mates proceed; store failures
//! abort the whole request with 500 so the gate retries the batch.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::SqliteConnection;
use uuid::Uuid;

use palegate_db::{
    BackendStore, DbError, EntryRepo, EntryReplica, ExitReplica, ExitRepo, ProcessedRepo, UserRepo,
};
use palegate_types::{EntryFlag, EntryStatus, EventType, ExitFlag, RejectedEvent, SyncResponse};
use tracing::{debug, error};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn gate_events(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult<Json<SyncResponse>> {
    let Some(events) = body.get("events").and_then(Value::as_array) else {
        return Err(ApiError::bad_request("Invalid payload: 'events' must be a list"));
    };

    let max_events = state.config.sync_max_events;
    if events.len() > max_events {
        return Err(ApiError::too_large(format!(
            "Too many events in one request (max {max_events})"
        )));
    }

    let mut acked = Vec::new();
    let mut rejected = Vec::new();

    for event in events {
        match apply_event(&state.store, event).await {
            Ok(EventOutcome::Acked(event_id)) => acked.push(event_id),
            Ok(EventOutcome::Rejected { event_id, reason }) => {
                debug!(?event_id, reason = %reason, "rejected sync event");
                rejected.push(RejectedEvent {
                    event_id,
                    error: reason,
                });
            }
            Err(db_err) => {
                // Transient store failure: fail the whole batch so the gate
                // keeps the rows queued and retries.
                error!(error = %db_err, "sync event application failed");
                return Err(db_err.into());
            }
        }
    }

    Ok(Json(SyncResponse {
        acked_event_ids: acked,
        rejected,
        server_time: Utc::now(),
    }))
}

enum EventOutcome {
    Acked(Uuid),
    Rejected {
        event_id: Option<String>,
        reason: String,
    },
}

/// Per-event validation failure; rolls the event back without failing the
/// batch
struct Invalid(String);

enum ApplyError {
    Invalid(Invalid),
    Db(DbError),
}

impl From<DbError> for ApplyError {
    fn from(e: DbError) -> Self {
        Self::Db(e)
    }
}

impl From<Invalid> for ApplyError {
    fn from(e: Invalid) -> Self {
        Self::Invalid(e)
    }
}

async fn apply_event(store: &BackendStore, event: &Value) -> Result<EventOutcome, DbError> {
    let Some(fields) = event.as_object() else {
        return Ok(EventOutcome::Rejected {
            event_id: None,
            reason: "Event must be an object".to_string(),
        });
    };

    let raw_event_id = fields.get("eventId").filter(|v| !v.is_null());
    let Some(raw_event_id) = raw_event_id else {
        return Ok(EventOutcome::Rejected {
            event_id: None,
            reason: "Missing eventId".to_string(),
        });
    };

    let raw_text = match raw_event_id.as_str() {
        Some(s) => s.to_string(),
        None => raw_event_id.to_string(),
    };
    let Ok(event_id) = Uuid::parse_str(raw_text.trim()) else {
        return Ok(EventOutcome::Rejected {
            event_id: Some(raw_text),
            reason: "Invalid eventId (must be UUID)".to_string(),
        });
    };

    let event_type_raw = fields.get("type").and_then(Value::as_str).unwrap_or("");

    let mut tx = store.pool().begin().await.map_err(DbError::from)?;

    // The idempotency guard. A collision means the event was applied at
    // least once already: ack as if freshly applied, mutate nothing.
    let fresh =
        ProcessedRepo::force_insert(&mut *tx, event_id, event_type_raw, Utc::now()).await?;
    if !fresh {
        tx.rollback().await.map_err(DbError::from)?;
        return Ok(EventOutcome::Acked(event_id));
    }

    let applied = match event_type_raw.parse::<EventType>() {
        Ok(EventType::Entry) => apply_entry(&mut tx, fields, EntryStatus::Entered).await,
        Ok(EventType::EntryExpiredSeen) => {
            apply_entry(&mut tx, fields, EntryStatus::Expired).await
        }
        Ok(EventType::Exit) => apply_exit(&mut tx, fields).await,
        Err(_) => {
            let label = if event_type_raw.is_empty() {
                "null".to_string()
            } else {
                event_type_raw.to_string()
            };
            Err(ApplyError::Invalid(Invalid(format!(
                "Unknown event type: {label}"
            ))))
        }
    };

    match applied {
        Ok(()) => {
            tx.commit().await.map_err(DbError::from)?;
            Ok(EventOutcome::Acked(event_id))
        }
        Err(ApplyError::Invalid(Invalid(reason))) => {
            // Roll the guard back too, so a corrected resend can apply.
            tx.rollback().await.map_err(DbError::from)?;
            Ok(EventOutcome::Rejected {
                event_id: Some(event_id.to_string()),
                reason,
            })
        }
        Err(ApplyError::Db(db_err)) => {
            let _ = tx.rollback().await;
            Err(db_err)
        }
    }
}

async fn apply_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    fields: &Map<String, Value>,
    default_status: EntryStatus,
) -> Result<(), ApplyError> {
    let entry_id = required_uuid(fields, "entryId", "ENTRY requires entryId and roll")?;
    let roll = required_roll(fields, "ENTRY requires entryId and roll")?;
    let extra = extra_list(fields, "ENTRY extra must be a list")?;

    let scanned_at = parse_dt(fields.get("scannedAt")).unwrap_or_else(Utc::now);
    let status = match fields.get("status").and_then(Value::as_str) {
        Some(raw) => raw
            .parse::<EntryStatus>()
            .map_err(|e| Invalid(e.to_string()))?,
        None => default_status,
    };
    let entry_flag = match fields.get("entryFlag").and_then(Value::as_str) {
        Some(raw) => raw
            .parse::<EntryFlag>()
            .map_err(|e| Invalid(e.to_string()))?,
        None => EntryFlag::NormalEntry,
    };
    let laptop = fields
        .get("laptop")
        .and_then(Value::as_str)
        .map(str::to_string);

    let conn: &mut SqliteConnection = &mut *tx;
    UserRepo::get_or_create(&mut *conn, &roll).await.map_err(ApplyError::from)?;

    let existing = EntryRepo::find_by_id(&mut *conn, entry_id)
        .await
        .map_err(ApplyError::from)?;
    if let Some(existing) = existing {
        if !should_apply(existing.scanned_at, scanned_at) {
            // Older replay; keep the newer data already in place.
            return Ok(());
        }
    }

    let replica = EntryReplica {
        id: entry_id,
        roll,
        status,
        entry_flag,
        laptop,
        extra,
        scanned_at,
    };
    EntryRepo::upsert_replica(&mut *conn, &replica, Utc::now())
        .await
        .map_err(ApplyError::from)?;

    Ok(())
}

async fn apply_exit(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    fields: &Map<String, Value>,
) -> Result<(), ApplyError> {
    let exit_id = required_uuid(fields, "exitId", "EXIT requires exitId and roll")?;
    let roll = required_roll(fields, "EXIT requires exitId and roll")?;
    let extra = extra_list(fields, "EXIT extra must be a list")?;

    let device_meta = match fields.get("deviceMeta") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(Invalid("EXIT deviceMeta must be an object".to_string()).into()),
    };

    let scanned_at = parse_dt(fields.get("scannedAt")).unwrap_or_else(Utc::now);
    let exit_flag = match fields.get("exitFlag").and_then(Value::as_str) {
        Some(raw) => raw
            .parse::<ExitFlag>()
            .map_err(|e| Invalid(e.to_string()))?,
        None => ExitFlag::NormalExit,
    };
    let laptop = fields
        .get("laptop")
        .and_then(Value::as_str)
        .map(str::to_string);

    let entry_id = match fields.get("entryId").filter(|v| !v.is_null()) {
        None => None,
        Some(raw) => {
            let text = raw.as_str().map(str::to_string).unwrap_or_else(|| raw.to_string());
            Some(
                Uuid::parse_str(text.trim())
                    .map_err(|_| Invalid("Invalid entryId (must be UUID)".to_string()))?,
            )
        }
    };

    let conn: &mut SqliteConnection = &mut *tx;
    UserRepo::get_or_create(&mut *conn, &roll).await.map_err(ApplyError::from)?;

    // An EXIT may outrun its ENTRY. Park a PENDING skeleton for the foreign
    // key; the ENTRY upserts over it when it arrives.
    if let Some(entry_id) = entry_id {
        EntryRepo::get_or_create_pending(&mut *conn, entry_id, &roll, Utc::now())
            .await
            .map_err(ApplyError::from)?;
    }

    let existing = ExitRepo::find_by_id(&mut *conn, exit_id)
        .await
        .map_err(ApplyError::from)?;
    if let Some(existing) = existing {
        if !should_apply(existing.scanned_at, scanned_at) {
            return Ok(());
        }
    }

    let replica = ExitReplica {
        id: exit_id,
        roll,
        entry_id,
        exit_flag,
        laptop,
        extra,
        device_meta,
        scanned_at,
    };
    ExitRepo::upsert_replica(&mut *conn, &replica, Utc::now())
        .await
        .map_err(ApplyError::from)?;

    Ok(())
}

/// Last-writer-wins on `scanned_at`: an equal or newer incoming timestamp
/// applies, so replays of the winning event stay deterministic.
fn should_apply(existing: Option<DateTime<Utc>>, incoming: DateTime<Utc>) -> bool {
    match existing {
        None => true,
        Some(existing) => incoming >= existing,
    }
}

fn required_uuid(
    fields: &Map<String, Value>,
    key: &str,
    missing_reason: &str,
) -> Result<Uuid, Invalid> {
    let Some(raw) = fields.get(key).filter(|v| !v.is_null()) else {
        return Err(Invalid(missing_reason.to_string()));
    };
    let text = raw.as_str().map(str::to_string).unwrap_or_else(|| raw.to_string());
    Uuid::parse_str(text.trim()).map_err(|_| Invalid(format!("Invalid {key} (must be UUID)")))
}

fn required_roll(fields: &Map<String, Value>, missing_reason: &str) -> Result<String, Invalid> {
    fields
        .get("roll")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Invalid(missing_reason.to_string()))
}

fn extra_list(fields: &Map<String, Value>, reason: &str) -> Result<Vec<Value>, Invalid> {
    match fields.get("extra") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(Invalid(reason.to_string())),
    }
}

fn parse_dt(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = value?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn lww_prefers_newer_and_reapplies_equal() {
        let now = Utc::now();
        assert!(should_apply(None, now));
        assert!(should_apply(Some(now - Duration::seconds(5)), now));
        assert!(should_apply(Some(now), now));
        assert!(!should_apply(Some(now + Duration::seconds(5)), now));
    }

    #[test]
    fn parse_dt_handles_offsets_and_garbage() {
        use chrono::TimeZone;

        let value = Value::String("2026-01-10T09:30:00+05:30".to_string());
        let parsed = parse_dt(Some(&value)).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 1, 10, 4, 0, 0).unwrap());

        assert!(parse_dt(Some(&Value::String("yesterday".to_string()))).is_none());
        assert!(parse_dt(Some(&Value::Null)).is_none());
        assert!(parse_dt(None).is_none());
    }
}
