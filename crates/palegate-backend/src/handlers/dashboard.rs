//! Read-only dashboard summary over the replicated log

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{NaiveTime, Utc};
use serde_json::{json, Value};

use palegate_db::{EntryRepo, ExitRepo};
use palegate_types::{EntryFlag, ExitFlag};

use crate::error::ApiResult;
use crate::state::AppState;

const ENTRY_FLAGS: [EntryFlag; 3] = [
    EntryFlag::NormalEntry,
    EntryFlag::ForcedEntry,
    EntryFlag::DuplicateEntry,
];

const EXIT_FLAGS: [ExitFlag; 5] = [
    ExitFlag::NormalExit,
    ExitFlag::EmergencyExit,
    ExitFlag::OrphanExit,
    ExitFlag::AutoExit,
    ExitFlag::DuplicateExit,
];

/// `GET /dashboard/summary`: today's traffic, current occupancy and flag
/// totals.
pub async fn summary(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let now = Utc::now();
    let today_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let pool = state.store.pool();

    let today_entries = EntryRepo::count_created_since(pool, today_start).await?;
    let today_exits = ExitRepo::count_scanned_since(pool, today_start).await?;
    let current_inside = EntryRepo::count_open(pool).await?;

    let entry_totals = EntryRepo::flag_totals(pool).await?;
    let exit_totals = ExitRepo::flag_totals(pool).await?;

    // Every flag is reported, zeros included.
    let mut entry_flags = serde_json::Map::new();
    for flag in ENTRY_FLAGS {
        let count = entry_totals
            .iter()
            .find(|(name, _)| name == flag.as_str())
            .map(|(_, n)| *n)
            .unwrap_or(0);
        entry_flags.insert(flag.as_str().to_string(), json!(count));
    }

    let mut exit_flags = serde_json::Map::new();
    for flag in EXIT_FLAGS {
        let count = exit_totals
            .iter()
            .find(|(name, _)| name == flag.as_str())
            .map(|(_, n)| *n)
            .unwrap_or(0);
        exit_flags.insert(flag.as_str().to_string(), json!(count));
    }

    Ok(Json(json!({
        "timestamp": now,
        "today": {
            "entries": today_entries,
            "exits": today_exits,
            "current_inside": current_inside,
        },
        "entry_flags": entry_flags,
        "exit_flags": exit_flags,
    })))
}
