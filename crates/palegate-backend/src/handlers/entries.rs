//! Credential issuance handlers

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use palegate_db::{EntryRepo, NewEntryLog, UserRepo};
use palegate_token::{EmergencyExitTokenSpec, EntryTokenSpec, EMERGENCY_EXIT_TOKEN_TTL_SECS};
use palegate_types::EntryStatus;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_ROLL_LEN: usize = 50;
const MAX_LAPTOP_LEN: usize = 150;

/// Body of both issuance endpoints
#[derive(Debug, Deserialize)]
pub struct TokenGenerateRequest {
    pub roll: String,
    #[serde(default)]
    pub laptop: Option<String>,
    #[serde(default)]
    pub extra: Option<Vec<Value>>,
}

impl TokenGenerateRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let roll = self.roll.trim();
        if roll.is_empty() {
            return Err(ApiError::bad_request("roll is required"));
        }
        if roll.len() > MAX_ROLL_LEN {
            return Err(ApiError::bad_request(format!(
                "roll must be at most {MAX_ROLL_LEN} characters"
            )));
        }
        if let Some(ref laptop) = self.laptop {
            if laptop.len() > MAX_LAPTOP_LEN {
                return Err(ApiError::bad_request(format!(
                    "laptop must be at most {MAX_LAPTOP_LEN} characters"
                )));
            }
        }
        Ok(())
    }

    fn laptop(&self) -> Option<String> {
        self.laptop
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// `POST /entries/generate`: pre-allocate a PENDING entry record and return
/// the signed entry token bound to it.
pub async fn generate_token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TokenGenerateRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    request.validate()?;
    let roll = request.roll.trim().to_string();
    let laptop = request.laptop();
    let extra = request.extra.clone().unwrap_or_default();

    let entry_id = Uuid::new_v4();
    let now = Utc::now();

    let mut tx = state
        .store
        .pool()
        .begin()
        .await
        .map_err(palegate_db::DbError::from)?;
    UserRepo::get_or_create(&mut *tx, &roll).await?;
    EntryRepo::insert(
        &mut *tx,
        &NewEntryLog {
            id: entry_id,
            roll: roll.clone(),
            status: EntryStatus::Pending,
            entry_flag: None,
            laptop: laptop.clone(),
            extra: extra.clone(),
            device_meta: Map::new(),
            source: None,
            os: None,
            device_id: None,
            created_at: now,
            scanned_at: None,
        },
    )
    .await?;
    tx.commit().await.map_err(palegate_db::DbError::from)?;

    let token = state.codec.sign_entry(EntryTokenSpec {
        entry_id,
        roll: roll.clone(),
        laptop,
        extra,
        ..Default::default()
    })?;

    info!(%entry_id, roll = %roll, "entry token issued");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "entryId": entry_id,
            "token": token,
            "message": "Stored in db, token generated.",
        })),
    ))
}

/// `POST /entries/generate/exit`: emergency token for a user with an active
/// entry who lost the original QR. 404 when no entry is open.
pub async fn generate_emergency_exit_token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TokenGenerateRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    request.validate()?;
    let roll = request.roll.trim().to_string();

    let active = EntryRepo::find_latest_open_by_roll(state.store.pool(), &roll).await?;
    let Some(active) = active else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "No active entry found for this roll number.",
                "roll": roll,
            })),
        ));
    };

    // laptop/extra come from the request: what the user carries out now.
    let token = state.codec.sign_emergency_exit(EmergencyExitTokenSpec {
        entry_id: Some(active.id),
        roll: roll.clone(),
        laptop: request.laptop(),
        extra: request.extra.clone().unwrap_or_default(),
        ..Default::default()
    })?;

    info!(entry_id = %active.id, roll = %roll, "emergency exit token issued");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "entryId": active.id,
            "token": token,
            "expiresInSeconds": EMERGENCY_EXIT_TOKEN_TTL_SECS,
            "message": "Emergency exit token generated. Valid for 5 minutes.",
        })),
    ))
}
