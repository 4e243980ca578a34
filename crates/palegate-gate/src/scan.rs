//! Scan state machine
//!
//! Decides the outcome of one entry or exit scan against the local store,
//! with no network call anywhere on the path. All mutations of a scan and
//! the outbox rows describing them share a single transaction.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use palegate_db::{EntryRepo, ExitRepo, GateStore, NewEntryLog, NewExitLog, UserRepo};
use palegate_token::{TokenAction, TokenClaims};
use palegate_types::{EntryFlag, EntryStatus, EventType, ExitFlag};
use tracing::{debug, info, warn};

use crate::error::GateResult;
use crate::outbox;

/// Which lane the credential was presented at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Entry,
    Exit,
}

/// Per-scan options; the overrides only apply with `test_mode` set
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub test_mode: bool,
    pub override_scanned_at: Option<DateTime<Utc>>,
    pub override_created_at: Option<DateTime<Utc>>,
}

/// What an allowed entry scan did locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryScanNote {
    /// First observation: the row was materialised
    Recorded {
        status: EntryStatus,
        entry_flag: EntryFlag,
    },
    /// Same token scanned again while ENTERED; observable, never stored
    DuplicateScan,
    /// Row exists in a state no entry scan should see; left untouched
    UnexpectedState { status: EntryStatus },
    /// Token carried no entryId, nothing to record
    NotMaterialized,
}

/// Operator-facing details of an allowed scan
#[derive(Debug, Clone)]
pub struct AllowDetails {
    pub roll: Option<String>,
    pub action: Option<TokenAction>,
    pub laptop: Option<String>,
    pub extra: Vec<Value>,
    /// The entry id (entry mode) or exit id (exit mode)
    pub id: Option<Uuid>,
    pub exp: i64,
    pub entry_note: Option<EntryScanNote>,
    pub exit_flag: Option<ExitFlag>,
}

/// Why a scan was denied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Expired entry credential; `recorded` is true when the local row was
    /// transitioned to EXPIRED on the way out
    TokenExpired { recorded: bool },
    /// Credential payload lacks the roll needed to materialise a record
    MissingRoll,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenExpired { .. } => f.write_str("token expired"),
            Self::MissingRoll => f.write_str("token is missing roll"),
        }
    }
}

/// Outcome of one scan
#[derive(Debug, Clone)]
pub enum ScanDecision {
    Allow(AllowDetails),
    Deny(DenyReason),
}

impl ScanDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }
}

/// The gate-side scan processor
#[derive(Clone)]
pub struct ScanEngine {
    store: GateStore,
    device_id: Option<String>,
}

impl ScanEngine {
    pub fn new(store: GateStore) -> Self {
        Self {
            store,
            device_id: None,
        }
    }

    /// Tag every produced row and event with this gate's device id
    pub fn with_device_id(mut self, device_id: Option<String>) -> Self {
        self.device_id = device_id;
        self
    }

    /// Process one decoded credential. `expired` marks payloads recovered
    /// through the controlled expired-token fallback.
    pub async fn process(
        &self,
        claims: &TokenClaims,
        expired: bool,
        mode: ScanMode,
        opts: &ScanOptions,
    ) -> GateResult<ScanDecision> {
        match mode {
            ScanMode::Entry => self.process_entry(claims, expired, opts).await,
            ScanMode::Exit => self.process_exit(claims, expired, opts).await,
        }
    }

    async fn process_entry(
        &self,
        claims: &TokenClaims,
        expired: bool,
        opts: &ScanOptions,
    ) -> GateResult<ScanDecision> {
        let ts = scanned_at(opts);

        if expired {
            // Best-effort local record of the stale credential, then deny.
            let Some(entry_id) = claims.entry_id else {
                return Ok(ScanDecision::Deny(DenyReason::TokenExpired {
                    recorded: false,
                }));
            };

            let mut tx = self.store.pool().begin().await.map_err(palegate_db::DbError::from)?;
            let updated = EntryRepo::mark_expired(&mut *tx, entry_id, ts).await?;
            if updated {
                let body = outbox::entry_expired_seen(
                    entry_id,
                    claims.roll.as_deref(),
                    ts,
                    None,
                    claims.laptop.as_deref(),
                    &claims.extra,
                );
                outbox::emit(&mut *tx, EventType::EntryExpiredSeen, &body, ts).await?;
                info!(%entry_id, "expired entry token seen; record expired");
            }
            tx.commit().await.map_err(palegate_db::DbError::from)?;

            return Ok(ScanDecision::Deny(DenyReason::TokenExpired {
                recorded: updated,
            }));
        }

        let Some(entry_id) = claims.entry_id else {
            debug!("entry token without entryId; nothing to record");
            return Ok(ScanDecision::Allow(self.allow_entry(
                claims,
                None,
                EntryScanNote::NotMaterialized,
            )));
        };

        let mut tx = self.store.pool().begin().await.map_err(palegate_db::DbError::from)?;

        if let Some(existing) = EntryRepo::find_by_id(&mut *tx, entry_id).await? {
            tx.commit().await.map_err(palegate_db::DbError::from)?;

            let note = if existing.status == EntryStatus::Entered {
                info!(%entry_id, "duplicate entry scan; first scan already processed");
                EntryScanNote::DuplicateScan
            } else {
                warn!(%entry_id, status = %existing.status, "unexpected entry state; ignoring");
                EntryScanNote::UnexpectedState {
                    status: existing.status,
                }
            };
            return Ok(ScanDecision::Allow(self.allow_entry(
                claims,
                Some(entry_id),
                note,
            )));
        }

        // First observer of this credential.
        let Some(roll) = claims.roll.clone() else {
            return Ok(ScanDecision::Deny(DenyReason::MissingRoll));
        };

        // Snapshot any open entries for the roll *before* the bulk update,
        // or there would be nothing left to iterate afterwards.
        let displaced = EntryRepo::find_open_by_roll(&mut *tx, &roll).await?;
        let entry_flag = if displaced.is_empty() {
            EntryFlag::NormalEntry
        } else {
            EntryRepo::expire_open_for_roll(&mut *tx, &roll, ts).await?;
            for row in &displaced {
                let body = outbox::entry_displaced(row);
                outbox::emit(&mut *tx, EventType::Entry, &body, ts).await?;
            }
            EntryFlag::ForcedEntry
        };

        UserRepo::get_or_create(&mut *tx, &roll).await?;

        let created_at = if opts.test_mode {
            opts.override_created_at.or(claims.created_at).unwrap_or(ts)
        } else {
            ts
        };

        let new = NewEntryLog {
            id: entry_id,
            roll,
            status: EntryStatus::Entered,
            entry_flag: Some(entry_flag),
            laptop: claims.laptop.clone(),
            extra: claims.extra.clone(),
            device_meta: self.device_meta(claims, false),
            source: claims.source.clone(),
            os: claims.os.clone(),
            device_id: self.device_id.clone(),
            created_at,
            scanned_at: Some(ts),
        };
        EntryRepo::insert(&mut *tx, &new).await?;

        let body = outbox::entry_recorded(&new);
        outbox::emit(&mut *tx, EventType::Entry, &body, ts).await?;

        tx.commit().await.map_err(palegate_db::DbError::from)?;

        info!(
            %entry_id,
            roll = %new.roll,
            flag = %entry_flag,
            displaced = displaced.len(),
            "entry recorded"
        );

        Ok(ScanDecision::Allow(self.allow_entry(
            claims,
            Some(entry_id),
            EntryScanNote::Recorded {
                status: EntryStatus::Entered,
                entry_flag,
            },
        )))
    }

    async fn process_exit(
        &self,
        claims: &TokenClaims,
        expired: bool,
        opts: &ScanOptions,
    ) -> GateResult<ScanDecision> {
        let ts = scanned_at(opts);
        let Some(roll) = claims.roll.clone() else {
            return Ok(ScanDecision::Deny(DenyReason::MissingRoll));
        };

        let mut device_meta = self.device_meta(claims, expired);

        let mut tx = self.store.pool().begin().await.map_err(palegate_db::DbError::from)?;

        // Resolve the referenced entry: the token's claim first, then - for
        // emergency tokens - the most recent open entry of the roll.
        let mut entry = None;
        if let Some(claimed) = claims.entry_id {
            entry = EntryRepo::find_by_id(&mut *tx, claimed).await?;
        }
        if entry.is_none() && claims.is_emergency() {
            entry = EntryRepo::find_latest_open_by_roll(&mut *tx, &roll).await?;
        }

        UserRepo::get_or_create(&mut *tx, &roll).await?;

        if let Some(ref resolved) = entry {
            if ExitRepo::exists_for_entry(&mut *tx, resolved.id).await? {
                // Exit already on record for this entry: allow, but mark.
                let new = self.new_exit(
                    claims,
                    &roll,
                    Some(resolved.id),
                    ExitFlag::DuplicateExit,
                    device_meta,
                    ts,
                );
                ExitRepo::insert(&mut *tx, &new).await?;
                outbox::emit(&mut *tx, EventType::Exit, &outbox::exit_recorded(&new), ts).await?;
                tx.commit().await.map_err(palegate_db::DbError::from)?;

                info!(exit_id = %new.id, entry_id = %resolved.id, "duplicate exit recorded");
                return Ok(ScanDecision::Allow(self.allow_exit(
                    claims,
                    new.id,
                    ExitFlag::DuplicateExit,
                )));
            }
        }

        let exit_flag = match (&entry, claims.is_emergency()) {
            (None, _) => {
                if let Some(claimed) = claims.entry_id {
                    device_meta.insert("claimedEntryId".to_string(), json!(claimed));
                }
                ExitFlag::OrphanExit
            }
            (Some(_), true) => ExitFlag::EmergencyExit,
            (Some(_), false) => ExitFlag::NormalExit,
        };

        let new = self.new_exit(
            claims,
            &roll,
            entry.as_ref().map(|e| e.id),
            exit_flag,
            device_meta,
            ts,
        );
        ExitRepo::insert(&mut *tx, &new).await?;

        if let Some(ref resolved) = entry {
            // The entry closes, but its scanned_at keeps the entry time.
            EntryRepo::mark_exited(&mut *tx, resolved.id).await?;
            let body = outbox::entry_transition(resolved, EntryStatus::Exited);
            outbox::emit(&mut *tx, EventType::Entry, &body, ts).await?;
        }

        outbox::emit(&mut *tx, EventType::Exit, &outbox::exit_recorded(&new), ts).await?;

        tx.commit().await.map_err(palegate_db::DbError::from)?;

        info!(exit_id = %new.id, roll = %roll, flag = %exit_flag, "exit recorded");
        Ok(ScanDecision::Allow(self.allow_exit(claims, new.id, exit_flag)))
    }

    fn new_exit(
        &self,
        claims: &TokenClaims,
        roll: &str,
        entry_id: Option<Uuid>,
        exit_flag: ExitFlag,
        device_meta: Map<String, Value>,
        ts: DateTime<Utc>,
    ) -> NewExitLog {
        NewExitLog {
            id: Uuid::new_v4(),
            roll: roll.to_string(),
            entry_id,
            exit_flag,
            laptop: claims.laptop.clone(),
            extra: claims.extra.clone(),
            device_meta,
            source: claims.source.clone(),
            os: claims.os.clone(),
            device_id: self.device_id.clone(),
            created_at: ts,
            scanned_at: Some(ts),
        }
    }

    fn device_meta(&self, claims: &TokenClaims, expired: bool) -> Map<String, Value> {
        let mut meta = claims.device_meta.clone().unwrap_or_default();
        if expired {
            meta.insert("expired".to_string(), json!(true));
        }
        if let Some(ref device_id) = self.device_id {
            meta.insert("gateDeviceId".to_string(), json!(device_id));
        }
        meta
    }

    fn allow_entry(
        &self,
        claims: &TokenClaims,
        id: Option<Uuid>,
        note: EntryScanNote,
    ) -> AllowDetails {
        AllowDetails {
            roll: claims.roll.clone(),
            action: claims.action,
            laptop: claims.laptop.clone(),
            extra: claims.extra.clone(),
            id: id.or(claims.entry_id).or(claims.exit_id),
            exp: claims.exp,
            entry_note: Some(note),
            exit_flag: None,
        }
    }

    fn allow_exit(&self, claims: &TokenClaims, exit_id: Uuid, flag: ExitFlag) -> AllowDetails {
        AllowDetails {
            roll: claims.roll.clone(),
            action: claims.action,
            laptop: claims.laptop.clone(),
            extra: claims.extra.clone(),
            id: Some(exit_id),
            exp: claims.exp,
            entry_note: None,
            exit_flag: Some(flag),
        }
    }
}

fn scanned_at(opts: &ScanOptions) -> DateTime<Utc> {
    if opts.test_mode {
        opts.override_scanned_at.unwrap_or_else(Utc::now)
    } else {
        Utc::now()
    }
}
