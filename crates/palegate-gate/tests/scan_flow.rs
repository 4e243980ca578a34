//! Scan state machine tests against an in-memory gate store

use chrono::{Duration, Utc};
use serde_json::{json, Map};
use uuid::Uuid;

use palegate_db::{EntryRepo, ExitRepo, GateStore, NewEntryLog, OutboxRepo, UserRepo};
use palegate_gate::{
    DenyReason, EntryScanNote, MidnightCloser, ScanDecision, ScanEngine, ScanMode, ScanOptions,
};
use palegate_token::{TokenAction, TokenClaims};
use palegate_types::{EntryFlag, EntryStatus, EventType, ExitFlag};

fn entry_claims(entry_id: Uuid, roll: &str) -> TokenClaims {
    let now = Utc::now();
    TokenClaims {
        entry_id: Some(entry_id),
        exit_id: None,
        roll: Some(roll.to_string()),
        action: Some(TokenAction::Entering),
        token_type: None,
        laptop: Some("Dell XPS 15".to_string()),
        extra: vec![json!("charger")],
        source: None,
        os: None,
        device_meta: None,
        created_at: None,
        iss: "library-backend".to_string(),
        aud: "library-gate".to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(24)).timestamp(),
    }
}

fn exit_claims(entry_id: Option<Uuid>, roll: &str, emergency: bool) -> TokenClaims {
    let mut claims = entry_claims(entry_id.unwrap_or_else(Uuid::new_v4), roll);
    claims.entry_id = entry_id;
    claims.action = Some(TokenAction::Exiting);
    claims.token_type = emergency.then(|| "emergency".to_string());
    claims
}

async fn engine() -> (ScanEngine, GateStore) {
    let store = GateStore::in_memory().await.unwrap();
    (ScanEngine::new(store.clone()), store)
}

fn assert_allowed(decision: &ScanDecision) -> &palegate_gate::AllowDetails {
    match decision {
        ScanDecision::Allow(details) => details,
        ScanDecision::Deny(reason) => panic!("expected allow, denied with {reason}"),
    }
}

// ============================================================================
// Entry mode
// ============================================================================

#[tokio::test]
async fn first_scan_materialises_the_entry() {
    let (engine, store) = engine().await;
    let entry_id = Uuid::new_v4();
    let claims = entry_claims(entry_id, "24MA10001");

    let decision = engine
        .process(&claims, false, ScanMode::Entry, &ScanOptions::default())
        .await
        .unwrap();

    let details = assert_allowed(&decision);
    assert_eq!(
        details.entry_note,
        Some(EntryScanNote::Recorded {
            status: EntryStatus::Entered,
            entry_flag: EntryFlag::NormalEntry,
        })
    );

    let row = EntryRepo::find_by_id(store.pool(), entry_id).await.unwrap().unwrap();
    assert_eq!(row.status, EntryStatus::Entered);
    assert_eq!(row.entry_flag, Some(EntryFlag::NormalEntry));
    assert!(row.scanned_at.is_some());
    assert!(UserRepo::find(store.pool(), "24MA10001").await.unwrap().is_some());

    let outbox = OutboxRepo::find_all(store.pool()).await.unwrap();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].event_type, EventType::Entry);
    assert_eq!(outbox[0].payload.0["entryId"], json!(entry_id));
    assert_eq!(outbox[0].payload.0["status"], "ENTERED");
    assert_eq!(outbox[0].payload.0["entryFlag"], "NORMAL_ENTRY");
}

#[tokio::test]
async fn rescan_is_observable_but_stores_nothing() {
    let (engine, store) = engine().await;
    let claims = entry_claims(Uuid::new_v4(), "24MA10001");

    engine
        .process(&claims, false, ScanMode::Entry, &ScanOptions::default())
        .await
        .unwrap();
    let decision = engine
        .process(&claims, false, ScanMode::Entry, &ScanOptions::default())
        .await
        .unwrap();

    let details = assert_allowed(&decision);
    assert_eq!(details.entry_note, Some(EntryScanNote::DuplicateScan));

    // No second row, no second event, no DUPLICATE_ENTRY anywhere.
    assert_eq!(OutboxRepo::find_all(store.pool()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn forced_entry_displaces_every_open_entry() {
    let (engine, store) = engine().await;
    let roll = "24MA10002";

    let first_id = Uuid::new_v4();
    engine
        .process(&entry_claims(first_id, roll), false, ScanMode::Entry, &ScanOptions::default())
        .await
        .unwrap();

    let second_id = Uuid::new_v4();
    let decision = engine
        .process(&entry_claims(second_id, roll), false, ScanMode::Entry, &ScanOptions::default())
        .await
        .unwrap();

    let details = assert_allowed(&decision);
    assert_eq!(
        details.entry_note,
        Some(EntryScanNote::Recorded {
            status: EntryStatus::Entered,
            entry_flag: EntryFlag::ForcedEntry,
        })
    );

    // Exactly one ENTERED row survives for the roll.
    let open = EntryRepo::find_open_by_roll(store.pool(), roll).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, second_id);

    let displaced = EntryRepo::find_by_id(store.pool(), first_id).await.unwrap().unwrap();
    assert_eq!(displaced.status, EntryStatus::Expired);
    assert!(displaced.scanned_at.is_some());

    // 1 event from the first scan + (1 displacement + 1 new) from the second.
    let outbox = OutboxRepo::find_all(store.pool()).await.unwrap();
    assert_eq!(outbox.len(), 3);

    let displacement = outbox
        .iter()
        .find(|row| row.payload.0["entryId"] == json!(first_id) && row.payload.0["status"] == "EXPIRED")
        .expect("displacement event missing");
    assert_eq!(displacement.event_type, EventType::Entry);
    // The displaced row's original flag rides along; its scan time is not
    // rewritten on the wire.
    assert_eq!(displacement.payload.0["entryFlag"], "NORMAL_ENTRY");
    assert!(displacement.payload.0["scannedAt"].is_null());

    let fresh = outbox
        .iter()
        .find(|row| row.payload.0["entryId"] == json!(second_id))
        .expect("new entry event missing");
    assert_eq!(fresh.payload.0["entryFlag"], "FORCED_ENTRY");
}

#[tokio::test]
async fn expired_token_expires_the_known_record_and_denies() {
    let (engine, store) = engine().await;
    let entry_id = Uuid::new_v4();

    // The record was pre-allocated at issuance and replicated here.
    UserRepo::get_or_create(store.pool(), "R3").await.unwrap();
    EntryRepo::insert(
        store.pool(),
        &NewEntryLog {
            id: entry_id,
            roll: "R3".to_string(),
            status: EntryStatus::Pending,
            entry_flag: None,
            laptop: None,
            extra: vec![],
            device_meta: Map::new(),
            source: None,
            os: None,
            device_id: None,
            created_at: Utc::now() - Duration::hours(30),
            scanned_at: None,
        },
    )
    .await
    .unwrap();

    let claims = entry_claims(entry_id, "R3");
    let decision = engine
        .process(&claims, true, ScanMode::Entry, &ScanOptions::default())
        .await
        .unwrap();

    match decision {
        ScanDecision::Deny(DenyReason::TokenExpired { recorded }) => assert!(recorded),
        other => panic!("expected expiry denial, got {other:?}"),
    }

    let row = EntryRepo::find_by_id(store.pool(), entry_id).await.unwrap().unwrap();
    assert_eq!(row.status, EntryStatus::Expired);
    assert!(row.scanned_at.is_some());

    let outbox = OutboxRepo::find_all(store.pool()).await.unwrap();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].event_type, EventType::EntryExpiredSeen);
    assert_eq!(outbox[0].payload.0["status"], "EXPIRED");
}

#[tokio::test]
async fn expired_token_for_unknown_record_denies_without_side_effects() {
    let (engine, store) = engine().await;
    let claims = entry_claims(Uuid::new_v4(), "R3");

    let decision = engine
        .process(&claims, true, ScanMode::Entry, &ScanOptions::default())
        .await
        .unwrap();

    match decision {
        ScanDecision::Deny(DenyReason::TokenExpired { recorded }) => assert!(!recorded),
        other => panic!("expected expiry denial, got {other:?}"),
    }
    assert!(OutboxRepo::find_all(store.pool()).await.unwrap().is_empty());
}

// ============================================================================
// Exit mode
// ============================================================================

#[tokio::test]
async fn normal_exit_closes_the_entry_and_emits_both_events() {
    let (engine, store) = engine().await;
    let entry_id = Uuid::new_v4();
    let roll = "24MA10004";

    engine
        .process(&entry_claims(entry_id, roll), false, ScanMode::Entry, &ScanOptions::default())
        .await
        .unwrap();
    let entry_scanned_at = EntryRepo::find_by_id(store.pool(), entry_id)
        .await
        .unwrap()
        .unwrap()
        .scanned_at;

    let decision = engine
        .process(
            &exit_claims(Some(entry_id), roll, false),
            false,
            ScanMode::Exit,
            &ScanOptions::default(),
        )
        .await
        .unwrap();

    let details = assert_allowed(&decision);
    assert_eq!(details.exit_flag, Some(ExitFlag::NormalExit));
    let exit_id = details.id.unwrap();

    let exit = ExitRepo::find_by_id(store.pool(), exit_id).await.unwrap().unwrap();
    assert_eq!(exit.entry_id, Some(entry_id));
    assert_eq!(exit.exit_flag, ExitFlag::NormalExit);

    let entry = EntryRepo::find_by_id(store.pool(), entry_id).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Exited);
    // Exit processing must not rewrite the entry scan time.
    assert_eq!(entry.scanned_at, entry_scanned_at);

    // Entry scan event + (ENTRY status=EXITED + EXIT) from the exit scan.
    let outbox = OutboxRepo::find_all(store.pool()).await.unwrap();
    assert_eq!(outbox.len(), 3);

    let transition = outbox
        .iter()
        .find(|row| {
            row.event_type == EventType::Entry && row.payload.0["status"] == "EXITED"
        })
        .expect("EXITED transition event missing");
    assert_eq!(transition.payload.0["entryId"], json!(entry_id));

    let exit_event = outbox
        .iter()
        .find(|row| row.event_type == EventType::Exit)
        .expect("EXIT event missing");
    assert_eq!(exit_event.payload.0["exitId"], json!(exit_id));
    assert_eq!(exit_event.payload.0["exitFlag"], "NORMAL_EXIT");
}

#[tokio::test]
async fn second_exit_for_the_same_entry_is_marked_duplicate() {
    let (engine, store) = engine().await;
    let entry_id = Uuid::new_v4();
    let roll = "24MA10005";

    engine
        .process(&entry_claims(entry_id, roll), false, ScanMode::Entry, &ScanOptions::default())
        .await
        .unwrap();
    engine
        .process(
            &exit_claims(Some(entry_id), roll, false),
            false,
            ScanMode::Exit,
            &ScanOptions::default(),
        )
        .await
        .unwrap();

    let decision = engine
        .process(
            &exit_claims(Some(entry_id), roll, false),
            false,
            ScanMode::Exit,
            &ScanOptions::default(),
        )
        .await
        .unwrap();

    let details = assert_allowed(&decision);
    assert_eq!(details.exit_flag, Some(ExitFlag::DuplicateExit));

    let exits = ExitRepo::find_for_entry(store.pool(), entry_id).await.unwrap();
    assert_eq!(exits.len(), 2);
    assert_eq!(exits[1].exit_flag, ExitFlag::DuplicateExit);
    // Duplicates still point at the entry they re-exited.
    assert_eq!(exits[1].entry_id, Some(entry_id));
}

#[tokio::test]
async fn unresolvable_exit_is_an_orphan_carrying_its_claim() {
    let (engine, store) = engine().await;
    let claimed = Uuid::new_v4();

    let decision = engine
        .process(
            &exit_claims(Some(claimed), "R6", false),
            false,
            ScanMode::Exit,
            &ScanOptions::default(),
        )
        .await
        .unwrap();

    let details = assert_allowed(&decision);
    assert_eq!(details.exit_flag, Some(ExitFlag::OrphanExit));

    let exit = ExitRepo::find_by_id(store.pool(), details.id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit.entry_id, None);
    assert_eq!(exit.device_meta.0["claimedEntryId"], json!(claimed));
}

#[tokio::test]
async fn emergency_exit_resolves_the_most_recent_open_entry() {
    let (engine, store) = engine().await;
    let roll = "24MA10007";

    UserRepo::get_or_create(store.pool(), roll).await.unwrap();
    let older = Uuid::new_v4();
    let newer = Uuid::new_v4();
    for (id, age_hours) in [(older, 5), (newer, 1)] {
        EntryRepo::insert(
            store.pool(),
            &NewEntryLog {
                id,
                roll: roll.to_string(),
                status: EntryStatus::Entered,
                entry_flag: Some(EntryFlag::NormalEntry),
                laptop: None,
                extra: vec![],
                device_meta: Map::new(),
                source: None,
                os: None,
                device_id: None,
                created_at: Utc::now() - Duration::hours(age_hours),
                scanned_at: Some(Utc::now() - Duration::hours(age_hours)),
            },
        )
        .await
        .unwrap();
    }

    let decision = engine
        .process(
            &exit_claims(None, roll, true),
            false,
            ScanMode::Exit,
            &ScanOptions::default(),
        )
        .await
        .unwrap();

    let details = assert_allowed(&decision);
    assert_eq!(details.exit_flag, Some(ExitFlag::EmergencyExit));

    let exit = ExitRepo::find_by_id(store.pool(), details.id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit.entry_id, Some(newer));
}

#[tokio::test]
async fn expired_exit_is_allowed_but_tagged() {
    let (engine, store) = engine().await;
    let entry_id = Uuid::new_v4();
    let roll = "24MA10008";

    engine
        .process(&entry_claims(entry_id, roll), false, ScanMode::Entry, &ScanOptions::default())
        .await
        .unwrap();

    // People get out even on a stale credential.
    let decision = engine
        .process(
            &exit_claims(Some(entry_id), roll, false),
            true,
            ScanMode::Exit,
            &ScanOptions::default(),
        )
        .await
        .unwrap();

    let details = assert_allowed(&decision);
    let exit = ExitRepo::find_by_id(store.pool(), details.id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit.device_meta.0["expired"], json!(true));
}

#[tokio::test]
async fn device_id_tag_lands_in_rows_and_meta() {
    let store = GateStore::in_memory().await.unwrap();
    let engine = ScanEngine::new(store.clone()).with_device_id(Some("gate-01".to_string()));

    let decision = engine
        .process(
            &exit_claims(None, "R9", false),
            false,
            ScanMode::Exit,
            &ScanOptions::default(),
        )
        .await
        .unwrap();

    let details = assert_allowed(&decision);
    let exit = ExitRepo::find_by_id(store.pool(), details.id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit.device_id.as_deref(), Some("gate-01"));
    assert_eq!(exit.device_meta.0["gateDeviceId"], json!("gate-01"));
}

// ============================================================================
// Midnight closer
// ============================================================================

async fn seed_open_entry(store: &GateStore, roll: &str, age: Duration) -> Uuid {
    UserRepo::get_or_create(store.pool(), roll).await.unwrap();
    let id = Uuid::new_v4();
    EntryRepo::insert(
        store.pool(),
        &NewEntryLog {
            id,
            roll: roll.to_string(),
            status: EntryStatus::Entered,
            entry_flag: Some(EntryFlag::NormalEntry),
            laptop: Some("ThinkPad".to_string()),
            extra: vec![json!("mouse")],
            device_meta: Map::new(),
            source: None,
            os: None,
            device_id: None,
            created_at: Utc::now() - age,
            scanned_at: Some(Utc::now() - age),
        },
    )
    .await
    .unwrap();
    id
}

#[tokio::test]
async fn closer_expires_only_entries_past_the_threshold() {
    let store = GateStore::in_memory().await.unwrap();
    // Straddle the 20h cutoff from both sides.
    let stale = seed_open_entry(&store, "R10", Duration::hours(20) + Duration::seconds(5)).await;
    let fresh = seed_open_entry(&store, "R11", Duration::hours(20) - Duration::seconds(5)).await;

    let report = MidnightCloser::new(store.clone()).run(20, false).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.exits_created, 1);
    assert_eq!(report.entries_expired, 1);
    assert_eq!(report.failed, 0);

    let closed = EntryRepo::find_by_id(store.pool(), stale).await.unwrap().unwrap();
    assert_eq!(closed.status, EntryStatus::Expired);

    let untouched = EntryRepo::find_by_id(store.pool(), fresh).await.unwrap().unwrap();
    assert_eq!(untouched.status, EntryStatus::Entered);

    let exits = ExitRepo::find_for_entry(store.pool(), stale).await.unwrap();
    assert_eq!(exits.len(), 1);
    assert_eq!(exits[0].exit_flag, ExitFlag::AutoExit);
    assert_eq!(exits[0].device_meta.0["source"], json!("midnight_job"));
    // The auto exit carries what the entry brought in.
    assert_eq!(exits[0].laptop.as_deref(), Some("ThinkPad"));

    // One EXIT plus one ENTRY_EXPIRED_SEEN per closed entry.
    let outbox = OutboxRepo::find_all(store.pool()).await.unwrap();
    assert_eq!(outbox.len(), 2);
    assert!(outbox.iter().any(|r| r.event_type == EventType::Exit));
    assert!(outbox.iter().any(|r| r.event_type == EventType::EntryExpiredSeen));
}

#[tokio::test]
async fn closer_dry_run_changes_nothing() {
    let store = GateStore::in_memory().await.unwrap();
    let stale = seed_open_entry(&store, "R12", Duration::hours(25)).await;

    let report = MidnightCloser::new(store.clone()).run(20, true).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.exits_created, 0);
    assert!(report.dry_run);

    let row = EntryRepo::find_by_id(store.pool(), stale).await.unwrap().unwrap();
    assert_eq!(row.status, EntryStatus::Entered);
    assert!(OutboxRepo::find_all(store.pool()).await.unwrap().is_empty());
}
