//! Repository tests against fresh in-memory stores

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use palegate_db::{
    BackendStore, EntryRepo, EntryReplica, ExitRepo, GateStore, NewEntryLog, NewExitLog,
    OutboxRepo, ProcessedRepo, UserRepo,
};
use palegate_types::{EntryFlag, EntryStatus, EventType, ExitFlag};

fn entry(roll: &str, status: EntryStatus) -> NewEntryLog {
    NewEntryLog {
        id: Uuid::new_v4(),
        roll: roll.to_string(),
        status,
        entry_flag: Some(EntryFlag::NormalEntry),
        laptop: None,
        extra: vec![],
        device_meta: Map::new(),
        source: None,
        os: None,
        device_id: None,
        created_at: Utc::now(),
        scanned_at: Some(Utc::now()),
    }
}

#[tokio::test]
async fn users_are_created_once() {
    let store = GateStore::in_memory().await.unwrap();

    UserRepo::get_or_create(store.pool(), "24MA10001").await.unwrap();
    UserRepo::get_or_create(store.pool(), "24MA10001").await.unwrap();

    assert_eq!(UserRepo::count(store.pool()).await.unwrap(), 1);
    assert!(UserRepo::find(store.pool(), "24MA10001").await.unwrap().is_some());
}

#[tokio::test]
async fn entry_round_trips_with_json_fields() {
    let store = GateStore::in_memory().await.unwrap();
    UserRepo::get_or_create(store.pool(), "24MA10001").await.unwrap();

    let mut new = entry("24MA10001", EntryStatus::Entered);
    new.laptop = Some("Dell XPS 15".to_string());
    new.extra = vec![json!("charger"), json!({"kind": "bag"})];
    new.device_meta.insert("gateDeviceId".to_string(), json!("gate-01"));
    EntryRepo::insert(store.pool(), &new).await.unwrap();

    let row = EntryRepo::find_by_id(store.pool(), new.id).await.unwrap().unwrap();
    assert_eq!(row.status, EntryStatus::Entered);
    assert_eq!(row.entry_flag, Some(EntryFlag::NormalEntry));
    assert_eq!(row.extra.0.len(), 2);
    assert_eq!(row.device_meta.0["gateDeviceId"], json!("gate-01"));
}

#[tokio::test]
async fn displacement_only_touches_open_rows_of_the_roll() {
    let store = GateStore::in_memory().await.unwrap();
    UserRepo::get_or_create(store.pool(), "A").await.unwrap();
    UserRepo::get_or_create(store.pool(), "B").await.unwrap();

    let open_a = entry("A", EntryStatus::Entered);
    let exited_a = entry("A", EntryStatus::Exited);
    let open_b = entry("B", EntryStatus::Entered);
    for e in [&open_a, &exited_a, &open_b] {
        EntryRepo::insert(store.pool(), e).await.unwrap();
    }

    let ts = Utc::now();
    let displaced = EntryRepo::expire_open_for_roll(store.pool(), "A", ts).await.unwrap();
    assert_eq!(displaced, 1);

    let a = EntryRepo::find_by_id(store.pool(), open_a.id).await.unwrap().unwrap();
    assert_eq!(a.status, EntryStatus::Expired);

    let b = EntryRepo::find_by_id(store.pool(), open_b.id).await.unwrap().unwrap();
    assert_eq!(b.status, EntryStatus::Entered);

    let old = EntryRepo::find_by_id(store.pool(), exited_a.id).await.unwrap().unwrap();
    assert_eq!(old.status, EntryStatus::Exited);
}

#[tokio::test]
async fn mark_exited_preserves_entry_scan_time() {
    let store = GateStore::in_memory().await.unwrap();
    UserRepo::get_or_create(store.pool(), "A").await.unwrap();

    let new = entry("A", EntryStatus::Entered);
    let scanned_at = new.scanned_at;
    EntryRepo::insert(store.pool(), &new).await.unwrap();

    assert!(EntryRepo::mark_exited(store.pool(), new.id).await.unwrap());

    let row = EntryRepo::find_by_id(store.pool(), new.id).await.unwrap().unwrap();
    assert_eq!(row.status, EntryStatus::Exited);
    assert_eq!(row.scanned_at, scanned_at);
}

#[tokio::test]
async fn outbox_drains_oldest_first_and_respects_retry_windows() {
    let store = GateStore::in_memory().await.unwrap();
    let base = Utc::now() - Duration::minutes(10);

    let first = OutboxRepo::emit(store.pool(), EventType::Entry, &json!({"n": 1}), base)
        .await
        .unwrap();
    let second = OutboxRepo::emit(
        store.pool(),
        EventType::Exit,
        &json!({"n": 2}),
        base + Duration::minutes(1),
    )
    .await
    .unwrap();

    let now = Utc::now();
    let batch = OutboxRepo::claim_due(store.pool(), now, 10).await.unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].event_id, first);
    assert_eq!(batch[1].event_id, second);

    // Push the first into the future; only the second stays due.
    OutboxRepo::schedule_retry(store.pool(), first, now, now + Duration::minutes(5), "timeout")
        .await
        .unwrap();
    let batch = OutboxRepo::claim_due(store.pool(), now, 10).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].event_id, second);

    let retried = OutboxRepo::find_by_id(store.pool(), first).await.unwrap().unwrap();
    assert_eq!(retried.attempt_count, 1);
    assert_eq!(retried.last_error, "timeout");
    assert!(retried.sent_at.is_none());
}

#[tokio::test]
async fn acked_rows_never_reenter_the_queue() {
    let store = GateStore::in_memory().await.unwrap();
    let now = Utc::now();

    let id = OutboxRepo::emit(store.pool(), EventType::Entry, &json!({}), now)
        .await
        .unwrap();

    assert!(OutboxRepo::mark_acked(store.pool(), id, now).await.unwrap());
    // Second ack is a no-op: sent_at is write-once.
    assert!(!OutboxRepo::mark_acked(store.pool(), id, now).await.unwrap());

    assert_eq!(OutboxRepo::count_unsent(store.pool()).await.unwrap(), 0);
    assert!(OutboxRepo::claim_due(store.pool(), Utc::now(), 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_rows_are_dropped_but_auditable() {
    let store = GateStore::in_memory().await.unwrap();
    let now = Utc::now();

    let id = OutboxRepo::emit(store.pool(), EventType::Exit, &json!({}), now)
        .await
        .unwrap();
    OutboxRepo::mark_rejected(store.pool(), id, "Unknown event type: null", now)
        .await
        .unwrap();

    assert_eq!(OutboxRepo::count_unsent(store.pool()).await.unwrap(), 0);

    let rejected = OutboxRepo::find_rejected(store.pool()).await.unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].last_error, "rejected: Unknown event type: null");
    assert!(rejected[0].sent_at.is_some());
}

#[tokio::test]
async fn processed_set_inserts_exactly_once() {
    let store = BackendStore::in_memory().await.unwrap();
    let id = Uuid::new_v4();
    let now = Utc::now();

    assert!(ProcessedRepo::force_insert(store.pool(), id, "ENTRY", now).await.unwrap());
    assert!(!ProcessedRepo::force_insert(store.pool(), id, "ENTRY", now).await.unwrap());

    assert!(ProcessedRepo::contains(store.pool(), id).await.unwrap());
    assert_eq!(ProcessedRepo::count(store.pool()).await.unwrap(), 1);
}

#[tokio::test]
async fn pending_skeleton_is_create_once() {
    let store = BackendStore::in_memory().await.unwrap();
    UserRepo::get_or_create(store.pool(), "A").await.unwrap();

    let id = Uuid::new_v4();
    let now = Utc::now();
    EntryRepo::get_or_create_pending(store.pool(), id, "A", now).await.unwrap();

    // Fill the row in, then make sure the skeleton call never clobbers it.
    let replica = EntryReplica {
        id,
        roll: "A".to_string(),
        status: EntryStatus::Entered,
        entry_flag: EntryFlag::NormalEntry,
        laptop: None,
        extra: vec![],
        scanned_at: now,
    };
    EntryRepo::upsert_replica(store.pool(), &replica, now).await.unwrap();
    EntryRepo::get_or_create_pending(store.pool(), id, "A", now).await.unwrap();

    let row = EntryRepo::find_by_id(store.pool(), id).await.unwrap().unwrap();
    assert_eq!(row.status, EntryStatus::Entered);
}

#[tokio::test]
async fn exit_rows_link_and_count() {
    let store = GateStore::in_memory().await.unwrap();
    UserRepo::get_or_create(store.pool(), "A").await.unwrap();

    let open = entry("A", EntryStatus::Entered);
    EntryRepo::insert(store.pool(), &open).await.unwrap();

    assert!(!ExitRepo::exists_for_entry(store.pool(), open.id).await.unwrap());

    let exit = NewExitLog {
        id: Uuid::new_v4(),
        roll: "A".to_string(),
        entry_id: Some(open.id),
        exit_flag: ExitFlag::NormalExit,
        laptop: None,
        extra: vec![],
        device_meta: Map::new(),
        source: None,
        os: None,
        device_id: None,
        created_at: Utc::now(),
        scanned_at: Some(Utc::now()),
    };
    ExitRepo::insert(store.pool(), &exit).await.unwrap();

    assert!(ExitRepo::exists_for_entry(store.pool(), open.id).await.unwrap());
    let linked = ExitRepo::find_for_entry(store.pool(), open.id).await.unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].exit_flag, ExitFlag::NormalExit);

    let totals = ExitRepo::flag_totals(store.pool()).await.unwrap();
    assert_eq!(totals, vec![("NORMAL_EXIT".to_string(), 1)]);
}

#[tokio::test]
async fn range_listing_applies_filters() {
    let store = GateStore::in_memory().await.unwrap();
    UserRepo::get_or_create(store.pool(), "A").await.unwrap();
    UserRepo::get_or_create(store.pool(), "B").await.unwrap();

    let now = Utc::now();
    let mut old = entry("A", EntryStatus::Exited);
    old.created_at = now - Duration::days(3);
    let mut recent_a = entry("A", EntryStatus::Entered);
    recent_a.created_at = now - Duration::hours(1);
    let mut recent_b = entry("B", EntryStatus::Entered);
    recent_b.created_at = now - Duration::hours(2);
    for e in [&old, &recent_a, &recent_b] {
        EntryRepo::insert(store.pool(), e).await.unwrap();
    }

    let all = EntryRepo::list_range(store.pool(), None, None, None, 100, 0).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, old.id);

    let since = EntryRepo::list_range(
        store.pool(),
        Some(now - Duration::days(1)),
        None,
        None,
        100,
        0,
    )
    .await
    .unwrap();
    assert_eq!(since.len(), 2);

    let only_a = EntryRepo::list_range(store.pool(), None, None, Some("A"), 100, 0)
        .await
        .unwrap();
    assert_eq!(only_a.len(), 2);
}
