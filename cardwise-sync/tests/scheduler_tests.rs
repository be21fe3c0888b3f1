use cardwise_cloud::MemoryRemoteStore;
use cardwise_storage::LocalStore;
use cardwise_sync::{Backend, Ledger, Reconciler, SyncConfig, create_sync_scheduler};
use cardwise_types::{DocPath, Payload};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn path(raw: &str) -> DocPath {
    DocPath::parse(raw).unwrap()
}

fn payload(value: serde_json::Value) -> Payload {
    value.as_object().cloned().unwrap()
}

fn signed_in(account: &str) -> (Backend, Arc<MemoryRemoteStore>) {
    let backend = Backend::new(LocalStore::open_in_memory().unwrap());
    backend.sign_in(account).unwrap();
    (backend, Arc::new(MemoryRemoteStore::new().with_sequential_ids("R")))
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn push_runs_on_interval() {
    let (backend, remote) = signed_in("u1");
    backend
        .db_add("users.u1.cards", &payload(json!({ "cardId": "visa" })))
        .unwrap();
    let handle = backend.spawn_sync(remote.clone(), SyncConfig::default());

    advance(29).await;
    assert_eq!(remote.add_count(), 0);

    advance(2).await;
    assert_eq!(remote.add_count(), 1);
    assert!(
        backend
            .local()
            .unsynced("u1", &path("users.u1.cards"))
            .unwrap()
            .is_empty()
    );

    let status = handle.status();
    assert!(status.last_push.is_some());
    assert_eq!(status.running_pushes, 0);
    assert_eq!(status.last_push_report.map(|r| r.pushed), Some(1));
}

#[tokio::test(start_paused = true)]
async fn startup_pull_runs_once_after_delay() {
    let (backend, remote) = signed_in("u1");
    remote
        .insert(&path("users.u1"), payload(json!({ "dateCreated": "2024-01-01T00:00:00.000Z" })))
        .unwrap();
    remote
        .insert(&path("users.u1.cards.R7"), payload(json!({ "cardId": "amex" })))
        .unwrap();
    let handle = backend.spawn_sync(remote.clone(), SyncConfig::default());

    advance(14).await;
    assert!(!handle.status().startup_pull_done);
    assert_eq!(backend.local().count_entries("u1").unwrap(), 0);

    advance(2).await;
    assert!(handle.status().startup_pull_done);
    assert!(backend.db_does_doc_exist("users.u1").unwrap());
    assert!(backend.db_does_doc_exist("users.u1.cards.R7").unwrap());

    let gets_after_startup = remote.get_count();
    advance(60).await;
    // Push passes do not read; no second startup pull happened.
    assert_eq!(remote.get_count(), gets_after_startup);
}

#[tokio::test(start_paused = true)]
async fn startup_pull_brings_in_card_catalog() {
    let (backend, remote) = signed_in("u1");
    remote
        .insert(
            &path("cards.amex"),
            payload(json!({ "rewards": { "dining": 4, "others": 1 }, "conversion": 1.5 })),
        )
        .unwrap();
    remote
        .insert(
            &path("cards.visa"),
            payload(json!({ "rewards": { "others": 1 }, "conversion": 1 })),
        )
        .unwrap();
    remote
        .insert(&path("users.u1.cards.R7"), payload(json!({ "cardId": "amex" })))
        .unwrap();
    remote
        .insert(&path("users.u1.cards.R8"), payload(json!({ "cardId": "visa" })))
        .unwrap();
    let _handle = backend.spawn_sync(remote.clone(), SyncConfig::default());

    advance(16).await;
    let ranked = Ledger::new(backend.clone())
        .rank_cards_for_category("Restaurant")
        .unwrap();
    let ranked: Vec<_> = ranked.into_iter().map(|r| (r.card_id, r.reward)).collect();
    assert_eq!(
        ranked,
        vec![("amex".to_string(), 6.0), ("visa".to_string(), 1.0)]
    );
}

#[tokio::test(start_paused = true)]
async fn tracked_document_edit_is_pushed_on_tick() {
    let (backend, remote) = signed_in("u1");
    backend
        .db_set("users.u1", &payload(json!({ "plan": "pro" })), false)
        .unwrap();
    let config = SyncConfig {
        startup_delay_secs: 3600,
        ..SyncConfig::default()
    };
    let _handle = backend.spawn_sync(remote.clone(), config);

    advance(31).await;
    assert_eq!(
        remote.document(&path("users.u1")),
        Some(payload(json!({ "plan": "pro" })))
    );
    assert_eq!(remote.collection(&path("users")).len(), 1);

    let sets = remote.set_count();
    advance(30).await;
    assert_eq!(remote.set_count(), sets);
}

#[tokio::test(start_paused = true)]
async fn offline_account_never_touches_remote() {
    let backend = Backend::new(LocalStore::open_in_memory().unwrap());
    backend.sign_in_offline().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    backend
        .db_add("users.offline.cards", &payload(json!({ "cardId": "visa" })))
        .unwrap();
    let handle = backend.spawn_sync(remote.clone(), SyncConfig::default());

    advance(120).await;
    assert_eq!(
        remote.get_count() + remote.add_count() + remote.set_count() + remote.delete_count(),
        0
    );
    assert!(!handle.status().startup_pull_done);
    assert!(handle.status().last_push.is_none());
}

#[tokio::test(start_paused = true)]
async fn signed_out_scheduler_idles() {
    let backend = Backend::new(LocalStore::open_in_memory().unwrap());
    let remote = Arc::new(MemoryRemoteStore::new());
    let handle = backend.spawn_sync(remote.clone(), SyncConfig::default());

    advance(120).await;
    assert_eq!(remote.get_count() + remote.add_count(), 0);
    assert!(handle.status().last_pull.is_none());
}

#[tokio::test(start_paused = true)]
async fn push_now_and_pull_now() {
    let (backend, remote) = signed_in("u1");
    let handle = backend.spawn_sync(remote.clone(), SyncConfig::default());

    backend
        .db_add("users.u1.cards", &payload(json!({ "cardId": "visa" })))
        .unwrap();
    handle.push_now().await.unwrap();
    advance(1).await;
    assert_eq!(remote.add_count(), 1);

    remote
        .insert(&path("users.u1.transactions.R9"), payload(json!({ "amountSpent": 3 })))
        .unwrap();
    handle.pull_now().await.unwrap();
    advance(1).await;
    assert!(backend.db_does_doc_exist("users.u1.transactions.R9").unwrap());
    assert!(handle.status().last_pull.is_some());
    // A manual pull does not consume the startup latch.
    assert!(!handle.status().startup_pull_done);
}

#[tokio::test(start_paused = true)]
async fn hung_push_does_not_delay_next_tick() {
    let backend = Backend::new(LocalStore::open_in_memory().unwrap());
    backend.sign_in("u1").unwrap();
    let remote = Arc::new(
        MemoryRemoteStore::new()
            .with_sequential_ids("R")
            .with_latency(Duration::from_secs(45)),
    );
    backend
        .db_add("users.u1.cards", &payload(json!({ "cardId": "visa" })))
        .unwrap();
    let config = SyncConfig {
        startup_delay_secs: 3600,
        ..SyncConfig::default()
    };
    let handle = backend.spawn_sync(remote.clone(), config);

    // First pass starts at 30s and is still waiting on the remote at 61s,
    // while the second tick has fired and skipped the in-flight payload.
    advance(61).await;
    assert_eq!(handle.status().running_pushes, 1);
    assert_eq!(remote.add_count(), 1);
    assert_eq!(
        handle.status().last_push_report.map(|r| r.skipped),
        Some(1)
    );

    advance(60).await;
    assert_eq!(remote.add_count(), 1);
    assert_eq!(handle.status().running_pushes, 0);
}

#[tokio::test(start_paused = true)]
async fn stop_ends_the_loop() {
    let local = LocalStore::open_in_memory().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let reconciler = Reconciler::new(local, remote);
    let (handle, scheduler) = create_sync_scheduler(reconciler, SyncConfig::default());
    let task = tokio::spawn(scheduler.run());

    handle.stop().await.unwrap();
    task.await.unwrap();
    assert!(handle.is_stopped());
    assert!(handle.push_now().await.is_err());
}
