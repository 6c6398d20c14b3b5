//! Read-through healing over the in-memory tier fakes.
//!
//! These run unconditionally (no backend required). GREEN when:
//! - set-then-get round-trips through the repository;
//! - a task evicted from the hot tier heals from the durable tier;
//! - a task present only in the hot tier is still found;
//! - a hot tier that is down entirely degrades to the durable tier
//!   instead of failing the read;
//! - import-name lookup falls back to the durable tier when the hot set
//!   yields nothing.

use svp_schemas::TaskKind;
use svp_store::tasks::TaskDurableTier;
use svp_store::TaskRepository;
use svp_testkit::{accepted_record, InMemoryDurableTier, InMemoryHotTier};

#[tokio::test]
async fn set_then_get_round_trips() {
    let kv = InMemoryHotTier::new();
    let doc = InMemoryDurableTier::new();
    let repo = TaskRepository::new(&kv, &doc);

    let record = accepted_record("t-1", "u1");
    repo.set("t-1", TaskKind::Validation, &record).await.unwrap();

    let fetched = repo.get("t-1", TaskKind::Validation).await.unwrap();
    assert_eq!(fetched, Some(record));
}

#[tokio::test]
async fn hot_tier_eviction_heals_from_durable_tier() {
    let kv = InMemoryHotTier::new();
    let doc = InMemoryDurableTier::new();
    let repo = TaskRepository::new(&kv, &doc);

    let record = accepted_record("t-2", "u1");
    repo.set("t-2", TaskKind::Schemas, &record).await.unwrap();

    kv.evict("t-2", TaskKind::Schemas);

    let fetched = repo.get("t-2", TaskKind::Schemas).await.unwrap();
    assert_eq!(fetched, Some(record));
}

#[tokio::test]
async fn hot_tier_alone_still_serves_reads() {
    let kv = InMemoryHotTier::new();
    let doc = InMemoryDurableTier::new();
    let repo = TaskRepository::new(&kv, &doc);

    let record = accepted_record("t-3", "u1");
    repo.set("t-3", TaskKind::Validation, &record).await.unwrap();

    doc.remove("t-3", TaskKind::Validation);

    let fetched = repo.get("t-3", TaskKind::Validation).await.unwrap();
    assert_eq!(fetched, Some(record));
}

#[tokio::test]
async fn offline_hot_tier_degrades_to_durable_tier() {
    let kv = InMemoryHotTier::new();
    let doc = InMemoryDurableTier::new();

    // Seed the durable tier directly; the hot tier never sees the task.
    let record = accepted_record("t-4", "u1");
    doc.upsert_task("t-4", TaskKind::Validation, &record)
        .await
        .unwrap();
    kv.set_offline(true);

    let repo = TaskRepository::new(&kv, &doc);
    let fetched = repo.get("t-4", TaskKind::Validation).await.unwrap();
    assert_eq!(fetched, Some(record));
}

#[tokio::test]
async fn import_lookup_falls_back_to_durable_tier() {
    let kv = InMemoryHotTier::new();
    let doc = InMemoryDurableTier::new();
    let repo = TaskRepository::new(&kv, &doc);

    repo.set("t-5", TaskKind::Validation, &accepted_record("t-5", "batch"))
        .await
        .unwrap();
    repo.set("t-6", TaskKind::Validation, &accepted_record("t-6", "batch"))
        .await
        .unwrap();

    // Expire both hashes from the hot tier; the set lookup then yields
    // nothing and the durable tier serves the batch.
    kv.evict("t-5", TaskKind::Validation);
    kv.evict("t-6", TaskKind::Validation);

    let tasks = repo
        .get_by_import("batch", TaskKind::Validation)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 2);

    let tasks = repo
        .get_by_import("batch", TaskKind::Schemas)
        .await
        .unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn status_update_merges_data_in_both_tiers() {
    let kv = InMemoryHotTier::new();
    let doc = InMemoryDurableTier::new();
    let repo = TaskRepository::new(&kv, &doc);

    let record = accepted_record("t-7", "u1");
    repo.set("t-7", TaskKind::Schemas, &record).await.unwrap();

    let mut patch = serde_json::Map::new();
    patch.insert("update_date".into(), serde_json::json!("2026-02-01T00:00:00Z"));
    repo.update(&svp_schemas::UpdateTaskRequest {
        task_id: "t-7".into(),
        task: TaskKind::Schemas,
        field: "status".into(),
        value: serde_json::json!("completed"),
        message: "done".into(),
        data: Some(patch),
        reset_data: false,
    })
    .await
    .unwrap();

    let fetched = repo
        .get("t-7", TaskKind::Schemas)
        .await
        .unwrap()
        .expect("task must exist");
    assert_eq!(fetched.status, "completed");
    assert_eq!(fetched.message, "done");
    // The original import-name data survives the merge.
    assert_eq!(
        fetched.data.get("import_name"),
        Some(&serde_json::json!("u1"))
    );

    // The durable copy saw the same mutation.
    let durable = doc
        .get_task("t-7", TaskKind::Schemas)
        .await
        .unwrap()
        .expect("durable copy must exist");
    assert_eq!(durable.status, "completed");
}
