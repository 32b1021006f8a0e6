//! Name-sync watcher scenarios: startup seeding, stale detection, and the
//! rename fixed point.

mod support;

use std::sync::Arc;

use {
    support::{FakeGateway, FakeSource},
    threadmirror_bridge::{NameSyncWatcher, name_sync::stale_marker},
    threadmirror_common::PLACEHOLDER_THREAD_NAME,
    threadmirror_state::{Mapping, MappingRegistry, StateStore},
};

async fn fixture() -> (Arc<FakeGateway>, Arc<FakeSource>, MappingRegistry, NameSyncWatcher) {
    let gateway = FakeGateway::new();
    let source = FakeSource::new();
    let store = Arc::new(StateStore::open_in_memory().await.unwrap());
    let registry = MappingRegistry::new(store);
    let watcher = NameSyncWatcher::new(source.clone(), gateway.clone(), registry.clone());
    (gateway, source, registry, watcher)
}

#[tokio::test]
async fn startup_seeds_from_chat_service_and_marks_stale() {
    let (gateway, source, registry, watcher) = fixture().await;
    gateway.add_thread("T1", "Old", false);
    gateway.mark_missing("T2");
    registry.put(Mapping::new("C1", "T1", "demo")).await.unwrap();
    registry.put(Mapping::new("C2", "T2", "demo")).await.unwrap();

    watcher.initialize().await.unwrap();
    assert_eq!(watcher.cached_name("C1").await.as_deref(), Some("Old"));
    assert_eq!(watcher.cached_name("C2").await, Some(stale_marker("C2")));

    // First sync renames only the live thread; the stale one is left alone
    // forever.
    source.set_name("C1", "New");
    source.set_name("C2", "Rename me");
    let renamed = watcher.sync_pass().await.unwrap();
    assert_eq!(renamed, 1);
    assert_eq!(gateway.thread("T1").unwrap().name, "New");

    let renamed = watcher.sync_pass().await.unwrap();
    assert_eq!(renamed, 0);
    assert_eq!(watcher.cached_name("C2").await, Some(stale_marker("C2")));
}

#[tokio::test]
async fn stable_names_reach_a_fixed_point() {
    let (gateway, source, registry, watcher) = fixture().await;
    gateway.add_thread("T1", "Alpha", false);
    registry.put(Mapping::new("C1", "T1", "demo")).await.unwrap();
    source.set_name("C1", "Alpha");

    watcher.initialize().await.unwrap();
    assert_eq!(watcher.sync_pass().await.unwrap(), 0);
    assert_eq!(gateway.rename_count(), 0);
}

#[tokio::test]
async fn placeholder_threads_are_renamed_once_named() {
    let (gateway, source, registry, watcher) = fixture().await;
    gateway.add_thread("T1", PLACEHOLDER_THREAD_NAME, false);
    registry.put(Mapping::new("C1", "T1", "demo")).await.unwrap();

    watcher.initialize().await.unwrap();
    source.set_name("C1", "Implement retries");

    assert_eq!(watcher.sync_pass().await.unwrap(), 1);
    assert_eq!(gateway.thread("T1").unwrap().name, "Implement retries");
}

#[tokio::test]
async fn long_names_are_truncated_before_rename() {
    let (gateway, source, registry, watcher) = fixture().await;
    gateway.add_thread("T1", "Short", false);
    registry.put(Mapping::new("C1", "T1", "demo")).await.unwrap();
    watcher.initialize().await.unwrap();

    let long = "x".repeat(250);
    source.set_name("C1", &long);
    assert_eq!(watcher.sync_pass().await.unwrap(), 1);
    assert_eq!(gateway.thread("T1").unwrap().name.chars().count(), 100);

    // The cache stores the full IDE name, so the pass converges.
    assert_eq!(watcher.sync_pass().await.unwrap(), 0);
}

#[tokio::test]
async fn rename_not_found_poisons_the_cache_entry() {
    let (gateway, source, registry, watcher) = fixture().await;
    gateway.add_thread("T1", "Alive", false);
    registry.put(Mapping::new("C1", "T1", "demo")).await.unwrap();
    watcher.initialize().await.unwrap();

    gateway.mark_missing("T1");
    source.set_name("C1", "Renamed");

    assert_eq!(watcher.sync_pass().await.unwrap(), 0);
    assert_eq!(watcher.cached_name("C1").await, Some(stale_marker("C1")));
    assert!(registry.get("C1").await.unwrap().unwrap().stale);

    // No further rename attempts.
    assert_eq!(watcher.sync_pass().await.unwrap(), 0);
    assert_eq!(gateway.rename_count(), 0);
}
