//! Trait contract tests for ResourceStore and ChangeFeed.
//!
//! Every contract runs against both the in-memory store and the SurrealDB
//! store (in `mem://` mode). Any conforming implementation must pass these.

use chrono::Utc;
use reaper_state::{
    ChangeEvent, ChangeFeed, ExecutionResource, ManagedResource, ManagedRetention,
    MemoryResourceStore, ObjectKey, Outcome, Resource, ResourceKind, ResourceStore, StoreError,
    SurrealResourceStore, WatchEvent,
};

async fn surreal() -> SurrealResourceStore {
    SurrealResourceStore::in_memory().await.unwrap()
}

// ===========================================================================
// Contracts
// ===========================================================================

async fn get_missing_is_not_found<S: ResourceStore>(store: S) {
    let err = store
        .get(ResourceKind::Execution, &ObjectKey::new("ci", "ghost"))
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "expected NotFound, got {err:?}");
}

async fn apply_then_get_round_trip<S: ResourceStore>(store: S) {
    let run = ExecutionResource::new("ci", "run-1")
        .with_owner("build-a")
        .completed(Outcome::Failed, Utc::now());
    let stored = store.apply_execution(run.clone()).await.unwrap();

    assert!(stored.metadata.uid.is_some());
    assert!(stored.metadata.created_at.is_some());

    let loaded = store.get_execution(&run.key()).await.unwrap();
    assert_eq!(loaded, stored);
    assert_eq!(loaded.spec, run.spec);
    assert_eq!(loaded.status, run.status);
}

async fn update_preserves_identity<S: ResourceStore>(store: S) {
    let created = store
        .apply_execution(ExecutionResource::new("ci", "run-2").running())
        .await
        .unwrap();
    let updated = store
        .apply_execution(ExecutionResource::new("ci", "run-2").completed(Outcome::Succeeded, Utc::now()))
        .await
        .unwrap();

    assert_eq!(created.metadata.uid, updated.metadata.uid);
    assert_eq!(created.metadata.created_at, updated.metadata.created_at);
    assert_eq!(updated.outcome(), Some(Outcome::Succeeded));
}

async fn delete_is_terminal_and_reports_not_found<S: ResourceStore>(store: S) {
    let key = ObjectKey::new("ci", "run-3");
    let first = store
        .apply_execution(ExecutionResource::new("ci", "run-3"))
        .await
        .unwrap();

    store.delete(ResourceKind::Execution, &key).await.unwrap();
    assert!(store.get_execution(&key).await.unwrap_err().is_not_found());

    let again = store.delete(ResourceKind::Execution, &key).await.unwrap_err();
    assert!(again.is_not_found());

    // Re-creating the same name is a new object.
    let second = store
        .apply_execution(ExecutionResource::new("ci", "run-3"))
        .await
        .unwrap();
    assert_ne!(first.metadata.uid, second.metadata.uid);
}

async fn kinds_do_not_collide<S: ResourceStore>(store: S) {
    store
        .apply_managed(ManagedResource::new("ci", "same-name"))
        .await
        .unwrap();
    store
        .apply_execution(ExecutionResource::new("ci", "same-name"))
        .await
        .unwrap();

    let key = ObjectKey::new("ci", "same-name");
    assert!(matches!(
        store.get(ResourceKind::Managed, &key).await.unwrap(),
        Resource::Managed(_)
    ));
    store.delete(ResourceKind::Execution, &key).await.unwrap();
    assert!(store.get_managed(&key).await.is_ok());
}

async fn list_filters_by_namespace<S: ResourceStore>(store: S) {
    for (ns, name) in [("ci", "b"), ("ci", "a"), ("prod", "c")] {
        store
            .apply_execution(ExecutionResource::new(ns, name))
            .await
            .unwrap();
    }
    store
        .apply_managed(ManagedResource::new("ci", "build-a"))
        .await
        .unwrap();

    let all = store.list_executions(None).await.unwrap();
    assert_eq!(all.len(), 3);

    let ci: Vec<String> = store
        .list_executions(Some("ci"))
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.metadata.name)
        .collect();
    assert_eq!(ci, vec!["a".to_string(), "b".to_string()]);

    assert_eq!(store.list_managed(Some("ci")).await.unwrap().len(), 1);
    assert!(store.list_managed(Some("prod")).await.unwrap().is_empty());
}

async fn feed_reports_every_write<S: ResourceStore + ChangeFeed>(store: S) {
    let mut feed = store.subscribe();

    store
        .apply_managed(ManagedResource::new("ci", "build-a").with_retention(ManagedRetention {
            succeeded_limit: Some(3),
            ..Default::default()
        }))
        .await
        .unwrap();
    store
        .apply_execution(ExecutionResource::new("ci", "run-1").running())
        .await
        .unwrap();
    store
        .apply_execution(ExecutionResource::new("ci", "run-1").completed(Outcome::Succeeded, Utc::now()))
        .await
        .unwrap();
    store
        .delete(ResourceKind::Execution, &ObjectKey::new("ci", "run-1"))
        .await
        .unwrap();

    assert!(matches!(
        feed.recv().await.unwrap(),
        WatchEvent::Managed(ChangeEvent::Created(_))
    ));
    assert!(matches!(
        feed.recv().await.unwrap(),
        WatchEvent::Execution(ChangeEvent::Created(_))
    ));
    match feed.recv().await.unwrap() {
        WatchEvent::Execution(ChangeEvent::Updated { old, new }) => {
            assert_eq!(old.outcome(), None);
            assert_eq!(new.outcome(), Some(Outcome::Succeeded));
        }
        other => panic!("expected execution update, got {other:?}"),
    }
    assert!(matches!(
        feed.recv().await.unwrap(),
        WatchEvent::Execution(ChangeEvent::Deleted(_))
    ));
}

// ===========================================================================
// MemoryResourceStore
// ===========================================================================

#[tokio::test]
async fn test_memory_get_missing_is_not_found() {
    get_missing_is_not_found(MemoryResourceStore::new()).await;
}

#[tokio::test]
async fn test_memory_apply_then_get_round_trip() {
    apply_then_get_round_trip(MemoryResourceStore::new()).await;
}

#[tokio::test]
async fn test_memory_update_preserves_identity() {
    update_preserves_identity(MemoryResourceStore::new()).await;
}

#[tokio::test]
async fn test_memory_delete_is_terminal() {
    delete_is_terminal_and_reports_not_found(MemoryResourceStore::new()).await;
}

#[tokio::test]
async fn test_memory_kinds_do_not_collide() {
    kinds_do_not_collide(MemoryResourceStore::new()).await;
}

#[tokio::test]
async fn test_memory_list_filters_by_namespace() {
    list_filters_by_namespace(MemoryResourceStore::new()).await;
}

#[tokio::test]
async fn test_memory_feed_reports_every_write() {
    feed_reports_every_write(MemoryResourceStore::new()).await;
}

#[tokio::test]
async fn test_memory_injected_faults_fire_once() {
    let store = MemoryResourceStore::new();
    let key = ObjectKey::new("ci", "run-1");
    store
        .apply_execution(ExecutionResource::new("ci", "run-1"))
        .await
        .unwrap();

    store.fail_next_delete(StoreError::Backend("etcd timeout".into()));
    let err = store.delete(ResourceKind::Execution, &key).await.unwrap_err();
    assert_eq!(err, StoreError::Backend("etcd timeout".into()));
    assert_eq!(store.delete_count(), 0);

    store.delete(ResourceKind::Execution, &key).await.unwrap();
    assert_eq!(store.delete_count(), 1);
    assert!(!store.contains(ResourceKind::Execution, &key));

    store.fail_next_get(StoreError::Conflict("stale read".into()));
    assert!(matches!(
        store.get(ResourceKind::Execution, &key).await,
        Err(StoreError::Conflict(_))
    ));
    assert!(store.get(ResourceKind::Execution, &key).await.unwrap_err().is_not_found());
}

// ===========================================================================
// SurrealResourceStore
// ===========================================================================

#[tokio::test]
async fn test_surreal_get_missing_is_not_found() {
    get_missing_is_not_found(surreal().await).await;
}

#[tokio::test]
async fn test_surreal_apply_then_get_round_trip() {
    apply_then_get_round_trip(surreal().await).await;
}

#[tokio::test]
async fn test_surreal_update_preserves_identity() {
    update_preserves_identity(surreal().await).await;
}

#[tokio::test]
async fn test_surreal_delete_is_terminal() {
    delete_is_terminal_and_reports_not_found(surreal().await).await;
}

#[tokio::test]
async fn test_surreal_kinds_do_not_collide() {
    kinds_do_not_collide(surreal().await).await;
}

#[tokio::test]
async fn test_surreal_list_filters_by_namespace() {
    list_filters_by_namespace(surreal().await).await;
}

#[tokio::test]
async fn test_surreal_feed_reports_every_write() {
    feed_reports_every_write(surreal().await).await;
}
