//! Storage trait definitions for Reaper
//!
//! These traits define the collaborator surface the controller consumes:
//! - `ResourceStore`: keyed get/delete/list plus apply (create-or-update)
//! - `ChangeFeed`: a broadcast stream of create/update/delete notifications
//!
//! All traits are backend-agnostic. An in-memory fake lives in the `fakes`
//! module; `SurrealResourceStore` persists to SurrealDB.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::resource::{
    ExecutionResource, ManagedResource, ObjectKey, Resource, ResourceKind, WatchEvent,
};

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Capacity of the broadcast channel behind every change feed.
pub const CHANGE_FEED_CAPACITY: usize = 1024;

/// Durable resource store.
///
/// Guarantees:
/// - `get` on a missing object returns `StoreError::NotFound`, never `Ok`.
/// - `delete` on a missing object returns `StoreError::NotFound`.
/// - `apply_*` assigns `uid` and `created_at` on create and preserves them on update.
/// - Each successful apply or delete publishes exactly one `WatchEvent`
///   on the store's change feed.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Load a resource by kind and key.
    async fn get(&self, kind: ResourceKind, key: &ObjectKey) -> StoreResult<Resource>;

    /// Delete a resource by kind and key.
    async fn delete(&self, kind: ResourceKind, key: &ObjectKey) -> StoreResult<()>;

    /// List executions, optionally limited to one namespace.
    async fn list_executions(&self, namespace: Option<&str>)
        -> StoreResult<Vec<ExecutionResource>>;

    /// List managed resources, optionally limited to one namespace.
    async fn list_managed(&self, namespace: Option<&str>) -> StoreResult<Vec<ManagedResource>>;

    /// Create or update a managed resource, returning the stored object.
    async fn apply_managed(&self, resource: ManagedResource) -> StoreResult<ManagedResource>;

    /// Create or update an execution, returning the stored object.
    async fn apply_execution(&self, resource: ExecutionResource)
        -> StoreResult<ExecutionResource>;

    /// Load an execution by key.
    async fn get_execution(&self, key: &ObjectKey) -> StoreResult<ExecutionResource> {
        match self.get(ResourceKind::Execution, key).await? {
            Resource::Execution(r) => Ok(r),
            Resource::Managed(_) => Err(StoreError::Backend(format!(
                "expected execution at {key}, found managed resource"
            ))),
        }
    }

    /// Load a managed resource by key.
    async fn get_managed(&self, key: &ObjectKey) -> StoreResult<ManagedResource> {
        match self.get(ResourceKind::Managed, key).await? {
            Resource::Managed(r) => Ok(r),
            Resource::Execution(_) => Err(StoreError::Backend(format!(
                "expected managed resource at {key}, found execution"
            ))),
        }
    }
}

/// Source of change notifications.
///
/// Subscribers that fall behind by more than [`CHANGE_FEED_CAPACITY`] events
/// observe `RecvError::Lagged` and must resync from the store.
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to all future change notifications.
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;
}
