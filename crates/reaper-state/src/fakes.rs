//! In-memory resource store
//!
//! `MemoryResourceStore` satisfies the `ResourceStore` and `ChangeFeed`
//! contracts without any external dependencies. It backs tests and the
//! daemon's default (non-persistent) mode, and supports one-shot fault
//! injection so error paths can be exercised deterministically.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::resource::{
    ExecutionResource, ManagedResource, ObjectKey, ObjectMeta, Resource, ResourceKind, WatchEvent,
};
use crate::storage_traits::{ChangeFeed, ResourceStore, StoreResult, CHANGE_FEED_CAPACITY};

type Slot = (ResourceKind, ObjectKey);

#[derive(Debug, Default)]
struct Faults {
    get: VecDeque<StoreError>,
    delete: VecDeque<StoreError>,
    get_delay: Option<Duration>,
}

/// In-memory resource store backed by a `HashMap<(kind, key), Resource>`.
#[derive(Debug)]
pub struct MemoryResourceStore {
    objects: Mutex<HashMap<Slot, Resource>>,
    faults: Mutex<Faults>,
    deletes: AtomicU64,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for MemoryResourceStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            objects: Mutex::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
            deletes: AtomicU64::new(0),
            events,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `get` fail with `err`.
    pub fn fail_next_get(&self, err: StoreError) {
        lock(&self.faults).get.push_back(err);
    }

    /// Make the next `delete` fail with `err`.
    pub fn fail_next_delete(&self, err: StoreError) {
        lock(&self.faults).delete.push_back(err);
    }

    /// Delay every `get` by `delay` (simulates a slow backend).
    pub fn set_get_delay(&self, delay: Option<Duration>) {
        lock(&self.faults).get_delay = delay;
    }

    /// Number of successful deletions performed so far.
    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Whether an object of `kind` exists at `key`.
    pub fn contains(&self, kind: ResourceKind, key: &ObjectKey) -> bool {
        lock(&self.objects).contains_key(&(kind, key.clone()))
    }

    fn publish(&self, old: Option<Resource>, new: Option<Resource>) {
        if let Some(event) = WatchEvent::from_snapshots(old, new) {
            // No receivers is not an error: nobody is watching yet.
            let _ = self.events.send(event);
        }
    }

    fn upsert(&self, mut resource: Resource) -> Resource {
        let slot = (resource.kind(), resource.key());
        // Publish while holding the lock so feed order matches write order.
        let mut objects = lock(&self.objects);
        let old = objects.get(&slot).cloned();
        resource
            .metadata_mut()
            .assign_identity(old.as_ref().map(Resource::metadata));
        objects.insert(slot, resource.clone());
        self.publish(old, Some(resource.clone()));
        resource
    }
}

fn in_namespace(meta: &ObjectMeta, namespace: Option<&str>) -> bool {
    namespace.map(|ns| meta.namespace == ns).unwrap_or(true)
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn get(&self, kind: ResourceKind, key: &ObjectKey) -> StoreResult<Resource> {
        let (fault, delay) = {
            let mut faults = lock(&self.faults);
            (faults.get.pop_front(), faults.get_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = fault {
            return Err(err);
        }

        lock(&self.objects)
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })
    }

    async fn delete(&self, kind: ResourceKind, key: &ObjectKey) -> StoreResult<()> {
        if let Some(err) = lock(&self.faults).delete.pop_front() {
            return Err(err);
        }

        let mut objects = lock(&self.objects);
        match objects.remove(&(kind, key.clone())) {
            Some(old) => {
                self.deletes.fetch_add(1, Ordering::SeqCst);
                self.publish(Some(old), None);
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind,
                key: key.clone(),
            }),
        }
    }

    async fn list_executions(
        &self,
        namespace: Option<&str>,
    ) -> StoreResult<Vec<ExecutionResource>> {
        let objects = lock(&self.objects);
        let mut runs: Vec<ExecutionResource> = objects
            .values()
            .filter_map(|r| match r {
                Resource::Execution(run) if in_namespace(&run.metadata, namespace) => {
                    Some(run.clone())
                }
                _ => None,
            })
            .collect();
        runs.sort_by_key(ExecutionResource::key);
        Ok(runs)
    }

    async fn list_managed(&self, namespace: Option<&str>) -> StoreResult<Vec<ManagedResource>> {
        let objects = lock(&self.objects);
        let mut managed: Vec<ManagedResource> = objects
            .values()
            .filter_map(|r| match r {
                Resource::Managed(m) if in_namespace(&m.metadata, namespace) => Some(m.clone()),
                _ => None,
            })
            .collect();
        managed.sort_by_key(ManagedResource::key);
        Ok(managed)
    }

    async fn apply_managed(&self, resource: ManagedResource) -> StoreResult<ManagedResource> {
        match self.upsert(resource.into()) {
            Resource::Managed(m) => Ok(m),
            Resource::Execution(_) => Err(StoreError::Backend("kind changed on apply".into())),
        }
    }

    async fn apply_execution(
        &self,
        resource: ExecutionResource,
    ) -> StoreResult<ExecutionResource> {
        match self.upsert(resource.into()) {
            Resource::Execution(r) => Ok(r),
            Resource::Managed(_) => Err(StoreError::Backend("kind changed on apply".into())),
        }
    }
}

impl ChangeFeed for MemoryResourceStore {
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}
