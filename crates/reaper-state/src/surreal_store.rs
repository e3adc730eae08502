//! SurrealDB-backed ResourceStore implementation
//!
//! Uses `schema::ResourceRow` for persistence, converting to/from `Resource`
//! at the boundary. Change notifications are published for every write made
//! through this handle.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::migrations;
use crate::resource::{
    ExecutionResource, ManagedResource, ObjectKey, Resource, ResourceKind, WatchEvent,
};
use crate::schema::ResourceRow;
use crate::storage_traits::{ChangeFeed, ResourceStore, StoreResult, CHANGE_FEED_CAPACITY};

/// Default namespace/database selected after connecting.
pub const DEFAULT_NAMESPACE: &str = "reaper";
pub const DEFAULT_DATABASE: &str = "main";

/// SurrealDB-backed implementation of [`ResourceStore`].
pub struct SurrealResourceStore {
    db: Surreal<Any>,
    events: broadcast::Sender<WatchEvent>,
}

impl SurrealResourceStore {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StoreResult<Self> {
        Self::connect("mem://").await
    }

    /// Connect to any SurrealDB endpoint (`mem://`, `surrealkv://path`, `ws://host`),
    /// select `reaper/main` and initialize the schema.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns(DEFAULT_NAMESPACE).use_db(DEFAULT_DATABASE).await?;

        migrations::init_schema(&db).await?;

        info!(url = %url, "SurrealResourceStore connected");
        let (events, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self { db, events })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch(&self, kind: ResourceKind, key: &ObjectKey) -> StoreResult<Option<ResourceRow>> {
        let mut res = self
            .db
            .query("SELECT * FROM resources WHERE kind = $kind AND namespace = $ns AND name = $name")
            .bind(("kind", kind.as_str().to_string()))
            .bind(("ns", key.namespace.clone()))
            .bind(("name", key.name.clone()))
            .await?;

        let rows: Vec<ResourceRow> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn list(&self, kind: ResourceKind, namespace: Option<&str>) -> StoreResult<Vec<Resource>> {
        let rows: Vec<ResourceRow> = if let Some(ns) = namespace {
            let mut res = self
                .db
                .query(
                    "SELECT * FROM resources WHERE kind = $kind AND namespace = $ns \
                     ORDER BY namespace, name",
                )
                .bind(("kind", kind.as_str().to_string()))
                .bind(("ns", ns.to_string()))
                .await?;
            res.take(0)?
        } else {
            let mut res = self
                .db
                .query("SELECT * FROM resources WHERE kind = $kind ORDER BY namespace, name")
                .bind(("kind", kind.as_str().to_string()))
                .await?;
            res.take(0)?
        };

        rows.iter().map(ResourceRow::decode).collect()
    }

    async fn upsert(&self, mut resource: Resource) -> StoreResult<Resource> {
        let kind = resource.kind();
        let key = resource.key();
        let existing = self.fetch(kind, &key).await?;
        let old = existing.as_ref().map(ResourceRow::decode).transpose()?;

        resource
            .metadata_mut()
            .assign_identity(old.as_ref().map(Resource::metadata));
        let mut row = ResourceRow::encode(&resource)?;

        match existing {
            Some(prev) => {
                debug!(kind = %kind, key = %key, "updating resource");
                row.id = prev.id;
                self.db
                    .query(
                        "UPDATE resources CONTENT $row \
                         WHERE kind = $kind AND namespace = $ns AND name = $name",
                    )
                    .bind(("row", row))
                    .bind(("kind", kind.as_str().to_string()))
                    .bind(("ns", key.namespace.clone()))
                    .bind(("name", key.name.clone()))
                    .await?
                    .check()?;
            }
            None => {
                debug!(kind = %kind, key = %key, "creating resource");
                let _created: Option<ResourceRow> =
                    self.db.create("resources").content(row).await?;
            }
        }

        self.publish(old, Some(resource.clone()));
        Ok(resource)
    }

    fn publish(&self, old: Option<Resource>, new: Option<Resource>) {
        if let Some(event) = WatchEvent::from_snapshots(old, new) {
            let _ = self.events.send(event);
        }
    }
}

#[async_trait]
impl ResourceStore for SurrealResourceStore {
    async fn get(&self, kind: ResourceKind, key: &ObjectKey) -> StoreResult<Resource> {
        self.fetch(kind, key)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })?
            .decode()
    }

    async fn delete(&self, kind: ResourceKind, key: &ObjectKey) -> StoreResult<()> {
        let mut res = self
            .db
            .query(
                "DELETE resources WHERE kind = $kind AND namespace = $ns AND name = $name \
                 RETURN BEFORE",
            )
            .bind(("kind", kind.as_str().to_string()))
            .bind(("ns", key.namespace.clone()))
            .bind(("name", key.name.clone()))
            .await?;

        let rows: Vec<ResourceRow> = res.take(0)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            kind,
            key: key.clone(),
        })?;

        debug!(kind = %kind, key = %key, "deleted resource");
        self.publish(Some(row.decode()?), None);
        Ok(())
    }

    async fn list_executions(
        &self,
        namespace: Option<&str>,
    ) -> StoreResult<Vec<ExecutionResource>> {
        let resources = self.list(ResourceKind::Execution, namespace).await?;
        Ok(resources
            .into_iter()
            .filter_map(|r| match r {
                Resource::Execution(run) => Some(run),
                Resource::Managed(_) => None,
            })
            .collect())
    }

    async fn list_managed(&self, namespace: Option<&str>) -> StoreResult<Vec<ManagedResource>> {
        let resources = self.list(ResourceKind::Managed, namespace).await?;
        Ok(resources
            .into_iter()
            .filter_map(|r| match r {
                Resource::Managed(m) => Some(m),
                Resource::Execution(_) => None,
            })
            .collect())
    }

    async fn apply_managed(&self, resource: ManagedResource) -> StoreResult<ManagedResource> {
        match self.upsert(resource.into()).await? {
            Resource::Managed(m) => Ok(m),
            Resource::Execution(_) => Err(StoreError::Backend("kind changed on apply".into())),
        }
    }

    async fn apply_execution(
        &self,
        resource: ExecutionResource,
    ) -> StoreResult<ExecutionResource> {
        match self.upsert(resource.into()).await? {
            Resource::Execution(r) => Ok(r),
            Resource::Managed(_) => Err(StoreError::Backend("kind changed on apply".into())),
        }
    }
}

impl ChangeFeed for SurrealResourceStore {
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}
