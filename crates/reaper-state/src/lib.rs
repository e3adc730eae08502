//! Reaper-State: resource model and stores for Reaper
//!
//! This crate provides the persistence layer for the retention controller:
//! the resource schema it reasons about, the store and change-feed traits it
//! consumes, and two implementations of them.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: identity, idempotent deletes, and change notifications.
//!
//! ## Key Components
//!
//! - `ManagedResource` / `ExecutionResource`: the two watched kinds
//! - `ResourceStore` / `ChangeFeed`: the collaborator surface
//! - `MemoryResourceStore`: in-memory store with fault injection
//! - `SurrealResourceStore`: SurrealDB-backed store

mod error;
pub mod fakes;
mod migrations;
pub mod resource;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::StoreError;
pub use fakes::MemoryResourceStore;
pub use resource::{
    ChangeEvent, CompletionCondition, ConditionStatus, ExecutionResource, ExecutionRetention,
    ExecutionSpec, ExecutionStatus, ManagedResource, ManagedRetention, ManagedSpec, ObjectKey,
    ObjectMeta, Outcome, OwnerRef, Resource, ResourceKind, WatchEvent,
};
pub use schema::ResourceRow;
pub use storage_traits::{ChangeFeed, ResourceStore, StoreResult, CHANGE_FEED_CAPACITY};
pub use surreal_store::SurrealResourceStore;
