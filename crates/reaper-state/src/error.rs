//! Error types for reaper-state

use thiserror::Error;

use crate::resource::{ObjectKey, ResourceKind};

/// Errors that can occur in the resource store layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed resource does not exist (never existed or already deleted)
    #[error("{kind} {key} not found")]
    NotFound { kind: ResourceKind, key: ObjectKey },

    /// Backend connection or query failure
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored document could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A conflicting write was rejected by the backend
    #[error("conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Whether this error only means "the object is already gone".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
