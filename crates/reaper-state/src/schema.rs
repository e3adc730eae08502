//! Schema definitions for Reaper SurrealDB tables
//!
//! Tables:
//! - resources: one row per (kind, namespace, name), the object body stored as JSON text

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::resource::{ObjectKey, Resource, ResourceKind};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Resource row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    /// "managed" | "execution"
    pub kind: String,
    pub namespace: String,
    pub name: String,
    /// Store-assigned object uid
    pub uid: String,
    /// Full object serialized as JSON
    pub document: String,
    /// Last write timestamp
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ResourceRow {
    /// Encode a resource into a fresh row (no record ID yet).
    pub fn encode(resource: &Resource) -> Result<Self, StoreError> {
        let meta = resource.metadata();
        let uid = meta
            .uid
            .clone()
            .ok_or_else(|| StoreError::Serialization(format!("{} has no uid", meta.key())))?;
        Ok(ResourceRow {
            id: None,
            kind: resource.kind().as_str().to_string(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
            uid,
            document: serde_json::to_string(resource)?,
            updated_at: Utc::now(),
        })
    }

    /// Decode the stored document back into a resource.
    pub fn decode(&self) -> Result<Resource, StoreError> {
        let resource: Resource = serde_json::from_str(&self.document)?;
        if parse_kind(&self.kind)? != resource.kind() {
            return Err(StoreError::Backend(format!(
                "row {} is tagged {} but holds a {} document",
                self.key(),
                self.kind,
                resource.kind()
            )));
        }
        Ok(resource)
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

/// Parse the `kind` column.
pub fn parse_kind(kind: &str) -> Result<ResourceKind, StoreError> {
    match kind {
        "managed" => Ok(ResourceKind::Managed),
        "execution" => Ok(ResourceKind::Execution),
        other => Err(StoreError::Backend(format!("unknown resource kind: {other}"))),
    }
}
