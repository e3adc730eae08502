//! SurrealDB schema migrations and initialization
//!
//! Sets up the `resources` table with its uniqueness constraint and the
//! indexes the store queries rely on.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::storage_traits::StoreResult;

/// Initialize all Reaper tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> StoreResult<()> {
    info!("Initializing Reaper SurrealDB schema");
    init_resources_table(db).await?;
    info!("Reaper schema initialization complete");
    Ok(())
}

/// Initialize `resources` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE resources {
///   kind:        STRING (managed | execution)
///   namespace:   STRING
///   name:        STRING
///   uid:         STRING (new value every time an identity is re-created)
///   document:    STRING (JSON body)
///   updated_at:  DATETIME
/// }
/// ```
///
/// Constraints:
/// - `(kind, namespace, name)` is unique
async fn init_resources_table(db: &Surreal<Any>) -> StoreResult<()> {
    debug!("Initializing resources table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS resources SCHEMALESS;

        -- One live object per identity
        DEFINE INDEX IF NOT EXISTS idx_identity ON TABLE resources COLUMNS kind, namespace, name UNIQUE;

        -- Listing by kind within a namespace
        DEFINE INDEX IF NOT EXISTS idx_kind_namespace ON TABLE resources COLUMNS kind, namespace;
    "#;

    db.query(sql).await?.check()?;
    debug!("resources table initialized");
    Ok(())
}
