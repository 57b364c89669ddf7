//! Backing-store delegates for Wirebus entity services.
//!
//! Every entity service owns the lifecycle of its entity type's persisted
//! records through an [`EntityStore`] delegate; callers never touch the
//! store directly. Records are JSON objects keyed by (collection, id) —
//! the framework assumes nothing about their shape beyond a stable string
//! `id` field.
//!
//! Two implementations ship with this crate:
//! - [`MemoryStore`] — in-process maps, for tests and demos
//! - [`SqliteStore`] — JSON-blob rows in SQLite, for real deployments

mod error;
mod memory;
mod sqlite;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde_json::Value;
use wirebus_types::EntryId;

/// A backing store for one or more entity collections.
///
/// `update` applies a shallow field merge of the patch onto the stored
/// record; `create` rejects duplicate ids; `delete` reports whether a row
/// was actually removed.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetches a record by id. `Ok(None)` when absent.
    async fn find_by_id(&self, collection: &str, id: &EntryId) -> StorageResult<Option<Value>>;

    /// Persists a new record. Fails with [`StorageError::AlreadyExists`]
    /// when the id is taken.
    async fn create(&self, collection: &str, id: &EntryId, record: Value) -> StorageResult<Value>;

    /// Merges `patch` into the stored record and returns the result.
    /// Fails with [`StorageError::NotFound`] when the id is absent.
    async fn update(&self, collection: &str, id: &EntryId, patch: Value) -> StorageResult<Value>;

    /// Removes a record. Returns whether it existed.
    async fn delete(&self, collection: &str, id: &EntryId) -> StorageResult<bool>;
}

/// Shallow field merge: every top-level key of `patch` replaces the
/// corresponding key of `record`. Non-object patches replace the record
/// wholesale.
pub fn merge_fields(record: &mut Value, patch: &Value) {
    match (record.as_object_mut(), patch.as_object()) {
        (Some(existing), Some(incoming)) => {
            for (key, value) in incoming {
                existing.insert(key.clone(), value.clone());
            }
        }
        _ => *record = patch.clone(),
    }
}
