//! In-memory entity store for tests and demos.

use crate::{merge_fields, EntityStore, StorageError, StorageResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use wirebus_types::EntryId;

/// A store backed by in-process maps: collection → id → record.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, HashMap::len)
    }

    /// Whether a collection holds no records.
    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_by_id(&self, collection: &str, id: &EntryId) -> StorageResult<Option<Value>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|records| records.get(id.as_str()))
            .cloned())
    }

    async fn create(&self, collection: &str, id: &EntryId, record: Value) -> StorageResult<Value> {
        let mut collections = self.collections.write().await;
        let records = collections.entry(collection.to_string()).or_default();
        if records.contains_key(id.as_str()) {
            return Err(StorageError::AlreadyExists(id.to_string()));
        }
        records.insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn update(&self, collection: &str, id: &EntryId, patch: Value) -> StorageResult<Value> {
        let mut collections = self.collections.write().await;
        let record = collections
            .get_mut(collection)
            .and_then(|records| records.get_mut(id.as_str()))
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        merge_fields(record, &patch);
        Ok(record.clone())
    }

    async fn delete(&self, collection: &str, id: &EntryId) -> StorageResult<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .and_then(|records| records.remove(id.as_str()))
            .is_some())
    }
}
