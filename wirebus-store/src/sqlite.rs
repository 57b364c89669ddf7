//! SQLite-backed entity store.
//!
//! Records are stored as JSON blobs in a single `entities` table keyed by
//! (collection, id). The connection is shared behind a mutex and every
//! trait call runs on a blocking thread so the async runtime never stalls
//! on SQLite I/O.

use crate::{merge_fields, EntityStore, StorageError, StorageResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use wirebus_types::EntryId;

/// Persistent entity store backed by SQLite.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entities (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                UNIQUE(collection, id)
            );
            ",
        )?;
        Ok(())
    }

    async fn run_blocking<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            op(&conn)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn fetch(conn: &Connection, collection: &str, id: &str) -> StorageResult<Option<Value>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM entities WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| row.get(0),
        )
        .optional()?;
    match data {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn find_by_id(&self, collection: &str, id: &EntryId) -> StorageResult<Option<Value>> {
        let collection = collection.to_string();
        let id = id.to_string();
        self.run_blocking(move |conn| fetch(conn, &collection, &id))
            .await
    }

    async fn create(&self, collection: &str, id: &EntryId, record: Value) -> StorageResult<Value> {
        let collection = collection.to_string();
        let id = id.to_string();
        self.run_blocking(move |conn| {
            if fetch(conn, &collection, &id)?.is_some() {
                return Err(StorageError::AlreadyExists(id));
            }
            let json = serde_json::to_string(&record)?;
            conn.execute(
                "INSERT INTO entities (collection, id, data) VALUES (?1, ?2, ?3)",
                params![collection, id, json],
            )?;
            Ok(record)
        })
        .await
    }

    async fn update(&self, collection: &str, id: &EntryId, patch: Value) -> StorageResult<Value> {
        let collection = collection.to_string();
        let id = id.to_string();
        self.run_blocking(move |conn| {
            let mut record =
                fetch(conn, &collection, &id)?.ok_or_else(|| StorageError::NotFound(id.clone()))?;
            merge_fields(&mut record, &patch);
            let json = serde_json::to_string(&record)?;
            conn.execute(
                "UPDATE entities SET data = ?3 WHERE collection = ?1 AND id = ?2",
                params![collection, id, json],
            )?;
            Ok(record)
        })
        .await
    }

    async fn delete(&self, collection: &str, id: &EntryId) -> StorageResult<bool> {
        let collection = collection.to_string();
        let id = id.to_string();
        self.run_blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM entities WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )?;
            Ok(removed > 0)
        })
        .await
    }
}
