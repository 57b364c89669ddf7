//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity not found.
    #[error("entity not found: {0}")]
    NotFound(String),

    /// An entity with the same id already exists.
    #[error("entity already exists: {0}")]
    AlreadyExists(String),

    /// Invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A background task running a blocking store call failed.
    #[error("background task failed: {0}")]
    Task(String),
}
