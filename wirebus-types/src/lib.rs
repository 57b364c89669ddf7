//! Core type definitions for Wirebus.
//!
//! This crate defines the fundamental, service-agnostic types used throughout
//! the framework:
//! - Connection, identity and entry identifiers
//! - The `AccessLevel` grant order
//! - Access-control lists and service-wide grant maps
//!
//! Domain-specific record shapes (channels, documents, etc.) belong to the
//! services built on top, not here.

mod access;
mod ids;

pub use access::{
    AccessControlEntry, AccessControlList, AccessLevel, Identity, ServiceGrants,
};
pub use ids::{ConnectionId, EntryId, IdentityId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unknown access level: {0}")]
    UnknownAccessLevel(String),
}
