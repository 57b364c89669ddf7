//! Error types for the service layer.

use thiserror::Error;
use wirebus_store::StorageError;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced to callers of the dispatch layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A non-public method was called without an authenticated identity.
    #[error("authentication required")]
    AuthenticationRequired,

    /// An identity was present but held no sufficient grant at any level.
    #[error("insufficient permissions")]
    InsufficientPermissions,

    /// Subscribe-only: denial and absence are deliberately conflated so
    /// existence never leaks.
    #[error("not found or access denied")]
    NotFoundOrDenied,

    /// Business logic failed; the message passes through verbatim.
    #[error("{0}")]
    Handler(String),

    /// Unexpected failure not otherwise classified.
    #[error("internal error: {0}")]
    Internal(String),

    /// Store failure that propagates (create path only).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    /// Wraps a business-logic failure message.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Protocol failure code for this error, when one applies.
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        match self {
            ServiceError::AuthenticationRequired => Some(crate::protocol::code::AUTH_REQUIRED),
            ServiceError::InsufficientPermissions => Some(crate::protocol::code::FORBIDDEN),
            ServiceError::NotFoundOrDenied => Some(crate::protocol::code::NOT_FOUND),
            ServiceError::Handler(_) => None,
            ServiceError::Internal(_)
            | ServiceError::Storage(_)
            | ServiceError::Serialization(_) => Some(crate::protocol::code::INTERNAL),
        }
    }
}
