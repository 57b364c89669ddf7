//! Wire protocol messages.
//!
//! The framing is transport-agnostic: a client sends
//! `{event: "<service>:<method>", payload}` and expects exactly one
//! acknowledgement; the server pushes `{event: "<service>:update:<entry>"}`
//! frames to subscribers with no acknowledgement expected.

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use wirebus_types::{AccessLevel, EntryId, Identity, IdentityId, ServiceGrants};

/// Reserved method name for subscribing to an entry.
pub const SUBSCRIBE_METHOD: &str = "subscribe";

/// Reserved method name for unsubscribing from an entry.
pub const UNSUBSCRIBE_METHOD: &str = "unsubscribe";

/// Event name carried on the connect-time identity push.
pub const AUTH_INFO_EVENT: &str = "auth:info";

/// Protocol failure codes carried on failure acknowledgements.
pub mod code {
    /// Malformed event name or payload.
    pub const MALFORMED: u16 = 400;
    /// No identity on a non-public method.
    pub const AUTH_REQUIRED: u16 = 401;
    /// Identity present but no sufficient grant.
    pub const FORBIDDEN: u16 = 403;
    /// Unknown target, or not-found-or-denied on subscribe.
    pub const NOT_FOUND: u16 = 404;
    /// Unexpected failure.
    pub const INTERNAL: u16 = 500;
}

/// An inbound request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRequest {
    /// `"<service>:<method>"`.
    pub event: String,
    /// Method payload, shape defined by the target method.
    #[serde(default)]
    pub payload: Value,
}

/// The single acknowledgement every request receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    /// Whether the request succeeded.
    pub success: bool,
    /// Result value on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure reason on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Protocol failure code, when one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl Ack {
    /// Success acknowledgement carrying a result value.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    /// Failure acknowledgement without a protocol code.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            code: None,
        }
    }

    /// Failure acknowledgement with a protocol code.
    pub fn fail_with_code(code: u16, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            code: Some(code),
        }
    }
}

impl From<&ServiceError> for Ack {
    fn from(err: &ServiceError) -> Self {
        let message = match err {
            // A handler that failed without a message still produces an
            // explicit reason.
            ServiceError::Handler(m) if m.is_empty() => "internal error".to_string(),
            other => other.to_string(),
        };
        match err.code() {
            Some(code) => Ack::fail_with_code(code, message),
            None => Ack::fail(message),
        }
    }
}

/// A server-initiated push frame. No acknowledgement is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerPush {
    /// `"<service>:update:<entry>"`, or `"auth:info"`.
    pub event: String,
    /// The patch, snapshot or identity payload.
    pub payload: Value,
}

impl ServerPush {
    /// An entity update push for one entry.
    #[must_use]
    pub fn update(service: &str, entry_id: &EntryId, payload: Value) -> Self {
        Self {
            event: format!("{service}:update:{entry_id}"),
            payload,
        }
    }

    /// The connect-time identity push.
    #[must_use]
    pub fn auth_info(identity: &Identity) -> Self {
        let info = AuthInfo {
            identity_id: identity.id.clone(),
            grants: identity.grants.clone(),
        };
        Self {
            event: AUTH_INFO_EVENT.to_string(),
            payload: serde_json::to_value(info).unwrap_or(Value::Null),
        }
    }
}

/// Payload of the `auth:info` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthInfo {
    /// The resolved identity id.
    pub identity_id: IdentityId,
    /// The identity's service-grant map.
    pub grants: ServiceGrants,
}

/// Payload of a `<service>:subscribe` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribePayload {
    /// The entry to subscribe to.
    pub entry_id: EntryId,
    /// Access level to check at; defaults to `Read`.
    #[serde(default)]
    pub required_level: Option<AccessLevel>,
}

/// Payload of a `<service>:unsubscribe` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribePayload {
    /// The entry to unsubscribe from.
    pub entry_id: EntryId,
}

/// A parsed `"<service>:<method>"` event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventName<'a> {
    /// The target service.
    pub service: &'a str,
    /// The target method (possibly a reserved name).
    pub method: &'a str,
}

impl<'a> EventName<'a> {
    /// Splits an event name. Returns `None` when either half is empty.
    #[must_use]
    pub fn parse(event: &'a str) -> Option<Self> {
        let (service, method) = event.split_once(':')?;
        if service.is_empty() || method.is_empty() {
            return None;
        }
        Some(Self { service, method })
    }
}

/// The terminal patch pushed to subscribers when an entry is deleted.
#[must_use]
pub fn deletion_patch(entry_id: &EntryId) -> Value {
    json!({ "id": entry_id, "deleted": true })
}

/// Whether a patch is the deletion sentinel.
#[must_use]
pub fn is_deletion(patch: &Value) -> bool {
    patch.get("deleted").and_then(Value::as_bool) == Some(true)
}
