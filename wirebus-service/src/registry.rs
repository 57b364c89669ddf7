//! The method registry and dispatcher.
//!
//! Binds inbound `{event, payload}` frames to the declared methods of the
//! registered services, running the access pipeline before every handler
//! and converting results and errors into acknowledgement replies. The
//! generic subscribe/unsubscribe pair and disconnect cleanup are handled
//! here, outside the per-service method tables.

use crate::access::{AccessDecision, DenyReason};
use crate::connection::Connection;
use crate::method::MethodContext;
use crate::protocol::{
    code, Ack, EventName, ServerPush, SubscribePayload, UnsubscribePayload, SUBSCRIBE_METHOD,
    UNSUBSCRIBE_METHOD,
};
use crate::service::EntityService;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use wirebus_types::{AccessLevel, ConnectionId, Identity};

/// Resolves connection-supplied credentials to an identity with its
/// service-wide grants, or `None` for invalid credentials.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Attempts to resolve `credentials`.
    async fn resolve(&self, credentials: &Value) -> Option<Identity>;
}

/// The service registry and dispatcher.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<EntityService>>,
    resolver: Option<Arc<dyn IdentityResolver>>,
}

impl ServiceRegistry {
    /// Creates an empty registry with no identity resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that authenticates through `resolver`.
    #[must_use]
    pub fn with_resolver(resolver: Arc<dyn IdentityResolver>) -> Self {
        Self {
            services: HashMap::new(),
            resolver: Some(resolver),
        }
    }

    /// Registers a service under its configured name.
    pub fn register(&mut self, service: Arc<EntityService>) {
        self.services.insert(service.name().to_string(), service);
    }

    /// Looks up a registered service.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Arc<EntityService>> {
        self.services.get(name)
    }

    /// Names of the registered services.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Resolves credentials, binds the identity to the connection and
    /// pushes the `auth:info` event.
    pub async fn authenticate(&self, conn: &Arc<Connection>, credentials: &Value) -> Ack {
        let Some(resolver) = &self.resolver else {
            return Ack::fail_with_code(code::INTERNAL, "no identity resolver configured");
        };
        match resolver.resolve(credentials).await {
            Some(identity) => {
                conn.set_identity(Some(identity.clone()));
                conn.push(ServerPush::auth_info(&identity));
                debug!(connection = %conn.id(), identity = %identity.id, "authenticated");
                Ack::ok(json!({
                    "identity_id": identity.id,
                    "grants": identity.grants,
                }))
            }
            None => Ack::fail_with_code(code::AUTH_REQUIRED, "invalid credentials"),
        }
    }

    /// Dispatches one inbound frame and returns its acknowledgement.
    pub async fn dispatch(&self, conn: &Arc<Connection>, event: &str, payload: Value) -> Ack {
        let Some(name) = EventName::parse(event) else {
            return Ack::fail_with_code(code::MALFORMED, format!("malformed event name: {event}"));
        };
        let Some(service) = self.services.get(name.service) else {
            return Ack::fail_with_code(
                code::NOT_FOUND,
                format!("unknown service: {}", name.service),
            );
        };

        match name.method {
            SUBSCRIBE_METHOD => self.handle_subscribe(conn, service, payload).await,
            UNSUBSCRIBE_METHOD => self.handle_unsubscribe(conn, service, payload).await,
            method => self.handle_method(conn, service, method, payload).await,
        }
    }

    /// Removes the connection from every service's subscriber tables.
    /// Each service is cleaned independently so one failure cannot block
    /// the others.
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        for service in self.services.values() {
            service.unsubscribe_connection(conn_id).await;
        }
        debug!(connection = %conn_id, "disconnected, subscriptions cleaned");
    }

    async fn handle_subscribe(
        &self,
        conn: &Arc<Connection>,
        service: &Arc<EntityService>,
        payload: Value,
    ) -> Ack {
        let request: SubscribePayload = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(e) => {
                return Ack::fail_with_code(code::MALFORMED, format!("invalid payload: {e}"))
            }
        };
        let required = request.required_level.unwrap_or(AccessLevel::Read);
        match service.subscribe(conn, &request.entry_id, required).await {
            Some(snapshot) => Ack::ok(snapshot),
            None => Ack::fail_with_code(code::NOT_FOUND, "not found or access denied"),
        }
    }

    async fn handle_unsubscribe(
        &self,
        conn: &Arc<Connection>,
        service: &Arc<EntityService>,
        payload: Value,
    ) -> Ack {
        let request: UnsubscribePayload = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(e) => {
                return Ack::fail_with_code(code::MALFORMED, format!("invalid payload: {e}"))
            }
        };
        service.unsubscribe(&request.entry_id, conn.id()).await;
        Ack::ok(json!({ "unsubscribed": true, "entry_id": request.entry_id }))
    }

    async fn handle_method(
        &self,
        conn: &Arc<Connection>,
        service: &Arc<EntityService>,
        method_name: &str,
        payload: Value,
    ) -> Ack {
        let Some(method) = service.method(method_name) else {
            return Ack::fail_with_code(
                code::NOT_FOUND,
                format!("unknown method: {}:{method_name}", service.name()),
            );
        };

        let identity = conn.identity();
        if method.required_level() != AccessLevel::Public && identity.is_none() {
            return Ack::fail_with_code(code::AUTH_REQUIRED, "authentication required");
        }

        let entry_id = method.entry_id(&payload);
        let decision = service
            .ensure_access(method.required_level(), identity.as_ref(), entry_id.as_ref())
            .await;
        if let AccessDecision::Denied(reason) = decision {
            debug!(
                service = %service.name(),
                method = method_name,
                connection = %conn.id(),
                "access denied: {reason:?}"
            );
            return match reason {
                DenyReason::AuthenticationRequired => {
                    Ack::fail_with_code(code::AUTH_REQUIRED, "authentication required")
                }
                DenyReason::InsufficientPermissions => {
                    Ack::fail_with_code(code::FORBIDDEN, "insufficient permissions")
                }
            };
        }

        let ctx = MethodContext {
            connection_id: conn.id(),
            identity,
        };
        let method = Arc::clone(method);
        match method.handle(Arc::clone(service), payload, ctx).await {
            Ok(value) => Ack::ok(value),
            Err(e) => {
                warn!(
                    service = %service.name(),
                    method = method_name,
                    "handler failed: {e}"
                );
                Ack::from(&e)
            }
        }
    }
}
