//! The method capability interface.
//!
//! Each callable method is a [`ServiceMethod`]: a name, a required access
//! level, an explicit entry-id resolver and a handler. The dispatcher looks
//! methods up by name but never inspects payloads itself — resolving the
//! target entry from the payload is the method's own declaration.

use crate::error::ServiceResult;
use crate::service::EntityService;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use wirebus_types::{AccessLevel, ConnectionId, EntryId, Identity, IdentityId, ServiceGrants};

/// Caller context handed to method handlers.
#[derive(Debug, Clone)]
pub struct MethodContext {
    /// The calling connection.
    pub connection_id: ConnectionId,
    /// The caller's identity, absent on public methods called anonymously.
    pub identity: Option<Identity>,
}

impl MethodContext {
    /// The caller's identity id, if authenticated.
    #[must_use]
    pub fn identity_id(&self) -> Option<&IdentityId> {
        self.identity.as_ref().map(|i| &i.id)
    }

    /// The caller's service-grant map, if authenticated.
    #[must_use]
    pub fn grants(&self) -> Option<&ServiceGrants> {
        self.identity.as_ref().map(|i| &i.grants)
    }
}

/// One callable method on an entity service.
///
/// Registered once at service construction; the table is immutable
/// afterward.
#[async_trait]
pub trait ServiceMethod: Send + Sync {
    /// The method name clients address as `"<service>:<name>"`.
    fn name(&self) -> &str;

    /// The access level the caller must hold.
    fn required_level(&self) -> AccessLevel;

    /// Resolves the target entry from the payload, when the method is
    /// scoped to one. Methods that want the conventional string `id` field
    /// call [`entry_id_from_payload`] here explicitly.
    fn entry_id(&self, payload: &Value) -> Option<EntryId>;

    /// Executes the method. Runs only after the access pipeline allowed
    /// the call.
    async fn handle(
        &self,
        service: Arc<EntityService>,
        payload: Value,
        ctx: MethodContext,
    ) -> ServiceResult<Value>;
}

/// Reads the conventional string `id` field off a payload. Methods opt into
/// this at their edge; the dispatcher never applies it implicitly.
#[must_use]
pub fn entry_id_from_payload(payload: &Value) -> Option<EntryId> {
    payload.get("id").and_then(Value::as_str).map(EntryId::from)
}

type Resolver = Arc<dyn Fn(&Value) -> Option<EntryId> + Send + Sync>;
type Handler = Arc<
    dyn Fn(Arc<EntityService>, Value, MethodContext) -> BoxFuture<'static, ServiceResult<Value>>
        + Send
        + Sync,
>;

/// A [`ServiceMethod`] assembled from closures, for services that don't
/// warrant a dedicated type per method.
pub struct FnMethod {
    name: String,
    required_level: AccessLevel,
    resolver: Resolver,
    handler: Handler,
}

impl FnMethod {
    /// Creates a method from a resolver and an async handler.
    pub fn new<R, H, Fut>(
        name: impl Into<String>,
        required_level: AccessLevel,
        resolver: R,
        handler: H,
    ) -> Self
    where
        R: Fn(&Value) -> Option<EntryId> + Send + Sync + 'static,
        H: Fn(Arc<EntityService>, Value, MethodContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ServiceResult<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            required_level,
            resolver: Arc::new(resolver),
            handler: Arc::new(move |service, payload, ctx| {
                Box::pin(handler(service, payload, ctx))
            }),
        }
    }

    /// Creates an unscoped method (no target entry).
    pub fn unscoped<H, Fut>(
        name: impl Into<String>,
        required_level: AccessLevel,
        handler: H,
    ) -> Self
    where
        H: Fn(Arc<EntityService>, Value, MethodContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ServiceResult<Value>> + Send + 'static,
    {
        Self::new(name, required_level, |_| None, handler)
    }
}

#[async_trait]
impl ServiceMethod for FnMethod {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_level(&self) -> AccessLevel {
        self.required_level
    }

    fn entry_id(&self, payload: &Value) -> Option<EntryId> {
        (self.resolver)(payload)
    }

    async fn handle(
        &self,
        service: Arc<EntityService>,
        payload: Value,
        ctx: MethodContext,
    ) -> ServiceResult<Value> {
        (self.handler)(service, payload, ctx).await
    }
}
