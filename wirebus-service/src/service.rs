//! The entity service abstraction.
//!
//! One [`EntityService`] per entity type. It owns the backing-store
//! delegate, the declared method table, the access pipeline and the
//! subscriber table for its type. Services are assembled through the
//! builder and immutable once built.

use crate::access::{AccessDecision, AccessPipeline, EntryAclSource, OwnershipCheck};
use crate::connection::Connection;
use crate::error::ServiceResult;
use crate::method::ServiceMethod;
use crate::protocol::{deletion_patch, is_deletion, ServerPush};
use crate::subscriptions::SubscriptionTable;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use wirebus_store::EntityStore;
use wirebus_types::{AccessLevel, ConnectionId, EntryId, Identity};

/// Configuration for one entity service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// The service name, also used as the store collection name.
    pub name: String,
    /// Upper bound on an entry-ACL lookup (ms); a slower lookup is a deny.
    pub acl_timeout_ms: u64,
}

impl ServiceConfig {
    /// Creates a config with the default ACL-lookup timeout.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            acl_timeout_ms: 5_000,
        }
    }
}

/// Per-entity-type view function applied to snapshots and pushes after
/// access is granted, e.g. stripping private fields for everyone but the
/// entity's own identity.
pub type RedactFn = Arc<dyn Fn(Value, Option<&Identity>) -> Value + Send + Sync>;

/// One entity type's service: store delegate, method table, access
/// pipeline and subscriber table.
pub struct EntityService {
    config: ServiceConfig,
    store: Arc<dyn EntityStore>,
    methods: HashMap<String, Arc<dyn ServiceMethod>>,
    access: AccessPipeline,
    redact: Option<RedactFn>,
    subscriptions: SubscriptionTable,
}

impl EntityService {
    /// Starts building a service over a store delegate.
    #[must_use]
    pub fn builder(config: ServiceConfig, store: Arc<dyn EntityStore>) -> EntityServiceBuilder {
        EntityServiceBuilder {
            access: AccessPipeline::new(
                config.name.clone(),
                Duration::from_millis(config.acl_timeout_ms),
            ),
            config,
            store,
            methods: HashMap::new(),
            redact: None,
        }
    }

    /// The service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The backing-store delegate, for custom handlers that need multi-step
    /// mutations.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Looks up a declared method by name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&Arc<dyn ServiceMethod>> {
        self.methods.get(name)
    }

    /// Whether this service maintains entry-level ACLs.
    #[must_use]
    pub fn has_entry_acl(&self) -> bool {
        self.access.has_entry_acl()
    }

    /// Runs the access-check pipeline. See [`AccessPipeline::ensure_access`].
    pub async fn ensure_access(
        &self,
        required: AccessLevel,
        identity: Option<&Identity>,
        entry_id: Option<&EntryId>,
    ) -> AccessDecision {
        self.access.ensure_access(required, identity, entry_id).await
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Subscribes a connection to an entry at `required` level.
    ///
    /// Returns the current entity snapshot on success, `None` on denial or
    /// absence — the two are deliberately indistinguishable so existence
    /// never leaks. A failed subscribe leaves the subscriber table
    /// unchanged.
    pub async fn subscribe(
        &self,
        conn: &Arc<Connection>,
        entry_id: &EntryId,
        required: AccessLevel,
    ) -> Option<Value> {
        let identity = conn.identity();
        if !self
            .ensure_access(required, identity.as_ref(), Some(entry_id))
            .await
            .is_allowed()
        {
            debug!(service = %self.name(), entry = %entry_id, "subscribe denied");
            return None;
        }

        let snapshot = match self.store.find_by_id(&self.config.name, entry_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return None,
            Err(e) => {
                warn!(service = %self.name(), entry = %entry_id, "snapshot load failed: {e}");
                return None;
            }
        };

        self.subscriptions.insert(entry_id, conn).await;
        Some(self.apply_view(snapshot, identity.as_ref()))
    }

    /// Removes a connection from one entry's subscriber set. Idempotent.
    pub async fn unsubscribe(&self, entry_id: &EntryId, conn_id: ConnectionId) {
        self.subscriptions.remove(entry_id, conn_id).await;
    }

    /// Removes a connection from every entry's subscriber set, on
    /// disconnect. Safe when the connection was never subscribed.
    pub async fn unsubscribe_connection(&self, conn_id: ConnectionId) {
        self.subscriptions.remove_connection(conn_id).await;
    }

    /// Delivers a patch to every connection currently subscribed to the
    /// entry. Fire-and-forget: no acknowledgement, no retry. The deletion
    /// sentinel bypasses the view function so terminality survives
    /// redaction.
    pub async fn emit_update(&self, entry_id: &EntryId, patch: Value) {
        let skip_view = is_deletion(&patch) || self.redact.is_none();
        self.subscriptions
            .broadcast(entry_id, |viewer| {
                let payload = if skip_view {
                    patch.clone()
                } else {
                    self.apply_view(patch.clone(), viewer)
                };
                ServerPush::update(&self.config.name, entry_id, payload)
            })
            .await;
    }

    /// Whether a connection is subscribed to an entry.
    pub async fn is_subscribed(&self, entry_id: &EntryId, conn_id: ConnectionId) -> bool {
        self.subscriptions.is_subscribed(entry_id, conn_id).await
    }

    /// Number of connections subscribed to an entry.
    pub async fn subscriber_count(&self, entry_id: &EntryId) -> usize {
        self.subscriptions.subscriber_count(entry_id).await
    }

    /// Number of entries with at least one subscriber.
    pub async fn subscribed_entry_count(&self) -> usize {
        self.subscriptions.entry_count().await
    }

    // ── CRUD primitives ──────────────────────────────────────────

    /// Persists a new entity and emits an update for its id. Assigns a
    /// fresh id when the record carries none. Store failures propagate.
    pub async fn create(&self, mut data: Value) -> ServiceResult<Value> {
        let supplied = data.get("id").and_then(Value::as_str).map(EntryId::new);
        let entry_id = match supplied {
            Some(id) => id,
            None => {
                let id = EntryId::generate();
                if let Some(record) = data.as_object_mut() {
                    record.insert("id".to_string(), json!(id));
                }
                id
            }
        };
        let entity = self.store.create(&self.config.name, &entry_id, data).await?;
        self.emit_update(&entry_id, entity.clone()).await;
        Ok(entity)
    }

    /// Merges `data` into an entity and pushes the changed fields to
    /// subscribers. Returns `None` on any store failure — callers that need
    /// to distinguish causes use a custom handler instead.
    pub async fn update(&self, entry_id: &EntryId, data: Value) -> Option<Value> {
        match self.store.update(&self.config.name, entry_id, data.clone()).await {
            Ok(entity) => {
                let mut patch = data;
                if let Some(fields) = patch.as_object_mut() {
                    fields.insert("id".to_string(), json!(entry_id));
                }
                self.emit_update(entry_id, patch).await;
                Some(entity)
            }
            Err(e) => {
                warn!(service = %self.name(), entry = %entry_id, "update failed: {e}");
                None
            }
        }
    }

    /// Deletes an entity and pushes the `{id, deleted: true}` sentinel.
    /// Returns whether the deletion took effect.
    pub async fn delete(&self, entry_id: &EntryId) -> bool {
        match self.store.delete(&self.config.name, entry_id).await {
            Ok(true) => {
                self.emit_update(entry_id, deletion_patch(entry_id)).await;
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(service = %self.name(), entry = %entry_id, "delete failed: {e}");
                false
            }
        }
    }

    fn apply_view(&self, entity: Value, viewer: Option<&Identity>) -> Value {
        match &self.redact {
            Some(redact) => redact(entity, viewer),
            None => entity,
        }
    }
}

/// Builder for [`EntityService`].
pub struct EntityServiceBuilder {
    config: ServiceConfig,
    store: Arc<dyn EntityStore>,
    methods: HashMap<String, Arc<dyn ServiceMethod>>,
    access: AccessPipeline,
    redact: Option<RedactFn>,
}

impl EntityServiceBuilder {
    /// Declares a callable method. Panics on a duplicate name — method
    /// tables are fixed at construction, so a collision is a programming
    /// error, not a runtime condition.
    #[must_use]
    pub fn method(mut self, method: impl ServiceMethod + 'static) -> Self {
        let name = method.name().to_string();
        assert!(
            !self.methods.contains_key(&name),
            "duplicate method declared: {name}"
        );
        self.methods.insert(name, Arc::new(method));
        self
    }

    /// Installs the synchronous ownership/custom access rule.
    #[must_use]
    pub fn ownership_check(
        mut self,
        check: impl Fn(&Identity, &EntryId) -> bool + Send + Sync + 'static,
    ) -> Self {
        let check: OwnershipCheck = Arc::new(check);
        self.access.set_ownership(check);
        self
    }

    /// Declares that this service maintains entry-level ACLs, read through
    /// the given source.
    #[must_use]
    pub fn entry_acl(mut self, source: Arc<dyn EntryAclSource>) -> Self {
        self.access.set_acl_source(source);
        self
    }

    /// Installs the per-entity-type view function.
    #[must_use]
    pub fn redact(
        mut self,
        redact: impl Fn(Value, Option<&Identity>) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.redact = Some(Arc::new(redact));
        self
    }

    /// Finalizes the service.
    #[must_use]
    pub fn build(self) -> Arc<EntityService> {
        Arc::new(EntityService {
            config: self.config,
            store: self.store,
            methods: self.methods,
            access: self.access,
            redact: self.redact,
            subscriptions: SubscriptionTable::new(),
        })
    }
}
