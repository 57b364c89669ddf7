//! Entry-ACL sources.
//!
//! Two representations of per-entry grants, both driven through plain
//! [`EntityStore`] key lookups:
//!
//! - [`MembershipAclSource`] — one row per (entry, identity) in a companion
//!   collection. The membership table is the single source of truth for
//!   many-to-many entity types; no denormalized copy is kept anywhere.
//! - [`EmbeddedAclSource`] — an `acl` array of `{identity_id, level}`
//!   entries embedded in the entity row itself, for simple
//!   owner-plus-collaborators types.

use crate::access::EntryAclSource;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use wirebus_store::{EntityStore, StorageError, StorageResult};
use wirebus_types::{AccessControlList, AccessLevel, EntryId, IdentityId};

/// Entry ACLs backed by a membership collection.
///
/// Rows are keyed `"<entry>:<identity>"` and carry a `level` field, e.g.
/// `{"entry_id": "c1", "identity_id": "alice", "level": "moderate"}`.
pub struct MembershipAclSource {
    store: Arc<dyn EntityStore>,
    collection: String,
}

impl MembershipAclSource {
    /// Creates a source reading membership rows from `collection`.
    pub fn new(store: Arc<dyn EntityStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// The row key for one (entry, identity) pair.
    #[must_use]
    pub fn member_key(entry_id: &EntryId, identity: &IdentityId) -> EntryId {
        EntryId::new(format!("{entry_id}:{identity}"))
    }

    /// Upserts a membership row granting `level`.
    pub async fn grant(
        &self,
        entry_id: &EntryId,
        identity: &IdentityId,
        level: AccessLevel,
    ) -> StorageResult<()> {
        let key = Self::member_key(entry_id, identity);
        let row = json!({
            "id": key,
            "entry_id": entry_id,
            "identity_id": identity,
            "level": level,
        });
        match self.store.update(&self.collection, &key, row.clone()).await {
            Ok(_) => Ok(()),
            Err(StorageError::NotFound(_)) => {
                self.store.create(&self.collection, &key, row).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Removes a membership row. Returns whether one existed.
    pub async fn revoke(&self, entry_id: &EntryId, identity: &IdentityId) -> StorageResult<bool> {
        let key = Self::member_key(entry_id, identity);
        self.store.delete(&self.collection, &key).await
    }
}

#[async_trait]
impl EntryAclSource for MembershipAclSource {
    async fn level_for(
        &self,
        entry_id: &EntryId,
        identity: &IdentityId,
    ) -> StorageResult<Option<AccessLevel>> {
        let key = Self::member_key(entry_id, identity);
        let Some(row) = self.store.find_by_id(&self.collection, &key).await? else {
            return Ok(None);
        };
        let Some(level) = row.get("level") else {
            return Ok(None);
        };
        let level: AccessLevel = serde_json::from_value(level.clone())?;
        Ok(Some(level))
    }
}

/// Entry ACLs embedded in the entity row.
pub struct EmbeddedAclSource {
    store: Arc<dyn EntityStore>,
    collection: String,
    field: String,
}

impl EmbeddedAclSource {
    /// Creates a source reading the `acl` field of rows in `collection`.
    pub fn new(store: Arc<dyn EntityStore>, collection: impl Into<String>) -> Self {
        Self::with_field(store, collection, "acl")
    }

    /// Creates a source reading a custom ACL field name.
    pub fn with_field(
        store: Arc<dyn EntityStore>,
        collection: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            field: field.into(),
        }
    }
}

#[async_trait]
impl EntryAclSource for EmbeddedAclSource {
    async fn level_for(
        &self,
        entry_id: &EntryId,
        identity: &IdentityId,
    ) -> StorageResult<Option<AccessLevel>> {
        let Some(row) = self.store.find_by_id(&self.collection, entry_id).await? else {
            return Ok(None);
        };
        let Some(raw) = row.get(&self.field) else {
            return Ok(None);
        };
        if raw == &Value::Null {
            return Ok(None);
        }
        let acl: AccessControlList = serde_json::from_value(raw.clone())?;
        Ok(acl.level_for(identity))
    }
}
