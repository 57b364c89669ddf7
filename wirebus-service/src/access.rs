//! The access-check pipeline.
//!
//! Every method invocation, subscribe and entity mutation funnels through
//! [`AccessPipeline::ensure_access`]. The checks run cheapest-first: the
//! service-wide grant and the in-memory ownership rule are consulted before
//! any store round-trip, and the entry-ACL lookup — the only asynchronous
//! step — runs last, bounded by a timeout. A slow or failing ACL lookup
//! degrades to deny, never to an error surfaced to the caller.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use wirebus_store::StorageResult;
use wirebus_types::{AccessLevel, EntryId, Identity, IdentityId};

/// Why access was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No identity on a non-public check.
    AuthenticationRequired,
    /// Identity present but no sufficient grant at any checked level.
    InsufficientPermissions,
}

/// Outcome of the access-check pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// The caller may proceed.
    Allowed,
    /// The caller may not proceed.
    Denied(DenyReason),
}

impl AccessDecision {
    /// Whether the caller may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed)
    }
}

/// Pluggable entry-level ACL lookup.
///
/// Implementations fetch whatever membership record or embedded ACL backs
/// the entry and return the caller's granted level, `None` when the caller
/// holds no grant (or the entry does not exist). Errors are treated as deny
/// by the pipeline, not propagated.
#[async_trait]
pub trait EntryAclSource: Send + Sync {
    /// The level granted to `identity` on `entry_id`, if any.
    async fn level_for(
        &self,
        entry_id: &EntryId,
        identity: &IdentityId,
    ) -> StorageResult<Option<AccessLevel>>;
}

/// Synchronous ownership/custom rule, e.g. "is the caller the owner/self".
pub type OwnershipCheck = Arc<dyn Fn(&Identity, &EntryId) -> bool + Send + Sync>;

/// The layered access-control pipeline for one service.
pub struct AccessPipeline {
    service_name: String,
    ownership: Option<OwnershipCheck>,
    acl_source: Option<Arc<dyn EntryAclSource>>,
    acl_timeout: Duration,
}

impl AccessPipeline {
    /// Creates a pipeline with neither ownership rule nor entry ACLs.
    pub fn new(service_name: impl Into<String>, acl_timeout: Duration) -> Self {
        Self {
            service_name: service_name.into(),
            ownership: None,
            acl_source: None,
            acl_timeout,
        }
    }

    /// Installs the synchronous ownership/custom rule.
    pub fn set_ownership(&mut self, check: OwnershipCheck) {
        self.ownership = Some(check);
    }

    /// Installs the entry-ACL source.
    pub fn set_acl_source(&mut self, source: Arc<dyn EntryAclSource>) {
        self.acl_source = Some(source);
    }

    /// Whether this service maintains entry-level ACLs.
    #[must_use]
    pub fn has_entry_acl(&self) -> bool {
        self.acl_source.is_some()
    }

    /// Decides whether a caller holding `identity` may act at `required`
    /// level, scoped to `entry_id` when one applies.
    ///
    /// Checks run in a fixed order, short-circuiting on first success:
    /// public, identity presence, service-wide grant, the unscoped `Read`
    /// floor, the ownership rule, the entry ACL. No other path allows.
    pub async fn ensure_access(
        &self,
        required: AccessLevel,
        identity: Option<&Identity>,
        entry_id: Option<&EntryId>,
    ) -> AccessDecision {
        if required == AccessLevel::Public {
            return AccessDecision::Allowed;
        }

        let Some(identity) = identity else {
            return AccessDecision::Denied(DenyReason::AuthenticationRequired);
        };

        if identity.grants.sufficient_for(&self.service_name, required) {
            return AccessDecision::Allowed;
        }

        // Unscoped methods fall back to a service-wide Read floor.
        let Some(entry_id) = entry_id else {
            return if required <= AccessLevel::Read {
                AccessDecision::Allowed
            } else {
                AccessDecision::Denied(DenyReason::InsufficientPermissions)
            };
        };

        if let Some(check) = &self.ownership {
            if check(identity, entry_id) {
                return AccessDecision::Allowed;
            }
        }

        if let Some(source) = &self.acl_source {
            match tokio::time::timeout(
                self.acl_timeout,
                source.level_for(entry_id, &identity.id),
            )
            .await
            {
                Ok(Ok(Some(level))) if level.sufficient_for(required) => {
                    return AccessDecision::Allowed;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    // Fail closed: a flaky store looks identical to "not
                    // authorized" from the caller's side.
                    warn!(
                        service = %self.service_name,
                        entry = %entry_id,
                        "entry ACL lookup failed, denying: {e}"
                    );
                }
                Err(_) => {
                    warn!(
                        service = %self.service_name,
                        entry = %entry_id,
                        "entry ACL lookup timed out, denying"
                    );
                }
            }
        }

        AccessDecision::Denied(DenyReason::InsufficientPermissions)
    }
}
