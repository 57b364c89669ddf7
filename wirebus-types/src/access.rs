//! Access levels, entry ACLs and service-wide grants.
//!
//! `AccessLevel` is a fixed total order — every sufficiency check in the
//! framework reduces to a `>=` comparison on it. Entry-level grants live in
//! an [`AccessControlList`] attached to an entity instance; service-wide
//! grants live in the [`ServiceGrants`] map attached to an identity.

use crate::ids::IdentityId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Grant strength, totally ordered: Public < Read < Moderate < Admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// No identity required.
    Public,
    /// May read and subscribe.
    Read,
    /// May mutate entries.
    Moderate,
    /// Full control, including ACL changes.
    Admin,
}

impl AccessLevel {
    /// Whether a grant of this level satisfies `required`.
    #[must_use]
    pub fn sufficient_for(self, required: AccessLevel) -> bool {
        self >= required
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessLevel::Public => "public",
            AccessLevel::Read => "read",
            AccessLevel::Moderate => "moderate",
            AccessLevel::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

impl FromStr for AccessLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(AccessLevel::Public),
            "read" => Ok(AccessLevel::Read),
            "moderate" => Ok(AccessLevel::Moderate),
            "admin" => Ok(AccessLevel::Admin),
            _ => Err(crate::Error::UnknownAccessLevel(s.to_string())),
        }
    }
}

/// One entry-level grant: an identity and the level it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlEntry {
    /// The identity the grant applies to.
    pub identity_id: IdentityId,
    /// The granted level.
    pub level: AccessLevel,
}

impl AccessControlEntry {
    /// Creates a new entry.
    pub fn new(identity_id: impl Into<IdentityId>, level: AccessLevel) -> Self {
        Self {
            identity_id: identity_id.into(),
            level,
        }
    }
}

/// Ordered list of entry-level grants attached to an entity instance.
///
/// Application logic treats it as a map by identity id; the first matching
/// entry wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessControlList(Vec<AccessControlEntry>);

impl AccessControlList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a grant.
    pub fn push(&mut self, entry: AccessControlEntry) {
        self.0.push(entry);
    }

    /// Builder-style append.
    #[must_use]
    pub fn with(mut self, identity_id: impl Into<IdentityId>, level: AccessLevel) -> Self {
        self.push(AccessControlEntry::new(identity_id, level));
        self
    }

    /// Looks up the level granted to an identity, if any.
    #[must_use]
    pub fn level_for(&self, identity_id: &IdentityId) -> Option<AccessLevel> {
        self.0
            .iter()
            .find(|e| &e.identity_id == identity_id)
            .map(|e| e.level)
    }

    /// Removes every grant held by an identity. Returns whether any existed.
    pub fn revoke(&mut self, identity_id: &IdentityId) -> bool {
        let before = self.0.len();
        self.0.retain(|e| &e.identity_id != identity_id);
        self.0.len() != before
    }

    /// Number of grants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the entries.
    pub fn iter(&self) -> impl Iterator<Item = &AccessControlEntry> {
        self.0.iter()
    }
}

impl FromIterator<AccessControlEntry> for AccessControlList {
    fn from_iter<T: IntoIterator<Item = AccessControlEntry>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Service-wide grants: service name → granted level.
///
/// Populated once at authentication time from the identity's persisted
/// record; read-only from the services' perspective afterward.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceGrants(HashMap<String, AccessLevel>);

impl ServiceGrants {
    /// Creates an empty grant map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style grant insertion.
    #[must_use]
    pub fn with(mut self, service: impl Into<String>, level: AccessLevel) -> Self {
        self.0.insert(service.into(), level);
        self
    }

    /// Inserts or replaces a grant.
    pub fn grant(&mut self, service: impl Into<String>, level: AccessLevel) {
        self.0.insert(service.into(), level);
    }

    /// The level granted for a service, if any.
    #[must_use]
    pub fn level_for(&self, service: &str) -> Option<AccessLevel> {
        self.0.get(service).copied()
    }

    /// Whether the grant for `service` satisfies `required`.
    #[must_use]
    pub fn sufficient_for(&self, service: &str, required: AccessLevel) -> bool {
        self.level_for(service)
            .is_some_and(|level| level.sufficient_for(required))
    }

    /// Iterates over (service, level) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AccessLevel)> {
        self.0.iter()
    }
}

impl FromIterator<(String, AccessLevel)> for ServiceGrants {
    fn from_iter<T: IntoIterator<Item = (String, AccessLevel)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An authenticated identity bound to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The identity's stable id.
    pub id: IdentityId,
    /// Service-wide grants sourced from the identity's persisted record.
    pub grants: ServiceGrants,
}

impl Identity {
    /// Creates an identity with no service-wide grants.
    pub fn new(id: impl Into<IdentityId>) -> Self {
        Self {
            id: id.into(),
            grants: ServiceGrants::new(),
        }
    }

    /// Builder-style grant attachment.
    #[must_use]
    pub fn with_grant(mut self, service: impl Into<String>, level: AccessLevel) -> Self {
        self.grants.grant(service, level);
        self
    }
}
