//! Tests for the access-level order, ACLs and grant maps.

use wirebus_types::{
    AccessControlEntry, AccessControlList, AccessLevel, Identity, IdentityId, ServiceGrants,
};

// ── AccessLevel ordering ────────────────────────────────────────

#[test]
fn level_order_is_total() {
    assert!(AccessLevel::Public < AccessLevel::Read);
    assert!(AccessLevel::Read < AccessLevel::Moderate);
    assert!(AccessLevel::Moderate < AccessLevel::Admin);
}

#[test]
fn sufficiency_is_at_least() {
    assert!(AccessLevel::Admin.sufficient_for(AccessLevel::Read));
    assert!(AccessLevel::Read.sufficient_for(AccessLevel::Read));
    assert!(!AccessLevel::Read.sufficient_for(AccessLevel::Moderate));
    assert!(AccessLevel::Public.sufficient_for(AccessLevel::Public));
}

#[test]
fn level_parses_from_wire_strings() {
    assert_eq!("read".parse::<AccessLevel>().unwrap(), AccessLevel::Read);
    assert_eq!("admin".parse::<AccessLevel>().unwrap(), AccessLevel::Admin);
    assert!("owner".parse::<AccessLevel>().is_err());
}

#[test]
fn level_serializes_lowercase() {
    let json = serde_json::to_string(&AccessLevel::Moderate).unwrap();
    assert_eq!(json, r#""moderate""#);
    let back: AccessLevel = serde_json::from_str(&json).unwrap();
    assert_eq!(back, AccessLevel::Moderate);
}

// ── AccessControlList ───────────────────────────────────────────

#[test]
fn acl_lookup_finds_first_match() {
    let alice = IdentityId::new("alice");
    let acl = AccessControlList::new()
        .with("alice", AccessLevel::Read)
        .with("bob", AccessLevel::Admin)
        .with("alice", AccessLevel::Admin);

    // First entry wins
    assert_eq!(acl.level_for(&alice), Some(AccessLevel::Read));
}

#[test]
fn acl_lookup_missing_identity() {
    let acl = AccessControlList::new().with("alice", AccessLevel::Read);
    assert_eq!(acl.level_for(&IdentityId::new("mallory")), None);
}

#[test]
fn acl_revoke_removes_all_grants() {
    let alice = IdentityId::new("alice");
    let mut acl = AccessControlList::new()
        .with("alice", AccessLevel::Read)
        .with("alice", AccessLevel::Admin)
        .with("bob", AccessLevel::Read);

    assert!(acl.revoke(&alice));
    assert_eq!(acl.level_for(&alice), None);
    assert_eq!(acl.len(), 1);
    assert!(!acl.revoke(&alice));
}

#[test]
fn acl_roundtrips_through_json() {
    let acl = AccessControlList::new()
        .with("alice", AccessLevel::Moderate)
        .with("bob", AccessLevel::Read);
    let json = serde_json::to_string(&acl).unwrap();
    let back: AccessControlList = serde_json::from_str(&json).unwrap();
    assert_eq!(back, acl);
}

#[test]
fn acl_from_iterator() {
    let acl: AccessControlList = vec![
        AccessControlEntry::new("alice", AccessLevel::Read),
        AccessControlEntry::new("bob", AccessLevel::Admin),
    ]
    .into_iter()
    .collect();
    assert_eq!(acl.len(), 2);
}

// ── ServiceGrants ───────────────────────────────────────────────

#[test]
fn grants_sufficiency() {
    let grants = ServiceGrants::new()
        .with("channels", AccessLevel::Moderate)
        .with("documents", AccessLevel::Read);

    assert!(grants.sufficient_for("channels", AccessLevel::Read));
    assert!(grants.sufficient_for("channels", AccessLevel::Moderate));
    assert!(!grants.sufficient_for("channels", AccessLevel::Admin));
    assert!(!grants.sufficient_for("documents", AccessLevel::Moderate));
    assert!(!grants.sufficient_for("unknown", AccessLevel::Read));
}

#[test]
fn identity_builder_attaches_grants() {
    let identity = Identity::new("alice").with_grant("channels", AccessLevel::Admin);
    assert_eq!(identity.id, IdentityId::new("alice"));
    assert_eq!(
        identity.grants.level_for("channels"),
        Some(AccessLevel::Admin)
    );
}
