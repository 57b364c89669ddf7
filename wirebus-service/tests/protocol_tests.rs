//! Wire-protocol shape tests.

use serde_json::json;
use wirebus_service::{protocol, Ack, ClientRequest, EventName, ServerPush};
use wirebus_types::{AccessLevel, EntryId, Identity};

// ── Event names ─────────────────────────────────────────────────

#[test]
fn event_name_splits_on_first_colon() {
    let name = EventName::parse("channels:rename").unwrap();
    assert_eq!(name.service, "channels");
    assert_eq!(name.method, "rename");

    // Entry ids may themselves contain colons; only the first split matters
    let name = EventName::parse("channels:update:c1").unwrap();
    assert_eq!(name.service, "channels");
    assert_eq!(name.method, "update:c1");
}

#[test]
fn event_name_rejects_empty_halves() {
    assert!(EventName::parse("channels:").is_none());
    assert!(EventName::parse(":rename").is_none());
    assert!(EventName::parse("bare").is_none());
}

// ── Acks ────────────────────────────────────────────────────────

#[test]
fn success_ack_omits_error_fields() {
    let json = serde_json::to_value(Ack::ok(json!({"x": 1}))).unwrap();
    assert_eq!(json, json!({"success": true, "data": {"x": 1}}));
}

#[test]
fn failure_ack_carries_reason_and_code() {
    let json = serde_json::to_value(Ack::fail_with_code(403, "insufficient permissions")).unwrap();
    assert_eq!(
        json,
        json!({"success": false, "error": "insufficient permissions", "code": 403})
    );
}

#[test]
fn request_payload_defaults_to_null() {
    let request: ClientRequest =
        serde_json::from_value(json!({"event": "channels:about"})).unwrap();
    assert_eq!(request.event, "channels:about");
    assert!(request.payload.is_null());
}

// ── Pushes ──────────────────────────────────────────────────────

#[test]
fn update_push_addresses_the_entry() {
    let push = ServerPush::update("channels", &EntryId::new("c1"), json!({"id": "c1"}));
    assert_eq!(push.event, "channels:update:c1");
}

#[test]
fn auth_info_push_carries_grants() {
    let identity = Identity::new("alice").with_grant("channels", AccessLevel::Read);
    let push = ServerPush::auth_info(&identity);
    assert_eq!(push.event, "auth:info");
    assert_eq!(push.payload["identity_id"], "alice");
    assert_eq!(push.payload["grants"]["channels"], "read");
}

// ── Deletion sentinel ───────────────────────────────────────────

#[test]
fn deletion_sentinel_is_distinguishable() {
    let sentinel = protocol::deletion_patch(&EntryId::new("c1"));
    assert!(protocol::is_deletion(&sentinel));
    assert_eq!(sentinel, json!({"id": "c1", "deleted": true}));

    assert!(!protocol::is_deletion(&json!({"id": "c1", "title": "x"})));
    assert!(!protocol::is_deletion(&json!({"deleted": false})));
    assert!(!protocol::is_deletion(&json!({"deleted": "yes"})));
}
