//! End-to-end tests for the example services through the dispatcher.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use wirebus_server::{build_registry, TokenFileResolver};
use wirebus_service::{mock, ServiceRegistry};
use wirebus_store::{EntityStore, MemoryStore};
use wirebus_types::{AccessLevel, EntryId, Identity};

fn registry() -> ServiceRegistry {
    let mut tokens = HashMap::new();
    tokens.insert("owner-token".to_string(), Identity::new("owner"));
    tokens.insert("guest-token".to_string(), Identity::new("guest"));
    tokens.insert(
        "admin-token".to_string(),
        Identity::new("admin")
            .with_grant("channels", AccessLevel::Admin)
            .with_grant("documents", AccessLevel::Admin),
    );
    build_registry(
        Arc::new(MemoryStore::new()),
        Arc::new(TokenFileResolver::from_map(tokens)),
    )
}

async fn login(
    registry: &ServiceRegistry,
    token: &str,
) -> (
    Arc<wirebus_service::Connection>,
    tokio::sync::mpsc::UnboundedReceiver<wirebus_service::ServerPush>,
) {
    let (conn, mut rx) = mock::connection();
    let ack = registry
        .authenticate(&conn, &json!({"token": token}))
        .await;
    assert!(ack.success, "login failed: {ack:?}");
    mock::drain(&mut rx); // discard auth:info
    (conn, rx)
}

// ── Channels: membership as the ACL source of truth ─────────────

#[tokio::test]
async fn channel_creator_becomes_admin_member() {
    let registry = registry();
    let (owner, _rx) = login(&registry, "owner-token").await;

    let ack = registry
        .dispatch(&owner, "channels:create", json!({"title": "general"}))
        .await;
    assert!(ack.success, "{ack:?}");
    let channel_id = ack.data.unwrap()["id"].as_str().unwrap().to_string();

    // The creator's membership row carries Admin, so Admin-level methods work
    let ack = registry
        .dispatch(
            &owner,
            "channels:invite",
            json!({"id": channel_id, "identity_id": "guest", "level": "read"}),
        )
        .await;
    assert!(ack.success, "{ack:?}");
}

#[tokio::test]
async fn invited_guest_can_subscribe_but_not_rename() {
    let registry = registry();
    let (owner, _rx) = login(&registry, "owner-token").await;
    let (guest, _guest_rx) = login(&registry, "guest-token").await;

    let ack = registry
        .dispatch(&owner, "channels:create", json!({"title": "general"}))
        .await;
    let channel_id = ack.data.unwrap()["id"].as_str().unwrap().to_string();

    // Before the invite, existence is hidden
    let ack = registry
        .dispatch(&guest, "channels:subscribe", json!({"entry_id": channel_id}))
        .await;
    assert!(!ack.success);

    registry
        .dispatch(
            &owner,
            "channels:invite",
            json!({"id": channel_id, "identity_id": "guest"}),
        )
        .await;

    let ack = registry
        .dispatch(&guest, "channels:subscribe", json!({"entry_id": channel_id}))
        .await;
    assert!(ack.success);
    assert_eq!(ack.data.unwrap()["title"], "general");

    let ack = registry
        .dispatch(
            &guest,
            "channels:rename",
            json!({"id": channel_id, "title": "mine now"}),
        )
        .await;
    assert!(!ack.success);
}

#[tokio::test]
async fn invite_pushes_member_event_to_subscribers() {
    let registry = registry();
    let (owner, mut owner_rx) = login(&registry, "owner-token").await;

    let ack = registry
        .dispatch(&owner, "channels:create", json!({"title": "general"}))
        .await;
    let channel_id = ack.data.unwrap()["id"].as_str().unwrap().to_string();

    registry
        .dispatch(&owner, "channels:subscribe", json!({"entry_id": channel_id}))
        .await;

    registry
        .dispatch(
            &owner,
            "channels:invite",
            json!({"id": channel_id, "identity_id": "guest"}),
        )
        .await;

    let frames = mock::drain(&mut owner_rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload["member_added"], "guest");
    assert_eq!(frames[0].payload["level"], "read");
}

#[tokio::test]
async fn leaving_revokes_membership() {
    let registry = registry();
    let (owner, _rx) = login(&registry, "owner-token").await;
    let (guest, _guest_rx) = login(&registry, "guest-token").await;

    let ack = registry
        .dispatch(&owner, "channels:create", json!({"title": "general"}))
        .await;
    let channel_id = ack.data.unwrap()["id"].as_str().unwrap().to_string();

    registry
        .dispatch(
            &owner,
            "channels:invite",
            json!({"id": channel_id, "identity_id": "guest"}),
        )
        .await;

    let ack = registry
        .dispatch(&guest, "channels:leave", json!({"id": channel_id}))
        .await;
    assert!(ack.success);
    assert_eq!(ack.data.unwrap()["left"], true);

    // Access is gone with the membership row
    let ack = registry
        .dispatch(&guest, "channels:subscribe", json!({"entry_id": channel_id}))
        .await;
    assert!(!ack.success);
}

// ── Documents: embedded ACL ─────────────────────────────────────

#[tokio::test]
async fn document_owner_shares_and_collaborator_edits() {
    let registry = registry();
    let (owner, _rx) = login(&registry, "owner-token").await;
    let (guest, _guest_rx) = login(&registry, "guest-token").await;

    let ack = registry
        .dispatch(
            &owner,
            "documents:create",
            json!({"title": "notes", "body": "draft"}),
        )
        .await;
    assert!(ack.success, "{ack:?}");
    let doc = ack.data.unwrap();
    let doc_id = doc["id"].as_str().unwrap().to_string();
    assert_eq!(doc["acl"][0]["identity_id"], "owner");
    assert_eq!(doc["acl"][0]["level"], "admin");

    // Guest has no ACE yet
    let ack = registry
        .dispatch(&guest, "documents:edit", json!({"id": doc_id, "body": "hax"}))
        .await;
    assert!(!ack.success);

    // Owner shares at moderate; guest can now edit
    let ack = registry
        .dispatch(
            &owner,
            "documents:share",
            json!({"id": doc_id, "identity_id": "guest", "level": "moderate"}),
        )
        .await;
    assert!(ack.success, "{ack:?}");

    let ack = registry
        .dispatch(&guest, "documents:edit", json!({"id": doc_id, "body": "v2"}))
        .await;
    assert!(ack.success, "{ack:?}");
    assert_eq!(ack.data.unwrap()["body"], "v2");
}

#[tokio::test]
async fn reshare_replaces_existing_grant() {
    let registry = registry();
    let (owner, _rx) = login(&registry, "owner-token").await;
    let (guest, _guest_rx) = login(&registry, "guest-token").await;

    let ack = registry
        .dispatch(&owner, "documents:create", json!({"title": "notes"}))
        .await;
    let doc_id = ack.data.unwrap()["id"].as_str().unwrap().to_string();

    for level in ["moderate", "read"] {
        let ack = registry
            .dispatch(
                &owner,
                "documents:share",
                json!({"id": doc_id, "identity_id": "guest", "level": level}),
            )
            .await;
        assert!(ack.success);
    }

    // Downgraded to read: edit is denied, subscribe still works
    let ack = registry
        .dispatch(&guest, "documents:edit", json!({"id": doc_id, "body": "x"}))
        .await;
    assert!(!ack.success);

    let ack = registry
        .dispatch(&guest, "documents:subscribe", json!({"entry_id": doc_id}))
        .await;
    assert!(ack.success);

    // The stored acl holds a single entry for the guest
    let service = registry.service("documents").unwrap();
    let row = service
        .store()
        .find_by_id("documents", &EntryId::new(&doc_id))
        .await
        .unwrap()
        .unwrap();
    let guest_entries = row["acl"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["identity_id"] == "guest")
        .count();
    assert_eq!(guest_entries, 1);
}

#[tokio::test]
async fn service_admin_bypasses_document_acl() {
    let registry = registry();
    let (owner, _rx) = login(&registry, "owner-token").await;
    let (admin, _admin_rx) = login(&registry, "admin-token").await;

    let ack = registry
        .dispatch(&owner, "documents:create", json!({"title": "private"}))
        .await;
    let doc_id = ack.data.unwrap()["id"].as_str().unwrap().to_string();

    let ack = registry
        .dispatch(
            &admin,
            "documents:share",
            json!({"id": doc_id, "identity_id": "guest", "level": "read"}),
        )
        .await;
    assert!(ack.success, "{ack:?}");
}
