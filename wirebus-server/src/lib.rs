//! HTTP/WebSocket surface and example services for the Wirebus server.
//!
//! The binary exposes two routes: `GET /api/v1/identity` (JSON service
//! description) and `GET /ws` (the RPC socket). Each socket frame is a
//! [`ClientRequest`] with an optional client-chosen `seq`; the server
//! answers every request with exactly one `ack` frame echoing that `seq`,
//! and pushes update frames with no `seq` at all.

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use wirebus_service::{
    entry_id_from_payload, Ack, Connection, EntityService, FnMethod, IdentityResolver,
    MembershipAclSource, EmbeddedAclSource, ServerPush, ServiceConfig, ServiceError,
    ServiceRegistry,
};
use wirebus_store::EntityStore;
use wirebus_types::{AccessControlList, AccessLevel, EntryId, Identity, IdentityId};

/// Payload of `GET /api/v1/identity`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ServerIdentity {
    /// Registered service names.
    pub services: Vec<String>,
    /// Protocol identifier.
    pub protocol_version: String,
    /// Server build identifier.
    pub agent_version: String,
}

/// Shared state behind the router.
pub struct AppState {
    /// The dispatcher.
    pub registry: ServiceRegistry,
    /// The identity payload served over HTTP.
    pub identity: ServerIdentity,
}

async fn identity_handler(State(state): State<Arc<AppState>>) -> Json<ServerIdentity> {
    Json(state.identity.clone())
}

async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// Build the router with the given application state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/identity", get(identity_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// An inbound socket frame.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    /// Client-chosen correlation number, echoed on the ack.
    #[serde(default)]
    seq: Option<u64>,
    event: String,
    #[serde(default)]
    payload: Value,
}

/// An outbound socket frame: either an ack (with `seq`) or a push.
#[derive(Debug, Serialize)]
struct OutboundFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    seq: Option<u64>,
    event: String,
    payload: Value,
}

impl OutboundFrame {
    fn ack(seq: Option<u64>, ack: Ack) -> Self {
        Self {
            seq,
            event: "ack".to_string(),
            payload: serde_json::to_value(ack).unwrap_or(Value::Null),
        }
    }

    fn push(frame: ServerPush) -> Self {
        Self {
            seq: None,
            event: frame.event,
            payload: frame.payload,
        }
    }
}

async fn handle_socket(state: Arc<AppState>, socket: WebSocket) {
    let (mut socket_tx, mut socket_rx) = socket.split();
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<ServerPush>();
    let conn = Arc::new(Connection::new(push_tx));
    let conn_id = conn.id();
    info!(connection = %conn_id, "socket connected");

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();

    // Single writer task: acks and pushes interleave onto one sink.
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if socket_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Forward subscription pushes into the writer.
    let push_out = out_tx.clone();
    let pump = tokio::spawn(async move {
        while let Some(frame) = push_rx.recv().await {
            if push_out.send(OutboundFrame::push(frame)).is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = socket_rx.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let frame: InboundFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(connection = %conn_id, "unparseable frame: {e}");
                let ack = Ack::fail_with_code(400, format!("invalid frame: {e}"));
                if out_tx.send(OutboundFrame::ack(None, ack)).is_err() {
                    break;
                }
                continue;
            }
        };

        let ack = if frame.event == "auth" {
            state.registry.authenticate(&conn, &frame.payload).await
        } else {
            state.registry.dispatch(&conn, &frame.event, frame.payload).await
        };
        if out_tx.send(OutboundFrame::ack(frame.seq, ack)).is_err() {
            break;
        }
    }

    state.registry.disconnect(conn_id).await;
    pump.abort();
    writer.abort();
    info!(connection = %conn_id, "socket closed");
}

// ── Identity resolution ──────────────────────────────────────────

/// One token entry in the auth file.
#[derive(Debug, Clone, Deserialize)]
struct TokenRecord {
    identity_id: String,
    #[serde(default)]
    grants: HashMap<String, AccessLevel>,
}

/// Resolves bearer tokens against a static token file.
pub struct TokenFileResolver {
    tokens: HashMap<String, Identity>,
}

impl TokenFileResolver {
    /// Loads a token file: `{"<token>": {"identity_id", "grants"}}`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read auth file {:?}", path.as_ref()))?;
        let records: HashMap<String, TokenRecord> =
            serde_json::from_str(&raw).context("failed to parse auth file")?;
        Ok(Self::from_records(records))
    }

    /// Builds a resolver from in-memory records (tests, demos).
    pub fn from_map(tokens: HashMap<String, Identity>) -> Self {
        Self { tokens }
    }

    fn from_records(records: HashMap<String, TokenRecord>) -> Self {
        let tokens = records
            .into_iter()
            .map(|(token, record)| {
                let mut identity = Identity::new(record.identity_id);
                for (service, level) in record.grants {
                    identity.grants.grant(service, level);
                }
                (token, identity)
            })
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl IdentityResolver for TokenFileResolver {
    async fn resolve(&self, credentials: &Value) -> Option<Identity> {
        let token = credentials.get("token")?.as_str()?;
        self.tokens.get(token).cloned()
    }
}

// ── Example services ─────────────────────────────────────────────

/// The channels service: many-to-many membership rows are the single ACL
/// source of truth.
pub fn channels_service(store: Arc<dyn EntityStore>) -> Arc<EntityService> {
    let members = Arc::new(MembershipAclSource::new(store.clone(), "channel_members"));

    let create_members = members.clone();
    let invite_members = members.clone();
    let leave_members = members.clone();

    EntityService::builder(ServiceConfig::new("channels"), store)
        .entry_acl(members)
        .method(FnMethod::unscoped(
            "create",
            AccessLevel::Read,
            move |service, payload, ctx| {
                let members = create_members.clone();
                async move {
                    let caller = ctx
                        .identity_id()
                        .cloned()
                        .ok_or(ServiceError::AuthenticationRequired)?;
                    let title = required_str(&payload, "title")?;
                    let entity = service
                        .create(json!({ "title": title, "owner": caller }))
                        .await?;
                    let entry = EntryId::new(entity["id"].as_str().unwrap_or_default());
                    members.grant(&entry, &caller, AccessLevel::Admin).await?;
                    Ok(entity)
                }
            },
        ))
        .method(FnMethod::new(
            "rename",
            AccessLevel::Moderate,
            entry_id_from_payload,
            |service, payload, _ctx| async move {
                let entry = required_entry(&payload)?;
                let title = required_str(&payload, "title")?;
                service
                    .update(&entry, json!({ "title": title }))
                    .await
                    .ok_or(ServiceError::NotFoundOrDenied)
            },
        ))
        .method(FnMethod::new(
            "invite",
            AccessLevel::Moderate,
            entry_id_from_payload,
            move |service, payload, _ctx| {
                let members = invite_members.clone();
                async move {
                    let entry = required_entry(&payload)?;
                    let invitee = IdentityId::new(required_str(&payload, "identity_id")?);
                    let level = payload
                        .get("level")
                        .cloned()
                        .map(serde_json::from_value)
                        .transpose()?
                        .unwrap_or(AccessLevel::Read);
                    members.grant(&entry, &invitee, level).await?;
                    // Membership changes push a member event, not an entity patch
                    service
                        .emit_update(
                            &entry,
                            json!({ "id": entry, "member_added": invitee, "level": level }),
                        )
                        .await;
                    Ok(json!({ "invited": invitee, "level": level }))
                }
            },
        ))
        .method(FnMethod::new(
            "leave",
            AccessLevel::Read,
            entry_id_from_payload,
            move |service, payload, ctx| {
                let members = leave_members.clone();
                async move {
                    let entry = required_entry(&payload)?;
                    let caller = ctx
                        .identity_id()
                        .cloned()
                        .ok_or(ServiceError::AuthenticationRequired)?;
                    let removed = members.revoke(&entry, &caller).await?;
                    if removed {
                        service
                            .emit_update(&entry, json!({ "id": entry, "member_removed": caller }))
                            .await;
                    }
                    Ok(json!({ "left": removed }))
                }
            },
        ))
        .build()
}

/// The documents service: owner-plus-collaborators ACL embedded in the
/// entity row.
pub fn documents_service(store: Arc<dyn EntityStore>) -> Arc<EntityService> {
    let acl = Arc::new(EmbeddedAclSource::new(store.clone(), "documents"));

    EntityService::builder(ServiceConfig::new("documents"), store)
        .entry_acl(acl)
        .method(FnMethod::unscoped(
            "create",
            AccessLevel::Read,
            |service, payload, ctx| async move {
                let caller = ctx
                    .identity_id()
                    .cloned()
                    .ok_or(ServiceError::AuthenticationRequired)?;
                let title = required_str(&payload, "title")?;
                let acl = AccessControlList::new().with(caller.as_str(), AccessLevel::Admin);
                service
                    .create(json!({
                        "title": title,
                        "owner": caller,
                        "body": payload.get("body").cloned().unwrap_or(Value::Null),
                        "acl": acl,
                    }))
                    .await
            },
        ))
        .method(FnMethod::new(
            "edit",
            AccessLevel::Moderate,
            entry_id_from_payload,
            |service, payload, _ctx| async move {
                let entry = required_entry(&payload)?;
                let body = payload
                    .get("body")
                    .cloned()
                    .ok_or_else(|| ServiceError::handler("missing body"))?;
                service
                    .update(&entry, json!({ "body": body }))
                    .await
                    .ok_or(ServiceError::NotFoundOrDenied)
            },
        ))
        .method(FnMethod::new(
            "share",
            AccessLevel::Admin,
            entry_id_from_payload,
            |service, payload, _ctx| async move {
                let entry = required_entry(&payload)?;
                let collaborator = IdentityId::new(required_str(&payload, "identity_id")?);
                let level = payload
                    .get("level")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()?
                    .unwrap_or(AccessLevel::Read);

                // The embedded acl array is the single source of truth
                let store = service.store();
                let Some(row) = store.find_by_id(service.name(), &entry).await? else {
                    return Err(ServiceError::NotFoundOrDenied);
                };
                let mut acl: AccessControlList = row
                    .get("acl")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()?
                    .unwrap_or_default();
                acl.revoke(&collaborator);
                let acl = acl.with(collaborator.as_str(), level);
                service
                    .update(&entry, json!({ "acl": acl }))
                    .await
                    .ok_or(ServiceError::NotFoundOrDenied)?;
                Ok(json!({ "shared_with": collaborator, "level": level }))
            },
        ))
        .build()
}

fn required_str(payload: &Value, field: &str) -> Result<String, ServiceError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ServiceError::handler(format!("missing {field}")))
}

fn required_entry(payload: &Value) -> Result<EntryId, ServiceError> {
    entry_id_from_payload(payload).ok_or_else(|| ServiceError::handler("missing id"))
}

/// Assembles the registry with the example services.
pub fn build_registry(
    store: Arc<dyn EntityStore>,
    resolver: Arc<dyn IdentityResolver>,
) -> ServiceRegistry {
    let mut registry = ServiceRegistry::with_resolver(resolver);
    registry.register(channels_service(store.clone()));
    registry.register(documents_service(store));
    registry
}

/// Builds the full application state.
pub fn build_state(
    store: Arc<dyn EntityStore>,
    resolver: Arc<dyn IdentityResolver>,
) -> Arc<AppState> {
    let registry = build_registry(store, resolver);
    let identity = ServerIdentity {
        services: {
            let mut names: Vec<String> =
                registry.service_names().map(str::to_string).collect();
            names.sort();
            names
        },
        protocol_version: "/wirebus/1.0.0".to_string(),
        agent_version: format!("wirebus-server/{}", env!("CARGO_PKG_VERSION")),
    };
    Arc::new(AppState { registry, identity })
}
