//! Access-control and subscription broadcast engine for Wirebus.
//!
//! The framework pairs socket-based RPC with per-entity pub/sub behind a
//! layered access-control model.
//!
//! # Architecture
//!
//! - **Access pipeline**: decides whether a caller may invoke a method or
//!   touch an entry, combining service-wide grants, ownership rules and
//!   entry-level ACLs — cheapest checks first, fail-closed on store trouble
//! - **Entity services**: one per entity type, owning the store delegate,
//!   the declared method table and the subscriber table
//! - **Registry**: binds inbound `"<service>:<method>"` frames to handlers,
//!   runs the access pipeline first and converts outcomes into
//!   acknowledgements
//! - **Subscriptions**: track which live connections watch which entries
//!   and push incremental updates to exactly those connections
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wirebus_service::{EntityService, ServiceConfig, ServiceRegistry};
//! use wirebus_store::MemoryStore;
//!
//! let store = Arc::new(MemoryStore::new());
//! let notes = EntityService::builder(ServiceConfig::new("notes"), store).build();
//!
//! let mut registry = ServiceRegistry::new();
//! registry.register(notes);
//! ```

mod access;
pub mod acl;
mod connection;
mod error;
mod method;
pub mod protocol;
mod registry;
mod service;
mod subscriptions;

pub use access::{AccessDecision, AccessPipeline, DenyReason, EntryAclSource, OwnershipCheck};
pub use acl::{EmbeddedAclSource, MembershipAclSource};
pub use connection::{mock, Connection};
pub use error::{ServiceError, ServiceResult};
pub use method::{entry_id_from_payload, FnMethod, MethodContext, ServiceMethod};
pub use protocol::{
    Ack, AuthInfo, ClientRequest, EventName, ServerPush, SubscribePayload, UnsubscribePayload,
};
pub use registry::{IdentityResolver, ServiceRegistry};
pub use service::{EntityService, EntityServiceBuilder, RedactFn, ServiceConfig};
pub use subscriptions::SubscriptionTable;
