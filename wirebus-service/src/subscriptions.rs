//! Per-entry subscriber bookkeeping.
//!
//! One table per service, mapping entry id to the set of live connections
//! subscribed to it. Invariants: subscribe is idempotent, unsubscribe and
//! disconnect remove the connection from every set it belonged to, and an
//! entry whose set becomes empty is pruned from the map entirely.

use crate::connection::Connection;
use crate::protocol::ServerPush;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use wirebus_types::{ConnectionId, EntryId, Identity};

/// One registered subscriber: the identity it held at subscribe time plus
/// its push sink.
struct Subscriber {
    identity: Option<Identity>,
    sink: mpsc::UnboundedSender<ServerPush>,
}

/// The subscriber table for one service.
#[derive(Default)]
pub struct SubscriptionTable {
    entries: RwLock<HashMap<EntryId, HashMap<ConnectionId, Subscriber>>>,
}

impl SubscriptionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection for an entry. Idempotent: re-subscribing
    /// replaces the existing registration.
    pub async fn insert(&self, entry_id: &EntryId, conn: &Arc<Connection>) {
        let mut entries = self.entries.write().await;
        entries.entry(entry_id.clone()).or_default().insert(
            conn.id(),
            Subscriber {
                identity: conn.identity(),
                sink: conn.sink(),
            },
        );
    }

    /// Removes a connection from one entry's set. Idempotent; prunes the
    /// entry when its set becomes empty.
    pub async fn remove(&self, entry_id: &EntryId, conn_id: ConnectionId) {
        let mut entries = self.entries.write().await;
        if let Some(subscribers) = entries.get_mut(entry_id) {
            subscribers.remove(&conn_id);
            if subscribers.is_empty() {
                entries.remove(entry_id);
            }
        }
    }

    /// Removes a connection from every entry's set. Safe when the
    /// connection was never subscribed anywhere.
    pub async fn remove_connection(&self, conn_id: ConnectionId) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, subscribers| {
            subscribers.remove(&conn_id);
            !subscribers.is_empty()
        });
    }

    /// Whether a connection is currently subscribed to an entry.
    pub async fn is_subscribed(&self, entry_id: &EntryId, conn_id: ConnectionId) -> bool {
        self.entries
            .read()
            .await
            .get(entry_id)
            .is_some_and(|subscribers| subscribers.contains_key(&conn_id))
    }

    /// Number of connections subscribed to an entry.
    pub async fn subscriber_count(&self, entry_id: &EntryId) -> usize {
        self.entries
            .read()
            .await
            .get(entry_id)
            .map_or(0, HashMap::len)
    }

    /// Number of entries with at least one subscriber.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Delivers a frame to every subscriber of an entry, building it per
    /// viewer so redaction can differ by identity. Fire-and-forget.
    pub(crate) async fn broadcast<F>(&self, entry_id: &EntryId, make_frame: F)
    where
        F: Fn(Option<&Identity>) -> ServerPush,
    {
        let entries = self.entries.read().await;
        let Some(subscribers) = entries.get(entry_id) else {
            return;
        };
        debug!(entry = %entry_id, subscribers = subscribers.len(), "broadcasting update");
        for subscriber in subscribers.values() {
            let frame = make_frame(subscriber.identity.as_ref());
            let _ = subscriber.sink.send(frame);
        }
    }
}
