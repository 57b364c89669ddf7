//! Per-connection state and the push seam.
//!
//! A [`Connection`] is the framework's view of one live socket: a stable id,
//! the authenticated identity (set once at authentication time), and an
//! unbounded channel the subscription tables push update frames into. The
//! transport layer drains the receiving half into the actual socket.

use crate::protocol::ServerPush;
use std::sync::RwLock;
use tokio::sync::mpsc;
use wirebus_types::{ConnectionId, Identity};

/// One live connection.
pub struct Connection {
    id: ConnectionId,
    identity: RwLock<Option<Identity>>,
    sink: mpsc::UnboundedSender<ServerPush>,
}

impl Connection {
    /// Creates a connection with a freshly minted id.
    #[must_use]
    pub fn new(sink: mpsc::UnboundedSender<ServerPush>) -> Self {
        Self::with_id(ConnectionId::new(), sink)
    }

    /// Creates a connection with an explicit id.
    #[must_use]
    pub fn with_id(id: ConnectionId, sink: mpsc::UnboundedSender<ServerPush>) -> Self {
        Self {
            id,
            identity: RwLock::new(None),
            sink,
        }
    }

    /// The connection's id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The authenticated identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.identity.read().unwrap().clone()
    }

    /// Binds (or clears) the authenticated identity.
    pub fn set_identity(&self, identity: Option<Identity>) {
        *self.identity.write().unwrap() = identity;
    }

    /// Delivers a push frame. Fire-and-forget: a closed receiver is ignored,
    /// disconnect cleanup removes the subscriptions shortly after.
    pub fn push(&self, frame: ServerPush) {
        let _ = self.sink.send(frame);
    }

    /// Clone of the push sink, for subscriber registration.
    pub(crate) fn sink(&self) -> mpsc::UnboundedSender<ServerPush> {
        self.sink.clone()
    }
}

/// In-process connections for testing.
pub mod mock {
    use super::*;
    use std::sync::Arc;

    /// Creates a connection plus the receiving half of its push channel.
    #[must_use]
    pub fn connection() -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerPush>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Connection::new(tx)), rx)
    }

    /// Creates an authenticated connection plus its push receiver.
    #[must_use]
    pub fn authenticated(
        identity: Identity,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerPush>) {
        let (conn, rx) = connection();
        conn.set_identity(Some(identity));
        (conn, rx)
    }

    /// Drains every frame currently queued on a push receiver.
    pub fn drain(rx: &mut mpsc::UnboundedReceiver<ServerPush>) -> Vec<ServerPush> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }
}
