//! One client's connection handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use vigil_core::ids::SessionToken;

/// What side of the session a connection belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClientRole {
    /// The test-taker's client.
    Monitored,
    /// An instructor dashboard or other observer.
    Observer,
}

/// A connected signaling client.
///
/// The hub holds an `Arc<ClientConnection>` per client; the socket task holds
/// the receiving half of `tx`. Sends are non-blocking: a full channel counts
/// as a drop rather than stalling the broadcast path.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    /// Monitored client or observer.
    pub role: ClientRole,
    tx: mpsc::Sender<Arc<String>>,
    room: Mutex<Option<SessionToken>>,
    drops: AtomicU64,
}

impl ClientConnection {
    /// Create a connection around the sending half of a socket channel.
    pub fn new(id: impl Into<String>, role: ClientRole, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id: id.into(),
            role,
            tx,
            room: Mutex::new(None),
            drops: AtomicU64::new(0),
        }
    }

    /// Bind this connection to a session room.
    pub fn join_room(&self, token: SessionToken) {
        *self.room.lock() = Some(token);
    }

    /// Leave the current room, if any.
    pub fn leave_room(&self) -> Option<SessionToken> {
        self.room.lock().take()
    }

    /// The room this connection is currently in.
    #[must_use]
    pub fn room(&self) -> Option<SessionToken> {
        self.room.lock().clone()
    }

    /// Try to enqueue a serialized message. Returns `false` (and counts a
    /// drop) when the client's channel is full or closed.
    pub fn send(&self, payload: Arc<String>) -> bool {
        match self.tx.try_send(payload) {
            Ok(()) => true,
            Err(_) => {
                let _ = self.drops.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Lifetime count of dropped messages for this connection.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}
