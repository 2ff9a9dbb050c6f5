//! Message fan-out to connected signaling clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use vigil_core::ids::SessionToken;

use crate::connection::{ClientConnection, ClientRole};
use crate::message::SignalMessage;

/// Maximum total lifetime message drops before forcibly disconnecting a slow
/// client.
const MAX_TOTAL_DROPS: u64 = 100;

/// Signaling failures.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// A message could not be serialized for the wire.
    #[error("failed to serialize signaling message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The publishing seam engine components depend on.
///
/// The production implementation is [`SignalingHub`]; tests substitute a
/// recording fake.
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Publish a message to every client in the session's room.
    async fn publish(&self, token: &SessionToken, message: SignalMessage)
    -> Result<(), SignalError>;

    /// Publish a message to every connected client.
    async fn publish_all(&self, message: SignalMessage) -> Result<(), SignalError>;
}

/// Manages signaling fan-out to connected clients.
pub struct SignalingHub {
    /// Connected clients indexed by connection ID.
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
    /// Atomic counter tracking total connections (avoids read-locking for
    /// count queries).
    active_count: AtomicUsize,
    /// Rooms whose monitored client has gone, with the instant it left.
    /// Consumed by the grace-period watchdog.
    vacated: Mutex<HashMap<SessionToken, Instant>>,
}

impl SignalingHub {
    /// Create a new hub.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
            vacated: Mutex::new(HashMap::new()),
        }
    }

    /// Add a connection.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        if connection.role == ClientRole::Monitored {
            if let Some(token) = connection.room() {
                let _ = self.vacated.lock().remove(&token);
            }
        }
        let mut conns = self.connections.write().await;
        if conns.insert(connection.id.clone(), connection).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a connection by ID, recording room vacancy for monitored
    /// clients so the watchdog can apply the grace period.
    pub async fn remove(&self, connection_id: &str) {
        let removed = {
            let mut conns = self.connections.write().await;
            conns.remove(connection_id)
        };
        if let Some(conn) = removed {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
            if conn.role == ClientRole::Monitored {
                if let Some(token) = conn.room() {
                    let _ = self.vacated.lock().insert(token, Instant::now());
                }
            }
        }
    }

    /// Bind a connection to a session room.
    pub async fn join_room(&self, connection_id: &str, token: SessionToken) {
        let conns = self.connections.read().await;
        if let Some(conn) = conns.get(connection_id) {
            if conn.role == ClientRole::Monitored {
                let _ = self.vacated.lock().remove(&token);
            }
            conn.join_room(token);
        } else {
            warn!(connection_id, "join_room for unknown connection");
        }
    }

    /// Broadcast a message to every client in the given room.
    pub async fn broadcast_to_room(&self, token: &SessionToken, message: &SignalMessage) {
        self.broadcast_to(
            |c| c.room().as_ref() == Some(token),
            message,
            token.as_str(),
        )
        .await;
    }

    /// Broadcast a message to every connected client.
    pub async fn broadcast_all(&self, message: &SignalMessage) {
        self.broadcast_to(|_| true, message, "all").await;
    }

    /// Serialize once, fan out to matching clients, evict slow clients.
    async fn broadcast_to(
        &self,
        filter: impl Fn(&ClientConnection) -> bool,
        message: &SignalMessage,
        label: &str,
    ) {
        let json = match serde_json::to_string(message) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "failed to serialize signaling message");
                return;
            }
        };
        let mut to_remove = Vec::new();
        {
            let conns = self.connections.read().await;
            let mut recipients = 0u32;
            for conn in conns.values() {
                if filter(conn) {
                    recipients += 1;
                    if !conn.send(Arc::clone(&json)) {
                        counter!("signal_broadcast_drops_total").increment(1);
                        let drops = conn.drop_count();
                        if drops >= MAX_TOTAL_DROPS {
                            warn!(conn_id = %conn.id, label, drops, "disconnecting slow client");
                            to_remove.push(conn.id.clone());
                        } else {
                            warn!(conn_id = %conn.id, label, total_drops = drops, "failed to send signaling message (channel full)");
                        }
                    }
                }
            }
            debug!(kind = message.kind(), label, recipients, "broadcast signaling message");
        }
        for id in &to_remove {
            self.remove(id).await;
        }
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Connections currently in a room.
    pub async fn room_connections(&self, token: &SessionToken) -> Vec<Arc<ClientConnection>> {
        let conns = self.connections.read().await;
        conns
            .values()
            .filter(|c| c.room().as_ref() == Some(token))
            .cloned()
            .collect()
    }

    /// Rooms whose monitored client has been gone longer than `grace`.
    /// Each returned token is removed from the vacancy set so the caller acts
    /// on it exactly once.
    pub fn take_expired_rooms(&self, grace: std::time::Duration) -> Vec<SessionToken> {
        let mut vacated = self.vacated.lock();
        let expired: Vec<SessionToken> = vacated
            .iter()
            .filter(|(_, since)| since.elapsed() >= grace)
            .map(|(token, _)| token.clone())
            .collect();
        for token in &expired {
            let _ = vacated.remove(token);
        }
        expired
    }
}

impl Default for SignalingHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalSink for SignalingHub {
    async fn publish(
        &self,
        token: &SessionToken,
        message: SignalMessage,
    ) -> Result<(), SignalError> {
        self.broadcast_to_room(token, &message).await;
        Ok(())
    }

    async fn publish_all(&self, message: SignalMessage) -> Result<(), SignalError> {
        self.broadcast_all(&message).await;
        Ok(())
    }
}
