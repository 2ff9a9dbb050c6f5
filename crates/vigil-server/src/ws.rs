//! Signaling WebSocket endpoint.
//!
//! Each socket becomes a [`ClientConnection`] in the hub. Inbound frames are
//! parsed as [`SignalMessage`]s and dispatched: queries answered directly,
//! lifecycle messages folded into the registry, everything room-scoped
//! relayed to the session's room. Outbound traffic arrives through the
//! connection's channel from hub broadcasts.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use metrics::counter;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use vigil_core::ids::SessionToken;
use vigil_signaling::connection::{ClientConnection, ClientRole};
use vigil_signaling::message::SignalMessage;

use crate::metrics::{WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::state::AppState;

/// Outbound channel depth per connection; beyond this, sends count as drops.
const OUTBOUND_BUFFER: usize = 64;

/// Query parameters for the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// `monitored` or `observer` (the default).
    role: Option<String>,
}

/// `GET /ws` — upgrade into the signaling channel.
pub async fn upgrade(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let role = match query.role.as_deref() {
        Some("monitored") => ClientRole::Monitored,
        _ => ClientRole::Observer,
    };
    ws.on_upgrade(move |socket| serve(state, role, socket))
}

async fn serve(state: Arc<AppState>, role: ClientRole, socket: WebSocket) {
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(OUTBOUND_BUFFER);
    let id = uuid::Uuid::now_v7().to_string();
    let conn = Arc::new(ClientConnection::new(&id, role, tx));
    state.hub.add(Arc::clone(&conn)).await;
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!(conn_id = %id, ?role, "signaling client connected");

    let (mut sender, mut receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender
                .send(Message::Text(payload.as_str().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = receiver.next().await {
        match frame {
            Message::Text(text) => match serde_json::from_str::<SignalMessage>(text.as_str()) {
                Ok(message) => dispatch(&state, &conn, message).await,
                Err(e) => warn!(conn_id = %id, error = %e, "unparseable signaling frame"),
            },
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of the
            // protocol.
            _ => {}
        }
    }

    state.hub.remove(&id).await;
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    writer.abort();
    info!(conn_id = %id, "signaling client disconnected");
}

/// Route one inbound message.
pub(crate) async fn dispatch(
    state: &AppState,
    conn: &Arc<ClientConnection>,
    message: SignalMessage,
) {
    match &message {
        SignalMessage::GetActiveStreams {} => {
            reply(
                conn,
                &SignalMessage::ActiveStreams {
                    sessions: state.registry.active_summaries(),
                },
            );
        }
        SignalMessage::MonitoredReady { session_token } => {
            join_room(state, conn, session_token).await;
            state.hub.broadcast_to_room(session_token, &message).await;
        }
        SignalMessage::StreamStarted { session_token } => {
            join_room(state, conn, session_token).await;
            if let Err(e) = state.registry.mark_live(session_token) {
                warn!(token = %session_token, error = %e, "stream-started for unusable session");
            }
            state.hub.broadcast_to_room(session_token, &message).await;
        }
        SignalMessage::StreamResumed { session_token, .. } => {
            if let Err(e) = state.registry.mark_live(session_token) {
                warn!(token = %session_token, error = %e, "stream-resumed for unusable session");
            }
            state.hub.broadcast_to_room(session_token, &message).await;
        }
        SignalMessage::StreamPaused {
            session_token,
            reason,
            disconnected_at,
        } => {
            if let Err(e) = state
                .registry
                .mark_paused(session_token, reason, *disconnected_at)
            {
                warn!(token = %session_token, error = %e, "stream-paused for unusable session");
            }
            state.hub.broadcast_to_room(session_token, &message).await;
        }
        SignalMessage::StreamEnded { session_token }
        | SignalMessage::QuizTerminated { session_token, .. } => {
            if let Err(e) = state.registry.mark_ended(session_token) {
                warn!(token = %session_token, error = %e, "end event for unknown session");
            }
            state.hub.broadcast_to_room(session_token, &message).await;
        }
        SignalMessage::ProctoringViolation { violation } => {
            if let Err(e) = state.registry.record_violation(violation) {
                warn!(token = %violation.session_token, error = %e,
                    "violation for unknown session");
            }
            let token = violation.session_token.clone();
            state.hub.broadcast_to_room(&token, &message).await;
        }
        SignalMessage::NegotiationOffer { session_token, .. }
        | SignalMessage::NegotiationAnswer { session_token, .. }
        | SignalMessage::NegotiationCandidate { session_token, .. } => {
            // Negotiation traffic binds the sender to the room and is
            // relayed opaquely; the engine never interprets the bodies.
            join_room(state, conn, session_token).await;
            state.hub.broadcast_to_room(session_token, &message).await;
        }
        SignalMessage::ActiveStreams { .. } => {
            debug!(conn_id = %conn.id, "ignoring server-origin message from client");
        }
    }
}

async fn join_room(state: &AppState, conn: &Arc<ClientConnection>, token: &SessionToken) {
    if conn.room().as_ref() != Some(token) {
        state.hub.join_room(&conn.id, token.clone()).await;
    }
}

fn reply(conn: &Arc<ClientConnection>, message: &SignalMessage) {
    match serde_json::to_string(message) {
        Ok(json) => {
            if !conn.send(Arc::new(json)) {
                warn!(conn_id = %conn.id, "failed to queue direct reply");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize direct reply"),
    }
}
