//! HTTP route handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics::counter;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use vigil_core::ids::{AssessmentId, SessionToken};
use vigil_core::policy::MonitoringPolicy;
use vigil_core::session::SessionSummary;
use vigil_core::violation::Violation;
use vigil_signaling::message::SignalMessage;

use crate::error::ServerError;
use crate::metrics::HTTP_REQUESTS_TOTAL;
use crate::state::AppState;
use crate::ws;

/// Build the full router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/active-sessions", get(active_sessions))
        .route("/sessions/{token}/join", post(join_session))
        .route("/violations", post(post_violation))
        .route("/proctoring-policy/{assessment}", get(proctoring_policy))
        .route("/ws", get(ws::upgrade))
        .route("/metrics", get(render_metrics))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `GET /active-sessions` — summaries of every non-ended session.
async fn active_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSummary>> {
    counter!(HTTP_REQUESTS_TOTAL, "route" => "active_sessions").increment(1);
    Json(state.registry.active_summaries())
}

/// `POST /sessions/{token}/join` — register an observer's interest in a
/// session. Negotiation itself flows over the signaling socket.
async fn join_session(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<StatusCode, ServerError> {
    counter!(HTTP_REQUESTS_TOTAL, "route" => "join_session").increment(1);
    let token = SessionToken::new(token);
    if state.registry.get(&token).is_none() {
        return Err(vigil_registry::RegistryError::UnknownSession(token).into());
    }
    info!(token = %token, "observer joined session");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /violations` — record a violation and broadcast it to the session's
/// room.
async fn post_violation(
    State(state): State<Arc<AppState>>,
    Json(violation): Json<Violation>,
) -> Result<StatusCode, ServerError> {
    counter!(HTTP_REQUESTS_TOTAL, "route" => "post_violation").increment(1);
    state.registry.record_violation(&violation)?;
    let token = violation.session_token.clone();
    state
        .hub
        .broadcast_to_room(&token, &SignalMessage::ProctoringViolation { violation })
        .await;
    Ok(StatusCode::CREATED)
}

/// `GET /proctoring-policy/{assessment}` — the assessment's monitoring
/// policy, defaulted when none was registered.
async fn proctoring_policy(
    State(state): State<Arc<AppState>>,
    Path(assessment): Path<String>,
) -> Json<MonitoringPolicy> {
    counter!(HTTP_REQUESTS_TOTAL, "route" => "proctoring_policy").increment(1);
    Json(state.policy(&AssessmentId::new(assessment)))
}

/// `GET /metrics` — Prometheus text format.
async fn render_metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}

/// `GET /health` — liveness probe.
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
