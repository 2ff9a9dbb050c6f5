//! Observer-side aggregation.
//!
//! One aggregator per observer dashboard. It mirrors the record service into
//! the local registry, folds live signaling events into that mirror, and
//! drives the transport link manager for the sessions the observer watches.

use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};

use vigil_core::ids::{ObserverId, SessionToken};
use vigil_registry::SessionRegistry;
use vigil_signaling::hub::SignalSink;
use vigil_signaling::message::SignalMessage;
use vigil_transport::{TransportLink, TransportLinkManager};

use crate::client::{DashboardError, RecordServiceClient};

/// Aggregates everything one observer's dashboard needs.
pub struct DashboardAggregator {
    client: Arc<RecordServiceClient>,
    registry: Arc<SessionRegistry>,
    links: Arc<TransportLinkManager>,
    sink: Arc<dyn SignalSink>,
    observer: ObserverId,
}

impl DashboardAggregator {
    /// Aggregator for `observer`, mirroring into `registry`.
    pub fn new(
        client: Arc<RecordServiceClient>,
        registry: Arc<SessionRegistry>,
        links: Arc<TransportLinkManager>,
        sink: Arc<dyn SignalSink>,
        observer: ObserverId,
    ) -> Self {
        Self {
            client,
            registry,
            links,
            sink,
            observer,
        }
    }

    /// Pull the record service's session list into the registry. Returns how
    /// many summaries were merged.
    pub async fn refresh(&self) -> Result<usize, DashboardError> {
        let summaries = self.client.active_sessions().await?;
        let count = summaries.len();
        self.registry.upsert_from_snapshot(summaries);
        info!(count, "dashboard refreshed");
        Ok(count)
    }

    /// Start watching a session: register the join with the record service,
    /// then negotiate the observer's transport link.
    pub async fn watch(&self, token: &SessionToken) -> Result<TransportLink, DashboardError> {
        self.client.join_session(token).await?;
        let link = self.links.join(token, &self.observer).await?;
        Ok(link)
    }

    /// Force-terminate a session: broadcast the termination to its room,
    /// end it in the registry, and tear down this observer's link.
    pub async fn terminate(
        &self,
        token: &SessionToken,
        reason: impl Into<String>,
    ) -> Result<(), DashboardError> {
        let reason = reason.into();
        if let Err(e) = self
            .sink
            .publish(
                token,
                SignalMessage::QuizTerminated {
                    session_token: token.clone(),
                    reason: reason.clone(),
                },
            )
            .await
        {
            warn!(token = %token, error = %e, "failed to broadcast termination");
        }
        let _ = self.registry.mark_ended(token)?;
        self.links.close(token, &self.observer).await;
        counter!("sessions_terminated_total").increment(1);
        info!(token = %token, reason, "session terminated by observer");
        Ok(())
    }

    /// Tear down and re-establish every link this observer holds.
    pub async fn reconnect_all(&self) -> Vec<SessionToken> {
        self.links.reconnect_all(&self.observer).await
    }

    /// Fold one signaling event into the local mirror. Events are advisory:
    /// failures (stale events for ended sessions, unknown tokens) are logged,
    /// never propagated. End events also tear down this observer's transport
    /// link, since `Ended` is terminal and nothing may renegotiate it.
    pub async fn apply_event(&self, message: &SignalMessage) {
        match message {
            SignalMessage::ActiveStreams { sessions } => {
                self.registry.upsert_from_snapshot(sessions.clone());
            }
            SignalMessage::StreamStarted { session_token }
            | SignalMessage::StreamResumed { session_token, .. } => {
                if let Err(e) = self.registry.mark_live(session_token) {
                    warn!(token = %session_token, error = %e, "stale lifecycle event");
                }
            }
            SignalMessage::StreamPaused {
                session_token,
                reason,
                disconnected_at,
            } => {
                if let Err(e) = self
                    .registry
                    .mark_paused(session_token, reason, *disconnected_at)
                {
                    warn!(token = %session_token, error = %e, "stale pause event");
                }
            }
            SignalMessage::StreamEnded { session_token }
            | SignalMessage::QuizTerminated { session_token, .. } => {
                if let Err(e) = self.registry.mark_ended(session_token) {
                    warn!(token = %session_token, error = %e, "stale end event");
                }
                self.links.close(session_token, &self.observer).await;
            }
            SignalMessage::ProctoringViolation { violation } => {
                if let Err(e) = self.registry.record_violation(violation) {
                    warn!(token = %violation.session_token, error = %e,
                        "violation for unknown session");
                }
            }
            // Negotiation traffic and queries are routed elsewhere.
            _ => {}
        }
    }
}
