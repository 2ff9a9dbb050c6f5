//! The transport link manager.
//!
//! Owns every (session, observer) link and drives its negotiation state
//! machine. The actual media protocol is behind [`LinkNegotiator`]; the
//! manager routes offers/answers/candidates over the signaling channel and
//! requests session lifecycle changes through the registry — it never sets
//! a session's status directly.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use vigil_core::ids::{ObserverId, SessionToken};
use vigil_core::session::{PauseReason, SessionStatus};
use vigil_registry::SessionRegistry;
use vigil_signaling::hub::SignalSink;
use vigil_signaling::message::SignalMessage;

use crate::link::{LinkState, TransportLink};

type LinkKey = (SessionToken, ObserverId);

/// Transport failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Another join for the same pair is mid-flight.
    #[error("join already in flight for session {token} observer {observer}")]
    JoinInFlight {
        /// Session token.
        token: SessionToken,
        /// Observer attempting the join.
        observer: ObserverId,
    },
    /// No link exists for the pair.
    #[error("no transport link for session {token} observer {observer}")]
    LinkNotFound {
        /// Session token.
        token: SessionToken,
        /// Observer.
        observer: ObserverId,
    },
    /// The operation requires an established link.
    #[error("link for session {token} is {state:?}, renegotiation requires an established link")]
    NotConnected {
        /// Session token.
        token: SessionToken,
        /// Actual link state.
        state: LinkState,
    },
    /// The underlying media negotiation failed.
    #[error("negotiation failed: {0}")]
    Negotiation(String),
}

/// The media-protocol seam.
///
/// Production wraps the real peer-connection stack; tests substitute a
/// scripted fake. The manager treats offer/answer/candidate bodies as opaque
/// JSON either way.
#[async_trait]
pub trait LinkNegotiator: Send + Sync {
    /// Create an offer for the pair, allocating media resources.
    async fn create_offer(
        &self,
        token: &SessionToken,
        observer: &ObserverId,
    ) -> Result<Value, TransportError>;

    /// Apply the remote answer.
    async fn apply_answer(
        &self,
        token: &SessionToken,
        observer: &ObserverId,
        sdp: &Value,
    ) -> Result<(), TransportError>;

    /// Add a remote connectivity candidate.
    async fn add_candidate(
        &self,
        token: &SessionToken,
        observer: &ObserverId,
        candidate: &Value,
    ) -> Result<(), TransportError>;

    /// Release the pair's media resources. Must be safe to call for a pair
    /// that was never offered.
    async fn close(&self, token: &SessionToken, observer: &ObserverId);
}

/// Manages every observer↔session transport link.
pub struct TransportLinkManager {
    links: DashMap<LinkKey, TransportLink>,
    /// Pairs with a join mid-flight. Guarded so two concurrent joins for the
    /// same pair produce one link and one offer.
    joining: Mutex<HashSet<LinkKey>>,
    negotiator: Arc<dyn LinkNegotiator>,
    registry: Arc<SessionRegistry>,
    sink: Arc<dyn SignalSink>,
    reconnect_stagger: Duration,
}

/// Removes the pair from the joining set on every exit path.
struct JoinGuard<'a> {
    joining: &'a Mutex<HashSet<LinkKey>>,
    key: LinkKey,
}

impl<'a> JoinGuard<'a> {
    fn try_acquire(joining: &'a Mutex<HashSet<LinkKey>>, key: LinkKey) -> Option<Self> {
        if joining.lock().insert(key.clone()) {
            Some(Self { joining, key })
        } else {
            None
        }
    }
}

impl Drop for JoinGuard<'_> {
    fn drop(&mut self) {
        let _ = self.joining.lock().remove(&self.key);
    }
}

impl TransportLinkManager {
    /// Manager negotiating through `negotiator`, reporting lifecycle changes
    /// to `registry` and signaling through `sink`.
    pub fn new(
        negotiator: Arc<dyn LinkNegotiator>,
        registry: Arc<SessionRegistry>,
        sink: Arc<dyn SignalSink>,
        reconnect_stagger: Duration,
    ) -> Self {
        Self {
            links: DashMap::new(),
            joining: Mutex::new(HashSet::new()),
            negotiator,
            registry,
            sink,
            reconnect_stagger,
        }
    }

    /// Join an observer to a session.
    ///
    /// Idempotent per pair: an existing non-closed link is returned
    /// unchanged, with no second offer. Otherwise a new link is created, the
    /// initial offer sent, and the link returned in `Offering`.
    pub async fn join(
        &self,
        token: &SessionToken,
        observer: &ObserverId,
    ) -> Result<TransportLink, TransportError> {
        let key = (token.clone(), observer.clone());
        if let Some(existing) = self.links.get(&key) {
            if !existing.state.is_closed() {
                debug!(token = %token, observer = %observer, state = ?existing.state,
                    "join returned existing link");
                return Ok(existing.clone());
            }
        }

        let Some(_guard) = JoinGuard::try_acquire(&self.joining, key.clone()) else {
            return Err(TransportError::JoinInFlight {
                token: token.clone(),
                observer: observer.clone(),
            });
        };

        let _ = self
            .links
            .insert(key.clone(), TransportLink::new(token.clone(), observer.clone()));
        self.update_gauge();

        let sdp = match self.negotiator.create_offer(token, observer).await {
            Ok(sdp) => sdp,
            Err(e) => {
                let _ = self.links.remove(&key);
                self.update_gauge();
                return Err(e);
            }
        };

        let link = {
            let mut entry = self
                .links
                .get_mut(&key)
                .ok_or_else(|| TransportError::LinkNotFound {
                    token: token.clone(),
                    observer: observer.clone(),
                })?;
            entry.state = LinkState::Offering;
            entry.last_offer_at = Some(Utc::now());
            entry.clone()
        };

        counter!("link_offers_total").increment(1);
        self.publish(
            token,
            SignalMessage::NegotiationOffer {
                session_token: token.clone(),
                observer_id: observer.clone(),
                sdp,
            },
        )
        .await;
        info!(token = %token, observer = %observer, "transport link offered");
        Ok(link)
    }

    /// Apply a remote answer. Accepted while the link is offering,
    /// renegotiating, or already connected; otherwise logged and ignored.
    pub async fn handle_answer(
        &self,
        token: &SessionToken,
        observer: &ObserverId,
        sdp: &Value,
    ) -> Result<(), TransportError> {
        let key = (token.clone(), observer.clone());
        let state = self.links.get(&key).map(|l| l.state);
        match state {
            Some(state) if state.accepts_remote() => {}
            other => {
                debug!(token = %token, observer = %observer, state = ?other,
                    "ignoring answer for closed or absent link");
                return Ok(());
            }
        }

        self.negotiator.apply_answer(token, observer, sdp).await?;

        // The session's prior status decides which lifecycle event this
        // negotiation completes.
        let prior = self.registry.get(token).map(|s| s.status);

        if let Some(mut entry) = self.links.get_mut(&key) {
            entry.state = LinkState::Connected;
            entry.inbound_video = true;
            entry.inbound_audio = true;
        }

        match self.registry.mark_live(token) {
            Ok(true) => {
                self.registry.set_connection_state(token, "connected");
                self.registry.set_media_attached(token, true);
                let event = match prior {
                    Some(SessionStatus::Paused) => Some(SignalMessage::StreamResumed {
                        session_token: token.clone(),
                        resumed_at: Utc::now(),
                    }),
                    Some(SessionStatus::Setup) => Some(SignalMessage::StreamStarted {
                        session_token: token.clone(),
                    }),
                    _ => None,
                };
                if let Some(event) = event {
                    self.publish(token, event).await;
                }
            }
            Ok(false) => {
                self.registry.set_connection_state(token, "connected");
                self.registry.set_media_attached(token, true);
            }
            Err(e) => warn!(token = %token, error = %e, "negotiation completed for unusable session"),
        }
        info!(token = %token, observer = %observer, "transport link connected");
        Ok(())
    }

    /// Route a remote candidate. Same acceptance rule as answers.
    pub async fn handle_candidate(
        &self,
        token: &SessionToken,
        observer: &ObserverId,
        candidate: &Value,
    ) -> Result<(), TransportError> {
        let key = (token.clone(), observer.clone());
        let state = self.links.get(&key).map(|l| l.state);
        match state {
            Some(state) if state.accepts_remote() => {
                self.negotiator.add_candidate(token, observer, candidate).await
            }
            other => {
                debug!(token = %token, observer = %observer, state = ?other,
                    "ignoring candidate for closed or absent link");
                Ok(())
            }
        }
    }

    /// Send a fresh offer on an established link, preserving tracks.
    /// `reason` is carried for diagnostics (`ice-restart`, `track-change`).
    pub async fn renegotiate(
        &self,
        token: &SessionToken,
        observer: &ObserverId,
        reason: &str,
    ) -> Result<(), TransportError> {
        let key = (token.clone(), observer.clone());
        {
            let mut entry = self
                .links
                .get_mut(&key)
                .ok_or_else(|| TransportError::LinkNotFound {
                    token: token.clone(),
                    observer: observer.clone(),
                })?;
            if entry.state != LinkState::Connected {
                return Err(TransportError::NotConnected {
                    token: token.clone(),
                    state: entry.state,
                });
            }
            entry.state = LinkState::Renegotiating;
        }

        let sdp = match self.negotiator.create_offer(token, observer).await {
            Ok(sdp) => sdp,
            Err(e) => {
                // Keep the link usable; the caller may retry.
                if let Some(mut entry) = self.links.get_mut(&key) {
                    entry.state = LinkState::Connected;
                }
                return Err(e);
            }
        };

        if let Some(mut entry) = self.links.get_mut(&key) {
            entry.last_offer_at = Some(Utc::now());
        }
        counter!("link_renegotiations_total").increment(1);
        self.publish(
            token,
            SignalMessage::NegotiationOffer {
                session_token: token.clone(),
                observer_id: observer.clone(),
                sdp,
            },
        )
        .await;
        info!(token = %token, observer = %observer, reason, "transport link renegotiating");
        Ok(())
    }

    /// Report an established link as lost. Tears the link down and requests
    /// `Live → Paused` for the session; reconnection goes through a fresh
    /// `join` or the next renegotiation.
    pub async fn report_link_down(&self, token: &SessionToken, observer: &ObserverId) {
        let key = (token.clone(), observer.clone());
        let Some((_, link)) = self.links.remove(&key) else {
            return;
        };
        self.update_gauge();
        self.negotiator.close(token, observer).await;
        debug!(token = %token, observer = %observer, state = ?link.state, "transport link lost");

        let at = Utc::now();
        match self.registry.mark_paused(token, &PauseReason::TransportLost, at) {
            Ok(true) => {
                self.registry.set_connection_state(token, "disconnected");
                self.registry.set_media_attached(token, false);
                self.publish(
                    token,
                    SignalMessage::StreamPaused {
                        session_token: token.clone(),
                        reason: PauseReason::TransportLost,
                        disconnected_at: at,
                    },
                )
                .await;
            }
            Ok(false) => {}
            Err(e) => debug!(token = %token, error = %e, "link loss for non-pausable session"),
        }
    }

    /// Close a pair's link. Safe for any state, including absent.
    pub async fn close(&self, token: &SessionToken, observer: &ObserverId) {
        let key = (token.clone(), observer.clone());
        if self.links.remove(&key).is_some() {
            self.update_gauge();
            debug!(token = %token, observer = %observer, "transport link closed");
        }
        self.negotiator.close(token, observer).await;
    }

    /// Close every link held by one observer.
    pub async fn close_all_for_observer(&self, observer: &ObserverId) {
        for token in self.tokens_for(observer) {
            self.close(&token, observer).await;
        }
    }

    /// Tear down and sequentially re-join every session the observer was
    /// watching, with the configured stagger between joins. A failed rejoin
    /// is logged and skipped; the rest proceed. Returns the successfully
    /// rejoined tokens.
    pub async fn reconnect_all(&self, observer: &ObserverId) -> Vec<SessionToken> {
        let tokens = self.tokens_for(observer);
        for token in &tokens {
            self.close(token, observer).await;
        }

        let mut rejoined = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.reconnect_stagger).await;
            }
            match self.join(token, observer).await {
                Ok(_) => rejoined.push(token.clone()),
                Err(e) => warn!(token = %token, observer = %observer, error = %e,
                    "rejoin failed during reconnect-all"),
            }
        }
        info!(observer = %observer, total = tokens.len(), rejoined = rejoined.len(),
            "reconnect-all finished");
        rejoined
    }

    /// The link for a pair, if any.
    pub fn link(&self, token: &SessionToken, observer: &ObserverId) -> Option<TransportLink> {
        self.links
            .get(&(token.clone(), observer.clone()))
            .map(|l| l.clone())
    }

    /// Number of tracked links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn tokens_for(&self, observer: &ObserverId) -> Vec<SessionToken> {
        self.links
            .iter()
            .filter(|entry| &entry.key().1 == observer)
            .map(|entry| entry.key().0.clone())
            .collect()
    }

    async fn publish(&self, token: &SessionToken, message: SignalMessage) {
        if let Err(e) = self.sink.publish(token, message).await {
            warn!(token = %token, error = %e, "failed to publish transport message");
        }
    }

    fn update_gauge(&self) {
        gauge!("links_active").set(self.links.len() as f64);
    }
}
