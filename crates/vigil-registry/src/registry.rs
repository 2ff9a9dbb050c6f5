//! The session registry.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use metrics::gauge;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use vigil_core::ids::{AssessmentId, CandidateId, SessionToken};
use vigil_core::session::{PauseReason, ProctoringSession, SessionStatus, SessionSummary};
use vigil_core::snapshot::ComplianceSnapshot;
use vigil_core::violation::{Violation, ViolationKind};

/// Registry failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The token is not in the registry.
    #[error("unknown session {0}")]
    UnknownSession(SessionToken),
    /// The requested status change is not a legal state-machine edge.
    #[error("illegal transition {from:?} -> {to:?} for session {token}")]
    IllegalTransition {
        /// Session token.
        token: SessionToken,
        /// Current status.
        from: SessionStatus,
        /// Requested status.
        to: SessionStatus,
    },
}

/// Authoritative in-memory session map.
///
/// All mutation happens under one write lock, so a reader never observes a
/// partially-merged record and concurrent lifecycle events for the same
/// token are serialized.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionToken, ProctoringSession>>,
    /// Unresolved violation kinds per session. Resolution is per
    /// (token, kind) key: a clean tick for one kind clears only that kind.
    active_violations: Mutex<HashMap<SessionToken, BTreeSet<ViolationKind>>>,
    /// In-memory recent-violation retention per session.
    retention: usize,
}

impl SessionRegistry {
    /// Create a registry retaining `retention` recent violations per session.
    pub fn new(retention: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            active_violations: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Register a new session in `Setup`. Returns the created record.
    ///
    /// A token maps to exactly one session for its lifetime: re-opening an
    /// existing token returns the existing record untouched.
    pub fn open(
        &self,
        token: SessionToken,
        candidate_id: CandidateId,
        assessment_id: AssessmentId,
    ) -> ProctoringSession {
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(token.clone())
            .or_insert_with(|| ProctoringSession::new(token, candidate_id, assessment_id))
            .clone();
        Self::update_gauge(&sessions);
        session
    }

    /// Get a session by token.
    pub fn get(&self, token: &SessionToken) -> Option<ProctoringSession> {
        self.sessions.read().get(token).cloned()
    }

    /// Merge a REST-fetched summary list into the registry.
    ///
    /// Field-level merge, atomic per token: identity fields (candidate,
    /// assessment, start time) come from the snapshot; counters take the
    /// larger of local and incoming (local bookkeeping may be ahead of the
    /// record service); enrichment fields the snapshot does not carry
    /// (attached media, connection state, recent violations, pause
    /// timestamps) are preserved. Status is only nudged forward
    /// (`Setup → Live` when the snapshot says the stream is up) — never
    /// regressed.
    pub fn upsert_from_snapshot(&self, summaries: Vec<SessionSummary>) {
        let mut sessions = self.sessions.write();
        for summary in summaries {
            match sessions.get_mut(&summary.token) {
                Some(existing) => {
                    existing.candidate_id = summary.candidate_id;
                    existing.assessment_id = summary.assessment_id;
                    existing.started_at = summary.started_at;
                    existing.violation_count = existing.violation_count.max(summary.violation_count);
                    existing.risk_score = existing.risk_score.max(summary.risk_score);
                    if summary.is_live && existing.status == SessionStatus::Setup {
                        existing.status = SessionStatus::Live;
                    }
                }
                None => {
                    let mut session = ProctoringSession::new(
                        summary.token.clone(),
                        summary.candidate_id,
                        summary.assessment_id,
                    );
                    session.started_at = summary.started_at;
                    session.violation_count = summary.violation_count;
                    session.risk_score = summary.risk_score;
                    if summary.is_live {
                        session.status = SessionStatus::Live;
                    }
                    let _ = sessions.insert(summary.token, session);
                }
            }
        }
        Self::update_gauge(&sessions);
    }

    /// Request `Live`. `Setup → Live` on first negotiation, `Paused → Live`
    /// on reconnect (records the reconnect timestamp). Returns whether the
    /// status changed; repeating the current state is an idempotent no-op.
    pub fn mark_live(&self, token: &SessionToken) -> Result<bool, RegistryError> {
        self.transition(token, SessionStatus::Live, |session| {
            if session.status == SessionStatus::Paused {
                session.reconnected_at = Some(Utc::now());
            }
        })
    }

    /// Request `Paused` with a connectivity reason. This is a connectivity
    /// signal, not a policy violation — no violation is recorded here.
    pub fn mark_paused(
        &self,
        token: &SessionToken,
        reason: &PauseReason,
        at: DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        let changed = self.transition(token, SessionStatus::Paused, |session| {
            session.disconnected_at = Some(at);
        })?;
        if changed {
            info!(token = %token, ?reason, "session paused");
        }
        Ok(changed)
    }

    /// Request the terminal `Ended` state. Legal from any non-`Ended` state.
    pub fn mark_ended(&self, token: &SessionToken) -> Result<bool, RegistryError> {
        let changed = self.transition(token, SessionStatus::Ended, |_| {})?;
        if changed {
            let _ = self.active_violations.lock().remove(token);
        }
        Ok(changed)
    }

    fn transition(
        &self,
        token: &SessionToken,
        to: SessionStatus,
        on_change: impl FnOnce(&mut ProctoringSession),
    ) -> Result<bool, RegistryError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(token)
            .ok_or_else(|| RegistryError::UnknownSession(token.clone()))?;
        if session.status == to {
            return Ok(false);
        }
        if !session.status.can_transition_to(to) {
            return Err(RegistryError::IllegalTransition {
                token: token.clone(),
                from: session.status,
                to,
            });
        }
        let from = session.status;
        session.status = to;
        on_change(session);
        debug!(token = %token, ?from, ?to, "session transition");
        Self::update_gauge(&sessions);
        Ok(true)
    }

    /// Pause every non-terminal live session, e.g. when the signaling channel
    /// itself is lost past the grace period. Never escalates to `Ended`.
    /// Returns the tokens that were paused.
    pub fn pause_all(&self, reason: &PauseReason, at: DateTime<Utc>) -> Vec<SessionToken> {
        let tokens: Vec<SessionToken> = {
            let sessions = self.sessions.read();
            sessions
                .values()
                .filter(|s| s.status == SessionStatus::Live)
                .map(|s| s.token.clone())
                .collect()
        };
        let mut paused = Vec::new();
        for token in tokens {
            match self.mark_paused(&token, reason, at) {
                Ok(true) => paused.push(token),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "pause_all skipped session"),
            }
        }
        paused
    }

    /// Sessions, optionally filtered by assessment. The returned vector is a
    /// consistent snapshot; iterate (and re-iterate) it freely.
    pub fn list(&self, filter: Option<&AssessmentId>) -> Vec<ProctoringSession> {
        let sessions = self.sessions.read();
        sessions
            .values()
            .filter(|s| filter.is_none_or(|a| &s.assessment_id == a))
            .cloned()
            .collect()
    }

    /// Summaries of all non-ended sessions, for `active-streams` responses.
    pub fn active_summaries(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read();
        sessions
            .values()
            .filter(|s| s.status != SessionStatus::Ended)
            .map(SessionSummary::from)
            .collect()
    }

    /// Record a violation against its session: bump the count, raise the
    /// risk score by the severity weight, push into the bounded recent ring,
    /// and mark the (token, kind) key active.
    pub fn record_violation(&self, violation: &Violation) -> Result<(), RegistryError> {
        {
            let mut sessions = self.sessions.write();
            let session = sessions
                .get_mut(&violation.session_token)
                .ok_or_else(|| RegistryError::UnknownSession(violation.session_token.clone()))?;
            session.violation_count += 1;
            session.raise_risk(violation.severity.risk_weight());
            session.recent_violations.push(violation.clone());
            if session.recent_violations.len() > self.retention {
                let excess = session.recent_violations.len() - self.retention;
                let _ = session.recent_violations.drain(..excess);
            }
        }
        let _ = self
            .active_violations
            .lock()
            .entry(violation.session_token.clone())
            .or_default()
            .insert(violation.kind);
        Ok(())
    }

    /// Clear one active violation key after a clean tick for that kind.
    pub fn resolve_violation(&self, token: &SessionToken, kind: ViolationKind) {
        let mut active = self.active_violations.lock();
        if let Some(kinds) = active.get_mut(token) {
            if kinds.remove(&kind) {
                debug!(token = %token, kind = kind.as_str(), "violation resolved");
            }
            if kinds.is_empty() {
                let _ = active.remove(token);
            }
        }
    }

    /// The currently unresolved violation kinds for a session.
    pub fn active_kinds(&self, token: &SessionToken) -> BTreeSet<ViolationKind> {
        self.active_violations
            .lock()
            .get(token)
            .cloned()
            .unwrap_or_default()
    }

    /// Enrichment: flag whether an inbound media track is attached.
    pub fn set_media_attached(&self, token: &SessionToken, attached: bool) {
        if let Some(session) = self.sessions.write().get_mut(token) {
            session.media_attached = Some(attached);
        }
    }

    /// Enrichment: record the last known transport connection state label.
    pub fn set_connection_state(&self, token: &SessionToken, state: impl Into<String>) {
        if let Some(session) = self.sessions.write().get_mut(token) {
            session.connection_state = Some(state.into());
        }
    }

    /// Enrichment: merge the latest compliance snapshot into the session's
    /// live status for observer display.
    pub fn set_live_status(&self, token: &SessionToken, snapshot: ComplianceSnapshot) {
        if let Some(session) = self.sessions.write().get_mut(token) {
            session.live_status = Some(snapshot);
        }
    }

    /// Number of sessions currently tracked (any status).
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn update_gauge(sessions: &HashMap<SessionToken, ProctoringSession>) {
        let live = sessions
            .values()
            .filter(|s| s.status == SessionStatus::Live)
            .count();
        gauge!("sessions_active").set(live as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(50)
    }

    fn token(raw: &str) -> SessionToken {
        SessionToken::new(raw)
    }

    fn open(reg: &SessionRegistry, raw: &str) -> SessionToken {
        let t = token(raw);
        let _ = reg.open(
            t.clone(),
            CandidateId::new("cand-1"),
            AssessmentId::new("assess-1"),
        );
        t
    }

    fn summary(raw: &str, live: bool) -> SessionSummary {
        SessionSummary {
            token: token(raw),
            candidate_id: CandidateId::new("cand-1"),
            assessment_id: AssessmentId::new("assess-1"),
            started_at: Utc::now(),
            risk_score: 0,
            violation_count: 0,
            is_live: live,
        }
    }

    fn violation(raw: &str, kind: ViolationKind) -> Violation {
        Violation::new(token(raw), kind, "test", json!({}))
    }

    // --- Lifecycle ---

    #[test]
    fn open_is_idempotent_per_token() {
        let reg = registry();
        let t = open(&reg, "tok-1");
        assert!(reg.mark_live(&t).unwrap());
        // Re-opening must not reset the existing record.
        let again = reg.open(
            t.clone(),
            CandidateId::new("other"),
            AssessmentId::new("other"),
        );
        assert_eq!(again.status, SessionStatus::Live);
        assert_eq!(again.candidate_id, CandidateId::new("cand-1"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn setup_to_live_to_paused_to_live() {
        let reg = registry();
        let t = open(&reg, "tok-1");
        assert!(reg.mark_live(&t).unwrap());
        assert!(
            reg.mark_paused(&t, &PauseReason::TransportLost, Utc::now())
                .unwrap()
        );
        assert!(reg.mark_live(&t).unwrap());

        let session = reg.get(&t).unwrap();
        assert_eq!(session.status, SessionStatus::Live);
        assert!(session.disconnected_at.is_some());
        assert!(session.reconnected_at.is_some());
    }

    #[test]
    fn repeated_mark_is_noop() {
        let reg = registry();
        let t = open(&reg, "tok-1");
        assert!(reg.mark_live(&t).unwrap());
        assert!(!reg.mark_live(&t).unwrap());
        assert!(reg.mark_ended(&t).unwrap());
        assert!(!reg.mark_ended(&t).unwrap());
    }

    #[test]
    fn setup_cannot_pause() {
        let reg = registry();
        let t = open(&reg, "tok-1");
        let err = reg
            .mark_paused(&t, &PauseReason::TransportLost, Utc::now())
            .unwrap_err();
        assert_matches!(
            err,
            RegistryError::IllegalTransition {
                from: SessionStatus::Setup,
                to: SessionStatus::Paused,
                ..
            }
        );
    }

    #[test]
    fn nothing_leaves_ended() {
        let reg = registry();
        let t = open(&reg, "tok-1");
        assert!(reg.mark_ended(&t).unwrap());
        assert_matches!(
            reg.mark_live(&t),
            Err(RegistryError::IllegalTransition { .. })
        );
        assert_matches!(
            reg.mark_paused(&t, &PauseReason::TransportLost, Utc::now()),
            Err(RegistryError::IllegalTransition { .. })
        );
    }

    #[test]
    fn unknown_session_rejected() {
        let reg = registry();
        assert_matches!(
            reg.mark_live(&token("ghost")),
            Err(RegistryError::UnknownSession(_))
        );
    }

    #[test]
    fn ended_from_any_state() {
        let reg = registry();
        let setup = open(&reg, "tok-setup");
        let live = open(&reg, "tok-live");
        let paused = open(&reg, "tok-paused");
        let _ = reg.mark_live(&live).unwrap();
        let _ = reg.mark_live(&paused).unwrap();
        let _ = reg
            .mark_paused(&paused, &PauseReason::TransportLost, Utc::now())
            .unwrap();

        for t in [&setup, &live, &paused] {
            assert!(reg.mark_ended(t).unwrap());
            assert_eq!(reg.get(t).unwrap().status, SessionStatus::Ended);
        }
    }

    // --- Snapshot merge ---

    #[test]
    fn upsert_creates_unknown_sessions() {
        let reg = registry();
        reg.upsert_from_snapshot(vec![summary("tok-1", true), summary("tok-2", false)]);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(&token("tok-1")).unwrap().status, SessionStatus::Live);
        assert_eq!(
            reg.get(&token("tok-2")).unwrap().status,
            SessionStatus::Setup
        );
    }

    #[test]
    fn upsert_preserves_enrichment_fields() {
        let reg = registry();
        let t = open(&reg, "tok-1");
        let _ = reg.mark_live(&t).unwrap();
        reg.set_media_attached(&t, true);
        reg.set_connection_state(&t, "connected");
        reg.set_live_status(&t, ComplianceSnapshot::compliant());

        // Snapshot has no enrichment fields at all.
        reg.upsert_from_snapshot(vec![summary("tok-1", true)]);

        let session = reg.get(&t).unwrap();
        assert_eq!(session.media_attached, Some(true));
        assert_eq!(session.connection_state.as_deref(), Some("connected"));
        assert!(session.live_status.is_some());
    }

    #[test]
    fn upsert_never_regresses_status() {
        let reg = registry();
        let t = open(&reg, "tok-1");
        let _ = reg.mark_live(&t).unwrap();
        let _ = reg
            .mark_paused(&t, &PauseReason::TransportLost, Utc::now())
            .unwrap();

        // The record service still thinks the stream is live; the registry
        // knows better and keeps Paused.
        reg.upsert_from_snapshot(vec![summary("tok-1", true)]);
        assert_eq!(reg.get(&t).unwrap().status, SessionStatus::Paused);
    }

    #[test]
    fn upsert_keeps_larger_counters() {
        let reg = registry();
        let t = open(&reg, "tok-1");
        reg.record_violation(&violation("tok-1", ViolationKind::FullscreenExited))
            .unwrap();
        assert_eq!(reg.get(&t).unwrap().violation_count, 1);

        // Stale snapshot with zero violations must not roll the count back.
        reg.upsert_from_snapshot(vec![summary("tok-1", false)]);
        assert_eq!(reg.get(&t).unwrap().violation_count, 1);
    }

    #[test]
    fn upsert_takes_incoming_identity_fields() {
        let reg = registry();
        let _ = open(&reg, "tok-1");
        let mut incoming = summary("tok-1", false);
        incoming.candidate_id = CandidateId::new("cand-2");
        incoming.assessment_id = AssessmentId::new("assess-2");
        reg.upsert_from_snapshot(vec![incoming]);

        let session = reg.get(&token("tok-1")).unwrap();
        assert_eq!(session.candidate_id, CandidateId::new("cand-2"));
        assert_eq!(session.assessment_id, AssessmentId::new("assess-2"));
    }

    // --- Listing ---

    #[test]
    fn list_filters_by_assessment() {
        let reg = registry();
        let _ = reg.open(
            token("tok-1"),
            CandidateId::new("c1"),
            AssessmentId::new("assess-a"),
        );
        let _ = reg.open(
            token("tok-2"),
            CandidateId::new("c2"),
            AssessmentId::new("assess-b"),
        );

        assert_eq!(reg.list(None).len(), 2);
        let filtered = reg.list(Some(&AssessmentId::new("assess-a")));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].token.as_str(), "tok-1");
    }

    #[test]
    fn active_summaries_exclude_ended() {
        let reg = registry();
        let alive = open(&reg, "tok-1");
        let dead = open(&reg, "tok-2");
        let _ = reg.mark_live(&alive).unwrap();
        let _ = reg.mark_ended(&dead).unwrap();

        let summaries = reg.active_summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].token, alive);
        assert!(summaries[0].is_live);
    }

    // --- Violation bookkeeping ---

    #[test]
    fn record_violation_updates_count_risk_and_ring() {
        let reg = registry();
        let t = open(&reg, "tok-1");
        reg.record_violation(&violation("tok-1", ViolationKind::MobilePhoneDetected))
            .unwrap();

        let session = reg.get(&t).unwrap();
        assert_eq!(session.violation_count, 1);
        assert_eq!(session.risk_score, 25);
        assert_eq!(session.recent_violations.len(), 1);
        assert!(
            reg.active_kinds(&t)
                .contains(&ViolationKind::MobilePhoneDetected)
        );
    }

    #[test]
    fn recent_ring_is_bounded() {
        let reg = SessionRegistry::new(3);
        let t = open(&reg, "tok-1");
        for _ in 0..5 {
            reg.record_violation(&violation("tok-1", ViolationKind::LowAttention))
                .unwrap();
        }
        let session = reg.get(&t).unwrap();
        assert_eq!(session.recent_violations.len(), 3);
        assert_eq!(session.violation_count, 5);
    }

    #[test]
    fn resolve_clears_single_kind_only() {
        let reg = registry();
        let t = open(&reg, "tok-1");
        reg.record_violation(&violation("tok-1", ViolationKind::FullscreenExited))
            .unwrap();
        reg.record_violation(&violation("tok-1", ViolationKind::GazeDeviation))
            .unwrap();

        reg.resolve_violation(&t, ViolationKind::FullscreenExited);

        let active = reg.active_kinds(&t);
        assert!(!active.contains(&ViolationKind::FullscreenExited));
        assert!(active.contains(&ViolationKind::GazeDeviation));
    }

    #[test]
    fn ending_session_clears_active_keys() {
        let reg = registry();
        let t = open(&reg, "tok-1");
        reg.record_violation(&violation("tok-1", ViolationKind::FullscreenExited))
            .unwrap();
        let _ = reg.mark_ended(&t).unwrap();
        assert!(reg.active_kinds(&t).is_empty());
    }

    #[test]
    fn record_violation_for_unknown_session_errors() {
        let reg = registry();
        assert_matches!(
            reg.record_violation(&violation("ghost", ViolationKind::LowAttention)),
            Err(RegistryError::UnknownSession(_))
        );
    }

    // --- Bulk pause ---

    #[test]
    fn pause_all_pauses_only_live_sessions() {
        let reg = registry();
        let live = open(&reg, "tok-live");
        let setup = open(&reg, "tok-setup");
        let ended = open(&reg, "tok-ended");
        let _ = reg.mark_live(&live).unwrap();
        let _ = reg.mark_ended(&ended).unwrap();

        let paused = reg.pause_all(&PauseReason::SignalingLost, Utc::now());
        assert_eq!(paused, vec![live.clone()]);
        assert_eq!(reg.get(&live).unwrap().status, SessionStatus::Paused);
        assert_eq!(reg.get(&setup).unwrap().status, SessionStatus::Setup);
        assert_eq!(reg.get(&ended).unwrap().status, SessionStatus::Ended);
    }
}
