//! Proctoring session model and lifecycle state machine.
//!
//! A [`ProctoringSession`] is created when a monitored client begins an
//! assessment and archived when the attempt ends. Status only moves through
//! the transitions [`SessionStatus::can_transition_to`] permits:
//!
//! ```text
//! Setup ──▶ Live ◀──▶ Paused
//!   │         │          │
//!   └─────────┴──────────┴──▶ Ended (terminal)
//! ```
//!
//! `Setup → Paused` is not a legal edge: a session that never negotiated
//! media has nothing to lose a connection on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AssessmentId, CandidateId, SessionToken};
use crate::snapshot::ComplianceSnapshot;
use crate::violation::Violation;

/// Lifecycle status of a proctoring session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, media not yet negotiated.
    Setup,
    /// Media flowing, monitoring active.
    Live,
    /// Transport lost; awaiting reconnection.
    Paused,
    /// Terminal. Submission completed or forcibly terminated.
    Ended,
}

impl SessionStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Repeating the current state is not a transition; callers treat it as
    /// an idempotent no-op before consulting this.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Setup, Self::Live)
            | (Self::Live, Self::Paused)
            | (Self::Paused, Self::Live) => true,
            (from, Self::Ended) => from != Self::Ended,
            _ => false,
        }
    }

    /// Whether this is the terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Ended
    }
}

/// Why a session was paused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// The monitored client's transport link dropped.
    TransportLost,
    /// The signaling channel itself was lost past the grace period.
    SignalingLost,
}

/// One monitored assessment attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProctoringSession {
    /// Opaque session token (unique, immutable).
    pub token: SessionToken,
    /// The monitored party.
    pub candidate_id: CandidateId,
    /// The assessment being taken.
    pub assessment_id: AssessmentId,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Last detected disconnect, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<DateTime<Utc>>,
    /// Last successful reconnect, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnected_at: Option<DateTime<Utc>>,
    /// Cumulative violation count for the attempt.
    pub violation_count: u64,
    /// Running risk score, 0–100.
    pub risk_score: u8,
    /// Most recent violations, bounded by the configured retention window.
    #[serde(default)]
    pub recent_violations: Vec<Violation>,
    /// Enrichment: whether an inbound media track is currently attached.
    /// Not part of record-service snapshots; preserved across merges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_attached: Option<bool>,
    /// Enrichment: last known transport connection state label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_state: Option<String>,
    /// Enrichment: the latest compliance snapshot, for observer display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_status: Option<ComplianceSnapshot>,
}

impl ProctoringSession {
    /// Create a new session in `Setup`.
    #[must_use]
    pub fn new(token: SessionToken, candidate_id: CandidateId, assessment_id: AssessmentId) -> Self {
        Self {
            token,
            candidate_id,
            assessment_id,
            started_at: Utc::now(),
            status: SessionStatus::Setup,
            disconnected_at: None,
            reconnected_at: None,
            violation_count: 0,
            risk_score: 0,
            recent_violations: Vec::new(),
            media_attached: None,
            connection_state: None,
            live_status: None,
        }
    }

    /// Bump the risk score, saturating at 100.
    pub fn raise_risk(&mut self, amount: u8) {
        self.risk_score = self.risk_score.saturating_add(amount).min(100);
    }
}

/// Lightweight session summary served by `GET /active-sessions`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session token.
    pub token: SessionToken,
    /// The monitored party.
    pub candidate_id: CandidateId,
    /// The assessment being taken.
    pub assessment_id: AssessmentId,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// Running risk score, 0–100.
    pub risk_score: u8,
    /// Cumulative violation count.
    pub violation_count: u64,
    /// Whether the session is currently live.
    pub is_live: bool,
}

impl From<&ProctoringSession> for SessionSummary {
    fn from(session: &ProctoringSession) -> Self {
        Self {
            token: session.token.clone(),
            candidate_id: session.candidate_id.clone(),
            assessment_id: session.assessment_id.clone(),
            started_at: session.started_at,
            risk_score: session.risk_score,
            violation_count: session.violation_count,
            is_live: session.status == SessionStatus::Live,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ProctoringSession {
        ProctoringSession::new(
            SessionToken::new("tok-1"),
            CandidateId::new("cand-1"),
            AssessmentId::new("assess-1"),
        )
    }

    #[test]
    fn legal_transitions() {
        assert!(SessionStatus::Setup.can_transition_to(SessionStatus::Live));
        assert!(SessionStatus::Live.can_transition_to(SessionStatus::Paused));
        assert!(SessionStatus::Paused.can_transition_to(SessionStatus::Live));
        assert!(SessionStatus::Setup.can_transition_to(SessionStatus::Ended));
        assert!(SessionStatus::Live.can_transition_to(SessionStatus::Ended));
        assert!(SessionStatus::Paused.can_transition_to(SessionStatus::Ended));
    }

    #[test]
    fn setup_cannot_skip_to_paused() {
        assert!(!SessionStatus::Setup.can_transition_to(SessionStatus::Paused));
    }

    #[test]
    fn nothing_leaves_ended() {
        for next in [
            SessionStatus::Setup,
            SessionStatus::Live,
            SessionStatus::Paused,
            SessionStatus::Ended,
        ] {
            assert!(!SessionStatus::Ended.can_transition_to(next));
        }
    }

    #[test]
    fn paused_cannot_return_to_setup() {
        assert!(!SessionStatus::Paused.can_transition_to(SessionStatus::Setup));
        assert!(!SessionStatus::Live.can_transition_to(SessionStatus::Setup));
    }

    #[test]
    fn new_session_starts_in_setup() {
        let s = session();
        assert_eq!(s.status, SessionStatus::Setup);
        assert_eq!(s.violation_count, 0);
        assert_eq!(s.risk_score, 0);
        assert!(s.recent_violations.is_empty());
    }

    #[test]
    fn raise_risk_saturates() {
        let mut s = session();
        s.raise_risk(60);
        assert_eq!(s.risk_score, 60);
        s.raise_risk(60);
        assert_eq!(s.risk_score, 100);
        s.raise_risk(10);
        assert_eq!(s.risk_score, 100);
    }

    #[test]
    fn summary_reflects_live_flag() {
        let mut s = session();
        assert!(!SessionSummary::from(&s).is_live);
        s.status = SessionStatus::Live;
        assert!(SessionSummary::from(&s).is_live);
    }

    #[test]
    fn status_wire_format_is_snake_case() {
        let json = serde_json::to_value(SessionStatus::Paused).unwrap();
        assert_eq!(json, "paused");
    }

    #[test]
    fn enrichment_fields_omitted_when_absent() {
        let s = session();
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("mediaAttached").is_none());
        assert!(json.get("connectionState").is_none());
    }
}
