//! The `SignalMessage` wire enum.
//!
//! Every message that crosses the signaling channel, internally tagged on
//! `type` with the exact kebab-case strings clients rely on. Negotiation
//! payloads (`sdp`, `candidate`) stay opaque JSON — the engine routes them,
//! it does not interpret them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use vigil_core::ids::{ObserverId, SessionToken};
use vigil_core::session::{PauseReason, SessionSummary};
use vigil_core::violation::Violation;

/// A message on the signaling channel. Room = session token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SignalMessage {
    /// Observer requests the current session snapshot.
    #[serde(rename = "get-active-streams")]
    GetActiveStreams {},

    /// Snapshot response: all currently known sessions.
    #[serde(rename = "active-streams")]
    ActiveStreams {
        /// Session summaries.
        sessions: Vec<SessionSummary>,
    },

    /// A monitored client began streaming.
    #[serde(rename = "stream-started")]
    StreamStarted {
        /// Session token.
        #[serde(rename = "sessionToken")]
        session_token: SessionToken,
    },

    /// A session ended.
    #[serde(rename = "stream-ended")]
    StreamEnded {
        /// Session token.
        #[serde(rename = "sessionToken")]
        session_token: SessionToken,
    },

    /// A session lost its transport and is paused.
    #[serde(rename = "stream-paused")]
    StreamPaused {
        /// Session token.
        #[serde(rename = "sessionToken")]
        session_token: SessionToken,
        /// Why the stream paused.
        reason: PauseReason,
        /// When the disconnect was detected.
        #[serde(rename = "disconnectedAt")]
        disconnected_at: DateTime<Utc>,
    },

    /// A paused session renegotiated and resumed.
    #[serde(rename = "stream-resumed")]
    StreamResumed {
        /// Session token.
        #[serde(rename = "sessionToken")]
        session_token: SessionToken,
        /// When the reconnect completed.
        #[serde(rename = "resumedAt")]
        resumed_at: DateTime<Utc>,
    },

    /// Transport negotiation offer.
    #[serde(rename = "negotiation-offer")]
    NegotiationOffer {
        /// Session token.
        #[serde(rename = "sessionToken")]
        session_token: SessionToken,
        /// The observer this offer is for.
        #[serde(rename = "observerId")]
        observer_id: ObserverId,
        /// Protocol-specific offer body.
        sdp: Value,
    },

    /// Transport negotiation answer.
    #[serde(rename = "negotiation-answer")]
    NegotiationAnswer {
        /// Session token.
        #[serde(rename = "sessionToken")]
        session_token: SessionToken,
        /// The observer this answer belongs to.
        #[serde(rename = "observerId")]
        observer_id: ObserverId,
        /// Protocol-specific answer body.
        sdp: Value,
    },

    /// Transport candidate exchange.
    #[serde(rename = "negotiation-candidate")]
    NegotiationCandidate {
        /// Session token.
        #[serde(rename = "sessionToken")]
        session_token: SessionToken,
        /// The observer this candidate belongs to.
        #[serde(rename = "observerId")]
        observer_id: ObserverId,
        /// Protocol-specific candidate body.
        candidate: Value,
    },

    /// Monitored client is ready to receive a negotiation offer.
    #[serde(rename = "monitored-ready")]
    MonitoredReady {
        /// Session token.
        #[serde(rename = "sessionToken")]
        session_token: SessionToken,
    },

    /// Real-time violation broadcast.
    #[serde(rename = "proctoring-violation")]
    ProctoringViolation {
        /// The full violation record.
        violation: Violation,
    },

    /// Observer-initiated forced termination.
    #[serde(rename = "quiz-terminated")]
    QuizTerminated {
        /// Session token.
        #[serde(rename = "sessionToken")]
        session_token: SessionToken,
        /// Why the observer terminated the attempt.
        reason: String,
    },
}

impl SignalMessage {
    /// The wire `type` string for this message.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetActiveStreams {} => "get-active-streams",
            Self::ActiveStreams { .. } => "active-streams",
            Self::StreamStarted { .. } => "stream-started",
            Self::StreamEnded { .. } => "stream-ended",
            Self::StreamPaused { .. } => "stream-paused",
            Self::StreamResumed { .. } => "stream-resumed",
            Self::NegotiationOffer { .. } => "negotiation-offer",
            Self::NegotiationAnswer { .. } => "negotiation-answer",
            Self::NegotiationCandidate { .. } => "negotiation-candidate",
            Self::MonitoredReady { .. } => "monitored-ready",
            Self::ProctoringViolation { .. } => "proctoring-violation",
            Self::QuizTerminated { .. } => "quiz-terminated",
        }
    }

    /// The session token the message is scoped to, when it carries one.
    #[must_use]
    pub fn session_token(&self) -> Option<&SessionToken> {
        match self {
            Self::StreamStarted { session_token }
            | Self::StreamEnded { session_token }
            | Self::StreamPaused { session_token, .. }
            | Self::StreamResumed { session_token, .. }
            | Self::NegotiationOffer { session_token, .. }
            | Self::NegotiationAnswer { session_token, .. }
            | Self::NegotiationCandidate { session_token, .. }
            | Self::MonitoredReady { session_token }
            | Self::QuizTerminated { session_token, .. } => Some(session_token),
            Self::ProctoringViolation { violation } => Some(&violation.session_token),
            Self::GetActiveStreams {} | Self::ActiveStreams { .. } => None,
        }
    }
}
