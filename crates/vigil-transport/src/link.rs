//! Transport link model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vigil_core::ids::{ObserverId, SessionToken};

/// Negotiation state of one (session, observer) link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Created, no offer sent yet.
    New,
    /// Initial offer sent, awaiting the answer.
    Offering,
    /// Negotiation complete, media flowing.
    Connected,
    /// Fresh offer sent on an established link.
    Renegotiating,
    /// Torn down. Terminal; a new link replaces it.
    Closed,
}

impl LinkState {
    /// Whether remote answers/candidates are accepted in this state.
    /// Candidates can trickle in after the link connects.
    #[must_use]
    pub fn accepts_remote(self) -> bool {
        matches!(self, Self::Offering | Self::Renegotiating | Self::Connected)
    }

    /// Whether the link is terminally closed.
    #[must_use]
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

/// One observer's media link to one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportLink {
    /// The monitored session.
    pub session_token: SessionToken,
    /// The watching observer.
    pub observer_id: ObserverId,
    /// Current negotiation state.
    pub state: LinkState,
    /// When the most recent offer was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_offer_at: Option<DateTime<Utc>>,
    /// Inbound candidate video track attached.
    pub inbound_video: bool,
    /// Inbound candidate audio track attached.
    pub inbound_audio: bool,
    /// Optional outbound observer audio track attached.
    pub outbound_audio: bool,
}

impl TransportLink {
    /// A fresh link in `New`, no tracks attached.
    #[must_use]
    pub fn new(session_token: SessionToken, observer_id: ObserverId) -> Self {
        Self {
            session_token,
            observer_id,
            state: LinkState::New,
            last_offer_at: None,
            inbound_video: false,
            inbound_audio: false,
            outbound_audio: false,
        }
    }
}
