//! Violation taxonomy.
//!
//! Violation types are a closed enum, not free-form strings: adding a kind
//! forces every exhaustive match (classifier, reporter, dashboards) to be
//! revisited at compile time. The kind→severity mapping is fixed and lives
//! here so no caller can grade a violation differently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::SessionToken;

/// How serious a violation is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational; logged and scored, no intervention expected.
    Low,
    /// Worth an observer's attention.
    Medium,
    /// Likely policy breach.
    High,
    /// Definite breach. Bypasses rate limiting.
    Critical,
}

impl Severity {
    /// Risk-score contribution of one violation at this severity.
    #[must_use]
    pub fn risk_weight(self) -> u8 {
        match self {
            Self::Low => 2,
            Self::Medium => 5,
            Self::High => 10,
            Self::Critical => 25,
        }
    }
}

/// Closed set of violation types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The assessment window left fullscreen.
    FullscreenExited,
    /// Camera activity below the policy threshold.
    CameraLevelLow,
    /// Microphone activity below the policy threshold.
    MicrophoneLevelLow,
    /// Speaker activity below the policy threshold.
    SpeakerLevelLow,
    /// No face in frame.
    NoFaceDetected,
    /// More than one face in frame.
    MultipleFacesDetected,
    /// A mobile phone in frame.
    MobilePhoneDetected,
    /// Notes or printed material in frame.
    NotesDetected,
    /// Gaze or head pose deviated from the screen.
    GazeDeviation,
    /// Attention score below threshold.
    LowAttention,
    /// Sustained suspicious behavior over the rolling window.
    SuspiciousPattern,
}

impl ViolationKind {
    /// The fixed severity for this kind.
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::FullscreenExited
            | Self::NoFaceDetected
            | Self::MultipleFacesDetected
            | Self::SuspiciousPattern => Severity::High,
            Self::CameraLevelLow | Self::MicrophoneLevelLow | Self::GazeDeviation => {
                Severity::Medium
            }
            Self::SpeakerLevelLow | Self::LowAttention => Severity::Low,
            Self::MobilePhoneDetected | Self::NotesDetected => Severity::Critical,
        }
    }

    /// Wire string for this kind (matches the serde rename).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullscreenExited => "fullscreen_exited",
            Self::CameraLevelLow => "camera_level_low",
            Self::MicrophoneLevelLow => "microphone_level_low",
            Self::SpeakerLevelLow => "speaker_level_low",
            Self::NoFaceDetected => "no_face_detected",
            Self::MultipleFacesDetected => "multiple_faces_detected",
            Self::MobilePhoneDetected => "mobile_phone_detected",
            Self::NotesDetected => "notes_detected",
            Self::GazeDeviation => "gaze_deviation",
            Self::LowAttention => "low_attention",
            Self::SuspiciousPattern => "suspicious_pattern",
        }
    }
}

/// One graded deviation from policy. Append-only; never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Session this violation belongs to.
    pub session_token: SessionToken,
    /// Violation type.
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    /// Severity, derived from the kind.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// Structured detail payload (thresholds, observed values, labels).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
    /// When the triggering check completed.
    pub timestamp: DateTime<Utc>,
}

impl Violation {
    /// Build a violation for `kind` with the fixed severity mapping applied.
    #[must_use]
    pub fn new(
        session_token: SessionToken,
        kind: ViolationKind,
        message: impl Into<String>,
        detail: Value,
    ) -> Self {
        Self {
            session_token,
            kind,
            severity: kind.severity(),
            message: message.into(),
            detail,
            timestamp: Utc::now(),
        }
    }
}
