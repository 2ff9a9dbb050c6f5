//! Compliance snapshots — one tick's read of the monitored environment.
//!
//! A [`ComplianceSnapshot`] is produced every sampling tick and never
//! persisted; it exists only to derive violations and to refresh the live
//! status observers see. The detection half of the snapshot is optional:
//! `detection: None` means the face/object/gaze pass was disabled or failed
//! this tick, and detection-dependent checks are skipped.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the monitored party is looking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GazeDirection {
    /// Facing the screen.
    Center,
    /// Looking left of the screen.
    Left,
    /// Looking right of the screen.
    Right,
    /// Looking above the screen.
    Up,
    /// Looking below the screen.
    Down,
    /// Face turned away entirely.
    Away,
}

impl GazeDirection {
    /// Whether this direction counts as off-screen.
    #[must_use]
    pub fn is_off_screen(self) -> bool {
        self != Self::Center
    }
}

/// Head pose in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadPose {
    /// Rotation around the vertical axis.
    pub yaw: f64,
    /// Rotation around the side-to-side axis.
    pub pitch: f64,
    /// Rotation around the front-to-back axis.
    pub roll: f64,
}

impl HeadPose {
    /// Neutral, screen-facing pose.
    #[must_use]
    pub fn neutral() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
        }
    }

    /// Largest absolute rotation across the three axes.
    #[must_use]
    pub fn max_deviation(&self) -> f64 {
        self.yaw.abs().max(self.pitch.abs()).max(self.roll.abs())
    }
}

/// Output of the model-backed detection pass for one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReadings {
    /// Number of faces in frame.
    pub face_count: u32,
    /// Labels of detected restricted objects (e.g. `mobile_phone`, `notes`).
    #[serde(default)]
    pub objects_detected: BTreeSet<String>,
    /// Gaze direction.
    pub gaze: GazeDirection,
    /// Head pose in degrees.
    pub head_pose: HeadPose,
    /// Whether the party is currently looking away.
    pub looking_away: bool,
    /// How long the current look-away has lasted, milliseconds.
    pub looking_away_ms: u64,
    /// Attention score, 0–100.
    pub attention_score: u8,
}

impl DetectionReadings {
    /// Readings for an attentive, single-face, empty-desk frame.
    #[must_use]
    pub fn attentive() -> Self {
        Self {
            face_count: 1,
            objects_detected: BTreeSet::new(),
            gaze: GazeDirection::Center,
            head_pose: HeadPose::neutral(),
            looking_away: false,
            looking_away_ms: 0,
            attention_score: 100,
        }
    }
}

/// A point-in-time read of every monitored signal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceSnapshot {
    /// Whether the assessment window is fullscreen.
    pub is_fullscreen: bool,
    /// Camera activity level, 0–100.
    pub camera_level: u8,
    /// Microphone activity level, 0–100.
    pub microphone_level: u8,
    /// Speaker activity level, 0–100.
    pub speaker_level: u8,
    /// Detection pass output; `None` when disabled or failed this tick.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionReadings>,
    /// When the snapshot was taken.
    pub sampled_at: DateTime<Utc>,
}

impl ComplianceSnapshot {
    /// A fully compliant snapshot, useful as a test baseline.
    #[must_use]
    pub fn compliant() -> Self {
        Self {
            is_fullscreen: true,
            camera_level: 80,
            microphone_level: 50,
            speaker_level: 40,
            detection: Some(DetectionReadings::attentive()),
            sampled_at: Utc::now(),
        }
    }
}
