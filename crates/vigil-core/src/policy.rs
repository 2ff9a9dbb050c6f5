//! Monitoring policy: the configured thresholds and enablement flags a
//! session is monitored against. Supplied once per assessment, read-only for
//! the session's lifetime.

use serde::{Deserialize, Serialize};

/// Compliance policy for one assessment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringPolicy {
    /// Whether leaving fullscreen is a violation.
    pub require_fullscreen: bool,
    /// Minimum acceptable camera activity level (0–100).
    pub min_camera_level: u8,
    /// Minimum acceptable microphone activity level (0–100).
    pub min_microphone_level: u8,
    /// Minimum acceptable speaker activity level (0–100).
    pub min_speaker_level: u8,
    /// Whether the face detection pass runs.
    pub enable_face_detection: bool,
    /// Whether the restricted-object detection pass runs.
    pub enable_object_detection: bool,
    /// Face detection sensitivity (0.0–1.0).
    pub face_detection_sensitivity: f64,
    /// Object detection sensitivity (0.0–1.0).
    pub object_detection_sensitivity: f64,
}

impl Default for MonitoringPolicy {
    fn default() -> Self {
        Self {
            require_fullscreen: true,
            min_camera_level: 20,
            min_microphone_level: 10,
            min_speaker_level: 0,
            enable_face_detection: true,
            enable_object_detection: true,
            face_detection_sensitivity: 0.7,
            object_detection_sensitivity: 0.6,
        }
    }
}

impl MonitoringPolicy {
    /// Whether any detection-capability pass is enabled.
    #[must_use]
    pub fn detection_enabled(&self) -> bool {
        self.enable_face_detection || self.enable_object_detection
    }
}
