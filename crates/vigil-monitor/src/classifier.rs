//! Violation classification.
//!
//! [`classify`] is a pure mapping from one snapshot plus policy to zero or
//! more violations. Each check contributes at most one violation per tick;
//! checks run in a fixed order (fullscreen, media levels, face, objects,
//! gaze, attention, pattern) and the output preserves that order. The only
//! state is the rolling window behind the suspicious-pattern signal, carried
//! in [`ClassifierState`] by the caller.
//!
//! Alongside violations, the outcome reports which kinds were evaluated and
//! found clean, so the caller can resolve active violations per
//! (session, kind) key. Checks skipped this tick (detection unavailable,
//! disabled by policy) appear in neither list.

use std::collections::VecDeque;

use serde_json::json;

use vigil_core::ids::SessionToken;
use vigil_core::policy::MonitoringPolicy;
use vigil_core::snapshot::{ComplianceSnapshot, DetectionReadings};
use vigil_core::violation::{Violation, ViolationKind};

/// Head rotation beyond this many degrees counts as gaze deviation.
const HEAD_DEVIATION_DEGREES: f64 = 25.0;
/// Attention score below this is a low-attention violation.
const LOW_ATTENTION_THRESHOLD: u8 = 40;
/// Attention drop across the rolling window that marks a suspicious trend.
const SUSPICIOUS_TREND_DROP: u8 = 20;
/// Default rolling window length, in ticks.
pub const DEFAULT_WINDOW_TICKS: usize = 15;

/// Object labels graded as critical restricted objects.
const PHONE_LABELS: &[&str] = &["mobile_phone", "cell_phone", "smartphone"];
const NOTES_LABELS: &[&str] = &["notes", "book", "paper", "cheat_sheet"];

/// Rolling-window state behind the suspicious-pattern signal.
pub struct ClassifierState {
    window: VecDeque<WindowEntry>,
    capacity: usize,
}

struct WindowEntry {
    looking_away: bool,
    attention: u8,
}

impl ClassifierState {
    /// State with a rolling window of `capacity` ticks.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(2),
        }
    }

    fn push(&mut self, readings: &DetectionReadings) {
        if self.window.len() == self.capacity {
            let _ = self.window.pop_front();
        }
        self.window.push_back(WindowEntry {
            looking_away: readings.looking_away,
            attention: readings.attention_score,
        });
    }

    /// Whether the full window shows a sustained suspicious pattern: looking
    /// away on at least half the ticks, or an attention trend that fell by
    /// [`SUSPICIOUS_TREND_DROP`] and ended below the low-attention threshold.
    fn is_suspicious(&self) -> bool {
        if self.window.len() < self.capacity {
            return false;
        }
        let away = self.window.iter().filter(|e| e.looking_away).count();
        if away * 2 >= self.window.len() {
            return true;
        }
        let half = self.window.len() / 2;
        let front: u32 = self.window.iter().take(half).map(|e| u32::from(e.attention)).sum();
        let back: u32 = self.window.iter().skip(half).map(|e| u32::from(e.attention)).sum();
        let front_avg = front / half as u32;
        let back_avg = back / (self.window.len() - half) as u32;
        front_avg.saturating_sub(back_avg) >= u32::from(SUSPICIOUS_TREND_DROP)
            && back_avg < u32::from(LOW_ATTENTION_THRESHOLD)
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

impl Default for ClassifierState {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_TICKS)
    }
}

/// Result of classifying one tick.
pub struct ClassifyOutcome {
    /// Violations raised this tick, in check order.
    pub violations: Vec<Violation>,
    /// Kinds evaluated this tick and found clean.
    pub resolved: Vec<ViolationKind>,
}

/// Evaluate one snapshot against the policy.
pub fn classify(
    token: &SessionToken,
    snapshot: &ComplianceSnapshot,
    policy: &MonitoringPolicy,
    state: &mut ClassifierState,
) -> ClassifyOutcome {
    let mut out = ClassifyOutcome {
        violations: Vec::new(),
        resolved: Vec::new(),
    };

    // 1. Fullscreen requirement.
    if policy.require_fullscreen {
        check(
            &mut out,
            token,
            ViolationKind::FullscreenExited,
            !snapshot.is_fullscreen,
            "assessment window left fullscreen",
            json!({"isFullscreen": snapshot.is_fullscreen}),
        );
    }

    // 2–4. Media activity thresholds.
    check(
        &mut out,
        token,
        ViolationKind::CameraLevelLow,
        snapshot.camera_level < policy.min_camera_level,
        "camera activity below required level",
        json!({"threshold": policy.min_camera_level, "observed": snapshot.camera_level}),
    );
    check(
        &mut out,
        token,
        ViolationKind::MicrophoneLevelLow,
        snapshot.microphone_level < policy.min_microphone_level,
        "microphone activity below required level",
        json!({"threshold": policy.min_microphone_level, "observed": snapshot.microphone_level}),
    );
    check(
        &mut out,
        token,
        ViolationKind::SpeakerLevelLow,
        snapshot.speaker_level < policy.min_speaker_level,
        "speaker activity below required level",
        json!({"threshold": policy.min_speaker_level, "observed": snapshot.speaker_level}),
    );

    // 5+. Detection-dependent checks, skipped entirely when the pass did not
    // run this tick.
    let Some(readings) = snapshot.detection.as_ref() else {
        return out;
    };

    if policy.enable_face_detection {
        check(
            &mut out,
            token,
            ViolationKind::NoFaceDetected,
            readings.face_count == 0,
            "no face in frame",
            json!({"faceCount": readings.face_count}),
        );
        check(
            &mut out,
            token,
            ViolationKind::MultipleFacesDetected,
            readings.face_count > 1,
            "more than one face in frame",
            json!({"faceCount": readings.face_count}),
        );
    }

    if policy.enable_object_detection {
        let phone = readings
            .objects_detected
            .iter()
            .find(|label| PHONE_LABELS.contains(&label.as_str()));
        check(
            &mut out,
            token,
            ViolationKind::MobilePhoneDetected,
            phone.is_some(),
            "mobile phone detected in frame",
            json!({"label": phone}),
        );
        let notes = readings
            .objects_detected
            .iter()
            .find(|label| NOTES_LABELS.contains(&label.as_str()));
        check(
            &mut out,
            token,
            ViolationKind::NotesDetected,
            notes.is_some(),
            "notes or printed material detected in frame",
            json!({"label": notes}),
        );
    }

    if policy.enable_face_detection {
        let deviated = readings.gaze.is_off_screen()
            || readings.head_pose.max_deviation() > HEAD_DEVIATION_DEGREES;
        check(
            &mut out,
            token,
            ViolationKind::GazeDeviation,
            deviated,
            "gaze or head pose deviated from the screen",
            json!({
                "gaze": readings.gaze,
                "headDeviationDegrees": readings.head_pose.max_deviation(),
            }),
        );
        check(
            &mut out,
            token,
            ViolationKind::LowAttention,
            readings.attention_score < LOW_ATTENTION_THRESHOLD,
            "attention score below threshold",
            json!({"threshold": LOW_ATTENTION_THRESHOLD, "observed": readings.attention_score}),
        );

        state.push(readings);
        let suspicious = state.is_suspicious();
        check(
            &mut out,
            token,
            ViolationKind::SuspiciousPattern,
            suspicious,
            "sustained suspicious behavior over the rolling window",
            json!({"windowTicks": state.capacity}),
        );
        if suspicious {
            // Start a fresh window; re-firing is governed by new evidence,
            // not the same window sliding by one tick.
            state.reset();
        }
    }

    out
}

fn check(
    out: &mut ClassifyOutcome,
    token: &SessionToken,
    kind: ViolationKind,
    failed: bool,
    message: &str,
    detail: serde_json::Value,
) {
    if failed {
        out.violations
            .push(Violation::new(token.clone(), kind, message, detail));
    } else {
        out.resolved.push(kind);
    }
}
