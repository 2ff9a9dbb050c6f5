//! Repeat-violation suppression.
//!
//! A condition that persists across ticks (camera stays covered) would
//! otherwise emit an identical violation every two seconds. The limiter
//! admits the first occurrence of each kind, then suppresses repeats until
//! the window elapses. Critical violations always pass.
//!
//! Suppression never reaches the live status feed; only the violation
//! stream is limited.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use vigil_core::violation::{Severity, Violation, ViolationKind};

/// Per-session suppression window over violation kinds.
pub struct RateLimiter {
    window: Duration,
    last_emitted: HashMap<ViolationKind, Instant>,
}

impl RateLimiter {
    /// Limiter suppressing repeats of a kind within `window`.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emitted: HashMap::new(),
        }
    }

    /// Whether `violation` should be emitted now. Admitting records the
    /// emission time; suppressed violations leave the window untouched, so
    /// a persistent condition re-emits exactly once per window.
    pub fn admit(&mut self, violation: &Violation) -> bool {
        if violation.severity == Severity::Critical {
            let _ = self.last_emitted.insert(violation.kind, Instant::now());
            return true;
        }
        let now = Instant::now();
        match self.last_emitted.get(&violation.kind) {
            Some(last) if now.duration_since(*last) < self.window => {
                debug!(kind = violation.kind.as_str(), "violation suppressed by rate limit");
                false
            }
            _ => {
                let _ = self.last_emitted.insert(violation.kind, now);
                true
            }
        }
    }

    /// Forget a kind's window. Called when the condition resolves, so a
    /// later recurrence emits immediately rather than waiting out a window
    /// started by the previous episode.
    pub fn clear(&mut self, kind: ViolationKind) {
        let _ = self.last_emitted.remove(&kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use vigil_core::ids::SessionToken;

    fn violation(kind: ViolationKind) -> Violation {
        Violation::new(SessionToken::new("tok-1"), kind, "test", Value::Null)
    }

    #[tokio::test(start_paused = true)]
    async fn repeats_within_window_are_suppressed() {
        let mut limiter = RateLimiter::new(Duration::from_secs(10));
        let v = violation(ViolationKind::CameraLevelLow);
        assert!(limiter.admit(&v));
        assert!(!limiter.admit(&v));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!limiter.admit(&v));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(limiter.admit(&v));
    }

    #[tokio::test(start_paused = true)]
    async fn kinds_are_limited_independently() {
        let mut limiter = RateLimiter::new(Duration::from_secs(10));
        assert!(limiter.admit(&violation(ViolationKind::CameraLevelLow)));
        assert!(limiter.admit(&violation(ViolationKind::GazeDeviation)));
        assert!(!limiter.admit(&violation(ViolationKind::CameraLevelLow)));
    }

    #[tokio::test(start_paused = true)]
    async fn critical_violations_bypass_the_window() {
        let mut limiter = RateLimiter::new(Duration::from_secs(10));
        let v = violation(ViolationKind::MobilePhoneDetected);
        assert!(limiter.admit(&v));
        assert!(limiter.admit(&v));
        assert!(limiter.admit(&v));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_resets_the_window() {
        let mut limiter = RateLimiter::new(Duration::from_secs(10));
        let v = violation(ViolationKind::LowAttention);
        assert!(limiter.admit(&v));
        assert!(!limiter.admit(&v));
        limiter.clear(ViolationKind::LowAttention);
        assert!(limiter.admit(&v));
    }
}
