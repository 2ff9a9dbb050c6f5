//! Engine configuration.
//!
//! Every interval, window, and retention limit the engine uses lives here.
//! Components receive an [`EngineConfig`] (or the slice of it they need) and
//! never hard-code timing assumptions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunable knobs for the proctoring engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Monitoring tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// How many recent violations each session view retains in memory.
    pub violation_retention: usize,
    /// Suppression window for repeated non-critical violations, milliseconds.
    pub rate_limit_window_ms: u64,
    /// Delay between sequential rejoins during reconnect-all, milliseconds.
    pub reconnect_stagger_ms: u64,
    /// How long total signaling loss is tolerated before owned sessions are
    /// paused, milliseconds.
    pub signaling_grace_period_ms: u64,
    /// Maximum attempts when persisting a violation to the record service.
    pub persist_retry_max: u32,
    /// Base backoff between persistence retries, milliseconds.
    pub persist_retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2_000,
            violation_retention: 50,
            rate_limit_window_ms: 10_000,
            reconnect_stagger_ms: 500,
            signaling_grace_period_ms: 15_000,
            persist_retry_max: 3,
            persist_retry_backoff_ms: 250,
        }
    }
}

impl EngineConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Recognized variables: `VIGIL_TICK_INTERVAL_MS`,
    /// `VIGIL_VIOLATION_RETENTION`, `VIGIL_RATE_LIMIT_WINDOW_MS`,
    /// `VIGIL_RECONNECT_STAGGER_MS`, `VIGIL_SIGNALING_GRACE_PERIOD_MS`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_u64("VIGIL_TICK_INTERVAL_MS") {
            config.tick_interval_ms = v;
        }
        if let Some(v) = env_u64("VIGIL_VIOLATION_RETENTION") {
            config.violation_retention = v as usize;
        }
        if let Some(v) = env_u64("VIGIL_RATE_LIMIT_WINDOW_MS") {
            config.rate_limit_window_ms = v;
        }
        if let Some(v) = env_u64("VIGIL_RECONNECT_STAGGER_MS") {
            config.reconnect_stagger_ms = v;
        }
        if let Some(v) = env_u64("VIGIL_SIGNALING_GRACE_PERIOD_MS") {
            config.signaling_grace_period_ms = v;
        }
        config
    }

    /// Tick interval as a [`Duration`].
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Rate-limit window as a [`Duration`].
    #[must_use]
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    /// Reconnect stagger delay as a [`Duration`].
    #[must_use]
    pub fn reconnect_stagger(&self) -> Duration {
        Duration::from_millis(self.reconnect_stagger_ms)
    }

    /// Signaling grace period as a [`Duration`].
    #[must_use]
    pub fn signaling_grace_period(&self) -> Duration {
        Duration::from_millis(self.signaling_grace_period_ms)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
