//! Sampling seams.
//!
//! Two capability traits feed one snapshot per tick:
//!
//! - [`EnvironmentProbe`] reads the cheap, always-available signals
//!   (fullscreen state, camera/mic/speaker activity levels) from the capture
//!   devices.
//! - [`DetectionCapability`] is the model-backed black box returning face,
//!   object, and gaze readings. The engine consumes its output and knows
//!   nothing about the model behind it.
//!
//! [`DeviceSampler`] composes the two with the failure isolation the tick
//! contract requires: a probe failure fails the sample, a detection failure
//! degrades it (`detection: None`) so the remaining checks still run.

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use vigil_core::policy::MonitoringPolicy;
use vigil_core::snapshot::{ComplianceSnapshot, DetectionReadings};

use crate::errors::SamplerError;

/// Non-detection signal readings for one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvironmentReading {
    /// Whether the assessment window is fullscreen.
    pub is_fullscreen: bool,
    /// Camera activity level, 0–100.
    pub camera_level: u8,
    /// Microphone activity level, 0–100.
    pub microphone_level: u8,
    /// Speaker activity level, 0–100.
    pub speaker_level: u8,
}

/// Reads fullscreen state and media activity levels.
#[async_trait]
pub trait EnvironmentProbe: Send + Sync {
    /// Acquire the devices this probe needs. Called once before the first
    /// tick; a failure here prevents monitoring from starting.
    async fn acquire(&self) -> Result<(), SamplerError> {
        Ok(())
    }

    /// Read the current environment signals.
    async fn probe(&self) -> Result<EnvironmentReading, SamplerError>;

    /// Release any device handles. Called exactly once on loop stop,
    /// including error paths.
    async fn release(&self) {}
}

/// Model-backed face/object/gaze detection, consumed as a black box.
#[async_trait]
pub trait DetectionCapability: Send + Sync {
    /// Run one combined detection pass over the current frame.
    async fn detect(&self, policy: &MonitoringPolicy) -> Result<DetectionReadings, SamplerError>;
}

/// Produces one [`ComplianceSnapshot`] per tick.
///
/// The contract is side-effect-free: given current input, return the current
/// snapshot. Implementations may be stateful internally (device handles,
/// model sessions) but repeated calls must not accumulate observable state.
#[async_trait]
pub trait ComplianceSampler: Send + Sync {
    /// Acquire sampling resources before the first tick.
    async fn acquire(&self) -> Result<(), SamplerError>;

    /// Take one snapshot.
    async fn sample(&self, policy: &MonitoringPolicy) -> Result<ComplianceSnapshot, SamplerError>;

    /// Release sampling resources. Must be safe to call once after any
    /// sequence of `sample` calls, including zero.
    async fn release(&self);
}

/// The production sampler: an environment probe plus a detection capability.
pub struct DeviceSampler<P, D> {
    probe: P,
    detection: D,
}

impl<P: EnvironmentProbe, D: DetectionCapability> DeviceSampler<P, D> {
    /// Compose a sampler from a probe and a detection capability.
    pub fn new(probe: P, detection: D) -> Self {
        Self { probe, detection }
    }
}

#[async_trait]
impl<P: EnvironmentProbe, D: DetectionCapability> ComplianceSampler for DeviceSampler<P, D> {
    async fn acquire(&self) -> Result<(), SamplerError> {
        self.probe.acquire().await
    }

    async fn sample(&self, policy: &MonitoringPolicy) -> Result<ComplianceSnapshot, SamplerError> {
        let reading = self.probe.probe().await?;

        // One combined detection pass per tick. Failure is confined to the
        // detection half of the snapshot.
        let detection = if policy.detection_enabled() {
            match self.detection.detect(policy).await {
                Ok(readings) => Some(readings),
                Err(e) => {
                    warn!(error = %e, "detection pass failed, skipping detection checks this tick");
                    None
                }
            }
        } else {
            None
        };

        Ok(ComplianceSnapshot {
            is_fullscreen: reading.is_fullscreen,
            camera_level: reading.camera_level,
            microphone_level: reading.microphone_level,
            speaker_level: reading.speaker_level,
            detection,
            sampled_at: Utc::now(),
        })
    }

    async fn release(&self) {
        self.probe.release().await;
    }
}
