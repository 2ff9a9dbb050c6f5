//! Monitoring error taxonomy.
//!
//! Four families, handled differently by design:
//!
//! - [`SamplerError::DeviceAccess`] — surfaced immediately with a specific
//!   remediation message; monitoring cannot start without devices.
//! - [`SamplerError::Detection`] — the detection capability failed; the
//!   offending checks are skipped for that tick only.
//! - [`StoreError`] — violation persistence failed; the violation is still
//!   broadcast, persistence is retried with backoff.
//! - [`MonitorError`] — loop-level failures wrapping the above.

use vigil_core::ids::SessionToken;

/// Sampling failures.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// A required capture device could not be acquired.
    #[error("cannot access {device}: {remediation}")]
    DeviceAccess {
        /// Which device failed (`camera`, `microphone`).
        device: String,
        /// User-facing remediation hint.
        remediation: String,
    },
    /// The model-backed detection pass failed.
    #[error("detection capability failed: {0}")]
    Detection(String),
}

/// Violation persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record service rejected or never received the write.
    #[error("violation store unavailable: {0}")]
    Unavailable(String),
}

/// Monitoring-loop failures.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Sampling could not start.
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    /// The session is not known to the registry.
    #[error(transparent)]
    Registry(#[from] vigil_registry::RegistryError),
    /// The session's loop is not running.
    #[error("no monitoring loop running for session {0}")]
    NotRunning(SessionToken),
}
