//! # vigil-monitor
//!
//! Per-session compliance monitoring.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `sampler` | `ComplianceSampler` / `DetectionCapability` seams, device sampler |
//! | `classifier` | Pure snapshot → violations mapping with rolling-window state |
//! | `rate_limit` | Per-(session, kind) suppression window, critical bypass |
//! | `reporter` | Broadcast-first violation reporting with retried persistence |
//! | `monitor_loop` | Per-session scheduled tick, idempotent start, deterministic stop |
//!
//! ## Data Flow
//!
//! `monitor_loop` ticks → `sampler` builds one consistent snapshot →
//! `classifier` grades it → `rate_limit` suppresses repeats → `reporter`
//! broadcasts and persists → the registry's live status is refreshed.

#![deny(unsafe_code)]

pub mod classifier;
pub mod errors;
pub mod monitor_loop;
pub mod rate_limit;
pub mod reporter;
pub mod sampler;

pub use classifier::{ClassifierState, ClassifyOutcome, classify};
pub use errors::{MonitorError, SamplerError, StoreError};
pub use monitor_loop::MonitoringLoop;
pub use rate_limit::RateLimiter;
pub use reporter::{ViolationReporter, ViolationStore};
pub use sampler::{ComplianceSampler, DetectionCapability, DeviceSampler, EnvironmentProbe};
