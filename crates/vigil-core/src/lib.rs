//! # vigil-core
//!
//! Foundation types, errors, branded IDs, and configuration for the Vigil
//! proctoring engine.
//!
//! This crate provides the shared vocabulary that all other Vigil crates
//! depend on:
//!
//! - **Branded IDs**: [`ids::SessionToken`], [`ids::ObserverId`],
//!   [`ids::AssessmentId`], [`ids::CandidateId`] as newtypes
//! - **Sessions**: [`session::ProctoringSession`] and the
//!   [`session::SessionStatus`] lifecycle state machine
//! - **Snapshots**: [`snapshot::ComplianceSnapshot`] — one tick's signal read
//! - **Violations**: [`violation::Violation`] with the closed
//!   [`violation::ViolationKind`] taxonomy and fixed severity mapping
//! - **Policy**: [`policy::MonitoringPolicy`] thresholds and enablement flags
//! - **Config**: [`config::EngineConfig`] — every interval and window the
//!   engine uses, never hard-coded inside components
//! - **Logging**: [`logging::init`] for the tracing subscriber
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other vigil crates.

#![deny(unsafe_code)]

pub mod config;
pub mod ids;
pub mod logging;
pub mod policy;
pub mod session;
pub mod snapshot;
pub mod violation;
