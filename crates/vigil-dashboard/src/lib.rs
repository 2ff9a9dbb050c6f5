//! # vigil-dashboard
//!
//! The observer side of the engine: a typed REST client for the record
//! service and the [`DashboardAggregator`] that mirrors sessions into the
//! local registry, folds live signaling events into the mirror, and drives
//! transport links for watched sessions.

#![deny(unsafe_code)]

pub mod aggregator;
pub mod client;

pub use aggregator::DashboardAggregator;
pub use client::{DashboardError, RecordServiceClient};
