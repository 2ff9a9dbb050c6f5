//! # vigil-registry
//!
//! The authoritative in-memory map of proctoring sessions.
//!
//! [`SessionRegistry`] is the single writer-of-record for lifecycle status:
//! the monitoring loop, transport manager, and dashboard all *request* state
//! changes through it and never mutate session status themselves. It merges
//! two independent event sources — REST snapshots
//! ([`SessionRegistry::upsert_from_snapshot`]) and push/lifecycle events
//! (`mark_live` / `mark_paused` / `mark_ended`) — without ever exposing a
//! partially-merged record.

#![deny(unsafe_code)]

mod registry;

pub use registry::{RegistryError, SessionRegistry};
