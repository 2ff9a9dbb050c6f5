//! # vigil-transport
//!
//! Per-(session, observer) transport links: the negotiation state machine,
//! the join guard that keeps rapid duplicate joins from double-offering, and
//! observer-wide reconnect handling.
//!
//! The media protocol itself sits behind [`LinkNegotiator`]; this crate
//! routes its offers, answers, and candidates over the signaling channel and
//! requests session lifecycle changes through the registry.

#![deny(unsafe_code)]

pub mod link;
pub mod manager;

pub use link::{LinkState, TransportLink};
pub use manager::{LinkNegotiator, TransportError, TransportLinkManager};
