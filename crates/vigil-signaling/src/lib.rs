//! Room-scoped signaling bus for the Vigil proctoring engine.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `message` | `SignalMessage` wire enum — negotiation, lifecycle, violations |
//! | `connection` | One client's send handle, room binding, drop accounting |
//! | `hub` | Fan-out: room broadcast, slow-client eviction, `SignalSink` seam |
//! | `watchdog` | Grace-period watchdog for vacated rooms |
//!
//! ## Data Flow
//!
//! Clients connect and join the room named by their session token. Engine
//! components publish [`message::SignalMessage`]s through [`hub::SignalSink`];
//! the hub serialises once and fans out per room.

#![deny(unsafe_code)]

pub mod connection;
pub mod hub;
pub mod message;
pub mod watchdog;

pub use connection::{ClientConnection, ClientRole};
pub use hub::{SignalError, SignalSink, SignalingHub};
pub use message::SignalMessage;
