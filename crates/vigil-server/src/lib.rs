//! # vigil-server
//!
//! The engine's network surface: an axum router serving the session REST
//! routes, the signaling WebSocket upgrade, Prometheus metrics, and health.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `state` | Shared `AppState` (registry, hub, policies, config) |
//! | `routes` | REST handlers and router assembly |
//! | `ws` | WebSocket upgrade, frame dispatch, room relay |
//! | `error` | `ServerError` → HTTP status mapping |
//! | `metrics` | Prometheus recorder install + metric name constants |

#![deny(unsafe_code)]

pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod ws;

pub use error::ServerError;
pub use routes::app;
pub use state::AppState;
