//! # SyncBridge Application
//!
//! HTTP surface and process wiring.
//!
//! This crate contains:
//! - Application context (dependency injection and worker lifecycle)
//! - The axum router for notifications, repair and reconciliation
//! - Tracing initialisation
//!
//! ## Architecture
//! - Depends on `domain`, `core`, and `infra`
//! - Wires the ports in `core` to their `infra` implementations

pub mod context;
pub mod routes;
pub mod utils;

pub use context::AppContext;
pub use routes::{router, ApiError, AppState};
