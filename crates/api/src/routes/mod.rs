//! HTTP surface of the service

mod error;
mod health;
mod reconciliation;
mod sync;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

pub use error::{ApiError, ErrorResponse};

use crate::context::AppContext;

/// Shared state handed to every handler.
pub type AppState = Arc<AppContext>;

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/notifications", post(sync::receive_notification))
        .route("/repair/{source_id}", post(sync::repair))
        .route("/reconciliation", post(reconciliation::trigger))
        .route("/dead-letters", get(health::dead_letters))
        .route("/health", get(health::health))
        .with_state(state)
}
