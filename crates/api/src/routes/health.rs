//! Liveness and operator views

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use syncbridge_core::DeadLetterStore;
use syncbridge_domain::DeadLetter;

use super::error::ApiError;
use super::AppState;
use crate::utils::health::HealthStatus;

/// `GET /health`
///
/// # Example Response
/// ```json
/// {
///   "is_healthy": true,
///   "score": 1.0,
///   "message": null,
///   "components": [
///     { "name": "dispatcher", "is_healthy": true, "message": "8 partitions" },
///     { "name": "retry_worker", "is_healthy": true, "message": null }
///   ],
///   "timestamp": 1698765432
/// }
/// ```
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let status = state.health_check().await;
    let code = if status.is_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(status))
}

/// `GET /dead-letters`
pub async fn dead_letters(
    State(state): State<AppState>,
) -> Result<Json<Vec<DeadLetter>>, ApiError> {
    Ok(Json(state.dead_letters.list().await?))
}
