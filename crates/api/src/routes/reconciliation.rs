//! On-demand reconciliation trigger

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;

/// `POST /reconciliation`
///
/// Answers at once; the run reports through telemetry when it finishes.
pub async fn trigger(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let request_id = state.trigger_reconciliation();
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted", "requestId": request_id })))
}
