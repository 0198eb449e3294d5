//! Change notification intake and manual repair

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use syncbridge_domain::{ChangeEventMessage, ChangeNotification, SyncOutcome};
use tracing::{debug, instrument};

use super::error::ApiError;
use super::AppState;

/// `POST /notifications`
///
/// Routes the change to its partition and answers 202 without waiting for
/// the pass. A full partition answers 503 so the sender redelivers.
#[instrument(skip_all, fields(event_type = %message.event_type))]
pub async fn receive_notification(
    State(state): State<AppState>,
    Json(message): Json<ChangeEventMessage>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let notification = ChangeNotification::from(message);
    debug!(entity_id = %notification.entity_id, "notification received");

    state.dispatcher.dispatch(notification)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))))
}

/// `POST /repair/{source_id}`
///
/// Runs one pass on the partition owning the id and returns its outcome.
#[instrument(skip(state))]
pub async fn repair(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Result<Json<SyncOutcome>, ApiError> {
    let source_id = source_id.trim();
    if source_id.is_empty() {
        return Err(ApiError::BadRequest("source id must not be empty".into()));
    }

    let outcome = state.dispatcher.repair(source_id).await?;
    Ok(Json(outcome))
}
