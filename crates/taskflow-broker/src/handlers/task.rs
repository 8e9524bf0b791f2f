//! `/task` handlers — create, read, status, update.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use taskflow_types::{error::TaskflowError, CreateTaskRequest, Task, TaskStatusView, TaskUpdate, MUTABLE_FIELDS};

use crate::{error::AppError, state::AppState};

pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, HeaderMap, Json<serde_json::Value>), AppError> {
    let scheduled = req
        .scheduled_start_timestamp
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    let task = state
        .tasks
        .insert_task(&req.name, req.workspace_id, req.input, scheduled)
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        "Location",
        HeaderValue::from_str(&format!("/task/{}/status", task.id)).unwrap(),
    );

    Ok((StatusCode::ACCEPTED, headers, Json(json!({ "id": task.id.to_string() }))))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    let task = state.tasks.get_task(id).await?;
    Ok(Json(task))
}

pub async fn get_task_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskStatusView>, AppError> {
    let task = state.tasks.get_task(id).await?;
    Ok(Json(TaskStatusView::from(&task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(raw): Json<serde_json::Value>,
) -> Result<Json<TaskStatusView>, AppError> {
    let delta = parse_task_update(raw)?;
    let task = state.tasks.update_task(id, delta).await?;
    Ok(Json(TaskStatusView::from(&task)))
}

/// Validates the field whitelist (`input` and every other immutable field
/// is rejected here, before the store ever sees the request) and then
/// deserializes the remaining object into a `TaskUpdate`. Keeping this
/// check ahead of serde's own `deny_unknown_fields` guarantees a `400`
/// via `TaskflowError::InvalidInput` rather than axum's default `422` for
/// a `JsonDataError` rejection.
fn parse_task_update(raw: serde_json::Value) -> Result<TaskUpdate, TaskflowError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| TaskflowError::InvalidInput("request body must be a JSON object".into()))?;

    for field in obj.keys() {
        if !MUTABLE_FIELDS.contains(&field.as_str()) {
            return Err(TaskflowError::InvalidInput(format!("field '{field}' is not mutable")));
        }
    }

    serde_json::from_value(raw).map_err(|e| TaskflowError::InvalidInput(e.to_string()))
}
