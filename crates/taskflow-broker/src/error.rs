//! Error handling for the axum server.
//! Maps `TaskflowError` to appropriate HTTP status codes and JSON error bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use taskflow_types::TaskflowError;

/// Wrapper to convert `TaskflowError` into an axum response.
pub struct AppError(TaskflowError);

impl From<TaskflowError> for AppError {
    fn from(e: TaskflowError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = json!({
            "error": self.0.to_string(),
            "code": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
