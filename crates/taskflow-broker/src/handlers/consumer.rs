//! `/consumer` handlers — register and deregister workers.

use axum::{extract::State, Json};
use serde_json::json;

use taskflow_types::{ConsumerRegistration, DeregisterConsumerRequest, RegisterConsumerRequest};

use crate::{error::AppError, state::AppState};

pub async fn register_consumer(
    State(state): State<AppState>,
    Json(req): Json<RegisterConsumerRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .consumers
        .register(ConsumerRegistration {
            endpoint_url: req.endpoint_url,
            health_url: req.health_url,
            topic: req.topic,
            is_ready: req.ready,
        })
        .await?;

    Ok(Json(json!({ "ok": true })))
}

pub async fn deregister_consumer(
    State(state): State<AppState>,
    Json(req): Json<DeregisterConsumerRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.consumers.deregister(&req.endpoint_url).await?;
    Ok(Json(json!({ "ok": true })))
}
