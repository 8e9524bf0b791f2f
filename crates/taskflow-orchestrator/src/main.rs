//! taskflow-orchestrator — a worker process that consumes the
//! `index-document` topic and drives each document through the canonical
//! parse/chunk/redact/embed/index pipeline.
//!
//! Reads config from env vars:
//!   TASKFLOW_BROKER_URL      — broker base URL (required)
//!   TASKFLOW_BIND_ADDR       — this worker's listen address (default: 0.0.0.0:8011)
//!   TASKFLOW_MAX_CONCURRENT  — concurrent pipeline runs (default: 20)
//!   TASKFLOW_FANOUT_CONCURRENCY — per-step fan-out bound (default: 10)

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

use taskflow_client::http::HttpClient;
use taskflow_orchestrator::{run_pipeline, PipelineError};
use taskflow_types::PipelineDefinition;
use taskflow_worker::{SlotManager, TaskOutcome};

#[derive(Clone)]
struct OrchestratorState {
    manager: Arc<SlotManager<HttpClient>>,
    broker: Arc<HttpClient>,
    fanout_concurrency: usize,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,taskflow_orchestrator=debug".into()),
        )
        .init();

    let broker_url = std::env::var("TASKFLOW_BROKER_URL").expect("TASKFLOW_BROKER_URL must be set");
    let bind_addr = std::env::var("TASKFLOW_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8011".into());
    let max_concurrent: u32 = std::env::var("TASKFLOW_MAX_CONCURRENT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);
    let fanout_concurrency: usize = std::env::var("TASKFLOW_FANOUT_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);

    let broker = Arc::new(HttpClient::new(broker_url));
    let endpoint_url = format!("http://{bind_addr}/");
    let health_url = format!("http://{bind_addr}/health");
    let manager = SlotManager::new(broker.clone(), endpoint_url, health_url, "index-document", max_concurrent);

    manager.start().await;

    let state = OrchestratorState { manager: manager.clone(), broker, fanout_concurrency };

    let app = Router::new()
        .route("/", post(consume))
        .route("/health", axum::routing::get(health))
        .with_state(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {bind_addr}: {e}"));
    tracing::info!("taskflow-orchestrator listening on {bind_addr}");

    let shutdown_manager = manager.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown_manager.stop().await;
        })
        .await
        .expect("server error");
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn consume(State(state): State<OrchestratorState>, Json(body): Json<Value>) -> Json<Value> {
    let Some(task_id) = body.get("task_id").and_then(|v| v.as_str()).and_then(|s| Uuid::parse_str(s).ok())
    else {
        return Json(json!({ "accepted": false, "reason": "missing task_id" }));
    };

    let definition: PipelineDefinition = match serde_json::from_value(body["input"].clone()) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("malformed pipeline definition for task {task_id}: {e}");
            return Json(json!({ "accepted": false, "reason": "malformed input" }));
        }
    };

    let manager = state.manager.clone();
    let broker = state.broker.clone();
    let fanout_concurrency = state.fanout_concurrency;

    // Accept immediately and run the pipeline in the background — the
    // caller (the broker's dispatcher) only expects a fast 202/200; the
    // terminal state is reported later through PUT /task/{id}.
    tokio::spawn(async move {
        manager
            .execute_task(task_id, move || async move {
                match run_pipeline(broker, definition, Some(fanout_concurrency)).await {
                    Ok(output) => TaskOutcome::Succeeded(Some(output)),
                    Err(PipelineError::StepFailed { step, detail }) => {
                        TaskOutcome::Failed(json!({ "failed_step": step, "error": detail }))
                    }
                }
            })
            .await;
    });

    Json(json!({ "accepted": true }))
}
