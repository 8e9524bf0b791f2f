//! Router construction for the taskflow broker.

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, state::AppState};

/// Build the full axum router. No auth middleware — the control plane
/// trusts its network perimeter; see the spec's Non-goals.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/task", post(handlers::task::create_task))
        .route(
            "/task/:id",
            get(handlers::task::get_task).put(handlers::task::update_task),
        )
        .route("/task/:id/status", get(handlers::task::get_task_status))
        .route(
            "/consumer",
            put(handlers::consumer::register_consumer).delete(handlers::consumer::deregister_consumer),
        )
        .route("/health", get(handlers::health::health))
        .with_state(state)
}
