//! taskflow-broker — standalone control-plane server.
//!
//! Reads config from env vars:
//!   TASKFLOW_DATABASE_URL          — Postgres connection string (required)
//!   TASKFLOW_BIND_ADDR             — listen address (default: 0.0.0.0:4100)
//!   TASKFLOW_BROKER_INTERVAL_MS    — broker loop cadence (default: 200)
//!   TASKFLOW_HEALTH_INTERVAL_MS    — health pruner cadence (default: 5000)
//!   TASKFLOW_HEALTH_TIMEOUT_MS     — per-check timeout (default: 2000)
//!   TASKFLOW_DISPATCH_TIMEOUT_MS   — dispatch POST timeout (default: 30000)

use std::sync::Arc;
use std::time::Duration;

use taskflow_broker::{
    broker_loop::BrokerLoop, dispatcher::Dispatcher, health_pruner::HealthPruner, router::build_router,
    state::AppState,
};
use taskflow_postgres::PgStores;
use taskflow_types::{ConsumerRegistry, TaskStore};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,taskflow_broker=debug".into()),
        )
        .init();

    let database_url = std::env::var("TASKFLOW_DATABASE_URL").expect("TASKFLOW_DATABASE_URL must be set");
    let bind_addr = std::env::var("TASKFLOW_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:4100".into());

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    tracing::info!("connected to database");

    let stores = PgStores::new(pool);
    let tasks: Arc<dyn TaskStore> = Arc::new(stores.tasks);
    let consumers: Arc<dyn ConsumerRegistry> = Arc::new(stores.consumers);

    let dispatch_timeout = Duration::from_millis(env_u64("TASKFLOW_DISPATCH_TIMEOUT_MS", 30_000));
    let dispatcher = Arc::new(Dispatcher::new(dispatch_timeout));

    let broker_interval = Duration::from_millis(env_u64("TASKFLOW_BROKER_INTERVAL_MS", 200));
    let broker_loop = BrokerLoop::new(Arc::clone(&tasks), Arc::clone(&dispatcher), broker_interval);
    tokio::spawn(async move {
        broker_loop.run().await;
    });
    tracing::info!("broker loop spawned (interval={broker_interval:?})");

    let health_interval = Duration::from_millis(env_u64("TASKFLOW_HEALTH_INTERVAL_MS", 5_000));
    let health_timeout = Duration::from_millis(env_u64("TASKFLOW_HEALTH_TIMEOUT_MS", 2_000));
    let pruner = HealthPruner::new(Arc::clone(&consumers), health_interval, health_timeout);
    tokio::spawn(async move {
        pruner.run().await;
    });
    tracing::info!("health pruner spawned (interval={health_interval:?})");

    let state = AppState { tasks, consumers };
    let app = build_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {bind_addr}: {e}"));
    tracing::info!("taskflow-broker listening on {bind_addr}");

    axum::serve(listener, app).await.expect("server error");
}
