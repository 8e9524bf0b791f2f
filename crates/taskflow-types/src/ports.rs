//! Storage port traits — implemented by taskflow-postgres.
//! Core logic depends only on these traits, never on sqlx directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    consumer::ConsumerRegistration,
    error::Result,
    task::{Task, TaskUpdate},
};

/// Durable persistence of tasks and transactional leasing primitives.
/// See `Lease(topic, now)` and `UpdateTask(id, delta)` for the two
/// primitives the broker loop composes everything else from.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert_task(
        &self,
        name: &str,
        workspace_id: i64,
        input: serde_json::Value,
        scheduled_start_timestamp: Option<DateTime<Utc>>,
    ) -> Result<Task>;

    async fn get_task(&self, id: Uuid) -> Result<Task>;

    /// Applies `delta` to the task, validating the field whitelist and any
    /// requested state transition, and applying the side effects described
    /// in the task lifecycle (start_timestamp on first 0->1, end_timestamp
    /// and forced 100% progress on reaching a terminal state).
    async fn update_task(&self, id: Uuid, delta: TaskUpdate) -> Result<Task>;

    /// Atomically assigns the oldest eligible task of `topic` to a ready
    /// consumer of that topic, flipping the task to Running and the
    /// consumer's readiness token to false. Returns `None` if there is no
    /// eligible task or no ready consumer.
    async fn lease(&self, topic: &str, now: DateTime<Utc>) -> Result<Option<(Task, ConsumerRegistration)>>;

    /// Distinct topic names with at least one ready consumer — the set the
    /// broker loop iterates each tick.
    async fn topics_with_ready_consumers(&self) -> Result<Vec<String>>;
}

/// Tracks `{endpoint, topic, ready-bit}` per worker and evicts unreachable
/// workers.
#[async_trait]
pub trait ConsumerRegistry: Send + Sync {
    async fn register(&self, registration: ConsumerRegistration) -> Result<()>;

    async fn deregister(&self, endpoint_url: &str) -> Result<()>;

    async fn list_all(&self) -> Result<Vec<ConsumerRegistration>>;

    async fn remove(&self, endpoint_url: &str) -> Result<()>;
}
