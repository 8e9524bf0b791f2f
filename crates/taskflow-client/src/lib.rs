//! BrokerClient trait — the sole API boundary between a worker process and
//! the taskflow broker. Workers (and the orchestrator) depend on this
//! crate, never on taskflow-postgres or taskflow-broker directly.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;
use taskflow_types::{error::TaskflowError, Task};
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, TaskflowError>;

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Announce readiness for one task on `topic`.
    async fn ready(&self, endpoint_url: &str, health_url: &str, topic: &str) -> Result<()>;

    /// Deregister from the broker (graceful shutdown).
    async fn deregister(&self, endpoint_url: &str) -> Result<()>;

    /// Acknowledge success. `output` becomes the task's final output.
    async fn ack(&self, task_id: Uuid, output: Option<Value>) -> Result<()>;

    /// Release a task back to Queued without marking it failed.
    async fn nack(&self, task_id: Uuid) -> Result<()>;

    /// Mark a task permanently Failed with an optional structured status.
    async fn fail(&self, task_id: Uuid, status: Option<Value>) -> Result<()>;

    /// Persist worker-scratch `state` without changing lifecycle fields.
    async fn update_state(&self, task_id: Uuid, state: Value) -> Result<()>;

    /// Reschedule a Queued task to a later `scheduled_start_timestamp`.
    async fn reschedule(&self, task_id: Uuid, scheduled_start_timestamp: i64) -> Result<()>;

    /// Create a child task and return its id.
    async fn create_task(&self, name: &str, input: Value, workspace_id: i64) -> Result<Uuid>;

    /// Fetch a task's full record.
    async fn get_task(&self, task_id: Uuid) -> Result<Task>;
}
