//! Domain types, port traits, and the error vocabulary shared by every
//! taskflow crate. Zero sqlx — adapters live in `taskflow-postgres`.

pub mod consumer;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod task;

pub use consumer::{ConsumerRegistration, DeregisterConsumerRequest, RegisterConsumerRequest};
pub use error::{Result, TaskflowError};
pub use pipeline::{canonicalize_steps, is_fanout_step, PipelineDefinition, PipelineStep};
pub use ports::{ConsumerRegistry, TaskStore};
pub use task::{CreateTaskRequest, Task, TaskStatusCode, TaskStatusView, TaskUpdate, MUTABLE_FIELDS};
