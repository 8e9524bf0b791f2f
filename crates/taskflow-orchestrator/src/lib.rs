//! taskflow-orchestrator — drives the `index-document` pipeline: canonical
//! step ordering, per-step child tasks, bounded fan-out for redact/embed/
//! index, and failure propagation to the parent task.

pub mod pipeline;

pub use pipeline::{run_pipeline, PipelineError};
