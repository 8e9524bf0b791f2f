use serde::{Deserialize, Serialize};

/// One step of an `index-document` pipeline, as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    pub name: String,
}

/// The `input` payload of an `index-document` task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub s3_key: String,
    pub file_id: String,
    pub workspace_id: i64,
    pub original_filename: String,
    pub steps: Vec<PipelineStep>,
}

/// The fixed step order the orchestrator enforces regardless of submission
/// order. Unknown step names sort after all known ones and keep their
/// relative order, matching `_canonicalize_steps`'s `dict.get(name, 5)`
/// fallback.
pub const CANONICAL_STEP_ORDER: &[&str] = &["parse-document", "chunk", "redact", "embed", "index"];

pub fn step_priority(name: &str) -> usize {
    CANONICAL_STEP_ORDER
        .iter()
        .position(|s| *s == name)
        .unwrap_or(CANONICAL_STEP_ORDER.len())
}

/// Sorts `steps` into canonical order, stable on ties (only matters for
/// unknown step names, which all share the fallback priority).
pub fn canonicalize_steps(mut steps: Vec<PipelineStep>) -> Vec<PipelineStep> {
    steps.sort_by_key(|s| step_priority(&s.name));
    steps
}

/// Steps whose execution fans out over the chunk list rather than
/// producing a single child task.
pub fn is_fanout_step(name: &str) -> bool {
    matches!(name, "redact" | "embed" | "index")
}
