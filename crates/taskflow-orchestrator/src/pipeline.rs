//! The per-document pipeline run. Grounded on the original
//! `index-document-service`'s `_run_pipeline`/`_create_and_wait_task`/
//! `_run_*_fanout` functions: two persistent dictionaries (`artifact_ctx`,
//! `prev_output`), a 1Hz child-task poll, linear-backoff retry for
//! single-output steps, and a bounded semaphore for fan-out steps — the
//! semaphore is a deliberate addition over the unbounded original (see
//! DESIGN.md).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Semaphore;
use uuid::Uuid;

use taskflow_client::BrokerClient;
use taskflow_types::{
    pipeline::canonicalize_steps,
    task::TaskStatusCode,
    PipelineDefinition,
};

const CHILD_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_STEP_MAX_RETRIES: u32 = 3;
const DEFAULT_FANOUT_CONCURRENCY: usize = 10;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("step '{step}' failed: {detail}")]
    StepFailed { step: String, detail: String },
}

/// Runs one `index-document` task to completion, producing the final
/// output the orchestrator should ACK with.
pub async fn run_pipeline<C: BrokerClient + 'static>(
    broker: Arc<C>,
    definition: PipelineDefinition,
    fanout_concurrency: Option<usize>,
) -> Result<Value, PipelineError> {
    let fanout_concurrency = fanout_concurrency.unwrap_or(DEFAULT_FANOUT_CONCURRENCY);
    let steps = canonicalize_steps(definition.steps.clone());

    let mut artifact_ctx: HashMap<String, Value> = HashMap::new();
    let mut prev_output: Value = json!({});

    let root_ctx = json!({
        "s3_key": definition.s3_key,
        "file_id": definition.file_id,
        "workspace_id": definition.workspace_id,
        "original_filename": definition.original_filename,
    });

    for step in &steps {
        tracing::info!(step = %step.name, "starting pipeline step");

        if taskflow_types::pipeline::is_fanout_step(&step.name) {
            let chunks = artifact_ctx
                .get("chunks")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();

            run_fanout_step(&broker, &step.name, &chunks, definition.workspace_id, fanout_concurrency)
                .await
                .map_err(|detail| PipelineError::StepFailed { step: step.name.clone(), detail })?;

            prev_output = json!({});
            continue;
        }

        let step_input = build_step_input(&step.name, &root_ctx, &artifact_ctx, &prev_output);

        let output = run_single_step_with_retries(&broker, &step.name, step_input, definition.workspace_id)
            .await
            .map_err(|detail| PipelineError::StepFailed { step: step.name.clone(), detail })?;

        if step.name == "parse-document" {
            if let Some(v) = output.get("parsed_s3_key") {
                artifact_ctx.insert("parsed_s3_key".into(), v.clone());
            }
            if let Some(v) = output.get("document_parser_version") {
                artifact_ctx.insert("document_parser_version".into(), v.clone());
            }
        }
        if step.name == "chunk" {
            if let Some(v) = output.get("chunks") {
                artifact_ctx.insert("chunks".into(), v.clone());
            }
        }

        prev_output = output;
    }

    Ok(json!({ "steps_completed": steps.iter().map(|s| s.name.clone()).collect::<Vec<_>>() }))
}

fn build_step_input(
    step_name: &str,
    root_ctx: &Value,
    artifact_ctx: &HashMap<String, Value>,
    prev_output: &Value,
) -> Value {
    match step_name {
        "parse-document" => root_ctx.clone(),
        "chunk" => {
            let s3_key = artifact_ctx
                .get("parsed_s3_key")
                .cloned()
                .unwrap_or_else(|| root_ctx["s3_key"].clone());
            json!({
                "s3_key": s3_key,
                "file_id": root_ctx["file_id"],
                "workspace_id": root_ctx["workspace_id"],
                "original_filename": root_ctx["original_filename"],
                "document_parser_version": artifact_ctx.get("document_parser_version").cloned().unwrap_or(Value::Null),
            })
        }
        _ => json!({ "context": prev_output, "workspace_id": root_ctx["workspace_id"] }),
    }
}

async fn run_single_step_with_retries<C: BrokerClient + 'static>(
    broker: &Arc<C>,
    step_name: &str,
    step_input: Value,
    workspace_id: i64,
) -> Result<Value, String> {
    let mut tries = 0u32;
    loop {
        match create_and_wait(broker, step_name, step_input.clone(), workspace_id).await {
            Ok(output) => return Ok(output),
            Err(e) => {
                tries += 1;
                tracing::warn!(step = step_name, attempt = tries, "step failed: {e}");
                if tries >= DEFAULT_STEP_MAX_RETRIES {
                    return Err(e);
                }
                tokio::time::sleep(Duration::from_secs(2 * tries as u64)).await;
            }
        }
    }
}

async fn run_fanout_step<C: BrokerClient + 'static>(
    broker: &Arc<C>,
    step_name: &str,
    chunks: &[Value],
    workspace_id: i64,
    concurrency: usize,
) -> Result<(), String> {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let chunk_id = chunk
            .get("chunk_id")
            .or_else(|| chunk.get("id"))
            .cloned()
            .unwrap_or(Value::Null);
        let input = json!({ "chunk_id": chunk_id, "workspace_id": workspace_id });
        let broker = Arc::clone(broker);
        let semaphore = Arc::clone(&semaphore);
        let step_name = step_name.to_string();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            create_and_wait(&broker, &step_name, input, workspace_id).await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("fan-out task panicked: {e}"))?
            .map_err(|e| format!("{step_name} failed: {e}"))?;
    }

    Ok(())
}

async fn create_and_wait<C: BrokerClient + 'static>(
    broker: &Arc<C>,
    step_name: &str,
    input: Value,
    workspace_id: i64,
) -> Result<Value, String> {
    let task_id: Uuid = broker
        .create_task(step_name, input, workspace_id)
        .await
        .map_err(|e| e.to_string())?;

    loop {
        tokio::time::sleep(CHILD_POLL_INTERVAL).await;
        let task = broker.get_task(task_id).await.map_err(|e| e.to_string())?;
        match task.status_code {
            TaskStatusCode::Succeeded => return Ok(task.output),
            TaskStatusCode::Failed => {
                return Err(format!("task {task_id} ({step_name}) failed"));
            }
            TaskStatusCode::Queued | TaskStatusCode::Running => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_step_prefers_parsed_key_over_source_key() {
        let root_ctx = json!({
            "s3_key": "raw/doc.pdf",
            "file_id": "f1",
            "workspace_id": 7,
            "original_filename": "doc.pdf",
        });
        let mut artifact_ctx = HashMap::new();
        artifact_ctx.insert("parsed_s3_key".to_string(), json!("parsed/doc.json"));
        artifact_ctx.insert("document_parser_version".to_string(), json!("v2"));

        let input = build_step_input("chunk", &root_ctx, &artifact_ctx, &json!({}));
        assert_eq!(input["s3_key"], "parsed/doc.json");
        assert_eq!(input["document_parser_version"], "v2");
    }

    #[test]
    fn chunk_step_falls_back_to_source_key_before_parsing() {
        let root_ctx = json!({
            "s3_key": "raw/doc.pdf",
            "file_id": "f1",
            "workspace_id": 7,
            "original_filename": "doc.pdf",
        });
        let artifact_ctx = HashMap::new();
        let input = build_step_input("chunk", &root_ctx, &artifact_ctx, &json!({}));
        assert_eq!(input["s3_key"], "raw/doc.pdf");
    }

    #[test]
    fn unknown_step_passes_through_prev_output() {
        let root_ctx = json!({"workspace_id": 1});
        let artifact_ctx = HashMap::new();
        let prev_output = json!({"foo": "bar"});
        let input = build_step_input("some-custom-step", &root_ctx, &artifact_ctx, &prev_output);
        assert_eq!(input["context"], prev_output);
    }
}
