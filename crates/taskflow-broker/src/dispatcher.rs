//! Dispatcher — once the broker loop leases a task to a consumer, POSTs
//! the task payload to that consumer's endpoint. Fire-and-forget: the
//! broker never retries a failed POST; the worker owns every subsequent
//! state transition (see the task lifecycle and the error-handling table).

use std::time::Duration;

use serde_json::json;

use taskflow_types::{ConsumerRegistration, Task};

pub struct Dispatcher {
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new(send_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(send_timeout)
            .build()
            .expect("failed to build dispatch http client");
        Self { client }
    }

    pub async fn dispatch(&self, task: Task, consumer: ConsumerRegistration) {
        let body = json!({
            "task_id": task.id,
            "input": task.input,
        });

        match self.client.post(&consumer.endpoint_url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(task_id = %task.id, endpoint = %consumer.endpoint_url, "dispatched");
            }
            Ok(resp) => {
                tracing::warn!(
                    task_id = %task.id,
                    endpoint = %consumer.endpoint_url,
                    status = %resp.status(),
                    "dispatch rejected by consumer — task stays Running until the worker reports back"
                );
            }
            Err(e) => {
                tracing::warn!(
                    task_id = %task.id,
                    endpoint = %consumer.endpoint_url,
                    "dispatch failed: {e} — task stays Running until the worker reports back"
                );
            }
        }
    }
}
