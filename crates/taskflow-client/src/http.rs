//! HttpClient — calls the taskflow broker's REST surface over HTTP.
//!
//! All methods map to the corresponding broker endpoints. Error bodies are
//! deserialized to `TaskflowError` based on HTTP status.

use async_trait::async_trait;
use serde_json::{json, Value};
use taskflow_types::{error::TaskflowError, Task};
use uuid::Uuid;

use crate::{BrokerClient, Result};

pub struct HttpClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn handle_error_response(&self, resp: reqwest::Response) -> TaskflowError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();

        let msg = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or(body);

        match status {
            404 => TaskflowError::NotFound(msg),
            409 => TaskflowError::Conflict(msg),
            400 => TaskflowError::InvalidInput(msg),
            _ => TaskflowError::Internal(anyhow::anyhow!("HTTP {status}: {msg}")),
        }
    }

    async fn put_task(&self, task_id: Uuid, payload: Value) -> Result<()> {
        let resp = self
            .client
            .put(self.url(&format!("/task/{task_id}")))
            .json(&payload)
            .send()
            .await
            .map_err(|e| TaskflowError::Internal(e.into()))?;

        if !resp.status().is_success() {
            return Err(self.handle_error_response(resp).await);
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for HttpClient {
    async fn ready(&self, endpoint_url: &str, health_url: &str, topic: &str) -> Result<()> {
        let resp = self
            .client
            .put(self.url("/consumer"))
            .json(&json!({
                "endpoint_url": endpoint_url,
                "health_url": health_url,
                "topic": topic,
                "ready": true,
            }))
            .send()
            .await
            .map_err(|e| TaskflowError::Internal(e.into()))?;

        if !resp.status().is_success() {
            return Err(self.handle_error_response(resp).await);
        }
        Ok(())
    }

    async fn deregister(&self, endpoint_url: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.url("/consumer"))
            .json(&json!({ "endpoint_url": endpoint_url }))
            .send()
            .await
            .map_err(|e| TaskflowError::Internal(e.into()))?;

        if !resp.status().is_success() {
            return Err(self.handle_error_response(resp).await);
        }
        Ok(())
    }

    async fn ack(&self, task_id: Uuid, output: Option<Value>) -> Result<()> {
        let mut payload = json!({ "status_code": 2 });
        if let Some(output) = output {
            payload["output"] = output;
        }
        self.put_task(task_id, payload).await
    }

    async fn nack(&self, task_id: Uuid) -> Result<()> {
        self.put_task(task_id, json!({ "status_code": 0 })).await
    }

    async fn fail(&self, task_id: Uuid, status: Option<Value>) -> Result<()> {
        let mut payload = json!({ "status_code": 3 });
        if let Some(status) = status {
            payload["status"] = status;
        }
        self.put_task(task_id, payload).await
    }

    async fn update_state(&self, task_id: Uuid, state: Value) -> Result<()> {
        self.put_task(task_id, json!({ "state": state })).await
    }

    async fn reschedule(&self, task_id: Uuid, scheduled_start_timestamp: i64) -> Result<()> {
        self.put_task(
            task_id,
            json!({
                "status_code": 0,
                "scheduled_start_timestamp": scheduled_start_timestamp,
            }),
        )
        .await
    }

    async fn create_task(&self, name: &str, input: Value, workspace_id: i64) -> Result<Uuid> {
        let resp = self
            .client
            .post(self.url("/task"))
            .json(&json!({ "name": name, "input": input, "workspace_id": workspace_id }))
            .send()
            .await
            .map_err(|e| TaskflowError::Internal(e.into()))?;

        if !resp.status().is_success() {
            return Err(self.handle_error_response(resp).await);
        }

        let body: Value = resp.json().await.map_err(|e| TaskflowError::Internal(e.into()))?;
        let id = body["id"]
            .as_str()
            .ok_or_else(|| TaskflowError::Internal(anyhow::anyhow!("broker response missing id")))?;
        Uuid::parse_str(id).map_err(|e| TaskflowError::Internal(e.into()))
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Task> {
        let resp = self
            .client
            .get(self.url(&format!("/task/{task_id}")))
            .send()
            .await
            .map_err(|e| TaskflowError::Internal(e.into()))?;

        if !resp.status().is_success() {
            return Err(self.handle_error_response(resp).await);
        }

        resp.json::<Task>().await.map_err(|e| TaskflowError::Internal(e.into()))
    }
}
