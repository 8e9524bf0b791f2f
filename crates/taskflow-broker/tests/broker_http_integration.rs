//! HTTP-surface integration tests against an in-memory `TaskStore` /
//! `ConsumerRegistry`, exercised through the real axum router via
//! `tower::ServiceExt::oneshot` — no Postgres required.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use taskflow_broker::{router::build_router, state::AppState};
use taskflow_types::{
    error::{Result, TaskflowError},
    task::{validate_transition, Task, TaskStatusCode, TaskUpdate},
    ConsumerRegistration, ConsumerRegistry, TaskStore,
};

#[derive(Default)]
struct MemTaskStore {
    tasks: Mutex<Vec<Task>>,
}

#[async_trait]
impl TaskStore for MemTaskStore {
    async fn insert_task(
        &self,
        name: &str,
        workspace_id: i64,
        input: Value,
        scheduled_start_timestamp: Option<DateTime<Utc>>,
    ) -> Result<Task> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            name: name.to_string(),
            workspace_id,
            creation_timestamp: now,
            modification_timestamp: now,
            scheduled_start_timestamp: scheduled_start_timestamp.unwrap_or(now),
            start_timestamp: None,
            end_timestamp: None,
            status_code: TaskStatusCode::Queued,
            status: json!({}),
            progress_percentage: 0,
            input,
            state: json!({}),
            output: json!({}),
        };
        self.tasks.lock().unwrap().push(task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: Uuid) -> Result<Task> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| TaskflowError::NotFound(format!("task {id}")))
    }

    async fn update_task(&self, id: Uuid, delta: TaskUpdate) -> Result<Task> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TaskflowError::NotFound(format!("task {id}")))?;

        let now = Utc::now();
        if let Some(code) = delta.status_code {
            let next = TaskStatusCode::try_from(code)?;
            validate_transition(task.status_code, next)?;
            if task.status_code == TaskStatusCode::Queued
                && next == TaskStatusCode::Running
                && task.start_timestamp.is_none()
            {
                task.start_timestamp = Some(now);
            }
            if next.is_terminal() && task.end_timestamp.is_none() {
                task.end_timestamp = Some(now);
            }
            task.status_code = next;
        }
        if task.status_code == TaskStatusCode::Succeeded {
            task.progress_percentage = 100;
        } else if let Some(p) = delta.progress_percentage {
            task.progress_percentage = p;
        }
        if let Some(s) = delta.status {
            task.status = s;
        }
        if let Some(o) = delta.output {
            task.output = o;
        }
        if let Some(s) = delta.state {
            task.state = s;
        }
        task.modification_timestamp = now;
        Ok(task.clone())
    }

    async fn lease(&self, _topic: &str, _now: DateTime<Utc>) -> Result<Option<(Task, ConsumerRegistration)>> {
        Ok(None)
    }

    async fn topics_with_ready_consumers(&self) -> Result<Vec<String>> {
        Ok(vec![])
    }
}

#[derive(Default)]
struct MemConsumerRegistry {
    consumers: Mutex<Vec<ConsumerRegistration>>,
}

#[async_trait]
impl ConsumerRegistry for MemConsumerRegistry {
    async fn register(&self, registration: ConsumerRegistration) -> Result<()> {
        let mut consumers = self.consumers.lock().unwrap();
        consumers.retain(|c| c.endpoint_url != registration.endpoint_url);
        consumers.push(registration);
        Ok(())
    }

    async fn deregister(&self, endpoint_url: &str) -> Result<()> {
        self.remove(endpoint_url).await
    }

    async fn list_all(&self) -> Result<Vec<ConsumerRegistration>> {
        Ok(self.consumers.lock().unwrap().clone())
    }

    async fn remove(&self, endpoint_url: &str) -> Result<()> {
        self.consumers.lock().unwrap().retain(|c| c.endpoint_url != endpoint_url);
        Ok(())
    }
}

fn test_state() -> AppState {
    AppState {
        tasks: Arc::new(MemTaskStore::default()),
        consumers: Arc::new(MemConsumerRegistry::default()),
    }
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_then_get_task_round_trips() {
    let app = build_router(test_state());

    let create_req = Request::builder()
        .method("POST")
        .uri("/task")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"name": "hello", "input": {"greeting": "hi"}}).to_string(),
        ))
        .unwrap();

    let resp = app.clone().oneshot(create_req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert!(resp.headers().contains_key("Location"));
    let body = body_json(resp).await;
    let id = body["id"].as_str().unwrap();

    let get_req = Request::builder().uri(format!("/task/{id}")).body(Body::empty()).unwrap();
    let resp = app.oneshot(get_req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let task = body_json(resp).await;
    assert_eq!(task["name"], "hello");
    assert_eq!(task["status_code"], 0);
}

#[tokio::test]
async fn illegal_transition_is_rejected() {
    let app = build_router(test_state());

    let create_req = Request::builder()
        .method("POST")
        .uri("/task")
        .header("content-type", "application/json")
        .body(Body::from(json!({"name": "hello", "input": {}}).to_string()))
        .unwrap();
    let resp = app.clone().oneshot(create_req).await.unwrap();
    let body = body_json(resp).await;
    let id = body["id"].as_str().unwrap();

    // Queued -> Succeeded directly is illegal; only Running -> Succeeded is.
    let update_req = Request::builder()
        .method("PUT")
        .uri(format!("/task/{id}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({"status_code": 2}).to_string()))
        .unwrap();
    let resp = app.oneshot(update_req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_touching_input_is_rejected() {
    let app = build_router(test_state());

    let create_req = Request::builder()
        .method("POST")
        .uri("/task")
        .header("content-type", "application/json")
        .body(Body::from(json!({"name": "hello", "input": {"a": 1}}).to_string()))
        .unwrap();
    let resp = app.clone().oneshot(create_req).await.unwrap();
    let body = body_json(resp).await;
    let id = body["id"].as_str().unwrap();

    // `input` is immutable once created — not in MUTABLE_FIELDS, so this
    // must be rejected with 400 before it ever reaches the store.
    let update_req = Request::builder()
        .method("PUT")
        .uri(format!("/task/{id}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({"input": {"a": 2}}).to_string()))
        .unwrap();
    let resp = app.oneshot(update_req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn succeeded_forces_full_progress() {
    let app = build_router(test_state());

    let create_req = Request::builder()
        .method("POST")
        .uri("/task")
        .header("content-type", "application/json")
        .body(Body::from(json!({"name": "hello", "input": {}}).to_string()))
        .unwrap();
    let resp = app.clone().oneshot(create_req).await.unwrap();
    let body = body_json(resp).await;
    let id = body["id"].as_str().unwrap();

    let to_running = Request::builder()
        .method("PUT")
        .uri(format!("/task/{id}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({"status_code": 1}).to_string()))
        .unwrap();
    app.clone().oneshot(to_running).await.unwrap();

    let to_succeeded = Request::builder()
        .method("PUT")
        .uri(format!("/task/{id}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({"status_code": 2, "progress_percentage": 40}).to_string()))
        .unwrap();
    let resp = app.oneshot(to_succeeded).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let status = body_json(resp).await;
    assert_eq!(status["progress_percentage"], 100);
    assert_eq!(status["status_code"], 2);
}

#[tokio::test]
async fn consumer_register_and_deregister() {
    let app = build_router(test_state());

    let register = Request::builder()
        .method("PUT")
        .uri("/consumer")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "endpoint_url": "http://worker:9000/consume",
                "health_url": "http://worker:9000/health",
                "topic": "hello",
                "ready": true
            })
            .to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(register).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let deregister = Request::builder()
        .method("DELETE")
        .uri("/consumer")
        .header("content-type", "application/json")
        .body(Body::from(json!({"endpoint_url": "http://worker:9000/consume"}).to_string()))
        .unwrap();
    let resp = app.oneshot(deregister).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let app = build_router(test_state());
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "healthy");
}
