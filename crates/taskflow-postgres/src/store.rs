//! Postgres implementations of the taskflow-types port traits.
//!
//! Each adapter is a newtype wrapping PgPool. All SQL is runtime-checked
//! (sqlx::query, not sqlx::query!) since the schema is created by
//! migrations that may not have run yet at compile time.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use taskflow_types::{
    error::{Result, TaskflowError},
    task::{validate_transition, Task, TaskStatusCode, TaskUpdate},
    ConsumerRegistration, ConsumerRegistry, TaskStore,
};

fn row_to_task(row: &sqlx::postgres::PgRow) -> sqlx::Result<Task> {
    let status_code_raw: i16 = row.try_get("status_code")?;
    let status_code =
        TaskStatusCode::try_from(status_code_raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(Task {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        workspace_id: row.try_get("workspace_id")?,
        creation_timestamp: row.try_get("creation_timestamp")?,
        modification_timestamp: row.try_get("modification_timestamp")?,
        scheduled_start_timestamp: row.try_get("scheduled_start_timestamp")?,
        start_timestamp: row.try_get("start_timestamp")?,
        end_timestamp: row.try_get("end_timestamp")?,
        status_code,
        status: row.try_get("status")?,
        progress_percentage: row.try_get("progress_percentage")?,
        input: row.try_get("input")?,
        state: row.try_get("state")?,
        output: row.try_get("output")?,
    })
}

fn row_to_consumer(row: &sqlx::postgres::PgRow) -> sqlx::Result<ConsumerRegistration> {
    Ok(ConsumerRegistration {
        endpoint_url: row.try_get("endpoint_url")?,
        health_url: row.try_get("health_url")?,
        topic: row.try_get("topic")?,
        is_ready: row.try_get("is_ready")?,
    })
}

/// Postgres-backed `TaskStore`.
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn insert_task(
        &self,
        name: &str,
        workspace_id: i64,
        input: serde_json::Value,
        scheduled_start_timestamp: Option<DateTime<Utc>>,
    ) -> Result<Task> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let scheduled = scheduled_start_timestamp.unwrap_or(now);

        let row = sqlx::query(
            r#"
            INSERT INTO tasks (
                id, name, workspace_id, creation_timestamp, modification_timestamp,
                scheduled_start_timestamp, status_code, status, progress_percentage,
                input, state, output
            ) VALUES ($1, $2, $3, $4, $4, $5, 0, '{}'::jsonb, 0, $6, '{}'::jsonb, '{}'::jsonb)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(workspace_id)
        .bind(now)
        .bind(scheduled)
        .bind(&input)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        row_to_task(&row).map_err(|e| TaskflowError::Internal(anyhow!(e)))
    }

    async fn get_task(&self, id: Uuid) -> Result<Task> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TaskflowError::Internal(anyhow!(e)))?
            .ok_or_else(|| TaskflowError::NotFound(format!("task {id}")))?;

        row_to_task(&row).map_err(|e| TaskflowError::Internal(anyhow!(e)))
    }

    async fn update_task(&self, id: Uuid, delta: TaskUpdate) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        let row = sqlx::query("SELECT * FROM tasks WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| TaskflowError::Internal(anyhow!(e)))?
            .ok_or_else(|| TaskflowError::NotFound(format!("task {id}")))?;
        let current = row_to_task(&row).map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        // Side-effect ordering follows the original PUT /task/{id} handler:
        // modification_timestamp always bumps; start_timestamp is set once
        // on the first 0->1 transition; end_timestamp and a forced 100%
        // progress apply the moment the task reaches a terminal state.
        let now = Utc::now();
        let next_status = match delta.status_code {
            Some(code) => {
                let next = TaskStatusCode::try_from(code)?;
                validate_transition(current.status_code, next)?;
                next
            }
            None => current.status_code,
        };

        let start_timestamp = if current.status_code == TaskStatusCode::Queued
            && next_status == TaskStatusCode::Running
            && current.start_timestamp.is_none()
        {
            Some(now)
        } else {
            current.start_timestamp
        };

        let end_timestamp = if next_status.is_terminal() {
            current.end_timestamp.or(Some(now))
        } else {
            current.end_timestamp
        };

        let progress = if next_status == TaskStatusCode::Succeeded {
            100
        } else {
            delta.progress_percentage.unwrap_or(current.progress_percentage)
        };

        let status = delta.status.unwrap_or(current.status);
        let output = delta.output.unwrap_or(current.output);
        let state = delta.state.unwrap_or(current.state);
        let scheduled = match delta.scheduled_start_timestamp {
            Some(secs) => DateTime::<Utc>::from_timestamp(secs, 0)
                .ok_or_else(|| TaskflowError::InvalidInput("invalid scheduled_start_timestamp".into()))?,
            None => current.scheduled_start_timestamp,
        };

        let row = sqlx::query(
            r#"
            UPDATE tasks
            SET status_code = $2,
                status = $3,
                progress_percentage = $4,
                output = $5,
                state = $6,
                scheduled_start_timestamp = $7,
                start_timestamp = $8,
                end_timestamp = $9,
                modification_timestamp = $10
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(i16::from(next_status))
        .bind(&status)
        .bind(progress)
        .bind(&output)
        .bind(&state)
        .bind(scheduled)
        .bind(start_timestamp)
        .bind(end_timestamp)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        tx.commit().await.map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        row_to_task(&row).map_err(|e| TaskflowError::Internal(anyhow!(e)))
    }

    async fn lease(&self, topic: &str, now: DateTime<Utc>) -> Result<Option<(Task, ConsumerRegistration)>> {
        let mut tx = self.pool.begin().await.map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        // Oldest eligible task of this topic, locked so a concurrent broker
        // instance skips it rather than blocking, matching the
        // CTE + FOR UPDATE SKIP LOCKED shape used elsewhere for atomic pop.
        let task_row = sqlx::query(
            r#"
            SELECT * FROM tasks
            WHERE name = $1 AND status_code = 0 AND scheduled_start_timestamp <= $2
            ORDER BY scheduled_start_timestamp, creation_timestamp
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(topic)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        let Some(task_row) = task_row else {
            return Ok(None);
        };

        let consumer_row = sqlx::query(
            r#"
            SELECT * FROM consumers
            WHERE topic = $1 AND is_ready = true
            ORDER BY endpoint_url
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(topic)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        let Some(consumer_row) = consumer_row else {
            return Ok(None);
        };

        let task_id: Uuid = task_row.try_get("id").map_err(|e| TaskflowError::Internal(anyhow!(e)))?;
        let endpoint_url: String =
            consumer_row.try_get("endpoint_url").map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        let updated_task_row = sqlx::query(
            r#"
            UPDATE tasks
            SET status_code = 1,
                start_timestamp = COALESCE(start_timestamp, $2),
                modification_timestamp = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(task_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        let updated_consumer_row = sqlx::query(
            r#"
            UPDATE consumers
            SET is_ready = false
            WHERE endpoint_url = $1
            RETURNING *
            "#,
        )
        .bind(&endpoint_url)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        tx.commit().await.map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        let task = row_to_task(&updated_task_row).map_err(|e| TaskflowError::Internal(anyhow!(e)))?;
        let consumer =
            row_to_consumer(&updated_consumer_row).map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        Ok(Some((task, consumer)))
    }

    async fn topics_with_ready_consumers(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT topic FROM consumers WHERE is_ready = true")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("topic").map_err(|e| TaskflowError::Internal(anyhow!(e))))
            .collect()
    }
}

/// Postgres-backed `ConsumerRegistry`.
pub struct PgConsumerRegistry {
    pool: PgPool,
}

impl PgConsumerRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConsumerRegistry for PgConsumerRegistry {
    async fn register(&self, registration: ConsumerRegistration) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO consumers (endpoint_url, health_url, topic, is_ready)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (endpoint_url) DO UPDATE
            SET health_url = EXCLUDED.health_url,
                topic = EXCLUDED.topic,
                is_ready = EXCLUDED.is_ready
            "#,
        )
        .bind(&registration.endpoint_url)
        .bind(&registration.health_url)
        .bind(&registration.topic)
        .bind(registration.is_ready)
        .execute(&self.pool)
        .await
        .map_err(|e| TaskflowError::Internal(anyhow!(e)))?;
        Ok(())
    }

    async fn deregister(&self, endpoint_url: &str) -> Result<()> {
        self.remove(endpoint_url).await
    }

    async fn list_all(&self) -> Result<Vec<ConsumerRegistration>> {
        let rows = sqlx::query("SELECT * FROM consumers")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TaskflowError::Internal(anyhow!(e)))?;

        rows.iter()
            .map(|r| row_to_consumer(r).map_err(|e| TaskflowError::Internal(anyhow!(e))))
            .collect()
    }

    async fn remove(&self, endpoint_url: &str) -> Result<()> {
        sqlx::query("DELETE FROM consumers WHERE endpoint_url = $1")
            .bind(endpoint_url)
            .execute(&self.pool)
            .await
            .map_err(|e| TaskflowError::Internal(anyhow!(e)))?;
        Ok(())
    }
}
