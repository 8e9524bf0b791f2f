//! BrokerLoop — matches ready consumers to the oldest eligible task of
//! their topic and hands successful leases to the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use taskflow_types::{ConsumerRegistration, Task, TaskStore};

use crate::dispatcher::Dispatcher;

pub struct BrokerLoop {
    tasks: Arc<dyn TaskStore>,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
}

impl BrokerLoop {
    pub fn new(tasks: Arc<dyn TaskStore>, dispatcher: Arc<Dispatcher>, interval: Duration) -> Self {
        Self { tasks, dispatcher, interval }
    }

    /// Runs forever. Spawn via `tokio::spawn`.
    pub async fn run(&self) {
        tracing::info!(interval = ?self.interval, "broker loop started");
        loop {
            if let Err(e) = self.tick().await {
                tracing::error!("broker tick failed: {e}");
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let topics = self.tasks.topics_with_ready_consumers().await?;
        for topic in topics {
            // Lease repeatedly within a topic until no more matches are
            // found this tick — a ready consumer and an eligible task may
            // both still be present after one pairing.
            loop {
                match self.tasks.lease(&topic, Utc::now()).await {
                    Ok(Some((task, consumer))) => {
                        tracing::debug!(task_id = %task.id, topic = %topic, consumer = %consumer.endpoint_url, "leased task");
                        self.dispatch(task, consumer).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("lease failed for topic {topic}: {e}");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&self, task: Task, consumer: ConsumerRegistration) {
        self.dispatcher.dispatch(task, consumer).await;
    }
}
