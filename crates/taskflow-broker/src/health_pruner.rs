//! HealthPruner — periodically GETs each consumer's health_url and evicts
//! any consumer that fails to respond with a 2xx.

use std::sync::Arc;
use std::time::Duration;

use taskflow_types::ConsumerRegistry;

pub struct HealthPruner {
    consumers: Arc<dyn ConsumerRegistry>,
    client: reqwest::Client,
    interval: Duration,
}

impl HealthPruner {
    pub fn new(consumers: Arc<dyn ConsumerRegistry>, interval: Duration, check_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(check_timeout)
            .build()
            .expect("failed to build health-check http client");
        Self { consumers, client, interval }
    }

    /// Runs forever. Spawn via `tokio::spawn`.
    pub async fn run(&self) {
        tracing::info!(interval = ?self.interval, "health pruner started");
        loop {
            if let Err(e) = self.tick().await {
                tracing::error!("health pruner tick failed: {e}");
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let consumers = self.consumers.list_all().await?;
        for consumer in consumers {
            let healthy = match self.client.get(&consumer.health_url).send().await {
                Ok(resp) => resp.status().is_success(),
                Err(_) => false,
            };
            if !healthy {
                tracing::warn!(endpoint = %consumer.endpoint_url, "consumer failed health check, evicting");
                if let Err(e) = self.consumers.remove(&consumer.endpoint_url).await {
                    tracing::error!("failed to evict unhealthy consumer {}: {e}", consumer.endpoint_url);
                }
            }
        }
        Ok(())
    }
}
