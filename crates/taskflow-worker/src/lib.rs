//! taskflow-worker — the slot manager every worker process embeds.
//!
//! Maintains local capacity, advertises readiness to the broker, and runs
//! exactly one handler per granted slot. Grounded on the original
//! `TaskManager`/`TaskBrokerClient` pair: `start()` announces readiness
//! with exponential backoff and never gives up; `execute_task` re-announces
//! the next slot as soon as one frees up rather than waiting for the
//! current handler to finish.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use taskflow_client::BrokerClient;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

struct Slots {
    in_flight: HashSet<Uuid>,
    available: u32,
}

/// The outcome of a handler invocation, reported back to the broker.
pub enum TaskOutcome {
    Succeeded(Option<Value>),
    Failed(Value),
}

/// Embedded in a worker process. One instance per worker; `max_concurrent`
/// bounds how many handler invocations may run at once.
pub struct SlotManager<C: BrokerClient> {
    broker: Arc<C>,
    endpoint_url: String,
    health_url: String,
    topic: String,
    max_concurrent: u32,
    slots: Mutex<Slots>,
    start_lock: Mutex<()>,
}

impl<C: BrokerClient + 'static> SlotManager<C> {
    pub fn new(
        broker: Arc<C>,
        endpoint_url: impl Into<String>,
        health_url: impl Into<String>,
        topic: impl Into<String>,
        max_concurrent: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            broker,
            endpoint_url: endpoint_url.into(),
            health_url: health_url.into(),
            topic: topic.into(),
            max_concurrent,
            slots: Mutex::new(Slots { in_flight: HashSet::new(), available: max_concurrent }),
            start_lock: Mutex::new(()),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn inflight_count(&self) -> usize {
        // Best-effort snapshot; callers needing a strict read should hold
        // the lock themselves via a dedicated accessor.
        self.slots.try_lock().map(|s| s.in_flight.len()).unwrap_or(0)
    }

    /// Announces readiness for one slot if capacity remains. Retries with
    /// exponential backoff on transport failure and never gives up —
    /// matches the original `TaskManager.start()`.
    pub async fn start(self: &Arc<Self>) {
        let _guard = self.start_lock.lock().await;
        {
            let mut slots = self.slots.lock().await;
            if slots.available == 0 {
                return;
            }
            slots.available -= 1;
        }

        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.broker.ready(&self.endpoint_url, &self.health_url, &self.topic).await {
                Ok(()) => {
                    tracing::info!(topic = %self.topic, "advertised readiness");
                    return;
                }
                Err(e) => {
                    tracing::warn!("readiness announcement failed, retrying in {backoff:?}: {e}");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    /// Runs `handler` for an accepted task, following the acceptance flow:
    /// NACK immediately if local capacity raced to zero, otherwise run the
    /// handler and ACK/FAIL based on its outcome, re-advertising the next
    /// slot as soon as one is free rather than waiting for completion.
    pub async fn execute_task<F, Fut>(self: &Arc<Self>, task_id: Uuid, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = TaskOutcome> + Send,
    {
        let should_run = {
            let mut slots = self.slots.lock().await;
            if slots.in_flight.len() >= self.max_concurrent as usize && !slots.in_flight.contains(&task_id) {
                // Local capacity already spent — this is a race between
                // dispatch and our own bookkeeping. `available` is only the
                // advertise-token counter, not the concurrency gate; see
                // `task_manager.py`'s `capacity()`.
                false
            } else {
                slots.in_flight.insert(task_id);
                true
            }
        };

        if !should_run {
            if let Err(e) = self.broker.nack(task_id).await {
                tracing::warn!("nack failed for task {task_id}: {e}");
            }
            return;
        }

        let has_spare_slot = { self.slots.lock().await.available > 0 };
        if has_spare_slot {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.start().await });
        }

        let outcome = handler().await;

        match outcome {
            TaskOutcome::Succeeded(output) => {
                if let Err(e) = self.broker.ack(task_id, output).await {
                    tracing::error!("ack failed for task {task_id}: {e}");
                }
            }
            TaskOutcome::Failed(status) => {
                if let Err(e) = self.broker.fail(task_id, Some(status)).await {
                    tracing::error!("fail-report failed for task {task_id}: {e}");
                }
            }
        }

        let mut slots = self.slots.lock().await;
        slots.in_flight.remove(&task_id);
        let capacity = self.max_concurrent.saturating_sub(slots.in_flight.len() as u32);
        slots.available = slots.available.saturating_add(1).min(capacity);
        drop(slots);

        let this = Arc::clone(self);
        tokio::spawn(async move { this.start().await });
    }

    /// Deregisters from the broker. Call on graceful shutdown.
    pub async fn stop(&self) {
        if let Err(e) = self.broker.deregister(&self.endpoint_url).await {
            tracing::warn!("deregister failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use taskflow_client::Result as ClientResult;
    use taskflow_types::{error::TaskflowError, Task};

    struct FakeBroker {
        ready_calls: AtomicUsize,
        ack_calls: AtomicUsize,
        nack_calls: AtomicUsize,
    }

    impl FakeBroker {
        fn new() -> Self {
            Self {
                ready_calls: AtomicUsize::new(0),
                ack_calls: AtomicUsize::new(0),
                nack_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BrokerClient for FakeBroker {
        async fn ready(&self, _e: &str, _h: &str, _t: &str) -> ClientResult<()> {
            self.ready_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn deregister(&self, _e: &str) -> ClientResult<()> {
            Ok(())
        }
        async fn ack(&self, _id: Uuid, _output: Option<Value>) -> ClientResult<()> {
            self.ack_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn nack(&self, _id: Uuid) -> ClientResult<()> {
            self.nack_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn fail(&self, _id: Uuid, _status: Option<Value>) -> ClientResult<()> {
            Ok(())
        }
        async fn update_state(&self, _id: Uuid, _state: Value) -> ClientResult<()> {
            Ok(())
        }
        async fn reschedule(&self, _id: Uuid, _ts: i64) -> ClientResult<()> {
            Ok(())
        }
        async fn create_task(&self, _name: &str, _input: Value, _workspace_id: i64) -> ClientResult<Uuid> {
            Ok(Uuid::new_v4())
        }
        async fn get_task(&self, _id: Uuid) -> ClientResult<Task> {
            Err(TaskflowError::NotFound("not used in tests".into()))
        }
    }

    #[tokio::test]
    async fn start_advertises_readiness_once_per_slot() {
        let broker = Arc::new(FakeBroker::new());
        let manager = SlotManager::new(broker.clone(), "http://w/consume", "http://w/health", "hello", 1);
        manager.start().await;
        assert_eq!(broker.ready_calls.load(Ordering::SeqCst), 1);
        // No capacity left — a second start() is a no-op.
        manager.start().await;
        assert_eq!(broker.ready_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn execute_task_acks_on_success() {
        let broker = Arc::new(FakeBroker::new());
        let manager = SlotManager::new(broker.clone(), "http://w/consume", "http://w/health", "hello", 1);
        manager.start().await;
        let task_id = Uuid::new_v4();
        manager
            .execute_task(task_id, || async { TaskOutcome::Succeeded(Some(Value::Bool(true))) })
            .await;
        assert_eq!(broker.ack_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn execute_task_nacks_when_capacity_exhausted() {
        let broker = Arc::new(FakeBroker::new());
        let manager = SlotManager::new(broker.clone(), "http://w/consume", "http://w/health", "hello", 1);
        // Simulate a race: another task is already occupying the single
        // local slot when this one is dispatched.
        {
            let mut slots = manager.slots.lock().await;
            slots.in_flight.insert(Uuid::new_v4());
        }
        let task_id = Uuid::new_v4();
        manager.execute_task(task_id, || async { TaskOutcome::Succeeded(None) }).await;
        assert_eq!(broker.nack_calls.load(Ordering::SeqCst), 1);
    }
}
