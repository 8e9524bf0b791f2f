use serde::{Deserialize, Serialize};

/// A worker instance's registration with the broker. `endpoint_url` is the
/// primary key; `is_ready` is the one-bit readiness token the broker
/// consumes atomically when leasing a task to this consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerRegistration {
    pub endpoint_url: String,
    pub health_url: String,
    pub topic: String,
    pub is_ready: bool,
}

/// Body of `PUT /consumer`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterConsumerRequest {
    pub endpoint_url: String,
    pub health_url: String,
    pub topic: String,
    #[serde(default)]
    pub ready: bool,
}

/// Body of `DELETE /consumer`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeregisterConsumerRequest {
    pub endpoint_url: String,
}
