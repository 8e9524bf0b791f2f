//! taskflow-broker — the task store's HTTP surface plus the three
//! background loops that make it an actual broker.
//!
//! Routes:
//!   POST /task                — submit a task                  (202)
//!   GET  /task/:id             — full task record
//!   GET  /task/:id/status      — status subset
//!   PUT  /task/:id             — apply a mutable-field update
//!   PUT  /consumer             — register / update readiness
//!   DELETE /consumer           — deregister
//!   GET  /health               — liveness
//!
//! Background loops:
//!   BrokerLoop   — matches ready consumers to eligible tasks (~200ms)
//!   HealthPruner — evicts consumers that fail their health check (~5s)
//!   Dispatcher   — POSTs a leased task's payload to its consumer

pub mod broker_loop;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod health_pruner;
pub mod router;
pub mod state;
