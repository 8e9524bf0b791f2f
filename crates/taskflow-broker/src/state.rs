//! Shared server state handed to every handler and background loop via
//! `Extension`.

use std::sync::Arc;

use taskflow_types::{ConsumerRegistry, TaskStore};

#[derive(Clone)]
pub struct AppState {
    pub tasks: Arc<dyn TaskStore>,
    pub consumers: Arc<dyn ConsumerRegistry>,
}
