//! Shared state passed to all API handlers

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::actors::TaskHandler;
use crate::queue::TaskQueue;
use crate::registry::MonitorRegistry;
use crate::storage::HealthStore;

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<dyn MonitorRegistry>,
    pub store: Arc<dyn HealthStore>,
    pub queue: Arc<dyn TaskQueue>,

    /// Source of the dispatch counters
    pub handler: Arc<TaskHandler>,

    pub started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(
        registry: Arc<dyn MonitorRegistry>,
        store: Arc<dyn HealthStore>,
        queue: Arc<dyn TaskQueue>,
        handler: Arc<TaskHandler>,
    ) -> Self {
        Self {
            registry,
            store,
            queue,
            handler,
            started_at: Utc::now(),
        }
    }
}
