//! Application state for the API server.

use companion_coordinator::{CompanionConfig, Coordinator};
use std::sync::Arc;
use std::time::Instant;

pub struct AppState {
    pub coordinator: Arc<Coordinator>,

    /// Server start time, for the health check
    pub start_time: Instant,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            start_time: Instant::now(),
        }
    }

    /// Build the coordinator and its clients from configuration.
    pub async fn from_config(config: &CompanionConfig) -> companion_common::Result<Self> {
        let coordinator = Coordinator::new(config).await?;
        Ok(Self::new(Arc::new(coordinator)))
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
