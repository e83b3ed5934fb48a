//! Shared application state.

use crate::config::Config;
use cadence_core::TrackerService;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
pub struct AppState {
    pub service: Arc<TrackerService>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> cadence_core::Result<Self> {
        // No remote directory in the single-binary deployment; the local
        // tables are the authority.
        let service = Arc::new(TrackerService::open(
            &config.db_path,
            None,
            Duration::from_millis(config.upstream_timeout_ms),
        )?);
        Ok(Self { service, config })
    }
}
