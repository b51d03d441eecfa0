//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the school backend, for embedders constructing a
    /// `BackendClient`.
    pub base_url: String,
    /// Mirror database location; `None` keeps the mirror in memory.
    pub db_path: Option<PathBuf>,
    /// Bounded per-request timeout so a stalled call cannot block a cycle.
    pub request_timeout_secs: u64,
    /// Fixed liveness-probe interval.
    pub probe_interval_secs: u64,
    /// Settle delay before the startup sync trigger fires.
    pub settle_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            db_path: None,
            request_timeout_secs: 10,
            probe_interval_secs: 30,
            settle_delay_ms: 1500,
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
