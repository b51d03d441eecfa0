//! Per-cycle sync statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::storage::UpsertSummary;

/// Outcome of the PUSH phase for one entity type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityPush {
    pub entity: String,
    /// Rows confirmed by the remote (including purely local removals).
    pub pushed: usize,
    /// Rows that failed transiently and will retry next cycle.
    pub failed: usize,
    /// Rows the server rejected outright; they stay pending but are
    /// reported separately so an embedder can surface them.
    pub rejected: usize,
    /// Rows skipped because a parent reference is still local-only.
    pub deferred: usize,
}

/// Outcome of the PULL phase for one entity type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityPull {
    pub entity: String,
    pub fetched: usize,
    pub applied: usize,
    pub protected: usize,
    pub pruned: usize,
    pub error: Option<String>,
}

impl EntityPull {
    pub fn new(entity: &str) -> Self {
        EntityPull {
            entity: entity.to_string(),
            ..Default::default()
        }
    }

    pub fn absorb(&mut self, summary: &UpsertSummary) {
        self.fetched += summary.fetched;
        self.applied += summary.applied;
        self.protected += summary.protected;
        self.pruned += summary.pruned;
    }

    pub fn fail(&mut self, error: impl Display) {
        self.error = Some(error.to_string());
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub push: Vec<EntityPush>,
    pub pull: Vec<EntityPull>,
}

impl SyncReport {
    pub fn total_pushed(&self) -> usize {
        self.push.iter().map(|p| p.pushed).sum()
    }

    pub fn total_applied(&self) -> usize {
        self.pull.iter().map(|p| p.applied).sum()
    }

    /// True when every row pushed cleanly and every pull succeeded.
    pub fn clean(&self) -> bool {
        self.push
            .iter()
            .all(|p| p.failed == 0 && p.rejected == 0 && p.deferred == 0)
            && self.pull.iter().all(|p| p.error.is_none())
    }
}
