//! The push-then-pull sync orchestrator.
//!
//! State machine `Idle -> Syncing -> Idle`, never a fatal terminal state.
//! A running cycle ignores new triggers; the next natural trigger catches
//! up later. PUSH walks the adapters sequentially in dependency order
//! (parents before children); PULL is entered afterwards regardless of
//! push outcome and never rolls back an already-successful push.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use super::report::SyncReport;
use crate::adapters::SyncAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    Idle,
    Syncing,
}

/// Published on a watch channel so an embedding UI can render a sync
/// indicator without polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub last_report: Option<SyncReport>,
}

pub struct SyncOrchestrator {
    /// Dependency order: parents strictly before children. The same order
    /// serves PULL, where parent collections must land first.
    adapters: Vec<Arc<dyn SyncAdapter>>,
    syncing: AtomicBool,
    status_tx: watch::Sender<SyncStatus>,
}

impl SyncOrchestrator {
    pub fn new(adapters: Vec<Arc<dyn SyncAdapter>>) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus {
            phase: SyncPhase::Idle,
            last_report: None,
        });
        Self {
            adapters,
            syncing: AtomicBool::new(false),
            status_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Run one push-then-pull cycle. Returns `None` when a cycle is
    /// already in flight (re-entrancy guard).
    #[tracing::instrument(name = "sync.cycle", skip(self))]
    pub async fn run_cycle(&self) -> Option<SyncReport> {
        if self.syncing.swap(true, Ordering::SeqCst) {
            debug!("sync cycle already in flight, trigger ignored");
            return None;
        }

        let last_report = self.status_tx.borrow().last_report.clone();
        self.status_tx.send_replace(SyncStatus {
            phase: SyncPhase::Syncing,
            last_report,
        });

        let report = self.cycle().await;
        info!(
            pushed = report.total_pushed(),
            applied = report.total_applied(),
            clean = report.clean(),
            "sync cycle finished"
        );

        self.syncing.store(false, Ordering::SeqCst);
        self.status_tx.send_replace(SyncStatus {
            phase: SyncPhase::Idle,
            last_report: Some(report.clone()),
        });
        Some(report)
    }

    async fn cycle(&self) -> SyncReport {
        let mut report = SyncReport {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        // PUSH, strictly sequential: a child row must not go out before
        // its parent's create has assigned the server identity its
        // foreign key needs.
        for adapter in &self.adapters {
            report.push.push(adapter.push_pending().await);
        }

        // PULL regardless of push outcome; per-entity failures are
        // recorded and the remaining collections still refresh.
        for adapter in &self.adapters {
            report.pull.push(adapter.pull().await);
        }

        report.finished_at = Some(Utc::now());
        report
    }
}
