//! Connectivity monitor.
//!
//! Network presence does not guarantee backend reachability, so two
//! independent signals are tracked: the platform's network-presence flag
//! (fed by the embedder) and a periodic liveness probe against the remote
//! system. The derived `fully_operational` flag is published on a watch
//! channel; the orchestrator subscribes and starts a cycle on every
//! transition to operational.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use gradebook_api::{ApiError, RemoteBackend};

pub struct ConnectivityMonitor {
    network_present: AtomicBool,
    probe_ok: AtomicBool,
    operational_tx: watch::Sender<bool>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    /// Starts with the network assumed present and the backend assumed
    /// unreachable until the first probe (or entity call) says otherwise.
    pub fn new() -> Self {
        let (operational_tx, _) = watch::channel(false);
        Self {
            network_present: AtomicBool::new(true),
            probe_ok: AtomicBool::new(false),
            operational_tx,
        }
    }

    /// Platform signal: the embedder feeds online/offline events here.
    pub fn set_network_present(&self, present: bool) {
        let was = self.network_present.swap(present, Ordering::SeqCst);
        if was != present {
            if present {
                info!("network present");
            } else {
                warn!("network lost, entering offline mode");
            }
        }
        self.publish();
    }

    /// Outcome of a liveness probe, or of any entity call that proves the
    /// backend (un)reachable faster than the probe interval would.
    pub fn record_probe(&self, ok: bool) {
        let was = self.probe_ok.swap(ok, Ordering::SeqCst);
        if was != ok {
            debug!(reachable = ok, "backend liveness changed");
        }
        self.publish();
    }

    /// Feed the outcome of an entity call back into the liveness flag. A
    /// rejection still proves the backend answered.
    pub fn note_success(&self) {
        self.record_probe(true);
    }

    pub fn note_error(&self, err: &ApiError) {
        if err.is_transport() {
            self.record_probe(false);
        } else {
            self.record_probe(true);
        }
    }

    /// Fast-fail routing hint only: an attempt may still fail and must
    /// fall back.
    pub fn network_present(&self) -> bool {
        self.network_present.load(Ordering::SeqCst)
    }

    pub fn fully_operational(&self) -> bool {
        self.network_present.load(Ordering::SeqCst) && self.probe_ok.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.operational_tx.subscribe()
    }

    fn publish(&self) {
        let operational = self.fully_operational();
        self.operational_tx.send_if_modified(|current| {
            if *current != operational {
                *current = operational;
                true
            } else {
                false
            }
        });
    }
}

/// Probe the backend at a fixed interval, forever. Runs as a background
/// task owned by the engine.
pub(crate) async fn run_probe_loop(
    monitor: Arc<ConnectivityMonitor>,
    remote: Arc<dyn RemoteBackend>,
    interval: Duration,
) {
    loop {
        let ok = match remote.ping().await {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "liveness probe failed");
                !err.is_transport()
            }
        };
        monitor.record_probe(ok);
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn operational_requires_both_signals() {
        let monitor = ConnectivityMonitor::new();
        assert!(!monitor.fully_operational());

        monitor.record_probe(true);
        assert!(monitor.fully_operational());

        monitor.set_network_present(false);
        assert!(!monitor.fully_operational());
        assert!(!monitor.network_present());

        monitor.set_network_present(true);
        assert!(monitor.fully_operational());
    }

    #[tokio::test]
    async fn transitions_are_published_once() {
        let monitor = ConnectivityMonitor::new();
        let mut rx = monitor.subscribe();
        assert!(!*rx.borrow());

        monitor.record_probe(true);
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());

        // Re-recording the same outcome publishes nothing new.
        monitor.record_probe(true);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn rejections_count_as_reachable() {
        let monitor = ConnectivityMonitor::new();
        monitor.note_error(&ApiError::Rejected {
            status: 400,
            message: "nope".to_string(),
        });
        assert!(monitor.fully_operational());

        monitor.note_error(&ApiError::Transport("down".to_string()));
        assert!(!monitor.fully_operational());
    }
}
