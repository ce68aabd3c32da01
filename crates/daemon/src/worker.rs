//! Scan worker that turns scheduler requests into registry updates.
//!
//! Each request runs the scanner once and dispatches the result as a
//! versioned `ScanCompleted`. A request that arrives while a scan is still
//! running is skipped rather than queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use arbor_core::scheduler::ScanRequest;
use arbor_core::{ReconcileMessage, ViewEvent, ViewRegistry};

use crate::scanner::CommandScanner;

/// Tracks aggregate statistics across scans.
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub total_scans: AtomicU64,
    pub skipped_scans: AtomicU64,
    pub total_errors: AtomicU64,
    pub consecutive_errors: AtomicU64,
}

impl WorkerStats {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "total_scans": self.total_scans.load(Ordering::SeqCst),
            "skipped_scans": self.skipped_scans.load(Ordering::SeqCst),
            "total_errors": self.total_errors.load(Ordering::SeqCst),
            "consecutive_errors": self.consecutive_errors.load(Ordering::SeqCst),
        })
    }
}

pub struct ScanWorker {
    repo: String,
    scanner: CommandScanner,
    registry: Arc<ViewRegistry>,
    running: AtomicBool,
    last_version: AtomicU64,
    stats: Arc<WorkerStats>,
}

impl ScanWorker {
    pub fn new(
        repo: impl Into<String>,
        scanner: CommandScanner,
        registry: Arc<ViewRegistry>,
    ) -> Self {
        Self {
            repo: repo.into(),
            scanner,
            registry,
            running: AtomicBool::new(false),
            last_version: AtomicU64::new(0),
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Serve requests until the sending side is dropped.
    ///
    /// Each request gets its own task so that a request arriving mid-scan
    /// reaches [`maybe_scan`](Self::maybe_scan) and is skipped there.
    pub async fn run(self: Arc<Self>, mut requests: mpsc::UnboundedReceiver<ScanRequest>) {
        info!(repo = %self.repo, "scan worker started");
        while let Some(request) = requests.recv().await {
            let worker = Arc::clone(&self);
            tokio::spawn(async move {
                worker.maybe_scan(&request.local_path).await;
            });
        }
        info!("scan worker stopped");
    }

    /// Run one scan unless another is in progress. Returns the registry's
    /// event when the result was dispatched.
    pub async fn maybe_scan(&self, local_path: &str) -> Option<ViewEvent> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let skipped = self.stats.skipped_scans.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(local_path, skipped, "skipping scan: previous scan still running");
            return None;
        }

        let version = self.last_version.fetch_add(1, Ordering::SeqCst) + 1;
        let scan_started_at = Utc::now();
        self.stats.total_scans.fetch_add(1, Ordering::SeqCst);
        info!(version, local_path, "starting scan");

        let event = match self.scanner.scan(local_path).await {
            Ok(snapshot) => {
                self.stats.consecutive_errors.store(0, Ordering::SeqCst);
                let nodes = snapshot.nodes.len();
                let msg = ReconcileMessage::ScanCompleted {
                    snapshot,
                    version,
                    scan_started_at: Some(scan_started_at),
                };
                match self.registry.dispatch(&self.repo, msg) {
                    Ok(event) => {
                        info!(version, nodes, "scan completed");
                        Some(event)
                    }
                    Err(e) => {
                        error!(version, error = %e, "failed to dispatch scan result");
                        None
                    }
                }
            }
            Err(e) => {
                let errors = self.stats.total_errors.fetch_add(1, Ordering::SeqCst) + 1;
                let consecutive = self.stats.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
                error!(
                    version,
                    error = %e,
                    total_errors = errors,
                    consecutive_errors = consecutive,
                    "scan failed"
                );
                None
            }
        };

        self.running.store(false, Ordering::SeqCst);
        event
    }
}
