//! Adaptive re-scan scheduler.
//!
//! Decides *when* the external scanner should be asked for a new snapshot.
//! The cadence depends on whether the dashboard is visible, whether any
//! worktree is dirty, and whether the user is in the middle of editing an
//! edge. Scans are fire-and-forget: the scheduler hands the request to a
//! [`ScanTrigger`] and re-arms immediately without waiting for the result.
//!
//! The scheduler runs as a tokio task. Callers talk to it through a
//! [`SchedulerHandle`], which sends typed [`SchedulerSignal`]s and exposes the
//! latest [`SchedulerStatus`] via a watch channel.

pub mod state;

use std::future;
use std::panic::{self, AssertUnwindSafe};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

use crate::errors::SchedulerError;

pub use state::{
    PollIntervals, PollState, SchedulerInputs, SchedulerSignal, SchedulerState, SchedulerStatus,
    Visibility,
};

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// A request for the scanner to produce a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub local_path: String,
}

/// Receives scan requests from the scheduler.
///
/// Implementations must return quickly; long-running work belongs on the
/// other side of a channel. Errors and panics are logged by the scheduler
/// and never stop it.
pub trait ScanTrigger: Send + Sync + 'static {
    fn trigger_scan(&self, local_path: &str) -> anyhow::Result<()>;
}

impl<F> ScanTrigger for F
where
    F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn trigger_scan(&self, local_path: &str) -> anyhow::Result<()> {
        self(local_path)
    }
}

impl ScanTrigger for mpsc::UnboundedSender<ScanRequest> {
    fn trigger_scan(&self, local_path: &str) -> anyhow::Result<()> {
        self.send(ScanRequest {
            local_path: local_path.to_string(),
        })
        .map_err(|_| anyhow::anyhow!("scan request receiver dropped"))
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

enum Command {
    Signal(SchedulerSignal),
    Shutdown,
}

/// Owner-side handle to a running poll scheduler.
///
/// Dropping the handle aborts the task; [`shutdown`](Self::shutdown) stops it
/// cleanly and may be called any number of times.
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SchedulerStatus>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn set_enabled(&self, enabled: bool) -> Result<(), SchedulerError> {
        self.signal(SchedulerSignal::SetEnabled(enabled))
    }

    pub fn set_local_path(&self, local_path: Option<String>) -> Result<(), SchedulerError> {
        self.signal(SchedulerSignal::SetLocalPath(local_path))
    }

    pub fn set_editing_edge(&self, editing: bool) -> Result<(), SchedulerError> {
        self.signal(SchedulerSignal::SetEditingEdge(editing))
    }

    pub fn set_dirty_worktree(&self, dirty: bool) -> Result<(), SchedulerError> {
        self.signal(SchedulerSignal::SetDirtyWorktree(dirty))
    }

    pub fn set_visibility(&self, visibility: Visibility) -> Result<(), SchedulerError> {
        self.signal(SchedulerSignal::SetVisibility(visibility))
    }

    /// Send an arbitrary input change.
    pub fn signal(&self, signal: SchedulerSignal) -> Result<(), SchedulerError> {
        self.commands
            .send(Command::Signal(signal))
            .map_err(|_| SchedulerError::Stopped)
    }

    /// Latest published status.
    pub fn status(&self) -> SchedulerStatus {
        self.status.borrow().clone()
    }

    /// A receiver that is notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status.clone()
    }

    /// Cancel the armed timer and stop the task.
    pub async fn shutdown(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                warn!(error = %e, "poll scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler task
// ---------------------------------------------------------------------------

/// The poll scheduler actor.
pub struct PollScheduler<T: ScanTrigger> {
    state: PollState,
    trigger: T,
    commands: mpsc::UnboundedReceiver<Command>,
    status_tx: watch::Sender<SchedulerStatus>,
}

impl<T: ScanTrigger> PollScheduler<T> {
    /// Start a scheduler on the current tokio runtime.
    ///
    /// The first timer is armed before this returns, so the returned
    /// handle's status already reflects the initial interval.
    pub fn spawn(intervals: PollIntervals, inputs: SchedulerInputs, trigger: T) -> SchedulerHandle {
        let now = Instant::now();
        let mut state = PollState::new(intervals, inputs, now);
        state.schedule(now);

        let (status_tx, status_rx) = watch::channel(state.status());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        info!(
            interval_secs = state.current_interval().as_secs(),
            state = %state.state(),
            "poll scheduler started"
        );

        let scheduler = Self {
            state,
            trigger,
            commands: command_rx,
            status_tx,
        };
        let task = tokio::spawn(scheduler.run());

        SchedulerHandle {
            commands: command_tx,
            status: status_rx,
            task: Some(task),
        }
    }

    async fn run(mut self) {
        loop {
            let deadline = self.state.deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Signal(signal)) => {
                        if let Some(path) = self.state.apply(signal, Instant::now()) {
                            self.fire(&path);
                        }
                    }
                    Some(Command::Shutdown) | None => break,
                },
                _ = sleep_until(deadline) => {
                    if let Some(path) = self.state.on_timer(Instant::now()) {
                        self.fire(&path);
                    }
                }
            }

            self.publish();
        }

        self.state.cancel();
        self.publish();
        info!("poll scheduler stopped");
    }

    /// Invoke the trigger in isolation, then re-arm.
    fn fire(&mut self, path: &str) {
        self.publish();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.trigger.trigger_scan(path)));
        match outcome {
            Ok(Ok(())) => info!(path, "scan triggered"),
            Ok(Err(e)) => warn!(path, error = %e, "scan trigger failed"),
            Err(_) => error!(path, "scan trigger panicked"),
        }

        self.state.scan_dispatched(Instant::now());
    }

    fn publish(&self) {
        let status = self.state.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
