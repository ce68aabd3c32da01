//! Line-oriented control channel on stdin.
//!
//! Each line is one command. Commands adjust the scheduler's inputs or
//! resolve held-back structural changes; `status` prints a JSON summary.

use std::io::BufRead;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use arbor_core::scheduler::{SchedulerHandle, Visibility};
use arbor_core::{ReconcileMessage, ViewRegistry};

use crate::worker::WorkerStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Visible,
    Hidden,
    EditBegin,
    EditEnd,
    Enable,
    Disable,
    Apply,
    Discard,
    Status,
}

impl FromStr for ControlCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let words: Vec<String> = line
            .split_whitespace()
            .map(|w| w.to_ascii_lowercase())
            .collect();
        let words: Vec<&str> = words.iter().map(String::as_str).collect();

        let cmd = match words.as_slice() {
            ["visible"] => Self::Visible,
            ["hidden"] => Self::Hidden,
            ["edit", "begin"] => Self::EditBegin,
            ["edit", "end"] => Self::EditEnd,
            ["enable"] => Self::Enable,
            ["disable"] => Self::Disable,
            ["apply"] => Self::Apply,
            ["discard"] => Self::Discard,
            ["status"] => Self::Status,
            _ => bail!("unknown control command: {:?}", line.trim()),
        };
        Ok(cmd)
    }
}

/// Everything a command may act on.
pub struct ControlContext<'a> {
    pub repo: &'a str,
    pub registry: &'a ViewRegistry,
    pub scheduler: &'a SchedulerHandle,
    pub stats: &'a WorkerStats,
}

impl ControlCommand {
    /// Carry out the command. `Status` returns a JSON line to print.
    pub fn execute(self, ctx: &ControlContext<'_>) -> Result<Option<String>> {
        debug!(command = ?self, "executing control command");
        match self {
            Self::Visible => ctx.scheduler.set_visibility(Visibility::Visible)?,
            Self::Hidden => ctx.scheduler.set_visibility(Visibility::Hidden)?,
            Self::EditBegin => ctx.scheduler.set_editing_edge(true)?,
            Self::EditEnd => ctx.scheduler.set_editing_edge(false)?,
            Self::Enable => ctx.scheduler.set_enabled(true)?,
            Self::Disable => ctx.scheduler.set_enabled(false)?,
            Self::Apply => {
                ctx.registry.dispatch(ctx.repo, ReconcileMessage::ApplyPending)?;
            }
            Self::Discard => {
                ctx.registry.dispatch(ctx.repo, ReconcileMessage::DiscardPending)?;
            }
            Self::Status => return Ok(Some(status_json(ctx).to_string())),
        }
        Ok(None)
    }
}

/// Parse and execute one control line. Failures are logged, never fatal.
pub fn handle_line(line: &str, ctx: &ControlContext<'_>) {
    let command = match line.parse::<ControlCommand>() {
        Ok(command) => command,
        Err(e) => {
            warn!(error = %e, "ignoring control line");
            return;
        }
    };

    match command.execute(ctx) {
        Ok(Some(output)) => println!("{output}"),
        Ok(None) => info!(?command, "control command applied"),
        Err(e) => warn!(?command, error = %e, "control command failed"),
    }
}

fn status_json(ctx: &ControlContext<'_>) -> serde_json::Value {
    let status = ctx.scheduler.status();
    let next_scan_in_secs = status
        .next_scan_time
        .map(|at| at.saturating_duration_since(Instant::now()))
        .map(|d: Duration| d.as_secs());
    let snapshot = ctx.registry.snapshot(ctx.repo);

    serde_json::json!({
        "type": "status",
        "repo": ctx.repo,
        "scheduler": {
            "state": status.state.to_string(),
            "interval_secs": status.interval.as_secs(),
            "is_scanning": status.is_scanning,
            "scans_triggered": status.scans_triggered,
            "next_scan_in_secs": next_scan_in_secs,
        },
        "view": {
            "nodes": snapshot.as_ref().map(|s| s.nodes.len()),
            "edges": snapshot.as_ref().map(|s| s.edges.len()),
            "dirty": snapshot.as_ref().is_some_and(|s| s.has_dirty_worktree()),
            "pending": ctx.registry.pending_summary(ctx.repo),
        },
        "worker": ctx.stats.to_json(),
    })
}

/// Forward stdin lines to `tx` from a dedicated thread.
///
/// A plain thread rather than a runtime task, so a read blocked on stdin
/// never holds up runtime shutdown. The thread ends on EOF or once the
/// receiver is gone.
pub fn spawn_stdin_reader(
    tx: mpsc::Sender<String>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("arbor-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
            info!("control channel closed");
        })
}
