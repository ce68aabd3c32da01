//! Arbor daemon entry point.
//!
//! Loads configuration, seeds the repository view with an initial scan,
//! starts the poll scheduler and scan worker, and serves the stdin control
//! channel until a shutdown signal arrives. View events are written to
//! stdout as JSON lines; logs go to stderr.

mod control;
mod scanner;
mod signals;
mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use arbor_core::config::AppConfig;
use arbor_core::models::ScanSnapshot;
use arbor_core::scheduler::{
    PollScheduler, ScanRequest, SchedulerHandle, SchedulerInputs, Visibility,
};
use arbor_core::{RegistryEvent, ViewEvent, ViewRegistry};

use control::ControlContext;
use scanner::CommandScanner;
use worker::ScanWorker;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// Arbor branch-tree watcher daemon.
#[derive(Parser, Debug)]
#[command(
    name = "arbor-daemon",
    version,
    about = "Keeps a repository's branch tree in sync with adaptive re-scans"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config =
        AppConfig::load_and_validate(&args.config).context("failed to load configuration file")?;

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);
    let _log_guard = init_tracing(log_level, config.daemon.log_dir.as_deref())?;

    let repo = config.repository.repo_id();
    let local_path = config.repository.local_path.display().to_string();

    // Startup banner
    info!("========================================");
    info!("  Arbor Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file    : {}", args.config.display());
    info!("Repository     : {} ({})", repo, local_path);
    info!("Default branch : {}", config.repository.default_branch);
    info!("Scanner        : {}", config.scanner.command);
    info!(
        "Poll intervals : {}s dirty / {}s clean / {}s hidden",
        config.poll.active_dirty_secs, config.poll.active_clean_secs, config.poll.hidden_secs
    );
    info!("Polling        : {}", if config.poll.enabled { "enabled" } else { "disabled" });
    info!("Log level      : {}", log_level);
    info!("========================================");

    // Seed the view so the first displayed topology comes from the scanner
    // rather than from inference.
    let scanner = CommandScanner::from_config(&config.scanner);
    let initial = match scanner.scan(&local_path).await {
        Ok(snapshot) => {
            info!(
                nodes = snapshot.nodes.len(),
                edges = snapshot.edges.len(),
                "initial scan completed"
            );
            snapshot
        }
        Err(e) => {
            warn!(error = %e, "initial scan failed, starting with an empty view");
            ScanSnapshot::default()
        }
    };
    let initially_dirty = initial.has_dirty_worktree();

    let registry = Arc::new(ViewRegistry::default());
    registry.init(&repo, &config.repository.default_branch, initial);
    let mut events = registry.subscribe();

    // Scheduler -> worker
    let (scan_tx, scan_rx) = mpsc::unbounded_channel::<ScanRequest>();
    let worker = Arc::new(ScanWorker::new(repo.clone(), scanner, Arc::clone(&registry)));
    let stats = worker.stats();
    let worker_handle = tokio::spawn(Arc::clone(&worker).run(scan_rx));

    let inputs = SchedulerInputs {
        enabled: config.poll.enabled,
        local_path: Some(local_path),
        is_editing_edge: false,
        has_dirty_worktree: initially_dirty,
        visibility: Visibility::Visible,
    };
    let mut scheduler = PollScheduler::spawn(config.poll.intervals(), inputs, scan_tx);

    let (control_tx, mut control_rx) = mpsc::channel::<String>(32);
    control::spawn_stdin_reader(control_tx).context("failed to start control channel reader")?;
    let mut control_open = true;

    let shutdown = signals::wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                match signal {
                    Ok(signal) => info!(%signal, "shutdown signal received, stopping..."),
                    Err(e) => error!(error = %e, "failed to install signal handlers, stopping..."),
                }
                break;
            }
            line = control_rx.recv(), if control_open => match line {
                Some(line) => {
                    let ctx = ControlContext {
                        repo: &repo,
                        registry: &registry,
                        scheduler: &scheduler,
                        stats: &stats,
                    };
                    control::handle_line(&line, &ctx);
                }
                None => control_open = false,
            },
            event = events.recv() => match event {
                Ok(event) => {
                    emit(&event);
                    if !matches!(event.event, ViewEvent::ScanIgnored { .. }) {
                        sync_dirty_state(&registry, &repo, &scheduler);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged, some events were not printed");
                    sync_dirty_state(&registry, &repo, &scheduler);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    if tokio::time::timeout(Duration::from_secs(10), scheduler.shutdown())
        .await
        .is_err()
    {
        warn!("scheduler did not stop within 10s, forcing shutdown");
    }
    worker_handle.abort();

    info!("Arbor daemon stopped.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Console logging to stderr, plus a daily rolling file when `log_dir` is
/// set. The returned guard must live until exit to flush the file writer.
fn init_tracing(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "arbor-daemon.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

fn emit(event: &RegistryEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "failed to serialize view event"),
    }
}

/// Tell the scheduler whether the displayed snapshot has a dirty worktree.
fn sync_dirty_state(registry: &ViewRegistry, repo: &str, scheduler: &SchedulerHandle) {
    let dirty = registry
        .snapshot(repo)
        .is_some_and(|snapshot| snapshot.has_dirty_worktree());
    if let Err(e) = scheduler.set_dirty_worktree(dirty) {
        warn!(error = %e, "failed to update scheduler dirty state");
    }
}
