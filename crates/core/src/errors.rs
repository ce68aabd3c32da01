//! Error types for the Arbor core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type. The reconciliation functions themselves are total and have no
//! error type: malformed scanner output is rejected at the ingestion boundary
//! with a [`ScanError`] before it ever reaches them.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from loading or validating the TOML configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The TOML could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A field holds a value that fails validation.
    #[error("invalid value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O wrapper.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Scan / ingestion errors
// ---------------------------------------------------------------------------

/// Errors produced while obtaining or validating a scanner payload.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Two nodes in one snapshot share a branch name.
    #[error("duplicate branch '{0}' in scan snapshot")]
    DuplicateBranch(String),

    /// A node has an empty branch name.
    #[error("scan snapshot contains a node with an empty branch name")]
    EmptyBranchName,

    /// An edge has an empty parent or child.
    #[error("invalid edge '{parent}' -> '{child}': endpoints must be non-empty")]
    InvalidEdge { parent: String, child: String },

    /// The payload is not valid snapshot JSON.
    #[error("failed to parse scan snapshot: {0}")]
    ParseError(String),

    /// The scanner executable could not be found.
    #[error("scanner binary not found: {0}")]
    BinaryNotFound(String),

    /// The scanner command exited with a non-zero status.
    #[error("scanner command failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// The scanner command did not finish in time.
    #[error("scanner command timed out after {0}s")]
    Timeout(u64),

    /// Generic I/O wrapper.
    #[error("scanner I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Reconcile errors
// ---------------------------------------------------------------------------

/// Errors from applying a reconcile message to a displayed view.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// No view has been registered for the repository.
    #[error("unknown repository: {0}")]
    UnknownRepository(String),

    /// A local edit targeted a branch that is not displayed.
    #[error("branch '{0}' is not in the displayed snapshot")]
    UnknownBranch(String),

    /// Apply or discard was requested with no pending changes held.
    #[error("no pending changes to resolve")]
    NothingPending,
}

// ---------------------------------------------------------------------------
// Scheduler errors
// ---------------------------------------------------------------------------

/// Errors from talking to a poll scheduler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// The scheduler task has already shut down.
    #[error("poll scheduler has stopped")]
    Stopped,
}
