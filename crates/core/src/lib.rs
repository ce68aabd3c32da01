//! Arbor core library.
//!
//! This crate provides the pieces behind a live branch-tree dashboard:
//! the snapshot data model, the reconciliation engine that merges fresh
//! scans into the displayed view, the adaptive poll scheduler, the shared
//! view registry, configuration, and the scanner payload boundary.

pub mod config;
pub mod errors;
pub mod ingest;
pub mod models;
pub mod reconcile;
pub mod registry;
pub mod scheduler;
pub mod view;

// Re-exports for convenience.
pub use config::AppConfig;
pub use errors::CoreError;
pub use models::{Edge, Node, PendingChanges, ScanSnapshot};
pub use registry::{RegistryEvent, ViewRegistry};
pub use scheduler::{PollScheduler, SchedulerHandle};
pub use view::{NodeEdit, ReconcileMessage, RepoView, ViewEvent};
