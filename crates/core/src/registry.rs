//! Shared owner of every repository view, with event fan-out.
//!
//! Constructed once by the composition root and shared via `Arc`. Each
//! dispatched message is handled under the registry lock, so updates for a
//! repository are applied one at a time in arrival order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::errors::ReconcileError;
use crate::models::ScanSnapshot;
use crate::view::{ReconcileMessage, RepoView, ViewEvent};

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A [`ViewEvent`] tagged with the repository it happened in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryEvent {
    pub repo: String,
    #[serde(flatten)]
    pub event: ViewEvent,
}

pub struct ViewRegistry {
    views: Mutex<HashMap<String, RepoView>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl ViewRegistry {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            views: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Register a repository with its initial snapshot. Returns `false` and
    /// leaves the existing view untouched if `repo` is already registered.
    pub fn init(&self, repo: &str, default_branch: &str, snapshot: ScanSnapshot) -> bool {
        let mut views = self.lock();
        if views.contains_key(repo) {
            debug!(repo, "view already initialised");
            return false;
        }
        info!(repo, default_branch, nodes = snapshot.nodes.len(), "view initialised");
        views.insert(repo.to_string(), RepoView::new(default_branch, snapshot));
        true
    }

    /// Receive every event from now on. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Handle `msg` in `repo`'s view and broadcast the resulting event.
    pub fn dispatch(&self, repo: &str, msg: ReconcileMessage) -> Result<ViewEvent, ReconcileError> {
        let event = {
            let mut views = self.lock();
            let view = views
                .get_mut(repo)
                .ok_or_else(|| ReconcileError::UnknownRepository(repo.to_string()))?;
            view.handle(msg)?
        };

        // No subscribers is not an error.
        let _ = self.events.send(RegistryEvent {
            repo: repo.to_string(),
            event: event.clone(),
        });
        Ok(event)
    }

    /// The displayed snapshot of `repo`.
    pub fn snapshot(&self, repo: &str) -> Option<Arc<ScanSnapshot>> {
        self.lock().get(repo).map(RepoView::displayed)
    }

    /// Summary of `repo`'s held-back changes, if any.
    pub fn pending_summary(&self, repo: &str) -> Option<String> {
        self.lock()
            .get(repo)
            .and_then(|view| view.pending().map(ToString::to_string))
    }

    pub fn repos(&self) -> Vec<String> {
        let mut repos: Vec<String> = self.lock().keys().cloned().collect();
        repos.sort();
        repos
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RepoView>> {
        // A panic while holding the lock cannot leave a view half-updated:
        // `RepoView::handle` only swaps in fully built values.
        self.views.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ViewRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
