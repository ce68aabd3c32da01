//! Displayed state of one repository and the single handler that mutates it.
//!
//! Every change to what the user sees goes through [`RepoView::handle`]:
//! completed scans, local edits of time-protected fields, and the user's
//! decision on held-back structural changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ReconcileError;
use crate::models::{
    AheadBehind, BranchName, Node, NodeFieldTimestamps, PendingChanges, ScanSnapshot,
    TimestampedField, WorktreeInfo,
};
use crate::reconcile::{AttributeMerger, DiffAnalyzer, EdgeInferencer};

// ---------------------------------------------------------------------------
// Messages and events
// ---------------------------------------------------------------------------

/// A local change to one time-protected node field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum NodeEdit {
    AheadBehind(Option<AheadBehind>),
    RemoteAheadBehind(Option<AheadBehind>),
    Worktree(Option<WorktreeInfo>),
}

impl NodeEdit {
    pub fn field(&self) -> TimestampedField {
        match self {
            Self::AheadBehind(_) => TimestampedField::AheadBehind,
            Self::RemoteAheadBehind(_) => TimestampedField::RemoteAheadBehind,
            Self::Worktree(_) => TimestampedField::Worktree,
        }
    }

    fn apply_to(self, node: &mut Node) {
        match self {
            Self::AheadBehind(value) => node.ahead_behind = value,
            Self::RemoteAheadBehind(value) => node.remote_ahead_behind = value,
            Self::Worktree(value) => node.worktree = value,
        }
    }
}

/// Input to [`RepoView::handle`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileMessage {
    /// A scanner run finished. `version` increases with every scan started;
    /// `scan_started_at` enables protection of fields edited during the scan.
    ScanCompleted {
        snapshot: ScanSnapshot,
        version: u64,
        scan_started_at: Option<DateTime<Utc>>,
    },
    LocalEdit {
        branch: BranchName,
        edit: NodeEdit,
        at: DateTime<Utc>,
    },
    ApplyPending,
    DiscardPending,
}

/// Outcome of one handled message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewEvent {
    /// Safe attributes were merged and nothing waits for confirmation.
    SnapshotUpdated {
        version: u64,
        new_branches: Vec<BranchName>,
        inferred_edges: usize,
    },
    /// Safe attributes were merged, structural changes are held back.
    ChangesPending {
        version: u64,
        summary: String,
        nodes_deleted: Vec<BranchName>,
        new_branches: Vec<BranchName>,
    },
    PendingApplied {
        version: u64,
    },
    PendingDiscarded {
        version: u64,
    },
    /// The scan was older than one already accepted.
    ScanIgnored {
        version: u64,
        last_version: u64,
    },
    FieldEdited {
        branch: BranchName,
        field: TimestampedField,
    },
}

// ---------------------------------------------------------------------------
// RepoView
// ---------------------------------------------------------------------------

/// What one repository currently shows, plus anything awaiting the user.
#[derive(Debug)]
pub struct RepoView {
    default_branch: BranchName,
    displayed: Arc<ScanSnapshot>,
    pending: Option<PendingChanges>,
    field_timestamps: NodeFieldTimestamps,
    last_version: Option<u64>,
}

impl RepoView {
    pub fn new(default_branch: impl Into<BranchName>, initial: ScanSnapshot) -> Self {
        Self {
            default_branch: default_branch.into(),
            displayed: Arc::new(initial),
            pending: None,
            field_timestamps: NodeFieldTimestamps::new(),
            last_version: None,
        }
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    /// The snapshot on screen. Cheap to clone and safe to hold across updates.
    pub fn displayed(&self) -> Arc<ScanSnapshot> {
        Arc::clone(&self.displayed)
    }

    pub fn pending(&self) -> Option<&PendingChanges> {
        self.pending.as_ref()
    }

    pub fn field_timestamps(&self) -> &NodeFieldTimestamps {
        &self.field_timestamps
    }

    /// Version of the last accepted scan, if any.
    pub fn last_version(&self) -> Option<u64> {
        self.last_version
    }

    pub fn handle(&mut self, msg: ReconcileMessage) -> Result<ViewEvent, ReconcileError> {
        match msg {
            ReconcileMessage::ScanCompleted {
                snapshot,
                version,
                scan_started_at,
            } => Ok(self.on_scan(snapshot, version, scan_started_at)),
            ReconcileMessage::LocalEdit { branch, edit, at } => {
                self.on_local_edit(branch, edit, at)
            }
            ReconcileMessage::ApplyPending => self.on_apply(),
            ReconcileMessage::DiscardPending => self.on_discard(),
        }
    }

    fn on_scan(
        &mut self,
        incoming: ScanSnapshot,
        version: u64,
        scan_started_at: Option<DateTime<Utc>>,
    ) -> ViewEvent {
        if let Some(last_version) = self.last_version.filter(|last| version <= *last) {
            warn!(version, last_version, "dropping out-of-order scan result");
            return ViewEvent::ScanIgnored {
                version,
                last_version,
            };
        }
        self.last_version = Some(version);

        let analysis = DiffAnalyzer::analyze(&self.displayed, &incoming, version);

        let merged = AttributeMerger::merge_with_timestamps(
            &self.displayed,
            &incoming,
            &self.field_timestamps,
            scan_started_at,
        );
        let edges = EdgeInferencer::infer_edges_for_new_branches(
            &merged.edges,
            &analysis.new_branches,
            &incoming.edges,
            &self.default_branch,
        );
        let inferred_edges = edges.len() - merged.edges.len();
        self.displayed = Arc::new(ScanSnapshot { edges, ..merged });

        match analysis.pending_changes {
            Some(pending) => {
                if let Some(previous) = &self.pending {
                    debug!(
                        previous = previous.version,
                        version, "superseding pending changes"
                    );
                }
                let event = ViewEvent::ChangesPending {
                    version,
                    summary: pending.to_string(),
                    nodes_deleted: pending.nodes_deleted.clone(),
                    new_branches: pending.new_branches.clone(),
                };
                self.pending = Some(pending);
                event
            }
            None => {
                // The scan matches the displayed topology again, so anything
                // held back from an earlier scan no longer applies.
                if let Some(stale) = self.pending.take() {
                    info!(
                        stale = stale.version,
                        version, "structural changes reverted by newer scan"
                    );
                }
                ViewEvent::SnapshotUpdated {
                    version,
                    new_branches: analysis.new_branches,
                    inferred_edges,
                }
            }
        }
    }

    fn on_local_edit(
        &mut self,
        branch: BranchName,
        edit: NodeEdit,
        at: DateTime<Utc>,
    ) -> Result<ViewEvent, ReconcileError> {
        let index = self
            .displayed
            .nodes
            .iter()
            .position(|n| n.branch_name == branch)
            .ok_or_else(|| ReconcileError::UnknownBranch(branch.clone()))?;

        let field = edit.field();
        let mut next = (*self.displayed).clone();
        edit.apply_to(&mut next.nodes[index]);
        self.displayed = Arc::new(next);
        self.field_timestamps.record(branch.clone(), field, at);

        debug!(branch = %branch, %field, "local edit recorded");
        Ok(ViewEvent::FieldEdited { branch, field })
    }

    fn on_apply(&mut self) -> Result<ViewEvent, ReconcileError> {
        let pending = self.pending.take().ok_or(ReconcileError::NothingPending)?;
        let version = pending.version;

        self.displayed = Arc::new(pending.snapshot);
        self.field_timestamps.retain_branches(&self.displayed);

        info!(version, nodes = self.displayed.nodes.len(), "applied pending changes");
        Ok(ViewEvent::PendingApplied { version })
    }

    fn on_discard(&mut self) -> Result<ViewEvent, ReconcileError> {
        let pending = self.pending.take().ok_or(ReconcileError::NothingPending)?;
        info!(version = pending.version, "discarded pending changes");
        Ok(ViewEvent::PendingDiscarded {
            version: pending.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Edge;
    use crate::reconcile::fixtures::{basic_tree, node, node_ab, snapshot};
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn scan(snapshot: ScanSnapshot, version: u64) -> ReconcileMessage {
        ReconcileMessage::ScanCompleted {
            snapshot,
            version,
            scan_started_at: None,
        }
    }

    fn without_feature_b() -> ScanSnapshot {
        snapshot(
            vec![node("main"), node("feature/a")],
            vec![Edge::known("main", "feature/a")],
        )
    }

    #[test]
    fn test_safe_scan_updates_display() {
        let mut view = RepoView::new("main", basic_tree());
        let mut incoming = basic_tree();
        incoming.nodes[1] = node_ab("feature/a", 3, 1);

        let event = view.handle(scan(incoming, 1)).unwrap();

        assert_eq!(
            event,
            ViewEvent::SnapshotUpdated {
                version: 1,
                new_branches: vec![],
                inferred_edges: 0,
            }
        );
        let shown = view.displayed();
        assert_eq!(
            shown.node("feature/a").unwrap().ahead_behind,
            Some(AheadBehind::new(3, 1))
        );
        assert!(view.pending().is_none());
        assert_eq!(view.last_version(), Some(1));
    }

    #[test]
    fn test_new_branch_gets_inferred_edge() {
        let mut view = RepoView::new("main", basic_tree());
        let mut incoming = basic_tree();
        incoming.nodes.push(node("feature/c"));

        let event = view.handle(scan(incoming, 1)).unwrap();

        assert_eq!(
            event,
            ViewEvent::SnapshotUpdated {
                version: 1,
                new_branches: vec!["feature/c".to_string()],
                inferred_edges: 1,
            }
        );
        let shown = view.displayed();
        assert!(shown.contains("feature/c"));
        assert_eq!(shown.parent_of("feature/c"), Some("main"));
    }

    #[test]
    fn test_rescan_after_inference_stays_safe() {
        let mut view = RepoView::new("main", basic_tree());
        let mut incoming = basic_tree();
        incoming.nodes.push(node("feature/c"));

        view.handle(scan(incoming.clone(), 1)).unwrap();
        let event = view.handle(scan(incoming, 2)).unwrap();

        assert_eq!(
            event,
            ViewEvent::SnapshotUpdated {
                version: 2,
                new_branches: vec![],
                inferred_edges: 0,
            }
        );
        assert!(view.pending().is_none());
        assert_eq!(view.displayed().parent_of("feature/c"), Some("main"));
    }

    #[test]
    fn test_deletion_is_held_back_but_attributes_merge() {
        let mut view = RepoView::new("main", basic_tree());
        let mut incoming = without_feature_b();
        incoming.nodes[1] = node_ab("feature/a", 7, 0);

        let event = view.handle(scan(incoming, 1)).unwrap();

        match event {
            ViewEvent::ChangesPending {
                version,
                summary,
                nodes_deleted,
                ..
            } => {
                assert_eq!(version, 1);
                assert_eq!(summary, "1 branch deleted");
                assert_eq!(nodes_deleted, vec!["feature/b".to_string()]);
            }
            other => panic!("expected ChangesPending, got {other:?}"),
        }

        let shown = view.displayed();
        assert!(shown.contains("feature/b"), "topology must not change");
        assert_eq!(
            shown.node("feature/a").unwrap().ahead_behind,
            Some(AheadBehind::new(7, 0))
        );
        assert_eq!(view.pending().map(|p| p.version), Some(1));
    }

    #[test]
    fn test_stale_version_is_ignored() {
        let mut view = RepoView::new("main", basic_tree());
        view.handle(scan(basic_tree(), 5)).unwrap();

        let mut older = basic_tree();
        older.nodes[0] = node_ab("main", 9, 9);
        let event = view.handle(scan(older.clone(), 5)).unwrap();
        assert_eq!(
            event,
            ViewEvent::ScanIgnored {
                version: 5,
                last_version: 5,
            }
        );

        let event = view.handle(scan(older, 3)).unwrap();
        assert!(matches!(event, ViewEvent::ScanIgnored { version: 3, .. }));
        assert_eq!(view.displayed().node("main").unwrap().ahead_behind, None);
    }

    #[test]
    fn test_apply_adopts_pending_exactly_once() {
        let mut view = RepoView::new("main", basic_tree());
        view.handle(scan(without_feature_b(), 1)).unwrap();

        let event = view.handle(ReconcileMessage::ApplyPending).unwrap();
        assert_eq!(event, ViewEvent::PendingApplied { version: 1 });
        assert!(!view.displayed().contains("feature/b"));
        assert!(view.pending().is_none());

        assert_eq!(
            view.handle(ReconcileMessage::ApplyPending),
            Err(ReconcileError::NothingPending)
        );
    }

    #[test]
    fn test_discard_keeps_topology() {
        let mut view = RepoView::new("main", basic_tree());
        view.handle(scan(without_feature_b(), 1)).unwrap();

        let event = view.handle(ReconcileMessage::DiscardPending).unwrap();
        assert_eq!(event, ViewEvent::PendingDiscarded { version: 1 });
        assert!(view.displayed().contains("feature/b"));
        assert_eq!(
            view.handle(ReconcileMessage::DiscardPending),
            Err(ReconcileError::NothingPending)
        );
    }

    #[test]
    fn test_newer_pending_supersedes_older() {
        let mut view = RepoView::new("main", basic_tree());
        view.handle(scan(without_feature_b(), 1)).unwrap();

        let only_main = snapshot(vec![node("main")], vec![]);
        let event = view.handle(scan(only_main, 2)).unwrap();
        assert!(matches!(event, ViewEvent::ChangesPending { version: 2, .. }));

        let pending = view.pending().unwrap();
        assert_eq!(pending.version, 2);
        assert_eq!(pending.nodes_deleted.len(), 2);
    }

    #[test]
    fn test_reverted_structure_clears_pending() {
        let mut view = RepoView::new("main", basic_tree());
        view.handle(scan(without_feature_b(), 1)).unwrap();
        assert!(view.pending().is_some());

        let event = view.handle(scan(basic_tree(), 2)).unwrap();
        assert!(matches!(event, ViewEvent::SnapshotUpdated { version: 2, .. }));
        assert!(view.pending().is_none());
    }

    #[test]
    fn test_local_edit_survives_slower_scan() {
        let mut view = RepoView::new("main", basic_tree());

        let edit = ReconcileMessage::LocalEdit {
            branch: "feature/a".to_string(),
            edit: NodeEdit::AheadBehind(Some(AheadBehind::new(1, 0))),
            at: t(10),
        };
        assert_eq!(
            view.handle(edit).unwrap(),
            ViewEvent::FieldEdited {
                branch: "feature/a".to_string(),
                field: TimestampedField::AheadBehind,
            }
        );

        // Scan started before the edit: its stale value must not win.
        let mut stale = basic_tree();
        stale.nodes[1] = node_ab("feature/a", 0, 4);
        view.handle(ReconcileMessage::ScanCompleted {
            snapshot: stale,
            version: 1,
            scan_started_at: Some(t(5)),
        })
        .unwrap();
        assert_eq!(
            view.displayed().node("feature/a").unwrap().ahead_behind,
            Some(AheadBehind::new(1, 0))
        );

        // Scan started after the edit: incoming wins.
        let mut fresh = basic_tree();
        fresh.nodes[1] = node_ab("feature/a", 2, 0);
        view.handle(ReconcileMessage::ScanCompleted {
            snapshot: fresh,
            version: 2,
            scan_started_at: Some(t(20)),
        })
        .unwrap();
        assert_eq!(
            view.displayed().node("feature/a").unwrap().ahead_behind,
            Some(AheadBehind::new(2, 0))
        );
    }

    #[test]
    fn test_local_edit_unknown_branch() {
        let mut view = RepoView::new("main", basic_tree());
        let result = view.handle(ReconcileMessage::LocalEdit {
            branch: "nope".to_string(),
            edit: NodeEdit::Worktree(None),
            at: t(0),
        });
        assert_eq!(result, Err(ReconcileError::UnknownBranch("nope".to_string())));
        assert!(view.field_timestamps().is_empty());
    }

    #[test]
    fn test_apply_drops_timestamps_of_removed_branches() {
        let mut view = RepoView::new("main", basic_tree());
        view.handle(ReconcileMessage::LocalEdit {
            branch: "feature/b".to_string(),
            edit: NodeEdit::RemoteAheadBehind(Some(AheadBehind::new(0, 2))),
            at: t(1),
        })
        .unwrap();
        view.handle(scan(without_feature_b(), 1)).unwrap();
        view.handle(ReconcileMessage::ApplyPending).unwrap();

        assert!(view.field_timestamps().is_empty());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ViewEvent::PendingApplied { version: 4 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pending_applied");
        assert_eq!(json["version"], 4);
    }
}
