//! Change classification between the displayed and an incoming snapshot.
//!
//! Given the snapshot currently on screen and a freshly scanned one, the
//! analyzer decides whether the difference can be merged silently (safe
//! attribute updates, newly discovered branches) or must be held back for
//! the user (deleted branches, re-parented branches, edited designed edges).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{BranchName, Edge, PendingChanges, ScanSnapshot};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Outcome of comparing two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffAnalysis {
    /// A safe field differs on a shared branch, or new branches appeared.
    pub has_safe_changes: bool,
    /// Branches were deleted or edges changed.
    pub has_unsafe_changes: bool,
    /// Present exactly when `has_unsafe_changes` is true.
    pub pending_changes: Option<PendingChanges>,
    /// Branches in the incoming snapshot that are not displayed yet.
    pub new_branches: Vec<BranchName>,
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Stateless snapshot diff classifier.
pub struct DiffAnalyzer;

impl DiffAnalyzer {
    /// Classify the changes from `current` to `incoming`.
    ///
    /// `version` is stamped onto the resulting [`PendingChanges`] so the
    /// caller can tell which scan it came from.
    pub fn analyze(current: &ScanSnapshot, incoming: &ScanSnapshot, version: u64) -> DiffAnalysis {
        let current_names: HashSet<&str> =
            current.nodes.iter().map(|n| n.branch_name.as_str()).collect();
        let incoming_nodes: HashMap<&str, _> = incoming
            .nodes
            .iter()
            .map(|n| (n.branch_name.as_str(), n))
            .collect();

        let nodes_deleted: Vec<BranchName> = current
            .nodes
            .iter()
            .filter(|n| !incoming_nodes.contains_key(n.branch_name.as_str()))
            .map(|n| n.branch_name.clone())
            .collect();

        let new_branches: Vec<BranchName> = incoming
            .nodes
            .iter()
            .filter(|n| !current_names.contains(n.branch_name.as_str()))
            .map(|n| n.branch_name.clone())
            .collect();

        let edges_changed = edges_changed(current, incoming, &nodes_deleted, &new_branches);
        let designed_edges_changed = designed_edges_changed(&current.edges, &incoming.edges);

        let attributes_changed = current.nodes.iter().any(|cur| {
            incoming_nodes
                .get(cur.branch_name.as_str())
                .is_some_and(|inc| !cur.safe_fields_eq(inc))
        });

        let has_safe_changes = attributes_changed || !new_branches.is_empty();
        let has_unsafe_changes =
            edges_changed || !nodes_deleted.is_empty() || designed_edges_changed;

        debug!(
            version,
            deleted = nodes_deleted.len(),
            new = new_branches.len(),
            edges_changed,
            designed_edges_changed,
            attributes_changed,
            "snapshot diff computed"
        );

        let pending_changes = if has_unsafe_changes {
            info!(
                version,
                deleted = nodes_deleted.len(),
                edges_changed,
                designed_edges_changed,
                "structural changes require confirmation"
            );
            Some(PendingChanges {
                edges_changed,
                nodes_deleted,
                designed_edges_changed,
                new_branches: new_branches.clone(),
                version,
                snapshot: incoming.clone(),
            })
        } else {
            None
        };

        DiffAnalysis {
            has_safe_changes,
            has_unsafe_changes,
            pending_changes,
            new_branches,
        }
    }
}

/// First parent recorded for each child.
fn parent_map(edges: &[Edge]) -> HashMap<&str, &str> {
    let mut map = HashMap::with_capacity(edges.len());
    for edge in edges {
        map.entry(edge.child.as_str()).or_insert(edge.parent.as_str());
    }
    map
}

/// Whether the scanner reports a parent for a branch on both sides that
/// differs from the displayed one, or that the branch previously lacked.
/// A displayed edge the scanner no longer reports is kept as is, which is
/// what keeps inferred edges stable across rescans. Edges of new branches go
/// through edge inference instead, and edges of deleted branches are already
/// reported as deletions.
fn edges_changed(
    current: &ScanSnapshot,
    incoming: &ScanSnapshot,
    nodes_deleted: &[BranchName],
    new_branches: &[BranchName],
) -> bool {
    let current_parents = parent_map(&current.edges);
    let incoming_parents = parent_map(&incoming.edges);

    let excluded: HashSet<&str> = nodes_deleted
        .iter()
        .chain(new_branches)
        .map(String::as_str)
        .collect();

    incoming_parents
        .iter()
        .filter(|(child, _)| !excluded.contains(*child))
        .any(|(child, parent)| current_parents.get(child) != Some(parent))
}

/// Whether the set of user-designed edges differs.
fn designed_edges_changed(current: &[Edge], incoming: &[Edge]) -> bool {
    let current_designed: Vec<&Edge> = current.iter().filter(|e| e.is_designed).collect();
    let incoming_designed: HashMap<&str, &str> = incoming
        .iter()
        .filter(|e| e.is_designed)
        .map(|e| (e.child.as_str(), e.parent.as_str()))
        .collect();

    let incoming_count = incoming.iter().filter(|e| e.is_designed).count();
    if current_designed.len() != incoming_count {
        return true;
    }

    current_designed
        .iter()
        .any(|e| incoming_designed.get(e.child.as_str()) != Some(&e.parent.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, PrInfo, PrState};
    use crate::reconcile::fixtures::{basic_tree, node, node_ab, snapshot};

    fn pr(state: PrState) -> PrInfo {
        PrInfo {
            number: 12,
            title: "Feature A".into(),
            url: None,
            state,
            is_draft: false,
            review_decision: None,
        }
    }

    #[test]
    fn test_identical_snapshots_have_no_changes() {
        let s = basic_tree();
        let analysis = DiffAnalyzer::analyze(&s, &s, 1);
        assert!(!analysis.has_safe_changes);
        assert!(!analysis.has_unsafe_changes);
        assert!(analysis.pending_changes.is_none());
        assert!(analysis.new_branches.is_empty());
    }

    #[test]
    fn test_pr_state_change_is_safe() {
        let mut current = snapshot(
            vec![node("main"), node("feature/a")],
            vec![Edge::known("main", "feature/a")],
        );
        current.nodes[1].pr = Some(pr(PrState::Merged));
        let mut incoming = current.clone();
        incoming.nodes[1].pr = Some(pr(PrState::Closed));

        let analysis = DiffAnalyzer::analyze(&current, &incoming, 2);
        assert!(analysis.has_safe_changes);
        assert!(!analysis.has_unsafe_changes);
        assert!(analysis.pending_changes.is_none());
    }

    #[test]
    fn test_new_leaf_branch_is_safe() {
        let current = basic_tree();
        let mut incoming = current.clone();
        incoming.nodes.push(node("feature/c"));
        incoming.edges.push(Edge::known("feature/a", "feature/c"));

        let analysis = DiffAnalyzer::analyze(&current, &incoming, 3);
        assert!(analysis.has_safe_changes);
        assert!(!analysis.has_unsafe_changes);
        assert_eq!(analysis.new_branches, vec!["feature/c".to_string()]);
    }

    #[test]
    fn test_deleted_branch_is_unsafe() {
        let current = basic_tree();
        let mut incoming = current.clone();
        incoming.nodes.retain(|n| n.branch_name != "feature/b");
        incoming.edges.retain(|e| e.child != "feature/b");

        let analysis = DiffAnalyzer::analyze(&current, &incoming, 4);
        assert!(analysis.has_unsafe_changes);
        let pending = analysis.pending_changes.unwrap();
        assert_eq!(pending.nodes_deleted, vec!["feature/b".to_string()]);
        assert!(!pending.edges_changed);
        assert_eq!(pending.version, 4);
        assert_eq!(pending.snapshot, incoming);
    }

    #[test]
    fn test_swap_of_branch_does_not_flag_edges() {
        let current = snapshot(
            vec![node("main"), node("feature/a")],
            vec![Edge::known("main", "feature/a")],
        );
        let incoming = snapshot(
            vec![node("main"), node("feature/b")],
            vec![Edge::known("main", "feature/b")],
        );

        let analysis = DiffAnalyzer::analyze(&current, &incoming, 5);
        let pending = analysis.pending_changes.unwrap();
        assert_eq!(pending.nodes_deleted, vec!["feature/a".to_string()]);
        assert_eq!(pending.new_branches, vec!["feature/b".to_string()]);
        assert!(!pending.edges_changed);
        assert!(!pending.designed_edges_changed);
    }

    #[test]
    fn test_reparent_is_unsafe() {
        let current = basic_tree();
        let mut incoming = current.clone();
        incoming.edges[1] = Edge::known("feature/a", "feature/b");

        let analysis = DiffAnalyzer::analyze(&current, &incoming, 6);
        assert!(analysis.has_unsafe_changes);
        assert!(!analysis.has_safe_changes);
        assert!(analysis.pending_changes.unwrap().edges_changed);
    }

    #[test]
    fn test_existing_branch_gaining_edge_is_unsafe() {
        let current = snapshot(vec![node("main"), node("orphan")], vec![]);
        let incoming = snapshot(
            vec![node("main"), node("orphan")],
            vec![Edge::known("main", "orphan")],
        );

        let analysis = DiffAnalyzer::analyze(&current, &incoming, 7);
        assert!(analysis.pending_changes.unwrap().edges_changed);
    }

    #[test]
    fn test_existing_branch_losing_edge_is_not_structural() {
        let current = basic_tree();
        let mut incoming = current.clone();
        incoming.edges.retain(|e| e.child != "feature/a");

        let analysis = DiffAnalyzer::analyze(&current, &incoming, 8);
        assert!(!analysis.has_unsafe_changes);
        assert!(analysis.pending_changes.is_none());
    }

    #[test]
    fn test_unreported_inferred_edge_is_not_structural() {
        let mut current = basic_tree();
        current.nodes.push(node("feature/c"));
        current.edges.push(Edge::inferred("main", "feature/c"));
        let mut incoming = basic_tree();
        incoming.nodes.push(node("feature/c"));

        let analysis = DiffAnalyzer::analyze(&current, &incoming, 9);
        assert!(!analysis.has_safe_changes);
        assert!(!analysis.has_unsafe_changes);
    }

    #[test]
    fn test_confidence_change_alone_is_not_structural() {
        let current = basic_tree();
        let mut incoming = current.clone();
        incoming.edges[0] = Edge::inferred("main", "feature/a");

        let analysis = DiffAnalyzer::analyze(&current, &incoming, 9);
        assert!(!analysis.has_unsafe_changes);
    }

    #[test]
    fn test_designed_edge_added() {
        let current = basic_tree();
        let mut incoming = current.clone();
        incoming.edges[1].is_designed = true;

        let analysis = DiffAnalyzer::analyze(&current, &incoming, 10);
        let pending = analysis.pending_changes.unwrap();
        assert!(pending.designed_edges_changed);
        assert!(!pending.edges_changed);
    }

    #[test]
    fn test_designed_edge_reparented() {
        let current = snapshot(
            vec![node("main"), node("dev"), node("feature/a")],
            vec![Edge::known("main", "dev"), Edge::designed("main", "feature/a")],
        );
        let mut incoming = current.clone();
        incoming.edges[1] = Edge::designed("dev", "feature/a");

        let analysis = DiffAnalyzer::analyze(&current, &incoming, 11);
        let pending = analysis.pending_changes.unwrap();
        assert!(pending.designed_edges_changed);
        assert!(pending.edges_changed);
    }

    #[test]
    fn test_ahead_behind_change_is_safe() {
        let current = snapshot(vec![node_ab("b", 1, 0)], vec![]);
        let incoming = snapshot(vec![node_ab("b", 5, 2)], vec![]);

        let analysis = DiffAnalyzer::analyze(&current, &incoming, 12);
        assert!(analysis.has_safe_changes);
        assert!(!analysis.has_unsafe_changes);
    }

    #[test]
    fn test_passthrough_fields_do_not_count_as_changes() {
        let current = basic_tree();
        let mut incoming = current.clone();
        incoming.rules = Some(serde_json::json!({"prefix": "feature/"}));

        let analysis = DiffAnalyzer::analyze(&current, &incoming, 13);
        assert!(!analysis.has_safe_changes);
        assert!(!analysis.has_unsafe_changes);
    }
}
