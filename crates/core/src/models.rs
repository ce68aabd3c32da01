//! Data model shared by the scanner boundary, the reconciliation engine, and
//! the displayed view.
//!
//! Every type here is plain serializable data. Field names are camelCase on
//! the wire to match the JSON produced by the scanning collaborator.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of a git branch; the key of a [`Node`].
pub type BranchName = String;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The full observed state of a repository's branch tree at one instant.
///
/// Snapshots are treated as immutable values: every merge produces a new one.
/// `branch_name` is unique within `nodes`; that is checked once by
/// [`crate::ingest::validate_snapshot`] and assumed everywhere else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub edges: Vec<Edge>,

    #[serde(default)]
    pub warnings: Vec<ScanWarning>,

    #[serde(default)]
    pub worktrees: Vec<WorktreeInfo>,

    /// Branch naming / planning rules. Opaque to the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Value>,

    /// Restart hint from the scanner. Opaque to the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<Value>,

    /// User-designed tree layout. Opaque to the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_spec: Option<Value>,
}

impl ScanSnapshot {
    /// Look up a node by branch name.
    pub fn node(&self, branch: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.branch_name == branch)
    }

    /// Whether a node with this branch name exists.
    pub fn contains(&self, branch: &str) -> bool {
        self.node(branch).is_some()
    }

    /// Parent of `child` according to this snapshot's edges.
    pub fn parent_of(&self, child: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|e| e.child == child)
            .map(|e| e.parent.as_str())
    }

    /// True when any worktree, listed on its own or attached to a node, has
    /// uncommitted changes.
    pub fn has_dirty_worktree(&self) -> bool {
        self.worktrees
            .iter()
            .chain(self.nodes.iter().filter_map(|n| n.worktree.as_ref()))
            .any(|w| w.is_dirty)
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One branch in the tree.
///
/// Everything except `branch_name` is a *safe field*: it can be overwritten
/// by a scan without asking the user. A node's existence is structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub branch_name: BranchName,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ahead_behind: Option<AheadBehind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_ahead_behind: Option<AheadBehind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<WorktreeInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<PrInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub badges: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Node {
    /// A node with no attributes set.
    pub fn new(branch_name: impl Into<BranchName>) -> Self {
        Self {
            branch_name: branch_name.into(),
            ahead_behind: None,
            remote_ahead_behind: None,
            worktree: None,
            pr: None,
            last_commit_at: None,
            badges: Vec::new(),
            description: None,
        }
    }

    /// Structural equality over the safe fields only.
    pub fn safe_fields_eq(&self, other: &Node) -> bool {
        self.ahead_behind == other.ahead_behind
            && self.remote_ahead_behind == other.remote_ahead_behind
            && self.worktree == other.worktree
            && self.pr == other.pr
            && self.last_commit_at == other.last_commit_at
            && self.badges == other.badges
            && self.description == other.description
    }
}

/// Commit distance between a branch and its comparison point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AheadBehind {
    pub ahead: u32,
    pub behind: u32,
}

impl AheadBehind {
    pub fn new(ahead: u32, behind: u32) -> Self {
        Self { ahead, behind }
    }
}

/// A git worktree as reported by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeInfo {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchName>,

    #[serde(default)]
    pub is_dirty: bool,

    #[serde(default)]
    pub is_active: bool,
}

/// Pull request attached to a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrInfo {
    pub number: u64,
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    pub state: PrState,

    #[serde(default)]
    pub is_draft: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_decision: Option<String>,
}

/// GitHub pull request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Closed => write!(f, "CLOSED"),
            Self::Merged => write!(f, "MERGED"),
        }
    }
}

/// A non-fatal problem the scanner wants surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    pub code: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// How sure the scanner is about a parent/child relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Known,
    Unknown,
}

/// A parent -> child relationship between two branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub parent: BranchName,
    pub child: BranchName,
    pub confidence: Confidence,

    /// Provisional edge assigned to a newly discovered branch.
    #[serde(default)]
    pub is_inferred: bool,

    /// Edge the user authored explicitly.
    #[serde(default)]
    pub is_designed: bool,
}

impl Edge {
    /// An edge the scanner is certain about.
    pub fn known(parent: impl Into<BranchName>, child: impl Into<BranchName>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
            confidence: Confidence::Known,
            is_inferred: false,
            is_designed: false,
        }
    }

    /// A provisional edge awaiting user correction.
    pub fn inferred(parent: impl Into<BranchName>, child: impl Into<BranchName>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
            confidence: Confidence::Unknown,
            is_inferred: true,
            is_designed: false,
        }
    }

    /// An edge the user drew by hand.
    pub fn designed(parent: impl Into<BranchName>, child: impl Into<BranchName>) -> Self {
        Self {
            is_designed: true,
            ..Self::known(parent, child)
        }
    }
}

// ---------------------------------------------------------------------------
// Pending changes
// ---------------------------------------------------------------------------

/// Structural changes held back until the user applies or discards them.
///
/// Only [`crate::reconcile::DiffAnalyzer`] constructs this, and only when at
/// least one of `edges_changed`, `nodes_deleted`, `designed_edges_changed`
/// holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChanges {
    pub edges_changed: bool,
    pub nodes_deleted: Vec<BranchName>,
    pub designed_edges_changed: bool,
    pub new_branches: Vec<BranchName>,
    pub version: u64,
    /// The complete incoming snapshot, adopted wholesale on apply.
    pub snapshot: ScanSnapshot,
}

impl fmt::Display for PendingChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::reconcile::SummaryFormatter::format(self))
    }
}

// ---------------------------------------------------------------------------
// Field timestamps
// ---------------------------------------------------------------------------

/// The node fields protected against stale scans by local-edit timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimestampedField {
    AheadBehind,
    RemoteAheadBehind,
    Worktree,
}

impl fmt::Display for TimestampedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AheadBehind => write!(f, "aheadBehind"),
            Self::RemoteAheadBehind => write!(f, "remoteAheadBehind"),
            Self::Worktree => write!(f, "worktree"),
        }
    }
}

/// When each protected field of one branch was last changed locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTimestamps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ahead_behind: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_ahead_behind: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<DateTime<Utc>>,
}

impl FieldTimestamps {
    pub fn get(&self, field: TimestampedField) -> Option<DateTime<Utc>> {
        match field {
            TimestampedField::AheadBehind => self.ahead_behind,
            TimestampedField::RemoteAheadBehind => self.remote_ahead_behind,
            TimestampedField::Worktree => self.worktree,
        }
    }

    fn slot(&mut self, field: TimestampedField) -> &mut Option<DateTime<Utc>> {
        match field {
            TimestampedField::AheadBehind => &mut self.ahead_behind,
            TimestampedField::RemoteAheadBehind => &mut self.remote_ahead_behind,
            TimestampedField::Worktree => &mut self.worktree,
        }
    }
}

/// Per-branch local edit instants, keyed by branch name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeFieldTimestamps(HashMap<BranchName, FieldTimestamps>);

impl NodeFieldTimestamps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instant at which `field` of `branch` was last edited locally.
    pub fn get(&self, branch: &str, field: TimestampedField) -> Option<DateTime<Utc>> {
        self.0.get(branch).and_then(|ts| ts.get(field))
    }

    /// Record a local edit. Later instants overwrite earlier ones.
    pub fn record(
        &mut self,
        branch: impl Into<BranchName>,
        field: TimestampedField,
        at: DateTime<Utc>,
    ) {
        let slot = self.0.entry(branch.into()).or_default().slot(field);
        if slot.map_or(true, |existing| at > existing) {
            *slot = Some(at);
        }
    }

    /// Drop timestamps for branches no longer displayed.
    pub fn retain_branches(&mut self, snapshot: &ScanSnapshot) {
        self.0.retain(|branch, _| snapshot.contains(branch));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_snapshot_parses_camel_case() {
        let json = r#"{
            "nodes": [
                {
                    "branchName": "feature/a",
                    "aheadBehind": {"ahead": 2, "behind": 1},
                    "pr": {"number": 7, "title": "Add a", "state": "MERGED"},
                    "badges": ["stale"]
                }
            ],
            "edges": [
                {"parent": "main", "child": "feature/a", "confidence": "known"}
            ],
            "worktrees": [{"path": "/src/repo", "branch": "main", "isDirty": true}],
            "treeSpec": {"roots": ["main"]}
        }"#;

        let snapshot: ScanSnapshot = serde_json::from_str(json).unwrap();
        let node = snapshot.node("feature/a").unwrap();
        assert_eq!(node.ahead_behind, Some(AheadBehind::new(2, 1)));
        assert_eq!(node.pr.as_ref().unwrap().state, PrState::Merged);
        assert_eq!(snapshot.parent_of("feature/a"), Some("main"));
        assert!(!snapshot.edges[0].is_designed);
        assert!(snapshot.has_dirty_worktree());
        assert!(snapshot.tree_spec.is_some());
    }

    #[test]
    fn test_safe_fields_eq_ignores_nothing_but_name() {
        let mut a = Node::new("a");
        let mut b = Node::new("b");
        assert!(a.safe_fields_eq(&b));

        b.badges.push("wip".into());
        assert!(!a.safe_fields_eq(&b));

        a.badges.push("wip".into());
        assert!(a.safe_fields_eq(&b));
    }

    #[test]
    fn test_designed_edge_is_known() {
        let edge = Edge::designed("main", "feature/x");
        assert!(edge.is_designed);
        assert!(!edge.is_inferred);
        assert_eq!(edge.confidence, Confidence::Known);
    }

    #[test]
    fn test_record_keeps_latest_instant() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 5).unwrap();

        let mut ts = NodeFieldTimestamps::new();
        ts.record("b", TimestampedField::Worktree, t1);
        ts.record("b", TimestampedField::Worktree, t0);

        assert_eq!(ts.get("b", TimestampedField::Worktree), Some(t1));
        assert_eq!(ts.get("b", TimestampedField::AheadBehind), None);
        assert_eq!(ts.get("missing", TimestampedField::Worktree), None);
    }

    #[test]
    fn test_retain_branches_drops_removed() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut ts = NodeFieldTimestamps::new();
        ts.record("gone", TimestampedField::AheadBehind, t0);
        ts.record("kept", TimestampedField::AheadBehind, t0);

        let snapshot = ScanSnapshot {
            nodes: vec![Node::new("kept")],
            ..Default::default()
        };
        ts.retain_branches(&snapshot);

        assert!(ts.get("gone", TimestampedField::AheadBehind).is_none());
        assert!(ts.get("kept", TimestampedField::AheadBehind).is_some());
    }

    #[test]
    fn test_timestamps_serialize_as_map() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut ts = NodeFieldTimestamps::new();
        ts.record("b", TimestampedField::AheadBehind, t0);

        let json = serde_json::to_value(&ts).unwrap();
        assert!(json["b"]["aheadBehind"].is_string());
    }
}
