//! Safe-field merging of an incoming snapshot into the displayed one.
//!
//! The merger never changes topology: nodes missing from the scan are kept,
//! and edges plus the tree spec always come from the displayed snapshot.
//! Structural changes reach the display only through an explicit apply of
//! [`crate::models::PendingChanges`].

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{Node, NodeFieldTimestamps, ScanSnapshot, TimestampedField};

/// Stateless attribute merger.
pub struct AttributeMerger;

impl AttributeMerger {
    /// Adopt every safe field from `incoming` without timestamp protection.
    pub fn merge_plain(current: &ScanSnapshot, incoming: &ScanSnapshot) -> ScanSnapshot {
        merge(current, incoming, None)
    }

    /// Like [`merge_plain`](Self::merge_plain), but a time-protected field
    /// keeps its displayed value when it was edited locally strictly after
    /// `scan_start_time`. An edit at exactly `scan_start_time` is not
    /// protected. `None` disables protection.
    pub fn merge_with_timestamps(
        current: &ScanSnapshot,
        incoming: &ScanSnapshot,
        field_timestamps: &NodeFieldTimestamps,
        scan_start_time: Option<DateTime<Utc>>,
    ) -> ScanSnapshot {
        let protection = scan_start_time.map(|start| Protection {
            timestamps: field_timestamps,
            scan_start_time: start,
        });
        merge(current, incoming, protection.as_ref())
    }
}

struct Protection<'a> {
    timestamps: &'a NodeFieldTimestamps,
    scan_start_time: DateTime<Utc>,
}

impl Protection<'_> {
    fn keeps_current(&self, branch: &str, field: TimestampedField) -> bool {
        self.timestamps
            .get(branch, field)
            .is_some_and(|edited_at| edited_at > self.scan_start_time)
    }
}

fn merge(
    current: &ScanSnapshot,
    incoming: &ScanSnapshot,
    protection: Option<&Protection<'_>>,
) -> ScanSnapshot {
    let incoming_nodes: HashMap<&str, &Node> = incoming
        .nodes
        .iter()
        .map(|n| (n.branch_name.as_str(), n))
        .collect();
    let current_names: HashSet<&str> =
        current.nodes.iter().map(|n| n.branch_name.as_str()).collect();

    let mut protected = 0usize;
    let mut nodes: Vec<Node> = current
        .nodes
        .iter()
        .map(|cur| match incoming_nodes.get(cur.branch_name.as_str()) {
            Some(inc) => merge_node(cur, inc, protection, &mut protected),
            None => cur.clone(),
        })
        .collect();

    let appended_from = nodes.len();
    nodes.extend(
        incoming
            .nodes
            .iter()
            .filter(|n| !current_names.contains(n.branch_name.as_str()))
            .cloned(),
    );

    debug!(
        merged = appended_from,
        appended = nodes.len() - appended_from,
        protected,
        "merged safe fields"
    );

    ScanSnapshot {
        nodes,
        edges: current.edges.clone(),
        warnings: incoming.warnings.clone(),
        worktrees: incoming.worktrees.clone(),
        rules: incoming.rules.clone(),
        restart: incoming.restart.clone(),
        tree_spec: current.tree_spec.clone(),
    }
}

fn merge_node(
    cur: &Node,
    inc: &Node,
    protection: Option<&Protection<'_>>,
    protected: &mut usize,
) -> Node {
    let mut keep = |field| {
        let kept = protection.is_some_and(|p| p.keeps_current(&cur.branch_name, field));
        if kept {
            *protected += 1;
        }
        kept
    };

    let ahead_behind = if keep(TimestampedField::AheadBehind) {
        cur.ahead_behind
    } else {
        inc.ahead_behind
    };
    let remote_ahead_behind = if keep(TimestampedField::RemoteAheadBehind) {
        cur.remote_ahead_behind
    } else {
        inc.remote_ahead_behind
    };
    let worktree = if keep(TimestampedField::Worktree) {
        cur.worktree.clone()
    } else {
        inc.worktree.clone()
    };

    Node {
        branch_name: cur.branch_name.clone(),
        ahead_behind,
        remote_ahead_behind,
        worktree,
        pr: inc.pr.clone(),
        last_commit_at: inc.last_commit_at,
        badges: inc.badges.clone(),
        description: inc.description.clone().or_else(|| cur.description.clone()),
    }
}
