//! Provisional parent edges for newly discovered branches.

use std::collections::HashSet;

use tracing::debug;

use crate::models::{BranchName, Edge};

/// Stateless edge inferencer.
pub struct EdgeInferencer;

impl EdgeInferencer {
    /// Return `current_edges` followed by one inferred edge for every new
    /// branch that has no parent yet and is not the default branch.
    ///
    /// The parent is taken from the scanner's own edge for that branch when
    /// there is one, otherwise the default branch. Existing edges are never
    /// altered or removed.
    pub fn infer_edges_for_new_branches(
        current_edges: &[Edge],
        new_branches: &[BranchName],
        incoming_edges: &[Edge],
        default_branch: &str,
    ) -> Vec<Edge> {
        let mut parented: HashSet<&str> = current_edges.iter().map(|e| e.child.as_str()).collect();
        let mut edges = current_edges.to_vec();

        for branch in new_branches {
            if branch == default_branch || parented.contains(branch.as_str()) {
                continue;
            }
            let parent = incoming_edges
                .iter()
                .find(|e| e.child == *branch)
                .map(|e| e.parent.as_str())
                .unwrap_or(default_branch);

            debug!(branch = %branch, parent, "inferred parent for new branch");
            parented.insert(branch.as_str());
            edges.push(Edge::inferred(parent, branch.as_str()));
        }

        edges
    }
}
