//! Ingestion boundary for scanner payloads.
//!
//! Scanner output is parsed into the typed [`ScanSnapshot`] and validated
//! exactly once here. The reconciliation engine downstream assumes a
//! validated snapshot and never re-checks.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::errors::ScanError;
use crate::models::ScanSnapshot;

/// Parse a JSON scanner payload and validate it.
pub fn parse_snapshot(json: &str) -> Result<ScanSnapshot, ScanError> {
    let snapshot: ScanSnapshot =
        serde_json::from_str(json).map_err(|e| ScanError::ParseError(e.to_string()))?;
    validate_snapshot(&snapshot)?;
    debug!(
        nodes = snapshot.nodes.len(),
        edges = snapshot.edges.len(),
        "scan snapshot accepted"
    );
    Ok(snapshot)
}

/// Check the invariants the engine relies on.
///
/// - every node has a non-empty branch name
/// - branch names are unique
/// - every edge has non-empty endpoints
pub fn validate_snapshot(snapshot: &ScanSnapshot) -> Result<(), ScanError> {
    let mut seen = HashSet::with_capacity(snapshot.nodes.len());
    for node in &snapshot.nodes {
        if node.branch_name.is_empty() {
            return Err(ScanError::EmptyBranchName);
        }
        if !seen.insert(node.branch_name.as_str()) {
            warn!(branch = %node.branch_name, "rejecting snapshot with duplicate branch");
            return Err(ScanError::DuplicateBranch(node.branch_name.clone()));
        }
    }

    for edge in &snapshot.edges {
        if edge.parent.is_empty() || edge.child.is_empty() {
            return Err(ScanError::InvalidEdge {
                parent: edge.parent.clone(),
                child: edge.child.clone(),
            });
        }
    }

    Ok(())
}
