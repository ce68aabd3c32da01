//! One-line description of held-back structural changes.

use crate::models::PendingChanges;

/// Renders [`PendingChanges`] for a confirmation prompt.
pub struct SummaryFormatter;

impl SummaryFormatter {
    /// e.g. `"edge changes, 2 branches deleted"`.
    pub fn format(pending: &PendingChanges) -> String {
        let mut parts = Vec::new();

        if pending.edges_changed {
            parts.push("edge changes".to_string());
        }

        match pending.nodes_deleted.len() {
            0 => {}
            1 => parts.push("1 branch deleted".to_string()),
            n => parts.push(format!("{n} branches deleted")),
        }

        if pending.designed_edges_changed {
            parts.push("designed edges changed".to_string());
        }

        if parts.is_empty() {
            "structure changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScanSnapshot;

    fn pending(edges: bool, deleted: &[&str], designed: bool) -> PendingChanges {
        PendingChanges {
            edges_changed: edges,
            nodes_deleted: deleted.iter().map(|s| s.to_string()).collect(),
            designed_edges_changed: designed,
            new_branches: Vec::new(),
            version: 1,
            snapshot: ScanSnapshot::default(),
        }
    }

    #[test]
    fn test_all_parts_in_order() {
        let p = pending(true, &["a", "b"], true);
        assert_eq!(
            SummaryFormatter::format(&p),
            "edge changes, 2 branches deleted, designed edges changed"
        );
    }

    #[test]
    fn test_single_deletion_is_singular() {
        let p = pending(false, &["a"], false);
        assert_eq!(SummaryFormatter::format(&p), "1 branch deleted");
    }

    #[test]
    fn test_fallback_when_nothing_set() {
        let p = pending(false, &[], false);
        assert_eq!(SummaryFormatter::format(&p), "structure changes");
    }

    #[test]
    fn test_display_matches_format() {
        let p = pending(true, &[], false);
        assert_eq!(p.to_string(), "edge changes");
    }
}
