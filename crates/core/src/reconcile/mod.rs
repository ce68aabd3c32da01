//! Snapshot reconciliation: merging a fresh scan into the displayed view.
//!
//! The reconcile subsystem is responsible for:
//! 1. **Analysis** -- classifying an incoming scan into safe attribute
//!    updates and structural changes that need user confirmation.
//! 2. **Merging** -- copying safe fields into the displayed snapshot, with
//!    optional protection for fields edited locally after the scan began.
//! 3. **Inference** -- giving newly discovered branches a provisional parent.
//! 4. **Summary** -- a short description of held-back structural changes.
//!
//! Everything here is synchronous and pure: inputs are borrowed, outputs are
//! new values.

pub mod analyzer;
pub mod inference;
pub mod merger;
pub mod summary;

pub use analyzer::{DiffAnalysis, DiffAnalyzer};
pub use inference::EdgeInferencer;
pub use merger::AttributeMerger;
pub use summary::SummaryFormatter;
