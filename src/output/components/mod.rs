//! Rich-terminal rendering components used by the CLI output layer.
//!
//! These are presentation-only: they format data the core already computed
//! and have no bearing on sync/store correctness.

pub mod dep_tree;
pub mod issue_panel;
pub mod issue_table;
pub mod progress;
pub mod stats;

pub use dep_tree::DependencyTree;
pub use issue_panel::IssuePanel;
pub use issue_table::{IssueTable, IssueTableColumns};
pub use progress::ProgressTracker;
pub use stats::StatsPanel;
