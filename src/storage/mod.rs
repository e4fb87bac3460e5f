//! Transactional local persistence: the database of record for one clone.
//!
//! [`sqlite`] holds the `SqliteStorage` implementation (issues, dependencies,
//! labels, comments, config, the event log, dirty-tracking and merge
//! slots). [`schema`] owns the DDL and migrations. [`events`] has the
//! read-side audit log queries.

pub mod events;
pub mod schema;
pub mod sqlite;

pub use sqlite::{
    IssueUpdate, ListFilters, MergeSlotRow, MutationContext, ReadyFilters, ReadySortPolicy,
    SqliteStorage,
};
