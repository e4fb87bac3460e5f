//! `beads_rust`: a local, git-native issue tracker.
//!
//! The crate is organized around a storage core (`storage`, `model`) and a
//! sync core that keeps the SQLite store and a JSONL export in agreement
//! across collaborators: codec + merge (`sync`), a dedicated git worktree
//! transport (`syncbranch`), a background daemon speaking a small RPC
//! protocol over a Unix domain socket (`daemon`), and an at-most-one-holder
//! coordination primitive for merges (`mergeslot`). `cli`, `config`,
//! `output`, `format`, `util` and `validation` are the surrounding
//! command-line surface and plumbing.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod format;
pub mod logging;
pub mod mergeslot;
pub mod model;
pub mod output;
pub mod storage;
pub mod sync;
pub mod syncbranch;
pub mod util;
pub mod validation;

pub use error::{BeadsError, Result, StructuredError};
