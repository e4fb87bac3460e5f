//! Background daemon and RPC: a per-workspace singleton over a Unix domain
//! socket that routes operations to the Store and enforces the
//! pre-operation freshness check (auto-import) before every dispatch.
//!
//! `server` and `client` share `socket` for path derivation so the two
//! sides agree by construction, and `protocol` for the wire envelope.
//! Everything here is `std`-only: no async runtime in the dependency stack.

pub mod client;
pub mod protocol;
pub mod server;
pub mod socket;

pub use client::DaemonClient;
pub use protocol::{Op, Request, Response};
pub use server::DaemonServer;
pub use socket::{derive_socket_path, pid_file_path};
