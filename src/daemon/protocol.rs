//! Wire protocol for the daemon RPC: a length-prefixed JSON envelope over a
//! Unix domain socket.
//!
//! Framing is a 4-byte big-endian length prefix followed by that many bytes
//! of JSON. No compression, no multiplexing — one request per connection
//! round-trip, matching the socket's sequential ordering guarantee.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{BeadsError, Result};

/// Largest envelope we'll read before treating the peer as misbehaving.
const MAX_ENVELOPE_BYTES: u32 = 64 * 1024 * 1024;

/// The closed set of operations the daemon will dispatch. Anything else is
/// a protocol error, not a `NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Op {
    Show,
    List,
    Create,
    Update,
    Delete,
    AddDependency,
    RemoveDependency,
    AddLabel,
    RemoveLabel,
    ResolveId,
    Stats,
    Batch,
}

impl Op {
    /// Whether this op mutates the Store and should therefore kick the
    /// flush debouncer once it succeeds. `Batch` itself doesn't mark —
    /// its mutating sub-requests each mark on their own as they dispatch.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        matches!(
            self,
            Self::Create
                | Self::Update
                | Self::Delete
                | Self::AddDependency
                | Self::RemoveDependency
                | Self::AddLabel
                | Self::RemoveLabel
        )
    }
}

/// A single RPC request: `{op, args, db_path?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub op: Op,
    #[serde(default = "default_args")]
    pub args: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

fn default_args() -> serde_json::Value {
    serde_json::Value::Null
}

impl Request {
    #[must_use]
    pub fn new(op: Op, args: serde_json::Value) -> Self {
        Self {
            op,
            args,
            db_path: None,
        }
    }

    #[must_use]
    pub fn with_db_path(mut self, db_path: Option<String>) -> Self {
        self.db_path = db_path;
        self
    }
}

/// A single RPC response: `{success, data|error}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    #[must_use]
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn err(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(reason.into()),
        }
    }
}

impl From<&BeadsError> for Response {
    fn from(err: &BeadsError) -> Self {
        Response::err(err.to_string())
    }
}

/// Write one length-prefixed JSON envelope.
///
/// # Errors
///
/// Returns an error if serialization or the underlying write fails.
pub fn write_envelope<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    let len = u32::try_from(bytes.len())
        .map_err(|_| BeadsError::SocketError { reason: "envelope too large to frame".to_string() })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed JSON envelope.
///
/// # Errors
///
/// Returns an error if the length prefix exceeds [`MAX_ENVELOPE_BYTES`], the
/// connection closes mid-read, or the bytes don't parse as JSON.
pub fn read_envelope<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_ENVELOPE_BYTES {
        return Err(BeadsError::SocketError {
            reason: format!("envelope of {len} bytes exceeds the {MAX_ENVELOPE_BYTES} byte limit"),
        });
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(serde_json::from_slice(&buf)?)
}
