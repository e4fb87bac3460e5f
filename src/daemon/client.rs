//! Daemon RPC client: dial the workspace socket with a short timeout and
//! fall back to direct (in-process) mode on any failure to connect.

use std::io::{BufReader, BufWriter};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use crate::daemon::protocol::{read_envelope, write_envelope, Request, Response};
use crate::error::Result;

/// Dial timeout before giving up and falling back to direct mode.
const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);

/// A connected daemon client. One request per `call()`; the daemon doesn't
/// keep connections open across requests.
pub struct DaemonClient {
    socket_path: std::path::PathBuf,
    db_path: Option<String>,
}

impl DaemonClient {
    /// Attempt to dial `socket_path`. Returns `None` (never an error) if the
    /// socket is missing or the dial fails — callers should fall back to
    /// direct mode in that case, per the transport's design.
    #[must_use]
    pub fn try_connect(socket_path: &Path) -> Option<Self> {
        UnixStream::connect(socket_path).ok()?;
        Some(Self {
            socket_path: socket_path.to_path_buf(),
            db_path: None,
        })
    }

    /// Route subsequent requests to a non-default database file, for
    /// multi-DB deployments sharing one daemon.
    pub fn set_database_path(&mut self, path: impl Into<String>) {
        self.db_path = Some(path.into());
    }

    /// Send one request and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection can't be (re-)established or the
    /// envelope can't be written/read.
    pub fn call(&self, mut request: Request) -> Result<Response> {
        request.db_path = self.db_path.clone();

        let stream = connect_with_timeout(&self.socket_path)?;
        let mut writer = BufWriter::new(stream.try_clone()?);
        write_envelope(&mut writer, &request)?;

        let mut reader = BufReader::new(stream);
        read_envelope(&mut reader)
    }
}

fn connect_with_timeout(socket_path: &Path) -> Result<UnixStream> {
    let stream = UnixStream::connect(socket_path)?;
    stream.set_read_timeout(Some(CONNECT_TIMEOUT * 10))?;
    stream.set_write_timeout(Some(CONNECT_TIMEOUT))?;
    Ok(stream)
}
