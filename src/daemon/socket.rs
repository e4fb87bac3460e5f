//! Socket path derivation, shared verbatim between client and server so
//! that property #8 (socket-path agreement) holds by construction.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Conservative Unix domain socket path length limit. The actual kernel
/// limit (`sockaddr_un.sun_path`) is 104-108 bytes depending on platform;
/// we leave headroom rather than chase the exact value.
const SOCKET_PATH_LIMIT: usize = 100;

/// Derive the socket path for a workspace's `.beads` directory.
///
/// `override_path` (from `BD_SOCKET` / the `socket` config key) always wins.
/// Otherwise the socket lives at `<beads_dir>/bd.sock`; if that path would
/// exceed [`SOCKET_PATH_LIMIT`], it's replaced with a hash-based path under
/// `/tmp` so the daemon can still bind it.
#[must_use]
pub fn derive_socket_path(beads_dir: &Path, override_path: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }

    let candidate = beads_dir.join("bd.sock");
    if candidate.as_os_str().len() <= SOCKET_PATH_LIMIT {
        return candidate;
    }

    let mut hasher = Sha256::new();
    hasher.update(beads_dir.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    let short_hash = &format!("{digest:x}")[..16];

    PathBuf::from("/tmp").join(format!("beads-{short_hash}")).join("bd.sock")
}

/// Path to the PID file that sits next to the database, per workspace.
#[must_use]
pub fn pid_file_path(beads_dir: &Path) -> PathBuf {
    beads_dir.join("daemon.pid")
}
