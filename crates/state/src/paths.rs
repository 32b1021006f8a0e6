//! Per-workspace state file layout.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Location of the state database for `workspace_root` under `data_dir`.
///
/// Workspaces are keyed by a hash of their canonical root path so two
/// daemons serving different workspaces never share a file.
#[must_use]
pub fn workspace_state_path(data_dir: &Path, workspace_root: &Path) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(workspace_root.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    let key: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    data_dir.join("threadmirror").join(key).join("state.db")
}
