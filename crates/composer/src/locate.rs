//! Workspace-storage discovery.
//!
//! The IDE keeps one storage folder per workspace under a hashed name; the
//! only way to find ours is to scan them and match each folder's
//! `workspace.json` against the workspace root we serve.

use std::{
    fs,
    path::{Path, PathBuf},
};

use {threadmirror_common::Result, tracing::debug};

/// The resolved storage folder for one workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceStorage {
    pub dir: PathBuf,
    pub db_path: PathBuf,
}

impl WorkspaceStorage {
    /// Files the name-sync watcher should watch: the database and its WAL
    /// sibling (which may not exist until the IDE first writes).
    #[must_use]
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        let mut wal = self.db_path.as_os_str().to_owned();
        wal.push("-wal");
        vec![self.db_path.clone(), PathBuf::from(wal)]
    }
}

/// Platform base directory holding the IDE's per-workspace storage.
#[must_use]
pub fn storage_base_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|d| d.join("Cursor").join("User").join("workspaceStorage"))
}

/// Scan `base` for the storage folder whose `workspace.json` names
/// `workspace_root`.
pub fn locate_for_workspace(
    base: &Path,
    workspace_root: &Path,
) -> Result<Option<WorkspaceStorage>> {
    if !base.is_dir() {
        return Ok(None);
    }
    for entry in fs::read_dir(base)? {
        let dir = entry?.path();
        if !dir.is_dir() {
            continue;
        }
        let manifest = dir.join("workspace.json");
        let Ok(raw) = fs::read_to_string(&manifest) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) else {
            debug!(path = %manifest.display(), "unparseable workspace.json");
            continue;
        };
        let Some(folder) = value.get("folder").and_then(|f| f.as_str()) else {
            continue;
        };
        if file_uri_to_path(folder).is_some_and(|p| p == workspace_root) {
            let db_path = dir.join("state.vscdb");
            return Ok(Some(WorkspaceStorage { dir, db_path }));
        }
    }
    Ok(None)
}

/// Convert a `file://` URI into a local path, handling percent-escapes and
/// the Windows `/C:/...` form.
#[must_use]
pub fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    let decoded = percent_decode(rest);
    // Windows URIs look like file:///C:/dir — drop the leading slash.
    let decoded = if decoded.len() >= 3
        && decoded.starts_with('/')
        && decoded.as_bytes()[2] == b':'
    {
        decoded[1..].to_string()
    } else {
        decoded
    };
    Some(PathBuf::from(decoded))
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&input[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
