//! Shared error definitions and utilities used across all threadmirror
//! crates.

pub mod error;
pub mod text;

pub use error::{Error, Result};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// The thread name used when a conversation has not been named yet; the
/// name-sync watcher renames the thread once the IDE assigns a real name.
pub const PLACEHOLDER_THREAD_NAME: &str = "New conversation";

/// Cache-entry prefix marking a mapping whose thread could not be fetched.
pub const STALE_SENTINEL: &str = "__STALE__";
