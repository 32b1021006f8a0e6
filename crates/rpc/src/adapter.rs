//! Tool-adapter registration.
//!
//! The IDE launches tool-protocol servers from a JSON config file; the
//! daemon keeps the `discord-bridge` entry pointing at the bundled adapter
//! and rewrites the file (atomically) when it is absent or outdated.

use std::path::{Path, PathBuf};

use {serde_json::json, threadmirror_common::Result, tracing::info};

/// Registry key for the bridge adapter.
const ADAPTER_KEY: &str = "discord-bridge";

/// Default location of the IDE's adapter config.
#[must_use]
pub fn adapter_config_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| home.join(".cursor").join("mcp.json"))
}

/// Ensure `config_path` registers the bundled adapter. Returns `true` when
/// the file was (re)written — the caller should then request a host reload.
pub fn ensure_adapter_registered(config_path: &Path, adapter_path: &Path) -> Result<bool> {
    let mut root: serde_json::Value = match std::fs::read_to_string(config_path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|_| json!({})),
        Err(_) => json!({}),
    };

    let expected = json!({
        "command": "node",
        "args": [adapter_path.to_string_lossy()],
    });
    let current = root
        .get("mcpServers")
        .and_then(|servers| servers.get(ADAPTER_KEY));
    if current == Some(&expected) {
        return Ok(false);
    }

    if !root.is_object() {
        root = json!({});
    }
    let servers = root
        .as_object_mut()
        .and_then(|o| {
            if !o.contains_key("mcpServers") {
                o.insert("mcpServers".to_string(), json!({}));
            }
            o.get_mut("mcpServers")
        })
        .and_then(|s| s.as_object_mut());
    if let Some(servers) = servers {
        servers.insert(ADAPTER_KEY.to_string(), expected);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Write-then-rename so a crashed daemon never leaves a torn config.
    let tmp = config_path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(&root)?)?;
    std::fs::rename(&tmp, config_path)?;
    info!(path = %config_path.display(), "adapter registration written");
    Ok(true)
}
