//! Config schema types for the bridge daemon.
//!
//! The global record is shared across all workspaces on a host (which guild
//! to talk to and how noisy to be); the project record pins the channel a
//! single workspace posts into. Both are persisted as JSON blobs in the
//! workspace state store.

use serde::{Deserialize, Serialize};

/// How thread creation announces itself.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ThreadCreationNotify {
    /// Create the thread without pinging anyone.
    #[default]
    Silent,
    /// Post a mention message for the configured users after creation.
    Ping,
}

/// When agent posts into a thread mention the configured users.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessagePingMode {
    /// Never prefix posts with mentions.
    #[default]
    Never,
    /// Mention the single user who wrote in the thread most recently,
    /// consuming that record.
    OnRecentUserMessage,
    /// Mention every configured user on every post.
    Always,
}

/// Host-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalConfig {
    pub guild_id: Option<String>,
    pub guild_name: Option<String>,
    /// Users invited into every new thread and targeted by ping modes.
    pub invite_user_ids: Vec<String>,
    pub thread_creation_notify: ThreadCreationNotify,
    pub message_ping_mode: MessagePingMode,
    /// A conversation is kept open while it ranks in the top-N by recency.
    #[serde(default = "default_implicit_archive_count")]
    pub implicit_archive_count: u32,
    /// ... or was last touched within this many hours.
    #[serde(default = "default_implicit_archive_hours")]
    pub implicit_archive_hours: u32,
}

fn default_implicit_archive_count() -> u32 {
    10
}

fn default_implicit_archive_hours() -> u32 {
    48
}

impl GlobalConfig {
    /// Clamp policy knobs into their valid range (both are `≥ 1`).
    pub fn normalize(&mut self) {
        self.implicit_archive_count = self.implicit_archive_count.max(1);
        self.implicit_archive_hours = self.implicit_archive_hours.max(1);
    }

    pub fn implicit_archive_window_ms(&self) -> i64 {
        i64::from(self.implicit_archive_hours) * 60 * 60 * 1000
    }
}

/// Per-workspace configuration: the channel threads are created under.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectConfig {
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
    pub created_at: Option<i64>,
}

/// OAuth invite URL for installing the bot into a guild with the permission
/// set the bridge needs.
#[must_use]
pub fn invite_url(bot_user_id: &str) -> String {
    format!(
        "https://discord.com/oauth2/authorize?client_id={bot_user_id}&permissions=397284550672&scope=bot"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let cfg = GlobalConfig::default();
        assert_eq!(cfg.thread_creation_notify, ThreadCreationNotify::Silent);
        assert_eq!(cfg.message_ping_mode, MessagePingMode::Never);
        assert_eq!(cfg.implicit_archive_count, 10);
        assert_eq!(cfg.implicit_archive_hours, 48);
    }

    #[test]
    fn empty_json_gets_defaults() {
        let cfg: GlobalConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.implicit_archive_count, 10);
        assert_eq!(cfg.implicit_archive_hours, 48);
        assert!(cfg.invite_user_ids.is_empty());
    }

    #[test]
    fn ping_mode_wire_names() {
        let cfg: GlobalConfig =
            serde_json::from_str(r#"{"messagePingMode":"on_recent_user_message"}"#).unwrap();
        assert_eq!(cfg.message_ping_mode, MessagePingMode::OnRecentUserMessage);
        let cfg: GlobalConfig =
            serde_json::from_str(r#"{"threadCreationNotify":"ping"}"#).unwrap();
        assert_eq!(cfg.thread_creation_notify, ThreadCreationNotify::Ping);
    }

    #[test]
    fn normalize_clamps_to_one() {
        let mut cfg = GlobalConfig {
            implicit_archive_count: 0,
            implicit_archive_hours: 0,
            ..Default::default()
        };
        cfg.normalize();
        assert_eq!(cfg.implicit_archive_count, 1);
        assert_eq!(cfg.implicit_archive_hours, 1);
    }

    #[test]
    fn invite_url_embeds_client_id() {
        let url = invite_url("4242");
        assert!(url.contains("client_id=4242"));
        assert!(url.contains("permissions=397284550672"));
    }
}
