//! Ping-prefix policy for agent posts.
//!
//! Computed exactly once per `postToThread` call; only the first chunk of a
//! split post carries the prefix, and the prefix never affects splitting
//! boundaries.

use {
    threadmirror_config::{GlobalConfig, MessagePingMode},
    threadmirror_state::ActiveConversations,
};

/// The decided prefix plus whether an active-conversation record must be
/// consumed once the post lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingPlan {
    pub prefix: Option<String>,
    pub consume_active: bool,
}

impl PingPlan {
    const NONE: Self = Self {
        prefix: None,
        consume_active: false,
    };
}

/// Decide the ping prefix for a post into `thread_id`.
#[must_use]
pub fn plan(config: &GlobalConfig, active: &ActiveConversations, thread_id: &str) -> PingPlan {
    match config.message_ping_mode {
        MessagePingMode::Never => PingPlan::NONE,
        MessagePingMode::Always => {
            if config.invite_user_ids.is_empty() {
                PingPlan::NONE
            } else {
                let mentions: Vec<String> = config
                    .invite_user_ids
                    .iter()
                    .map(|id| format!("<@{id}>"))
                    .collect();
                PingPlan {
                    prefix: Some(mentions.join(" ")),
                    consume_active: false,
                }
            }
        },
        MessagePingMode::OnRecentUserMessage => match active.peek(thread_id) {
            Some(speaker) => PingPlan {
                prefix: Some(format!("<@{}>", speaker.user_id)),
                consume_active: true,
            },
            None => PingPlan::NONE,
        },
    }
}
