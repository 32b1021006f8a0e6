//! Per-thread transient cells.
//!
//! Process-scoped mutable state keyed by thread id. Each entry is an
//! independent cell; records that must only influence one post are removed
//! as they are read.

use {dashmap::DashMap, threadmirror_common::now_ms};

/// Who last wrote in a thread from the Discord side, for the
/// `on_recent_user_message` ping mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSpeaker {
    pub user_id: String,
    pub at_ms: i64,
}

/// thread id → most recent non-bot speaker. Consumed (removed) by the next
/// agent post into that thread.
#[derive(Default)]
pub struct ActiveConversations {
    inner: DashMap<String, ActiveSpeaker>,
}

impl ActiveConversations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, thread_id: &str, user_id: &str) {
        self.inner.insert(
            thread_id.to_string(),
            ActiveSpeaker {
                user_id: user_id.to_string(),
                at_ms: now_ms(),
            },
        );
    }

    /// Remove and return the record for `thread_id`, if any.
    pub fn consume(&self, thread_id: &str) -> Option<ActiveSpeaker> {
        self.inner.remove(thread_id).map(|(_, v)| v)
    }

    #[must_use]
    pub fn peek(&self, thread_id: &str) -> Option<ActiveSpeaker> {
        self.inner.get(thread_id).map(|r| r.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_removes_the_record() {
        let cells = ActiveConversations::new();
        cells.record("T1", "U1");
        assert_eq!(cells.consume("T1").unwrap().user_id, "U1");
        assert!(cells.consume("T1").is_none());
    }

    #[test]
    fn newer_speaker_replaces_older() {
        let cells = ActiveConversations::new();
        cells.record("T1", "U1");
        cells.record("T1", "U2");
        assert_eq!(cells.peek("T1").unwrap().user_id, "U2");
    }

    #[test]
    fn threads_are_independent() {
        let cells = ActiveConversations::new();
        cells.record("T1", "U1");
        cells.record("T2", "U2");
        cells.consume("T1");
        assert_eq!(cells.peek("T2").unwrap().user_id, "U2");
    }
}
