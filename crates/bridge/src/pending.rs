//! The single-slot pending composer.
//!
//! Holds the most recently created conversation that has no name yet. A
//! newer nameless creation replaces the slot; binding the conversation to a
//! thread clears it.

use std::sync::Mutex;

/// At-most-one nameless conversation awaiting a name.
#[derive(Default)]
pub struct PendingComposer {
    slot: Mutex<Option<String>>,
}

impl PendingComposer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `conversation_id`, returning the id it displaced, if any.
    pub fn replace(&self, conversation_id: &str) -> Option<String> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.replace(conversation_id.to_string())
            .filter(|old| old != conversation_id)
    }

    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Clear the slot iff it still holds `conversation_id`.
    pub fn clear(&self, conversation_id: &str) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_deref() == Some(conversation_id) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_reports_displaced_id() {
        let pending = PendingComposer::new();
        assert_eq!(pending.replace("C1"), None);
        assert_eq!(pending.replace("C2"), Some("C1".into()));
        assert_eq!(pending.current(), Some("C2".into()));
    }

    #[test]
    fn replacing_with_same_id_is_silent() {
        let pending = PendingComposer::new();
        pending.replace("C1");
        assert_eq!(pending.replace("C1"), None);
    }

    #[test]
    fn clear_only_matches_current() {
        let pending = PendingComposer::new();
        pending.replace("C1");
        pending.clear("C2");
        assert_eq!(pending.current(), Some("C1".into()));
        pending.clear("C1");
        assert_eq!(pending.current(), None);
    }
}
