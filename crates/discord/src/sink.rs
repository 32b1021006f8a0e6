//! The inbound delivery seam.
//!
//! A thread message that is not a question answer must reach the owning IDE
//! conversation; the daemon binary wires this to the keystroke actuator.

use {async_trait::async_trait, threadmirror_common::Result};

/// Delivers an inbound thread message into an IDE conversation.
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn deliver(&self, conversation_id: &str, text: &str, thread_id: &str) -> Result<()>;
}
