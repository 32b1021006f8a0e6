//! The IDE conversation-store seam.
//!
//! A pure reader over the IDE's workspace storage; the daemon never writes
//! through it. The sqlite-backed implementation lives in
//! `threadmirror-composer`.

use std::collections::{HashMap, HashSet};

use {async_trait::async_trait, threadmirror_common::Result};

/// One conversation with its recency rank, for the implicit-archive policy.
#[derive(Debug, Clone)]
pub struct RankedConversation {
    pub conversation_id: String,
    /// `None` when the IDE has no last-updated timestamp; ranked last.
    pub last_updated_at: Option<i64>,
    /// Zero-based position in descending recency order.
    pub position: usize,
}

/// Read-only view of the IDE's conversations.
///
/// Any error is "no data this tick": callers abandon the current pass and
/// retry on the next trigger.
#[async_trait]
pub trait ConversationSource: Send + Sync {
    /// Every conversation id, archived or not.
    async fn all_ids(&self) -> Result<Vec<String>>;

    /// Display name; `None` until the IDE assigns one (empty and
    /// whitespace-only names count as unassigned).
    async fn name(&self, conversation_id: &str) -> Result<Option<String>>;

    /// All non-empty names.
    async fn all_names(&self) -> Result<HashMap<String, String>>;

    async fn archived_ids(&self) -> Result<HashSet<String>>;

    /// Non-archived conversations in descending recency, nulls last.
    async fn active_ranked_by_recency(&self) -> Result<Vec<RankedConversation>>;
}
