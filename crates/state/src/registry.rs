//! The conversation↔thread mapping registry.
//!
//! A thin claim-aware layer over [`StateStore`]. Mappings are created when a
//! thread is created, survive restarts, are claimed at most once, and are
//! never removed implicitly — a dead thread only flips the `stale` flag.

use std::{sync::Arc, time::Duration};

use {threadmirror_common::{Result, now_ms}, tracing::debug};

use crate::store::StateStore;

/// Freshness window for `resolve()`-style lookups. Prevents an agent from
/// grabbing an orphaned mapping created in a previous daemon session.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(30);

/// A persistent conversation↔thread binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub conversation_id: String,
    pub thread_id: String,
    pub workspace: String,
    pub created_at: i64,
    pub claimed_at: Option<i64>,
    pub stale: bool,
}

impl Mapping {
    #[must_use]
    pub fn new(
        conversation_id: impl Into<String>,
        thread_id: impl Into<String>,
        workspace: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            thread_id: thread_id.into(),
            workspace: workspace.into(),
            created_at: now_ms(),
            claimed_at: None,
            stale: false,
        }
    }
}

/// Claim-aware registry over the persistent mapping table.
#[derive(Clone)]
pub struct MappingRegistry {
    store: Arc<StateStore>,
}

impl MappingRegistry {
    #[must_use]
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, conversation_id: &str) -> Result<Option<Mapping>> {
        self.store.mapping_by_conversation(conversation_id).await
    }

    pub async fn get_by_thread(&self, thread_id: &str) -> Result<Option<Mapping>> {
        self.store.mapping_by_thread(thread_id).await
    }

    pub async fn put(&self, mapping: Mapping) -> Result<()> {
        self.store.insert_mapping(&mapping).await
    }

    pub async fn all(&self) -> Result<Vec<Mapping>> {
        self.store.all_mappings().await
    }

    pub async fn mark_stale(&self, conversation_id: &str) -> Result<()> {
        self.store.mark_mapping_stale(conversation_id).await
    }

    /// Idempotent: sets `claimed-at` to now iff it is absent.
    pub async fn mark_claimed(&self, conversation_id: &str) -> Result<()> {
        self.store.try_claim(conversation_id).await?;
        Ok(())
    }

    /// Newest unclaimed mapping created within the freshness window.
    pub async fn most_recent_unclaimed_within(
        &self,
        freshness: Duration,
    ) -> Result<Option<Mapping>> {
        let cutoff = now_ms() - freshness.as_millis() as i64;
        self.store.newest_unclaimed_since(cutoff).await
    }

    /// Atomically select and claim the newest fresh unclaimed mapping.
    ///
    /// Concurrent callers race on the claim update; a loser retries the
    /// selection, so two callers get two distinct mappings when two fresh
    /// ones exist.
    pub async fn claim_most_recent_unclaimed_within(
        &self,
        freshness: Duration,
    ) -> Result<Option<Mapping>> {
        loop {
            let Some(candidate) = self.most_recent_unclaimed_within(freshness).await? else {
                return Ok(None);
            };
            if self.store.try_claim(&candidate.conversation_id).await? {
                debug!(
                    conversation_id = %candidate.conversation_id,
                    thread_id = %candidate.thread_id,
                    "claimed mapping"
                );
                return self.get(&candidate.conversation_id).await;
            }
            // Lost the race; another caller claimed it first.
        }
    }

    /// Poll for a fresh unclaimed mapping until one appears or `max_wait`
    /// elapses, claiming it on success.
    pub async fn wait_for_unclaimed_within(
        &self,
        max_wait: Duration,
        poll: Duration,
        freshness: Duration,
    ) -> Result<Option<Mapping>> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            if let Some(m) = self.claim_most_recent_unclaimed_within(freshness).await? {
                return Ok(Some(m));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry() -> MappingRegistry {
        MappingRegistry::new(Arc::new(StateStore::open_in_memory().await.unwrap()))
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let reg = registry().await;
        let m = Mapping::new("C1", "T1", "demo");
        reg.put(m.clone()).await.unwrap();
        assert_eq!(reg.get("C1").await.unwrap().unwrap().thread_id, "T1");
        assert_eq!(
            reg.get_by_thread("T1").await.unwrap().unwrap().conversation_id,
            "C1"
        );
    }

    #[tokio::test]
    async fn test_claim_never_returns_already_claimed() {
        let reg = registry().await;
        reg.put(Mapping::new("C1", "T1", "demo")).await.unwrap();

        let first = reg
            .claim_most_recent_unclaimed_within(DEFAULT_FRESHNESS)
            .await
            .unwrap();
        assert_eq!(first.unwrap().conversation_id, "C1");

        let second = reg
            .claim_most_recent_unclaimed_within(DEFAULT_FRESHNESS)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_claims_get_distinct_mappings() {
        let reg = registry().await;
        reg.put(Mapping::new("C1", "T1", "demo")).await.unwrap();
        reg.put(Mapping::new("C2", "T2", "demo")).await.unwrap();

        let (a, b) = tokio::join!(
            reg.claim_most_recent_unclaimed_within(DEFAULT_FRESHNESS),
            reg.claim_most_recent_unclaimed_within(DEFAULT_FRESHNESS),
        );
        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();
        assert_ne!(a.conversation_id, b.conversation_id);
    }

    #[tokio::test]
    async fn test_stale_window_excludes_old_mappings() {
        let reg = registry().await;
        let mut old = Mapping::new("C_old", "T_old", "demo");
        old.created_at = now_ms() - 120_000;
        reg.put(old).await.unwrap();
        reg.put(Mapping::new("C_fresh", "T_fresh", "demo")).await.unwrap();

        let hit = reg
            .most_recent_unclaimed_within(DEFAULT_FRESHNESS)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.conversation_id, "C_fresh");

        // The old one stays unclaimed forever as far as resolve is concerned.
        reg.mark_claimed("C_fresh").await.unwrap();
        assert!(
            reg.most_recent_unclaimed_within(DEFAULT_FRESHNESS)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_wait_for_unclaimed_times_out() {
        let reg = registry().await;
        let got = reg
            .wait_for_unclaimed_within(
                Duration::from_millis(80),
                Duration::from_millis(20),
                DEFAULT_FRESHNESS,
            )
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_unclaimed_picks_up_new_mapping() {
        let reg = registry().await;
        let reg2 = reg.clone();
        let waiter = tokio::spawn(async move {
            reg2.wait_for_unclaimed_within(
                Duration::from_secs(2),
                Duration::from_millis(20),
                DEFAULT_FRESHNESS,
            )
            .await
        });
        tokio::time::sleep(Duration::from_millis(60)).await;
        reg.put(Mapping::new("C1", "T1", "demo")).await.unwrap();

        let got = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(got.conversation_id, "C1");
        assert!(got.claimed_at.is_some());
    }
}
