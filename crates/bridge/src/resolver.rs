//! The three-strategy thread resolution protocol.
//!
//! "Which thread belongs to *this* caller" — asked by an external agent
//! through the RPC surface. Every successful answer claims the mapping, so
//! an agent can only ever grab a thread once and two concurrent agents
//! never share one.

use std::{sync::Arc, time::Duration};

use {
    serde::Serialize,
    threadmirror_common::{Error, PLACEHOLDER_THREAD_NAME, Result},
    threadmirror_state::{DEFAULT_FRESHNESS, Mapping, MappingRegistry},
    tracing::{debug, info, warn},
};

use crate::{pending::PendingComposer, source::ConversationSource, threads::ThreadService};

/// Tier-3 wait bounds.
const WAIT_FOR_NEW: Duration = Duration::from_secs(6);
const WAIT_POLL: Duration = Duration::from_millis(200);

/// Which strategy produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMethod {
    /// A fresh unclaimed mapping already existed.
    LatestUnclaimed,
    /// The mapping was created (pending composer) or appeared during the
    /// bounded wait.
    WaitedForNew,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub mapping: Mapping,
    pub method: ResolveMethod,
}

pub struct ThreadResolver {
    source: Arc<dyn ConversationSource>,
    threads: Arc<ThreadService>,
    registry: MappingRegistry,
    pending: Arc<PendingComposer>,
}

impl ThreadResolver {
    #[must_use]
    pub fn new(
        source: Arc<dyn ConversationSource>,
        threads: Arc<ThreadService>,
        registry: MappingRegistry,
        pending: Arc<PendingComposer>,
    ) -> Self {
        Self {
            source,
            threads,
            registry,
            pending,
        }
    }

    /// Resolve and claim a thread for the calling agent.
    ///
    /// 1. A pending composer forces thread creation (placeholder name when
    ///    the IDE has not assigned one yet).
    /// 2. Otherwise the newest unclaimed mapping within the freshness
    ///    window wins.
    /// 3. Otherwise poll for one for a bounded interval.
    pub async fn resolve(&self) -> Result<Resolution> {
        if let Some(pending_id) = self.pending.current() {
            let name = match self.source.name(&pending_id).await {
                Ok(Some(name)) => name,
                Ok(None) => PLACEHOLDER_THREAD_NAME.to_string(),
                Err(e) => {
                    debug!(error = %e, "name read failed during resolve; using placeholder");
                    PLACEHOLDER_THREAD_NAME.to_string()
                },
            };
            match self
                .threads
                .create_thread_for_conversation(&pending_id, &name)
                .await
            {
                Ok(mapping) => {
                    self.pending.clear(&pending_id);
                    self.registry.mark_claimed(&mapping.conversation_id).await?;
                    let mapping = self
                        .registry
                        .get(&mapping.conversation_id)
                        .await?
                        .unwrap_or(mapping);
                    info!(
                        conversation_id = %mapping.conversation_id,
                        thread_id = %mapping.thread_id,
                        "resolved via pending composer"
                    );
                    return Ok(Resolution {
                        mapping,
                        method: ResolveMethod::WaitedForNew,
                    });
                },
                Err(e) => {
                    warn!(
                        conversation_id = %pending_id,
                        error = %e,
                        "forced creation for pending composer failed"
                    );
                },
            }
        }

        if let Some(mapping) = self
            .registry
            .claim_most_recent_unclaimed_within(DEFAULT_FRESHNESS)
            .await?
        {
            info!(
                conversation_id = %mapping.conversation_id,
                thread_id = %mapping.thread_id,
                "resolved latest unclaimed mapping"
            );
            return Ok(Resolution {
                mapping,
                method: ResolveMethod::LatestUnclaimed,
            });
        }

        match self
            .registry
            .wait_for_unclaimed_within(WAIT_FOR_NEW, WAIT_POLL, DEFAULT_FRESHNESS)
            .await?
        {
            Some(mapping) => {
                info!(
                    conversation_id = %mapping.conversation_id,
                    thread_id = %mapping.thread_id,
                    "resolved mapping that appeared during wait"
                );
                Ok(Resolution {
                    mapping,
                    method: ResolveMethod::WaitedForNew,
                })
            },
            None => Err(Error::Timeout),
        }
    }
}
