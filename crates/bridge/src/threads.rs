//! Thread orchestration: creation with mapping persistence, archive
//! mirroring, and the inactivity reopener.

use std::sync::Arc;

use {
    threadmirror_common::{Error, Result, now_ms, text},
    threadmirror_config::{GlobalConfig, ThreadCreationNotify},
    threadmirror_state::{Mapping, MappingRegistry, StateStore},
    tracing::{debug, info, warn},
};

use crate::gateway::ChatGateway;

/// Creates threads, binds mappings, and mirrors archive state.
pub struct ThreadService {
    gateway: Arc<dyn ChatGateway>,
    registry: MappingRegistry,
    store: Arc<StateStore>,
    config: GlobalConfig,
    workspace_label: String,
}

impl ThreadService {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        registry: MappingRegistry,
        store: Arc<StateStore>,
        config: GlobalConfig,
        workspace_label: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            registry,
            store,
            config,
            workspace_label: workspace_label.into(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    #[must_use]
    pub fn workspace_label(&self) -> &str {
        &self.workspace_label
    }

    /// Create a thread for `conversation_id` and persist the mapping.
    ///
    /// Refuses an empty name; callers that want a thread before the IDE has
    /// named the conversation pass the placeholder explicitly.
    pub async fn create_thread_for_conversation(
        &self,
        conversation_id: &str,
        name: &str,
    ) -> Result<Mapping> {
        if name.trim().is_empty() {
            return Err(Error::invalid_input("thread name must not be empty"));
        }
        if let Some(existing) = self.registry.get(conversation_id).await? {
            debug!(
                conversation_id = %conversation_id,
                thread_id = %existing.thread_id,
                "conversation already mapped"
            );
            return Ok(existing);
        }

        let thread_name = text::truncate_thread_name(name);
        let thread_id = self.gateway.create_thread(&thread_name).await?;
        let mapping = Mapping::new(conversation_id, thread_id.clone(), &self.workspace_label);
        self.registry.put(mapping.clone()).await?;
        self.store.record_activity(&thread_id, now_ms()).await?;
        info!(
            conversation_id = %conversation_id,
            thread_id = %thread_id,
            name = %thread_name,
            "created thread"
        );

        let welcome = format!(
            "Mirroring IDE conversation `{conversation_id}` for workspace `{}`",
            self.workspace_label
        );
        if let Err(e) = self.gateway.post_to_thread(&thread_id, &welcome, false).await {
            warn!(thread_id = %thread_id, error = %e, "welcome post failed");
        }

        for user_id in &self.config.invite_user_ids {
            if let Err(e) = self.gateway.invite_user(&thread_id, user_id).await {
                warn!(thread_id = %thread_id, user_id = %user_id, error = %e, "invite failed");
            }
        }

        if self.config.thread_creation_notify == ThreadCreationNotify::Ping
            && !self.config.invite_user_ids.is_empty()
        {
            let mentions: Vec<String> = self
                .config
                .invite_user_ids
                .iter()
                .map(|id| format!("<@{id}>"))
                .collect();
            let ping = format!("{} — new conversation thread", mentions.join(" "));
            if let Err(e) = self.gateway.post_to_thread(&thread_id, &ping, false).await {
                warn!(thread_id = %thread_id, error = %e, "creation ping failed");
            }
        }

        Ok(mapping)
    }

    /// Archive the thread mapped to `conversation_id`, if any.
    pub async fn archive_for_conversation(&self, conversation_id: &str) -> Result<bool> {
        let Some(mapping) = self.registry.get(conversation_id).await? else {
            return Ok(false);
        };
        self.gateway.archive_thread(&mapping.thread_id).await?;
        Ok(true)
    }

    /// Unarchive the thread mapped to `conversation_id`, clearing any
    /// explicit-archive flag first.
    pub async fn unarchive_for_conversation(&self, conversation_id: &str) -> Result<bool> {
        let Some(mapping) = self.registry.get(conversation_id).await? else {
            return Ok(false);
        };
        self.store.remove_explicit_archive(&mapping.thread_id).await?;
        self.gateway.unarchive_thread(&mapping.thread_id).await?;
        Ok(true)
    }

    /// Tri-state archived check by conversation id; `None` when the mapping
    /// or the thread cannot be resolved.
    pub async fn is_thread_archived(&self, conversation_id: &str) -> Result<Option<bool>> {
        let Some(mapping) = self.registry.get(conversation_id).await? else {
            return Ok(None);
        };
        match self.gateway.thread_snapshot(&mapping.thread_id).await {
            Ok(Some(snapshot)) => Ok(Some(snapshot.archived)),
            Ok(None) => Ok(None),
            Err(e) => {
                debug!(thread_id = %mapping.thread_id, error = %e, "archived check failed");
                Ok(None)
            },
        }
    }

    /// Reopen archived threads for the truly-active conversations, skipping
    /// anything the user explicitly closed. Returns the count reopened.
    pub async fn ensure_active_threads_open(&self, active_conversation_ids: &[String]) -> Result<u32> {
        let mut reopened = 0;
        for conversation_id in active_conversation_ids {
            let Some(mapping) = self.registry.get(conversation_id).await? else {
                continue;
            };
            if self.store.is_explicitly_archived(&mapping.thread_id).await? {
                continue;
            }
            let archived = match self.gateway.thread_snapshot(&mapping.thread_id).await {
                Ok(Some(snapshot)) => snapshot.archived,
                Ok(None) | Err(_) => continue,
            };
            if !archived {
                continue;
            }
            match self.gateway.unarchive_thread(&mapping.thread_id).await {
                Ok(()) => {
                    reopened += 1;
                    info!(
                        conversation_id = %conversation_id,
                        thread_id = %mapping.thread_id,
                        "reopened inactive thread"
                    );
                },
                Err(e) => {
                    warn!(thread_id = %mapping.thread_id, error = %e, "reopen failed");
                },
            }
        }
        Ok(reopened)
    }
}
