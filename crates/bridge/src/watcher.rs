//! The reconciliation loop.
//!
//! Ticks roughly once a second, detecting new conversations, binding
//! nameless ones through the pending-composer slot, and mirroring archive
//! state between the IDE and the chat service. A reentrancy guard skips a
//! tick entirely while the previous one is still running.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    threadmirror_common::{Result, now_ms},
    threadmirror_config::GlobalConfig,
    threadmirror_state::{MappingRegistry, StateStore},
    tokio::{sync::Mutex, task::JoinHandle},
    tracing::{debug, info, warn},
};

use crate::{
    pending::PendingComposer,
    source::ConversationSource,
    threads::ThreadService,
};

/// How often the reconciliation loop ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// The inactivity reopener runs on every Nth tick.
const REOPEN_EVERY_TICKS: u64 = 30;

/// Events the watcher raises for observers (the RPC layer and log pane).
#[derive(Debug, Clone)]
pub enum WatcherEvent {
    /// A conversation left the IDE's non-archived view; its thread was
    /// archived.
    ConversationArchived { conversation_id: String },
}

/// Optional fast-path hook reporting the IDE's currently selected
/// conversations, checked before the storage read each tick.
pub type SelectedConversationsHook = Box<dyn Fn() -> Vec<String> + Send + Sync>;

pub struct ChatWatcher {
    source: Arc<dyn ConversationSource>,
    threads: Arc<ThreadService>,
    registry: MappingRegistry,
    store: Arc<StateStore>,
    pending: Arc<PendingComposer>,
    config: GlobalConfig,
    seen: Mutex<HashSet<String>>,
    tick_running: AtomicBool,
    ticks: AtomicU64,
    selected_hook: Option<SelectedConversationsHook>,
    events: Option<tokio::sync::mpsc::UnboundedSender<WatcherEvent>>,
}

impl ChatWatcher {
    #[must_use]
    pub fn new(
        source: Arc<dyn ConversationSource>,
        threads: Arc<ThreadService>,
        registry: MappingRegistry,
        store: Arc<StateStore>,
        pending: Arc<PendingComposer>,
        config: GlobalConfig,
    ) -> Self {
        Self {
            source,
            threads,
            registry,
            store,
            pending,
            config,
            seen: Mutex::new(HashSet::new()),
            tick_running: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            selected_hook: None,
            events: None,
        }
    }

    #[must_use]
    pub fn with_selected_hook(mut self, hook: SelectedConversationsHook) -> Self {
        self.selected_hook = Some(hook);
        self
    }

    #[must_use]
    pub fn with_events(
        mut self,
        events: tokio::sync::mpsc::UnboundedSender<WatcherEvent>,
    ) -> Self {
        self.events = Some(events);
        self
    }

    /// Load the persisted seen set; call once before the first tick.
    pub async fn hydrate(&self) -> Result<()> {
        let ids = self.store.seen_ids().await?;
        let mut seen = self.seen.lock().await;
        seen.extend(ids);
        Ok(())
    }

    /// Run ticks forever on [`TICK_INTERVAL`].
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }

    /// One guarded tick. Skipped entirely if the previous tick is still
    /// running; errors are logged and the loop continues.
    pub async fn tick(&self) {
        if self.tick_running.swap(true, Ordering::SeqCst) {
            debug!("previous tick still running; skipping");
            return;
        }
        let tick_no = self.ticks.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.run_tick(tick_no).await {
            debug!(error = %e, "tick abandoned");
        }
        self.tick_running.store(false, Ordering::SeqCst);
    }

    async fn run_tick(&self, tick_no: u64) -> Result<()> {
        // 1. Fast path: the selected-conversations hook, when wired.
        if let Some(hook) = &self.selected_hook {
            for id in hook() {
                self.handle_if_new(&id).await?;
            }
        }

        // 2. Slow path: full id scan from the IDE store.
        for id in self.source.all_ids().await? {
            self.handle_if_new(&id).await?;
        }

        // 3. Pending composer: bind it as soon as a name shows up.
        if let Some(pending_id) = self.pending.current() {
            if let Some(name) = self.source.name(&pending_id).await? {
                self.threads
                    .create_thread_for_conversation(&pending_id, &name)
                    .await?;
                self.pending.clear(&pending_id);
            }
        }

        // 4/5. Archive and unarchive mirroring, IDE → chat.
        let archived = self.source.archived_ids().await?;
        let processed: HashSet<String> =
            self.store.processed_archived_ids().await?.into_iter().collect();

        for id in archived.difference(&processed) {
            match self.threads.archive_for_conversation(id).await {
                Ok(mirrored) => {
                    if mirrored {
                        info!(conversation_id = %id, "archived thread for archived conversation");
                    }
                },
                Err(e) => warn!(conversation_id = %id, error = %e, "archive mirror failed"),
            }
            self.store.add_processed_archived(id).await?;
            if let Some(events) = &self.events {
                let _ = events.send(WatcherEvent::ConversationArchived {
                    conversation_id: id.clone(),
                });
            }
        }

        for id in processed.difference(&archived) {
            match self.threads.unarchive_for_conversation(id).await {
                Ok(mirrored) => {
                    if mirrored {
                        info!(conversation_id = %id, "unarchived thread for restored conversation");
                    }
                },
                Err(e) => warn!(conversation_id = %id, error = %e, "unarchive mirror failed"),
            }
            self.store.remove_processed_archived(id).await?;
        }

        // 6. Inactivity reopener, every Nth tick.
        if tick_no % REOPEN_EVERY_TICKS == 0 {
            let truly_active = self.truly_active_ids().await?;
            let reopened = self.threads.ensure_active_threads_open(&truly_active).await?;
            if reopened > 0 {
                info!(reopened, "reopened threads for active conversations");
            }
        }

        Ok(())
    }

    async fn handle_if_new(&self, conversation_id: &str) -> Result<()> {
        {
            let mut seen = self.seen.lock().await;
            if !seen.insert(conversation_id.to_string()) {
                return Ok(());
            }
        }
        self.store.add_seen(conversation_id).await?;

        if self.registry.get(conversation_id).await?.is_some() {
            return Ok(());
        }

        match self.source.name(conversation_id).await? {
            Some(name) => {
                self.threads
                    .create_thread_for_conversation(conversation_id, &name)
                    .await?;
            },
            None => {
                if let Some(displaced) = self.pending.replace(conversation_id) {
                    info!(
                        displaced = %displaced,
                        pending = %conversation_id,
                        "newer nameless conversation replaced pending composer"
                    );
                }
            },
        }
        Ok(())
    }

    /// A conversation is truly active when it ranks in the top-N by recency
    /// or was last touched within the configured window.
    async fn truly_active_ids(&self) -> Result<Vec<String>> {
        let ranked = self.source.active_ranked_by_recency().await?;
        let now = now_ms();
        let window = self.config.implicit_archive_window_ms();
        let top_n = self.config.implicit_archive_count as usize;
        Ok(ranked
            .into_iter()
            .filter(|r| {
                r.position < top_n
                    || r.last_updated_at
                        .is_some_and(|at| now.saturating_sub(at) < window)
            })
            .map(|r| r.conversation_id)
            .collect())
    }
}
