//! Thread-name reconciliation.
//!
//! The IDE assigns a conversation its human-readable name some time after
//! creation; this watcher renames the mapped thread once that happens. The
//! storage file has no change-notification channel, so triggering is
//! triple-redundant: native file watches on the database and its WAL,
//! an unconditional backup poll, and a watchdog that restarts dropped
//! watches. All three legs funnel into one mutex-guarded sync pass.

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use {
    notify_debouncer_full::{
        DebounceEventResult, Debouncer, RecommendedCache, new_debouncer, notify::RecursiveMode,
    },
    threadmirror_common::{
        Error, PLACEHOLDER_THREAD_NAME, Result, STALE_SENTINEL, text,
    },
    tokio::{sync::mpsc, task::JoinHandle},
    tracing::{debug, info, warn},
};

use crate::{gateway::ChatGateway, source::ConversationSource};

use threadmirror_state::MappingRegistry;

/// Debounce window for file-watch events.
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Unconditional backup poll.
const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Watchdog cadence for restarting dropped watches.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(60);

/// The stale marker stored in the name cache for unfetchable threads.
#[must_use]
pub fn stale_marker(conversation_id: &str) -> String {
    format!("{STALE_SENTINEL}{conversation_id}")
}

pub struct NameSyncWatcher {
    source: Arc<dyn ConversationSource>,
    gateway: Arc<dyn ChatGateway>,
    registry: MappingRegistry,
    /// conversation id → last known thread name (or stale marker).
    cache: tokio::sync::Mutex<HashMap<String, String>>,
    /// Overlapping sync passes return immediately.
    sync_lock: tokio::sync::Mutex<()>,
}

impl NameSyncWatcher {
    #[must_use]
    pub fn new(
        source: Arc<dyn ConversationSource>,
        gateway: Arc<dyn ChatGateway>,
        registry: MappingRegistry,
    ) -> Self {
        Self {
            source,
            gateway,
            registry,
            cache: tokio::sync::Mutex::new(HashMap::new()),
            sync_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Seed the cache from the chat service, not the IDE, so that any
    /// mismatch present at startup is caught by the first sync pass.
    pub async fn initialize(&self) -> Result<()> {
        let mappings = self.registry.all().await?;
        let mut cache = self.cache.lock().await;
        for mapping in mappings {
            match self.gateway.thread_snapshot(&mapping.thread_id).await {
                Ok(Some(snapshot)) => {
                    cache.insert(mapping.conversation_id, snapshot.name);
                },
                Ok(None) => {
                    warn!(
                        conversation_id = %mapping.conversation_id,
                        thread_id = %mapping.thread_id,
                        "mapped thread is gone; marking stale"
                    );
                    cache.insert(
                        mapping.conversation_id.clone(),
                        stale_marker(&mapping.conversation_id),
                    );
                    let _ = self.registry.mark_stale(&mapping.conversation_id).await;
                },
                Err(e) => {
                    // Could be transient (disconnect, throttle): poison only
                    // the cache entry, not the persistent mapping.
                    warn!(
                        thread_id = %mapping.thread_id,
                        error = %e,
                        "thread not fetchable at startup"
                    );
                    cache.insert(
                        mapping.conversation_id.clone(),
                        stale_marker(&mapping.conversation_id),
                    );
                },
            }
        }
        Ok(())
    }

    /// The cached thread name for a conversation, if any. Test hook.
    pub async fn cached_name(&self, conversation_id: &str) -> Option<String> {
        self.cache.lock().await.get(conversation_id).cloned()
    }

    /// One sync pass: rename every mapped thread whose IDE name has drifted
    /// from the cached thread name. Returns the number of renames issued.
    pub async fn sync_pass(&self) -> Result<u32> {
        let Ok(_guard) = self.sync_lock.try_lock() else {
            return Ok(0);
        };

        let names = self.source.all_names().await?;
        let mappings = self.registry.all().await?;
        let mut cache = self.cache.lock().await;
        let mut renamed = 0;

        for mapping in mappings {
            let Some(current) = names.get(&mapping.conversation_id) else {
                continue;
            };
            let cached = cache.get(&mapping.conversation_id);
            if cached.is_some_and(|c| c.starts_with(STALE_SENTINEL)) {
                continue;
            }
            let drifted = match cached {
                None => true,
                Some(c) => c != current || c == PLACEHOLDER_THREAD_NAME,
            };
            if !drifted {
                continue;
            }

            let thread_name = text::truncate_thread_name(current);
            match self.gateway.rename_thread(&mapping.thread_id, &thread_name).await {
                Ok(()) => {
                    renamed += 1;
                    info!(
                        conversation_id = %mapping.conversation_id,
                        thread_id = %mapping.thread_id,
                        name = %thread_name,
                        "renamed thread"
                    );
                    cache.insert(mapping.conversation_id.clone(), current.clone());
                },
                Err(Error::NotFound { .. }) => {
                    warn!(
                        thread_id = %mapping.thread_id,
                        "thread vanished during rename; marking stale"
                    );
                    cache.insert(
                        mapping.conversation_id.clone(),
                        stale_marker(&mapping.conversation_id),
                    );
                    let _ = self.registry.mark_stale(&mapping.conversation_id).await;
                },
                Err(e) => {
                    warn!(thread_id = %mapping.thread_id, error = %e, "rename failed");
                },
            }
        }
        Ok(renamed)
    }

    /// Start all three trigger legs. `watch_paths` are the IDE storage
    /// database and its WAL sibling.
    pub fn spawn(self: Arc<Self>, watch_paths: Vec<PathBuf>) -> Vec<JoinHandle<()>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let me = Arc::clone(&self);
        let trigger_task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                if let Err(e) = me.sync_pass().await {
                    debug!(error = %e, "triggered sync pass abandoned");
                }
            }
        });

        let me = Arc::clone(&self);
        let poll_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Err(e) = me.sync_pass().await {
                    debug!(error = %e, "polled sync pass abandoned");
                }
            }
        });

        let watchdog_task = tokio::spawn(watchdog(watch_paths, tx));

        vec![trigger_task, poll_task, watchdog_task]
    }
}

struct DbWatch {
    debouncer: Debouncer<notify_debouncer_full::notify::RecommendedWatcher, RecommendedCache>,
    watching: HashSet<PathBuf>,
}

fn build_watch(paths: &[PathBuf], tx: mpsc::UnboundedSender<()>) -> Option<DbWatch> {
    let events_tx = tx.clone();
    let debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
        match result {
            Ok(_) => {
                let _ = events_tx.send(());
            },
            Err(errors) => {
                for e in errors {
                    warn!(error = %e, "storage watch error");
                }
            },
        }
    });
    let mut watch = match debouncer {
        Ok(d) => DbWatch {
            debouncer: d,
            watching: HashSet::new(),
        },
        Err(e) => {
            warn!(error = %e, "could not create storage watcher");
            return None;
        },
    };
    for path in paths {
        if !path.exists() {
            continue;
        }
        match watch.debouncer.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                info!(path = %path.display(), "watching storage file");
                watch.watching.insert(path.clone());
            },
            Err(e) => warn!(path = %path.display(), error = %e, "watch failed"),
        }
    }
    Some(watch)
}

fn needs_restart(watch: Option<&DbWatch>, paths: &[PathBuf]) -> bool {
    match watch {
        None => true,
        Some(w) => paths
            .iter()
            .any(|p| p.exists() && !w.watching.contains(p)),
    }
}

/// Keeps the debouncer alive and rebuilds it when a storage file appears
/// that was not there at attach time (the WAL in particular only exists
/// once the IDE has written).
async fn watchdog(paths: Vec<PathBuf>, tx: mpsc::UnboundedSender<()>) {
    let mut watch = build_watch(&paths, tx.clone());
    let mut interval = tokio::time::interval(WATCHDOG_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        if needs_restart(watch.as_ref(), &paths) {
            info!("restarting storage file watches");
            watch = build_watch(&paths, tx.clone());
        }
    }
}
