//! Per-thread typing indicators.
//!
//! Discord's typing indicator expires after ~10 seconds, so an active
//! indicator is refreshed every 8. A hard cap stops a leaked indicator
//! after five minutes regardless.

use std::{sync::Arc, time::Duration};

use {
    dashmap::DashMap,
    serenity::{http::Http, model::id::ChannelId},
    tokio::task::JoinHandle,
    tracing::{debug, warn},
};

/// Refresh cadence for an active indicator.
const REFRESH: Duration = Duration::from_secs(8);

/// Safety cap: an indicator never outlives this.
const MAX_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// Tracks one refresh task per thread.
#[derive(Default)]
pub struct TypingManager {
    tasks: Arc<DashMap<String, JoinHandle<()>>>,
}

impl TypingManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the indicator for a thread. Exactly one refresh
    /// task runs per thread afterwards.
    pub fn start(&self, http: Arc<Http>, thread_id: &str, channel: ChannelId) {
        if let Some(existing) = self.tasks.remove(thread_id) {
            existing.1.abort();
        }

        let tasks = Arc::clone(&self.tasks);
        let key = thread_id.to_string();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            loop {
                if let Err(e) = channel.broadcast_typing(&http).await {
                    debug!(thread_id = %task_key, error = %e, "typing refresh failed");
                    break;
                }
                if started.elapsed() >= MAX_LIFETIME {
                    warn!(thread_id = %task_key, "typing indicator hit the five-minute cap");
                    break;
                }
                tokio::time::sleep(REFRESH).await;
            }
            tasks.remove(&task_key);
        });
        self.tasks.insert(key, handle);
    }

    /// Stop the indicator. A no-op success when none is active.
    pub fn stop(&self, thread_id: &str) {
        if let Some((_, handle)) = self.tasks.remove(thread_id) {
            handle.abort();
        }
    }

    /// Stop every indicator (shutdown path).
    pub fn stop_all(&self) {
        let keys: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.stop(&key);
        }
    }

    #[must_use]
    pub fn is_active(&self, thread_id: &str) -> bool {
        self.tasks.contains_key(thread_id)
    }
}
