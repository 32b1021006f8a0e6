//! Archive-transition classification.
//!
//! When a thread flips to archived, the daemon needs to know whether a user
//! closed it or the service's inactivity timer fired, because only the
//! former suppresses auto-reopen.

use {
    threadmirror_common::{Result, now_ms},
    threadmirror_state::StateStore,
    tracing::{debug, info},
};

/// Buffer subtracted from the auto-archive duration: transitions that land
/// inside the final five minutes of the inactivity window are attributed to
/// the timer, anything earlier to a user.
const INACTIVITY_BUFFER_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveClass {
    /// A user archived the thread; record it in the explicit-archive set.
    Manual,
    /// The service's inactivity timer archived it; eligible for auto-reopen.
    Inactivity,
}

/// Classify an archive transition observed `since_activity_ms` after the
/// last local activity, on a thread whose auto-archive duration (as carried
/// by the transition event itself) is `auto_archive_minutes`.
#[must_use]
pub fn classify_archive(auto_archive_minutes: u16, since_activity_ms: i64) -> ArchiveClass {
    let threshold_ms =
        (i64::from(auto_archive_minutes) - INACTIVITY_BUFFER_MINUTES).max(0) * 60 * 1000;
    if since_activity_ms <= threshold_ms {
        ArchiveClass::Manual
    } else {
        ArchiveClass::Inactivity
    }
}

/// Apply an observed archived-flag transition on a mapped thread.
///
/// On off→on, classify the transition against the last local activity and
/// record a manual close in the explicit-archive set. On on→off, clear the
/// explicit flag. Returns the classification for archive transitions.
pub async fn apply_archive_transition(
    store: &StateStore,
    thread_id: &str,
    now_archived: bool,
    auto_archive_minutes: u16,
) -> Result<Option<ArchiveClass>> {
    if !now_archived {
        store.remove_explicit_archive(thread_id).await?;
        debug!(thread_id = %thread_id, "thread unarchived; explicit flag cleared");
        return Ok(None);
    }

    let since_activity = match store.last_activity(thread_id).await? {
        Some(at) => now_ms().saturating_sub(at),
        // No recorded activity: nothing recent to protect, call it the timer.
        None => i64::MAX,
    };
    let class = classify_archive(auto_archive_minutes, since_activity);
    if class == ArchiveClass::Manual {
        store.add_explicit_archive(thread_id).await?;
        info!(thread_id = %thread_id, "user archived thread; auto-reopen suppressed");
    } else {
        debug!(thread_id = %thread_id, "thread archived by inactivity timer");
    }
    Ok(Some(class))
}

/// Record inbound (non-bot) activity in a mapped thread. A new message in
/// an explicitly archived thread lifts the suppression.
pub async fn note_inbound_activity(store: &StateStore, thread_id: &str) -> Result<()> {
    store.record_activity(thread_id, now_ms()).await?;
    if store.is_explicitly_archived(thread_id).await? {
        store.remove_explicit_archive(thread_id).await?;
        info!(thread_id = %thread_id, "inbound message cleared explicit archive");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: i64 = 60 * 1000;

    #[test]
    fn recent_activity_means_manual() {
        assert_eq!(classify_archive(1440, 10 * MIN), ArchiveClass::Manual);
    }

    #[test]
    fn threshold_boundary_for_one_day_threads() {
        assert_eq!(classify_archive(1440, 1435 * MIN), ArchiveClass::Manual);
        assert_eq!(classify_archive(1440, 1436 * MIN), ArchiveClass::Inactivity);
    }

    #[test]
    fn tiny_durations_never_go_negative() {
        assert_eq!(classify_archive(3, 0), ArchiveClass::Manual);
        assert_eq!(classify_archive(3, 1), ArchiveClass::Inactivity);
    }

    #[tokio::test]
    async fn manual_archive_sets_explicit_flag() {
        let store = StateStore::open_in_memory().await.unwrap();
        store.record_activity("T1", now_ms() - 10 * MIN).await.unwrap();

        let class = apply_archive_transition(&store, "T1", true, 1440)
            .await
            .unwrap();
        assert_eq!(class, Some(ArchiveClass::Manual));
        assert!(store.is_explicitly_archived("T1").await.unwrap());
    }

    #[tokio::test]
    async fn inactivity_archive_leaves_flag_clear() {
        let store = StateStore::open_in_memory().await.unwrap();
        store
            .record_activity("T1", now_ms() - 1439 * MIN)
            .await
            .unwrap();

        let class = apply_archive_transition(&store, "T1", true, 1440)
            .await
            .unwrap();
        assert_eq!(class, Some(ArchiveClass::Inactivity));
        assert!(!store.is_explicitly_archived("T1").await.unwrap());
    }

    #[tokio::test]
    async fn unarchive_clears_explicit_flag() {
        let store = StateStore::open_in_memory().await.unwrap();
        store.add_explicit_archive("T1").await.unwrap();

        let class = apply_archive_transition(&store, "T1", false, 1440)
            .await
            .unwrap();
        assert_eq!(class, None);
        assert!(!store.is_explicitly_archived("T1").await.unwrap());
    }

    #[tokio::test]
    async fn inbound_message_lifts_suppression_and_records_activity() {
        let store = StateStore::open_in_memory().await.unwrap();
        store.add_explicit_archive("T1").await.unwrap();

        note_inbound_activity(&store, "T1").await.unwrap();
        assert!(!store.is_explicitly_archived("T1").await.unwrap());
        assert!(store.last_activity("T1").await.unwrap().is_some());
    }
}
