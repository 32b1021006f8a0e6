//! SQLite-backed persistent workspace state.
//!
//! One database per workspace holds everything the daemon must remember
//! across restarts: conversation↔thread mappings, the all-time seen set,
//! the processed-archived set, per-thread activity timestamps, the
//! explicit-archive set, and the config/secret key-value blob.

use std::path::Path;

use {
    sqlx::{
        Row,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    threadmirror_common::{Error, Result, now_ms},
};

use crate::registry::Mapping;

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS mappings (
        conversation_id TEXT PRIMARY KEY,
        thread_id       TEXT NOT NULL UNIQUE,
        workspace       TEXT NOT NULL,
        created_at      INTEGER NOT NULL,
        claimed_at      INTEGER,
        stale           INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS seen_conversations (
        conversation_id TEXT PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS archived_conversations (
        conversation_id TEXT PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS thread_activity (
        thread_id        TEXT PRIMARY KEY,
        last_activity_ms INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS explicit_archives (
        thread_id TEXT PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS kv (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
];

/// Persistent store for one workspace.
///
/// A single-connection pool serializes all writes, which is what the
/// registry's ordering guarantees rely on.
pub struct StateStore {
    pool: sqlx::SqlitePool,
}

fn db_err(e: sqlx::Error) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.message().contains("locked") => {
            Error::locked(db.message())
        },
        _ => Error::external("state store", e),
    }
}

impl StateStore {
    /// Open (creating if missing) the state database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db_err)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for stmt in MIGRATIONS {
            sqlx::query(stmt).execute(&self.pool).await.map_err(db_err)?;
        }
        Ok(())
    }

    // ── Mappings ────────────────────────────────────────────────────────────

    pub async fn insert_mapping(&self, mapping: &Mapping) -> Result<()> {
        sqlx::query(
            r"INSERT INTO mappings (conversation_id, thread_id, workspace, created_at, claimed_at, stale)
              VALUES (?, ?, ?, ?, ?, ?)
              ON CONFLICT(conversation_id) DO UPDATE SET
                thread_id  = excluded.thread_id,
                workspace  = excluded.workspace,
                created_at = excluded.created_at",
        )
        .bind(&mapping.conversation_id)
        .bind(&mapping.thread_id)
        .bind(&mapping.workspace)
        .bind(mapping.created_at)
        .bind(mapping.claimed_at)
        .bind(i64::from(mapping.stale))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn mapping_by_conversation(&self, conversation_id: &str) -> Result<Option<Mapping>> {
        let row = sqlx::query_as::<_, MappingRow>(
            "SELECT conversation_id, thread_id, workspace, created_at, claimed_at, stale
             FROM mappings WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    pub async fn mapping_by_thread(&self, thread_id: &str) -> Result<Option<Mapping>> {
        let row = sqlx::query_as::<_, MappingRow>(
            "SELECT conversation_id, thread_id, workspace, created_at, claimed_at, stale
             FROM mappings WHERE thread_id = ?",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    pub async fn all_mappings(&self) -> Result<Vec<Mapping>> {
        let rows = sqlx::query_as::<_, MappingRow>(
            "SELECT conversation_id, thread_id, workspace, created_at, claimed_at, stale
             FROM mappings ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Newest unclaimed, non-stale mapping created at or after `cutoff_ms`.
    pub async fn newest_unclaimed_since(&self, cutoff_ms: i64) -> Result<Option<Mapping>> {
        let row = sqlx::query_as::<_, MappingRow>(
            "SELECT conversation_id, thread_id, workspace, created_at, claimed_at, stale
             FROM mappings
             WHERE claimed_at IS NULL AND stale = 0 AND created_at >= ?
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(cutoff_ms)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    /// Compare-and-set claim. Returns `true` iff this call set `claimed_at`.
    pub async fn try_claim(&self, conversation_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE mappings SET claimed_at = ? WHERE conversation_id = ? AND claimed_at IS NULL",
        )
        .bind(now_ms())
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    /// Flag a mapping whose backing thread is not fetchable. Never deletes.
    pub async fn mark_mapping_stale(&self, conversation_id: &str) -> Result<()> {
        sqlx::query("UPDATE mappings SET stale = 1 WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // ── Seen conversations ──────────────────────────────────────────────────

    pub async fn seen_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT conversation_id FROM seen_conversations")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    pub async fn add_seen(&self, conversation_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO seen_conversations (conversation_id) VALUES (?)")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // ── Processed-archived set ──────────────────────────────────────────────

    pub async fn processed_archived_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT conversation_id FROM archived_conversations")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    pub async fn add_processed_archived(&self, conversation_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO archived_conversations (conversation_id) VALUES (?)")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn remove_processed_archived(&self, conversation_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM archived_conversations WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // ── Thread activity ─────────────────────────────────────────────────────

    pub async fn record_activity(&self, thread_id: &str, at_ms: i64) -> Result<()> {
        sqlx::query(
            r"INSERT INTO thread_activity (thread_id, last_activity_ms) VALUES (?, ?)
              ON CONFLICT(thread_id) DO UPDATE SET last_activity_ms = excluded.last_activity_ms",
        )
        .bind(thread_id)
        .bind(at_ms)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn last_activity(&self, thread_id: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT last_activity_ms FROM thread_activity WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| r.get(0)))
    }

    // ── Explicit-archive set ────────────────────────────────────────────────

    pub async fn is_explicitly_archived(&self, thread_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM explicit_archives WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    pub async fn add_explicit_archive(&self, thread_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO explicit_archives (thread_id) VALUES (?)")
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn remove_explicit_archive(&self, thread_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM explicit_archives WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // ── Config / secret KV ──────────────────────────────────────────────────

    pub async fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| r.get(0)))
    }

    pub async fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r"INSERT INTO kv (key, value) VALUES (?, ?)
              ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct MappingRow {
    conversation_id: String,
    thread_id: String,
    workspace: String,
    created_at: i64,
    claimed_at: Option<i64>,
    stale: i64,
}

impl From<MappingRow> for Mapping {
    fn from(r: MappingRow) -> Self {
        Self {
            conversation_id: r.conversation_id,
            thread_id: r.thread_id,
            workspace: r.workspace,
            created_at: r.created_at,
            claimed_at: r.claimed_at,
            stale: r.stale != 0,
        }
    }
}

/// Well-known keys in the `kv` table; names mirror the IDE extension's
/// storage keys so the doctor command can print them verbatim.
pub mod keys {
    pub const PROJECT_CONFIG: &str = "discordBridge.projectConfig";
    pub const GLOBAL_CONFIG: &str = "discordBridge.globalConfig";
    pub const BOT_TOKEN: &str = "discordBridge.botToken";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(c: &str, t: &str, created_at: i64) -> Mapping {
        Mapping {
            conversation_id: c.into(),
            thread_id: t.into(),
            workspace: "demo".into(),
            created_at,
            claimed_at: None,
            stale: false,
        }
    }

    #[tokio::test]
    async fn test_mapping_round_trip() {
        let store = StateStore::open_in_memory().await.unwrap();
        store.insert_mapping(&mapping("C1", "T1", 100)).await.unwrap();

        let by_c = store.mapping_by_conversation("C1").await.unwrap().unwrap();
        assert_eq!(by_c.thread_id, "T1");
        let by_t = store.mapping_by_thread("T1").await.unwrap().unwrap();
        assert_eq!(by_t.conversation_id, "C1");
        assert!(store.mapping_by_conversation("C2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_is_idempotent() {
        let store = StateStore::open_in_memory().await.unwrap();
        store.insert_mapping(&mapping("C1", "T1", 100)).await.unwrap();

        assert!(store.try_claim("C1").await.unwrap());
        let first = store
            .mapping_by_conversation("C1")
            .await
            .unwrap()
            .unwrap()
            .claimed_at;
        assert!(first.is_some());

        // Second claim is a no-op and leaves the timestamp untouched.
        assert!(!store.try_claim("C1").await.unwrap());
        let second = store
            .mapping_by_conversation("C1")
            .await
            .unwrap()
            .unwrap()
            .claimed_at;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_newest_unclaimed_respects_cutoff() {
        let store = StateStore::open_in_memory().await.unwrap();
        store.insert_mapping(&mapping("old", "T_old", 1_000)).await.unwrap();
        store.insert_mapping(&mapping("fresh", "T_fresh", 5_000)).await.unwrap();

        let hit = store.newest_unclaimed_since(2_000).await.unwrap().unwrap();
        assert_eq!(hit.conversation_id, "fresh");

        // One past the cutoff is excluded.
        assert!(store.newest_unclaimed_since(5_001).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_mappings_are_skipped() {
        let store = StateStore::open_in_memory().await.unwrap();
        store.insert_mapping(&mapping("C1", "T1", 1_000)).await.unwrap();
        store.mark_mapping_stale("C1").await.unwrap();

        assert!(store.newest_unclaimed_since(0).await.unwrap().is_none());
        // Still present for manual lookups.
        assert!(store.mapping_by_conversation("C1").await.unwrap().unwrap().stale);
    }

    #[tokio::test]
    async fn test_seen_and_archived_sets() {
        let store = StateStore::open_in_memory().await.unwrap();
        store.add_seen("C1").await.unwrap();
        store.add_seen("C1").await.unwrap();
        assert_eq!(store.seen_ids().await.unwrap(), vec!["C1".to_string()]);

        store.add_processed_archived("C1").await.unwrap();
        assert_eq!(store.processed_archived_ids().await.unwrap().len(), 1);
        store.remove_processed_archived("C1").await.unwrap();
        assert!(store.processed_archived_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activity_and_explicit_archive() {
        let store = StateStore::open_in_memory().await.unwrap();
        store.record_activity("T1", 123).await.unwrap();
        store.record_activity("T1", 456).await.unwrap();
        assert_eq!(store.last_activity("T1").await.unwrap(), Some(456));
        assert_eq!(store.last_activity("T2").await.unwrap(), None);

        store.add_explicit_archive("T1").await.unwrap();
        assert!(store.is_explicitly_archived("T1").await.unwrap());
        store.remove_explicit_archive("T1").await.unwrap();
        assert!(!store.is_explicitly_archived("T1").await.unwrap());
    }

    #[tokio::test]
    async fn test_kv() {
        let store = StateStore::open_in_memory().await.unwrap();
        assert!(store.kv_get(keys::BOT_TOKEN).await.unwrap().is_none());
        store.kv_set(keys::BOT_TOKEN, "abc").await.unwrap();
        store.kv_set(keys::BOT_TOKEN, "def").await.unwrap();
        assert_eq!(store.kv_get(keys::BOT_TOKEN).await.unwrap().as_deref(), Some("def"));
    }
}
