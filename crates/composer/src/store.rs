//! Read-only composer queries against the IDE's `state.vscdb`.
//!
//! The IDE is the sole writer; this store opens a fresh read-only
//! connection per query so it never holds a lock across ticks. A busy
//! database surfaces as `Error::Locked`, which callers treat as "no data
//! this tick".

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
};

use {
    async_trait::async_trait,
    serde::Deserialize,
    sqlx::{ConnectOptions, Connection, sqlite::SqliteConnectOptions},
    threadmirror_bridge::{ConversationSource, RankedConversation},
    threadmirror_common::{Error, Result},
    tracing::debug,
};

/// The storage key whose value is the composer-data JSON blob.
const COMPOSER_DATA_KEY: &str = "composer.composerData";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComposerRecord {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    last_updated_at: Option<i64>,
    #[serde(default)]
    is_archived: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComposerData {
    #[serde(default)]
    all_composers: Vec<ComposerRecord>,
}

/// Read-only adapter over one workspace's `state.vscdb`.
pub struct ComposerStore {
    db_path: PathBuf,
}

fn db_err(e: sqlx::Error) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.message().contains("locked") => {
            Error::locked(db.message())
        },
        _ => Error::locked(e.to_string()),
    }
}

impl ComposerStore {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    #[must_use]
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    async fn read(&self) -> Result<ComposerData> {
        if !self.db_path.exists() {
            return Err(Error::locked(format!(
                "storage database missing: {}",
                self.db_path.display()
            )));
        }
        let options = SqliteConnectOptions::new()
            .filename(&self.db_path)
            .read_only(true)
            .disable_statement_logging();
        let mut conn = options.connect().await.map_err(db_err)?;
        let raw: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT value FROM ItemTable WHERE key = ?")
                .bind(COMPOSER_DATA_KEY)
                .fetch_optional(&mut conn)
                .await
                .map_err(db_err)?;
        let _ = conn.close().await;

        let Some(raw) = raw else {
            debug!("no composer data stored yet");
            return Ok(ComposerData::default());
        };
        Ok(serde_json::from_slice(&raw)?)
    }
}

fn usable_name(name: Option<&str>) -> Option<String> {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(ToOwned::to_owned)
}

#[async_trait]
impl ConversationSource for ComposerStore {
    async fn all_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .read()
            .await?
            .all_composers
            .into_iter()
            .map(|c| c.id)
            .collect())
    }

    async fn name(&self, conversation_id: &str) -> Result<Option<String>> {
        Ok(self
            .read()
            .await?
            .all_composers
            .iter()
            .find(|c| c.id == conversation_id)
            .and_then(|c| usable_name(c.name.as_deref())))
    }

    async fn all_names(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .read()
            .await?
            .all_composers
            .into_iter()
            .filter_map(|c| usable_name(c.name.as_deref()).map(|n| (c.id, n)))
            .collect())
    }

    async fn archived_ids(&self) -> Result<HashSet<String>> {
        Ok(self
            .read()
            .await?
            .all_composers
            .into_iter()
            .filter(|c| c.is_archived)
            .map(|c| c.id)
            .collect())
    }

    async fn active_ranked_by_recency(&self) -> Result<Vec<RankedConversation>> {
        let mut active: Vec<ComposerRecord> = self
            .read()
            .await?
            .all_composers
            .into_iter()
            .filter(|c| !c.is_archived)
            .collect();
        // Descending recency, conversations without a timestamp last.
        active.sort_by(|a, b| match (a.last_updated_at, b.last_updated_at) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Ok(active
            .into_iter()
            .enumerate()
            .map(|(position, c)| RankedConversation {
                conversation_id: c.id,
                last_updated_at: c.last_updated_at,
                position,
            })
            .collect())
    }
}
