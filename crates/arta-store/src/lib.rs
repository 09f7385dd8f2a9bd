//! SQLite-backed interaction history.
//!
//! Persists one row per answered message. Writes are best-effort from the
//! dispatcher's point of view: a failed save is logged by the caller and
//! never blocks the reply path.

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, Context, Result};
use arta_core::current_unix_timestamp_ms;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Channel the interaction arrived on.
pub enum MessageType {
    DirectMessage,
    CommentReply,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectMessage => "direct_message",
            Self::CommentReply => "comment_reply",
        }
    }

    fn from_str(value: &str) -> Self {
        match value {
            "comment_reply" => Self::CommentReply,
            _ => Self::DirectMessage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One answered interaction, as handed to [`InteractionStore::save`].
pub struct InteractionRecord {
    pub user_id: String,
    pub question: String,
    pub response: String,
    pub message_type: MessageType,
    pub sentiment: String,
    pub media_id: Option<String>,
    pub comment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A stored interaction row.
pub struct StoredInteraction {
    pub id: i64,
    pub user_id: String,
    pub question: String,
    pub response: String,
    pub message_type: MessageType,
    pub sentiment: String,
    pub media_id: Option<String>,
    pub comment_id: Option<String>,
    pub created_unix_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Aggregate counters for the ops surface.
pub struct StoreStats {
    pub total_requests: u64,
    pub today_requests: u64,
    pub unique_users: u64,
}

/// Interaction history store over a single SQLite file.
pub struct InteractionStore {
    conn: Mutex<Connection>,
}

impl InteractionStore {
    /// Opens (creating if needed) the store at `path` and applies the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open interaction store {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("failed to open in-memory interaction store")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS interactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                question TEXT NOT NULL,
                response TEXT NOT NULL,
                message_type TEXT NOT NULL,
                sentiment TEXT NOT NULL,
                media_id TEXT,
                comment_id TEXT,
                created_unix_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_interactions_user
                ON interactions (user_id, created_unix_ms);
            CREATE INDEX IF NOT EXISTS idx_interactions_created
                ON interactions (created_unix_ms);",
        )
        .context("failed to apply interaction store schema")?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION],
        )
        .context("failed to record schema version")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("interaction store mutex is poisoned"))
    }

    /// Inserts one interaction row, returning its id.
    pub fn save(&self, record: &InteractionRecord) -> Result<i64> {
        self.save_at(record, current_unix_timestamp_ms())
    }

    pub fn save_at(&self, record: &InteractionRecord, now_unix_ms: u64) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO interactions
                (user_id, question, response, message_type, sentiment, media_id, comment_id, created_unix_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.user_id,
                record.question,
                record.response,
                record.message_type.as_str(),
                record.sentiment,
                record.media_id,
                record.comment_id,
                now_unix_ms as i64,
            ],
        )
        .context("failed to insert interaction")?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent interactions for a user, newest first.
    pub fn history(&self, user_id: &str, limit: usize) -> Result<Vec<StoredInteraction>> {
        let conn = self.lock()?;
        let mut statement = conn
            .prepare(
                "SELECT id, user_id, question, response, message_type, sentiment,
                        media_id, comment_id, created_unix_ms
                 FROM interactions
                 WHERE user_id = ?1
                 ORDER BY created_unix_ms DESC, id DESC
                 LIMIT ?2",
            )
            .context("failed to prepare history query")?;
        let rows = statement
            .query_map(params![user_id, limit as i64], |row| {
                Ok(StoredInteraction {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    question: row.get(2)?,
                    response: row.get(3)?,
                    message_type: MessageType::from_str(&row.get::<_, String>(4)?),
                    sentiment: row.get(5)?,
                    media_id: row.get(6)?,
                    comment_id: row.get(7)?,
                    created_unix_ms: row.get::<_, i64>(8)? as u64,
                })
            })
            .context("failed to run history query")?;

        let mut interactions = Vec::new();
        for row in rows {
            interactions.push(row.context("failed to decode interaction row")?);
        }
        Ok(interactions)
    }

    /// Deletes rows older than the given age in days; returns how many.
    pub fn purge_older_than(&self, days: u64) -> Result<usize> {
        self.purge_older_than_at(days, current_unix_timestamp_ms())
    }

    pub fn purge_older_than_at(&self, days: u64, now_unix_ms: u64) -> Result<usize> {
        let cutoff_ms = now_unix_ms.saturating_sub(days.saturating_mul(86_400_000));
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM interactions WHERE created_unix_ms < ?1",
                params![cutoff_ms as i64],
            )
            .context("failed to purge old interactions")?;
        if removed > 0 {
            tracing::info!(removed, days, "purged old interaction records");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.stats_at(current_unix_timestamp_ms())
    }

    pub fn stats_at(&self, now_unix_ms: u64) -> Result<StoreStats> {
        let day_start_ms = now_unix_ms.saturating_sub(86_400_000);
        let conn = self.lock()?;
        let total_requests = conn
            .query_row("SELECT COUNT(*) FROM interactions", [], |row| {
                row.get::<_, i64>(0)
            })
            .context("failed to count interactions")? as u64;
        let today_requests = conn
            .query_row(
                "SELECT COUNT(*) FROM interactions WHERE created_unix_ms >= ?1",
                params![day_start_ms as i64],
                |row| row.get::<_, i64>(0),
            )
            .context("failed to count recent interactions")? as u64;
        let unique_users = conn
            .query_row("SELECT COUNT(DISTINCT user_id) FROM interactions", [], |row| {
                row.get::<_, i64>(0)
            })
            .context("failed to count unique users")? as u64;
        Ok(StoreStats {
            total_requests,
            today_requests,
            unique_users,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{InteractionRecord, InteractionStore, MessageType};

    fn record(user_id: &str, question: &str) -> InteractionRecord {
        InteractionRecord {
            user_id: user_id.to_string(),
            question: question.to_string(),
            response: "پاسخ".to_string(),
            message_type: MessageType::DirectMessage,
            sentiment: "neutral".to_string(),
            media_id: None,
            comment_id: None,
        }
    }

    #[test]
    fn unit_save_then_history_round_trips() {
        let store = InteractionStore::open_in_memory().expect("store");
        let id = store.save_at(&record("u1", "سوال"), 1_000).expect("save");
        assert!(id > 0);

        let history = store.history("u1", 10).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "سوال");
        assert_eq!(history[0].message_type, MessageType::DirectMessage);
        assert_eq!(history[0].created_unix_ms, 1_000);
    }

    #[test]
    fn unit_history_is_newest_first_and_limited() {
        let store = InteractionStore::open_in_memory().expect("store");
        for index in 0..5 {
            store
                .save_at(&record("u1", &format!("q{index}")), 1_000 + index)
                .expect("save");
        }
        store.save_at(&record("u2", "other"), 1_000).expect("save");

        let history = store.history("u1", 3).expect("history");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].question, "q4");
        assert_eq!(history[2].question, "q2");
    }

    #[test]
    fn functional_purge_removes_only_old_rows() {
        let store = InteractionStore::open_in_memory().expect("store");
        let day_ms = 86_400_000_u64;
        store.save_at(&record("u1", "old"), 0).expect("save");
        store
            .save_at(&record("u1", "fresh"), 95 * day_ms)
            .expect("save");

        let removed = store.purge_older_than_at(90, 100 * day_ms).expect("purge");
        assert_eq!(removed, 1);
        let history = store.history("u1", 10).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "fresh");
    }

    #[test]
    fn unit_stats_count_totals_and_unique_users() {
        let store = InteractionStore::open_in_memory().expect("store");
        store.save_at(&record("u1", "a"), 1_000).expect("save");
        store.save_at(&record("u1", "b"), 2_000).expect("save");
        store.save_at(&record("u2", "c"), 90_000_000_000).expect("save");

        let stats = store.stats_at(90_000_000_000).expect("stats");
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.unique_users, 2);
        assert_eq!(stats.today_requests, 1);
    }

    #[test]
    fn regression_open_creates_parent_directories() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("nested").join("history.sqlite");
        let store = InteractionStore::open(&path).expect("store");
        store.save_at(&record("u1", "q"), 1).expect("save");
        assert!(path.exists());
    }
}
