//! SQLite session store, the `persistent` durability mode.
//!
//! Uses a single SQLite database file with two tables:
//! - `sessions`: one row per session with creation/update timestamps
//! - `messages`: the ordered history, keyed by `(session_id, seq)`
//!
//! `seq` is an autoincrement key, so insertion order is history order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use threadline_core::error::StoreError;
use threadline_core::message::{Message, MessageToolCall, Role, SessionId};
use threadline_core::session::{MemoryMode, SessionGuard, SessionLocks, SessionStore, SessionSummary};
use tracing::{debug, info};

/// A durable session store backed by SQLite.
pub struct SqliteStore {
    pool: SqlitePool,
    locks: SessionLocks,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// Parent directories are created as needed, as are tables and indexes.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!("Cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!(path = %path.display(), "SQLite session store initialized");
        Ok(store)
    }

    /// An ephemeral database living on a single connection (useful for tests).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = "sqlite::memory:"
            .parse::<SqliteConnectOptions>()
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite URL: {e}")))?;

        // Every connection to :memory: is its own database, so keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        Self::from_pool(pool).await
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            locks: SessionLocks::new(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id          TEXT PRIMARY KEY NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq           INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id    TEXT NOT NULL,
                id            TEXT NOT NULL,
                role          TEXT NOT NULL,
                content       TEXT NOT NULL,
                tool_calls    TEXT NOT NULL DEFAULT '[]',
                tool_call_id  TEXT,
                tool_name     TEXT,
                timestamp     TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_session_seq ON messages(session_id, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("session index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Parse a `Message` from a row of the `messages` table.
    fn row_to_message(session: &SessionId, row: &SqliteRow) -> Result<Message, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            session_id: session.to_string(),
            reason,
        };

        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let role_str: String = row
            .try_get("role")
            .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let tool_calls_json: String = row
            .try_get("tool_calls")
            .map_err(|e| StoreError::QueryFailed(format!("tool_calls column: {e}")))?;
        let tool_call_id: Option<String> = row
            .try_get("tool_call_id")
            .map_err(|e| StoreError::QueryFailed(format!("tool_call_id column: {e}")))?;
        let tool_name: Option<String> = row
            .try_get("tool_name")
            .map_err(|e| StoreError::QueryFailed(format!("tool_name column: {e}")))?;
        let timestamp_str: String = row
            .try_get("timestamp")
            .map_err(|e| StoreError::QueryFailed(format!("timestamp column: {e}")))?;

        let role = Role::parse(&role_str).ok_or_else(|| corrupt(format!("unknown role '{role_str}'")))?;

        let tool_calls: Vec<MessageToolCall> = serde_json::from_str(&tool_calls_json)
            .map_err(|e| corrupt(format!("tool_calls for message {id}: {e}")))?;

        let timestamp = parse_timestamp(&timestamp_str)
            .ok_or_else(|| corrupt(format!("timestamp '{timestamp_str}'")))?;

        Ok(Message {
            id,
            role,
            content,
            tool_calls,
            tool_call_id,
            tool_name,
            timestamp,
        })
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl SessionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn mode(&self) -> MemoryMode {
        MemoryMode::Persistent
    }

    async fn get_history(&self, id: &SessionId) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, role, content, tool_calls, tool_call_id, tool_name, timestamp
            FROM messages
            WHERE session_id = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("History read failed: {e}")))?;

        rows.iter().map(|row| Self::row_to_message(id, row)).collect()
    }

    async fn append(&self, id: &SessionId, messages: Vec<Message>) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("Begin transaction: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, created_at, updated_at)
            VALUES (?1, ?2, ?2)
            ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(id.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Session upsert failed: {e}")))?;

        for message in &messages {
            let tool_calls_json = serde_json::to_string(&message.tool_calls)
                .map_err(|e| StoreError::Storage(format!("Tool call serialization: {e}")))?;

            sqlx::query(
                r#"
                INSERT INTO messages
                    (session_id, id, role, content, tool_calls, tool_call_id, tool_name, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(id.as_str())
            .bind(&message.id)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(&tool_calls_json)
            .bind(&message.tool_call_id)
            .bind(&message.tool_name)
            .bind(message.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Message insert failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("Commit failed: {e}")))?;

        debug!(session = %id, count = messages.len(), "Appended messages");
        Ok(())
    }

    async fn lock_session(&self, id: &SessionId) -> SessionGuard {
        self.locks.acquire(id).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT s.id AS id, s.updated_at AS updated_at, COUNT(m.seq) AS message_count
            FROM sessions s
            LEFT JOIN messages m ON m.session_id = s.id
            GROUP BY s.id
            ORDER BY s.updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Session listing failed: {e}")))?;

        rows.iter()
            .map(|row| {
                let id: String = row
                    .try_get("id")
                    .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
                let updated_at: String = row
                    .try_get("updated_at")
                    .map_err(|e| StoreError::QueryFailed(format!("updated_at column: {e}")))?;
                let count: i64 = row
                    .try_get("message_count")
                    .map_err(|e| StoreError::QueryFailed(format!("message_count column: {e}")))?;

                Ok(SessionSummary {
                    id: SessionId(id),
                    message_count: usize::try_from(count).unwrap_or(0),
                    updated_at: parse_timestamp(&updated_at),
                })
            })
            .collect()
    }

    async fn delete_session(&self, id: &SessionId) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("Begin transaction: {e}")))?;

        sqlx::query("DELETE FROM messages WHERE session_id = ?1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Message delete failed: {e}")))?;

        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Session delete failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("Commit failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("SQLite session store closed");
    }
}
