//! Session store trait: per-session ordered message history.
//!
//! Two durability modes exist:
//! - `temporary`: held in process memory, gone on restart
//! - `persistent`: durably recorded, resumable after restart
//!
//! A store also hands out per-session locks so that one turn's
//! read-modify-append sequence never interleaves with another turn on the
//! same session. Different sessions never contend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

use crate::error::StoreError;
use crate::message::{Message, SessionId};

/// Durability mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    /// Process-lifetime only
    Temporary,
    /// Survives process restart
    Persistent,
}

impl MemoryMode {
    pub const ALL: [MemoryMode; 2] = [MemoryMode::Temporary, MemoryMode::Persistent];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryMode::Temporary => "temporary",
            MemoryMode::Persistent => "persistent",
        }
    }
}

impl std::fmt::Display for MemoryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a mode string is neither `temporary` nor `persistent`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("memory must be 'temporary' or 'persistent' (got '{0}')")]
pub struct InvalidMode(pub String);

impl std::str::FromStr for MemoryMode {
    type Err = InvalidMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temporary" => Ok(MemoryMode::Temporary),
            "persistent" => Ok(MemoryMode::Persistent),
            other => Err(InvalidMode(other.to_string())),
        }
    }
}

/// Lightweight listing entry for administrative views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub message_count: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Held for the duration of one turn on one session.
pub type SessionGuard = OwnedMutexGuard<()>;

/// Once the lock table grows past this, idle entries are evicted.
const LOCK_TABLE_SOFT_LIMIT: usize = 1_024;

/// A table of per-session async locks.
///
/// The table itself is guarded by a `std::sync::Mutex` held only briefly;
/// the per-session locks are tokio mutexes held across awaits.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn acquire(&self, id: &SessionId) -> SessionGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());

            // An entry whose only owner is the table is not held by anyone.
            if locks.len() > LOCK_TABLE_SOFT_LIMIT {
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }

            locks.entry(id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of sessions currently tracked in the table.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// The core SessionStore trait.
///
/// Implementations: in-memory (`temporary`), SQLite (`persistent`).
/// A session exists from the first `append` for its id; reading an unseen
/// id returns an empty history.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "sqlite").
    fn name(&self) -> &str;

    /// The durability mode this backend provides.
    fn mode(&self) -> MemoryMode;

    /// Ordered history of a session, oldest first.
    async fn get_history(&self, id: &SessionId) -> Result<Vec<Message>, StoreError>;

    /// Append messages to the end of a session's history, atomically.
    async fn append(&self, id: &SessionId, messages: Vec<Message>) -> Result<(), StoreError>;

    /// Serialize turns on one session. Hold the guard across read and append.
    async fn lock_session(&self, id: &SessionId) -> SessionGuard;

    /// List known sessions (administrative).
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError>;

    /// Remove a session and its history (administrative).
    async fn delete_session(&self, id: &SessionId) -> Result<bool, StoreError>;

    /// Release backend resources at shutdown.
    async fn close(&self) {}
}
