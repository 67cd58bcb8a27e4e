//! In-memory session store, the `temporary` durability mode.
//!
//! History lives in a map for the process lifetime and is gone on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use threadline_core::error::StoreError;
use threadline_core::message::{Message, SessionId};
use threadline_core::session::{MemoryMode, SessionGuard, SessionLocks, SessionStore, SessionSummary};
use tokio::sync::RwLock;

struct Thread {
    messages: Vec<Message>,
    updated_at: DateTime<Utc>,
}

/// A process-local session store.
#[derive(Default)]
pub struct InMemoryStore {
    threads: RwLock<HashMap<SessionId, Thread>>,
    locks: SessionLocks,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn mode(&self) -> MemoryMode {
        MemoryMode::Temporary
    }

    async fn get_history(&self, id: &SessionId) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .threads
            .read()
            .await
            .get(id)
            .map(|t| t.messages.clone())
            .unwrap_or_default())
    }

    async fn append(&self, id: &SessionId, messages: Vec<Message>) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut threads = self.threads.write().await;
        let thread = threads.entry(id.clone()).or_insert_with(|| Thread {
            messages: Vec::new(),
            updated_at: Utc::now(),
        });
        thread.messages.extend(messages);
        thread.updated_at = Utc::now();
        Ok(())
    }

    async fn lock_session(&self, id: &SessionId) -> SessionGuard {
        self.locks.acquire(id).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let threads = self.threads.read().await;
        let mut sessions: Vec<SessionSummary> = threads
            .iter()
            .map(|(id, t)| SessionSummary {
                id: id.clone(),
                message_count: t.messages.len(),
                updated_at: Some(t.updated_at),
            })
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn delete_session(&self, id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.threads.write().await.remove(id).is_some())
    }
}
