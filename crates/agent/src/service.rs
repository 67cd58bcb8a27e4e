//! The chat service: the boundary every front end (HTTP, CLI) calls into.
//!
//! Owns one [`TurnController`] per durability mode, each bound to its own
//! session store. Both are built at startup and torn down by [`ChatService::shutdown`].

use std::sync::Arc;
use threadline_config::AppConfig;
use threadline_core::error::Error;
use threadline_core::message::{Message, SessionId};
use threadline_core::provider::Provider;
use threadline_core::session::{MemoryMode, SessionStore, SessionSummary};
use threadline_core::tool::ToolRegistry;
use threadline_memory::{InMemoryStore, SqliteStore};
use tracing::info;

use crate::gate::ToolGate;
use crate::trimmer::check_system_prompt;
use crate::turn::{TurnController, TurnSettings};

/// Errors surfaced to callers of the chat service.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The request was rejected before any state changed.
    #[error("{0}")]
    InvalidRequest(String),

    /// The turn failed (model or store).
    #[error(transparent)]
    Turn(#[from] Error),
}

/// A completed turn as seen by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub session_id: SessionId,
    pub reply: String,
    pub mode: MemoryMode,
    pub tokens_input: Option<u32>,
    pub tokens_output: Option<u32>,
}

/// Session stores for the two durability modes.
pub struct Stores {
    pub temporary: Arc<dyn SessionStore>,
    pub persistent: Arc<dyn SessionStore>,
}

pub struct ChatService {
    temporary: TurnController,
    persistent: TurnController,
    default_mode: MemoryMode,
}

impl ChatService {
    /// Build the service.
    ///
    /// Fails with a configuration error if the system prompt alone does
    /// not fit the history budget.
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        stores: Stores,
        gate: ToolGate,
        settings: TurnSettings,
        default_mode: MemoryMode,
    ) -> Result<Self, Error> {
        check_system_prompt(&settings.system_prompt, settings.history_budget, |m| {
            provider.count_tokens(m)
        })
        .map_err(|e| Error::Config {
            message: e.to_string(),
        })?;

        let controller = |store: Arc<dyn SessionStore>| {
            TurnController::new(
                provider.clone(),
                store,
                tools.clone(),
                gate.clone(),
                settings.clone(),
            )
        };

        Ok(Self {
            temporary: controller(stores.temporary),
            persistent: controller(stores.persistent),
            default_mode,
        })
    }

    /// Build the service from configuration: in-memory store for
    /// `temporary`, SQLite at `store.sqlite_path` for `persistent`, and the
    /// built-in tools.
    pub async fn from_config(config: &AppConfig, provider: Arc<dyn Provider>) -> Result<Self, Error> {
        let persistent = SqliteStore::open(&config.store.sqlite_path).await?;
        let stores = Stores {
            temporary: Arc::new(InMemoryStore::new()),
            persistent: Arc::new(persistent),
        };
        let tools = Arc::new(threadline_tools::default_registry(&config.tools));
        info!(
            tools = ?tools.names(),
            default_mode = %config.store.default_mode,
            "Chat service ready"
        );

        Self::new(
            provider,
            tools,
            stores,
            ToolGate::new(&config.tools.trigger_prefixes),
            settings_from_config(config),
            config.store.default_mode,
        )
    }

    /// Resolve a wire mode string, falling back to the default mode.
    pub fn resolve_mode(&self, mode: Option<&str>) -> Result<MemoryMode, ChatError> {
        match mode {
            None => Ok(self.default_mode),
            Some(raw) => raw
                .parse::<MemoryMode>()
                .map_err(|e| ChatError::InvalidRequest(e.to_string())),
        }
    }

    pub fn default_mode(&self) -> MemoryMode {
        self.default_mode
    }

    fn controller(&self, mode: MemoryMode) -> &TurnController {
        match mode {
            MemoryMode::Temporary => &self.temporary,
            MemoryMode::Persistent => &self.persistent,
        }
    }

    fn store(&self, mode: MemoryMode) -> &Arc<dyn SessionStore> {
        self.controller(mode).store()
    }

    /// Run one turn: validate, then hand off to the mode's controller.
    pub async fn chat(
        &self,
        session_id: &str,
        message: &str,
        mode: Option<&str>,
    ) -> Result<ChatReply, ChatError> {
        let session_id = parse_session_id(session_id)?;
        let mode = self.resolve_mode(mode)?;

        let outcome = self.controller(mode).run(&session_id, message).await?;

        Ok(ChatReply {
            session_id,
            reply: outcome.reply,
            mode,
            tokens_input: outcome.tokens_input,
            tokens_output: outcome.tokens_output,
        })
    }

    /// Full stored history of a session.
    pub async fn history(&self, mode: MemoryMode, session_id: &str) -> Result<Vec<Message>, ChatError> {
        let id = parse_session_id(session_id)?;
        Ok(self.store(mode).get_history(&id).await.map_err(Error::from)?)
    }

    pub async fn sessions(&self, mode: MemoryMode) -> Result<Vec<SessionSummary>, ChatError> {
        Ok(self.store(mode).list_sessions().await.map_err(Error::from)?)
    }

    /// Delete a session. Waits for any turn in progress on it to finish.
    pub async fn forget(&self, mode: MemoryMode, session_id: &str) -> Result<bool, ChatError> {
        let id = parse_session_id(session_id)?;
        let store = self.store(mode);
        let _guard = store.lock_session(&id).await;
        let removed = store.delete_session(&id).await.map_err(Error::from)?;
        info!(session_id = %id, mode = %mode, removed, "Session deleted");
        Ok(removed)
    }

    /// Release store resources. Call once at process shutdown.
    pub async fn shutdown(&self) {
        for mode in MemoryMode::ALL {
            self.store(mode).close().await;
        }
        info!("Chat service shut down");
    }
}

/// Turn settings derived from configuration.
pub fn settings_from_config(config: &AppConfig) -> TurnSettings {
    TurnSettings {
        model: config.model.clone(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        system_prompt: config.system_prompt.clone(),
        history_budget: config.history.max_tokens,
    }
}

fn parse_session_id(raw: &str) -> Result<SessionId, ChatError> {
    let id = SessionId::from(raw);
    if id.is_blank() {
        return Err(ChatError::InvalidRequest("session_id must not be empty".into()));
    }
    Ok(id)
}
