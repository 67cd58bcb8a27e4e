//! JSON API handlers.
//!
//! Endpoints:
//!
//! - `POST   /chat`                : Run one turn, get the reply
//! - `GET    /sessions/{mode}`     : List sessions in a mode
//! - `GET    /sessions/{mode}/{id}`: Full history of a session
//! - `DELETE /sessions/{mode}/{id}`: Forget a session

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use threadline_agent::{ChatError, ChatService};
use threadline_core::error::Error;
use threadline_core::message::Message;
use threadline_core::session::{MemoryMode, SessionSummary};

pub type SharedService = Arc<ChatService>;

type ApiError = (StatusCode, Json<ErrorResponse>);

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    /// Durability mode: `temporary` or `persistent`. Defaults per config.
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
    pub mode: MemoryMode,
    pub tokens_input: Option<u32>,
    pub tokens_output: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub mode: MemoryMode,
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub mode: MemoryMode,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// Map a chat service error onto an HTTP status.
fn map_chat_error(e: ChatError) -> ApiError {
    match e {
        ChatError::InvalidRequest(msg) => error_response(StatusCode::BAD_REQUEST, msg),
        ChatError::Turn(Error::Provider(e)) => {
            warn!(error = %e, "Turn failed at the model");
            error_response(StatusCode::BAD_GATEWAY, format!("Model error: {e}"))
        }
        ChatError::Turn(e) => {
            error!(error = %e, "Turn failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Malformed or incomplete bodies keep axum's status but use the JSON error shape.
fn map_json_rejection(rejection: JsonRejection) -> ApiError {
    warn!(status = %rejection.status(), error = %rejection.body_text(), "Rejected chat body");
    error_response(rejection.status(), rejection.body_text())
}

fn parse_mode(service: &ChatService, raw: &str) -> Result<MemoryMode, ApiError> {
    service.resolve_mode(Some(raw)).map_err(map_chat_error)
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// `POST /chat`: run one turn.
pub async fn chat_handler(
    State(service): State<SharedService>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(payload) = payload.map_err(map_json_rejection)?;
    info!(
        session_id = %payload.session_id,
        memory = payload.memory.as_deref().unwrap_or("default"),
        metadata = ?payload.metadata,
        "chat request"
    );

    let reply = service
        .chat(&payload.session_id, &payload.message, payload.memory.as_deref())
        .await
        .map_err(map_chat_error)?;

    Ok(Json(ChatResponse {
        session_id: reply.session_id.to_string(),
        reply: reply.reply,
        mode: reply.mode,
        tokens_input: reply.tokens_input,
        tokens_output: reply.tokens_output,
    }))
}

/// `GET /sessions/{mode}`
pub async fn list_sessions_handler(
    State(service): State<SharedService>,
    Path(mode): Path<String>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let mode = parse_mode(&service, &mode)?;
    let sessions = service.sessions(mode).await.map_err(map_chat_error)?;
    Ok(Json(SessionListResponse { mode, sessions }))
}

/// `GET /sessions/{mode}/{id}`
pub async fn get_history_handler(
    State(service): State<SharedService>,
    Path((mode, id)): Path<(String, String)>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let mode = parse_mode(&service, &mode)?;
    let messages = service.history(mode, &id).await.map_err(map_chat_error)?;
    Ok(Json(HistoryResponse {
        session_id: id,
        mode,
        messages,
    }))
}

/// `DELETE /sessions/{mode}/{id}`
pub async fn delete_session_handler(
    State(service): State<SharedService>,
    Path((mode, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let mode = parse_mode(&service, &mode)?;
    if service.forget(mode, &id).await.map_err(map_chat_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Session '{id}' not found in {mode} memory"),
        ))
    }
}
