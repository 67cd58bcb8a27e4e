//! # Threadline Core
//!
//! Domain types, traits, and error definitions for the Threadline chat backend.
//! This crate has **zero framework dependencies**; it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (the language model, tool capabilities, the
//! session store) is defined as a trait here. Implementations live in their
//! respective crates, so the turn logic can be exercised with mocks.

pub mod error;
pub mod message;
pub mod provider;
pub mod session;
pub mod token;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, MessageToolCall, Role, SessionId};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use session::{MemoryMode, SessionGuard, SessionLocks, SessionStore, SessionSummary};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
