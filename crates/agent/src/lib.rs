//! Turn orchestration for Threadline.
//!
//! One user turn flows through:
//!
//! 1. **Chat service** validates the session id and durability mode
//! 2. **Turn controller** reads the session history under its lock
//! 3. **History trimmer** fits system prompt + history into the token budget
//! 4. **Tool gate** decides whether this model call may use tools
//! 5. Tool calls run once, their results are persisted, and the model
//!    drafts a final answer with tools disabled

pub mod gate;
pub mod service;
pub mod trimmer;
pub mod turn;

pub use gate::ToolGate;
pub use service::{ChatError, ChatReply, ChatService, Stores, settings_from_config};
pub use trimmer::{TrimError, check_system_prompt, trim_history};
pub use turn::{TurnController, TurnOutcome, TurnSettings, TurnState, Visit};
