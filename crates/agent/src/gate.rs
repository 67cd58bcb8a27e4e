//! Tool gate: decides whether a model call may use tools.
//!
//! Tools are enabled only when the user's message opens with a trigger
//! prefix (case-insensitive) and the message right before this call is not
//! a tool result. The second condition means the call that follows a tool
//! run is always tool-free, which bounds a turn to one tool phase.

/// Per-turn tool permission policy.
#[derive(Debug, Clone)]
pub struct ToolGate {
    prefixes: Vec<String>,
}

impl ToolGate {
    pub fn new<S: AsRef<str>>(prefixes: impl IntoIterator<Item = S>) -> Self {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether `user_text` opens with a trigger prefix.
    pub fn is_invited(&self, user_text: &str) -> bool {
        let text = user_text.trim_start().to_lowercase();
        self.prefixes.iter().any(|p| text.starts_with(p.as_str()))
    }

    /// The gate decision for one model call.
    pub fn allows(&self, user_text: &str, preceded_by_tool_result: bool) -> bool {
        !preceded_by_tool_result && self.is_invited(user_text)
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}
