//! History trimming to a token budget.
//!
//! Policy: keep the leading system message, drop the oldest conversation
//! messages first, and stop as soon as the remainder fits. The token count
//! is supplied by the caller (normally `Provider::count_tokens`).

use std::slice;
use threadline_core::message::{Message, Role};

/// The mandatory system message does not fit the budget on its own.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrimError {
    #[error("system prompt needs {needed} tokens but the history budget is {budget}")]
    SystemPromptTooLarge { needed: usize, budget: usize },
}

/// Check at startup that `system_prompt` alone fits within `budget`.
pub fn check_system_prompt(
    system_prompt: &str,
    budget: usize,
    count: impl Fn(&[Message]) -> usize,
) -> Result<(), TrimError> {
    let needed = count(&[Message::system(system_prompt)]);
    if needed > budget {
        return Err(TrimError::SystemPromptTooLarge { needed, budget });
    }
    Ok(())
}

/// Trim `messages` so their token count is at most `budget`.
///
/// Returns the input unchanged when it already fits. Otherwise returns the
/// system message (if the sequence starts with one) followed by the longest
/// suffix of the remaining messages that fits. A kept suffix never opens
/// with a tool result whose request was dropped; when only such results
/// fit, just the system message is kept.
pub fn trim_history(
    messages: &[Message],
    budget: usize,
    count: impl Fn(&[Message]) -> usize,
) -> Result<Vec<Message>, TrimError> {
    if messages.is_empty() || count(messages) <= budget {
        return Ok(messages.to_vec());
    }

    let (system, rest) = match messages.split_first() {
        Some((first, rest)) if first.role == Role::System => (Some(first), rest),
        _ => (None, messages),
    };

    let head: Vec<Message> = system.cloned().into_iter().collect();
    if let Some(system) = system {
        let needed = count(slice::from_ref(system));
        if needed > budget {
            return Err(TrimError::SystemPromptTooLarge { needed, budget });
        }
    }

    let fits = |start: usize| {
        let candidate: Vec<Message> = head.iter().chain(&rest[start..]).cloned().collect();
        count(&candidate) <= budget
    };

    // Smallest start index whose suffix fits; rest.len() (empty suffix) always does.
    let mut start = (0..=rest.len())
        .find(|&i| fits(i))
        .unwrap_or(rest.len());

    while start < rest.len() && rest[start].is_tool_result() {
        start += 1;
    }

    let mut trimmed = head;
    trimmed.extend_from_slice(&rest[start..]);
    Ok(trimmed)
}
