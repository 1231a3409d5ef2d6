//! Token counting.
//!
//! Counting is pluggable so chunk bounds and the summarization trigger can
//! follow whatever tokenizer the deployment cares about. Both shipped counters
//! are deterministic and monotonic in content length.

use crate::message::Message;

/// Per-message overhead for role name, delimiters and wire formatting.
pub const MESSAGE_OVERHEAD: usize = 4;

/// Counts tokens in text.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    /// Tokens for one message, including overhead and tool-call arguments.
    fn count_message(&self, message: &Message) -> usize {
        let calls: usize = message
            .tool_calls
            .iter()
            .map(|c| self.count(&c.name) + self.count(&c.arguments.to_string()))
            .sum();
        MESSAGE_OVERHEAD + self.count(&message.content) + calls
    }

    /// Tokens for a slice of messages.
    fn count_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }
}

/// Heuristic: 1 token ≈ 4 characters. Rounds up.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimate;

impl TokenCounter for CharEstimate {
    fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        text.len().div_ceil(4)
    }
}

/// Heuristic: 1 word ≈ 1.3 tokens. Rounds up.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordEstimate;

impl TokenCounter for WordEstimate {
    fn count(&self, text: &str) -> usize {
        let words = text.split_whitespace().count();
        (words * 13).div_ceil(10)
    }
}
