//! Transcript compaction.
//!
//! When the transcript grows past `trigger_tokens`, everything but the most
//! recent `keep_messages` is folded into one system summary written by the
//! [`Purpose::Summarization`] chain.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use wayfinder_config::SummarizationConfig;
use wayfinder_core::message::{Message, Role, last_user_index};
use wayfinder_core::provider::{ProviderResponse, Purpose};
use wayfinder_core::token::{CharEstimate, TokenCounter};

use super::{CallContext, Middleware, ModelRequest, Next, StateUpdate};
use crate::error::AgentError;

const SUMMARY_INSTRUCTIONS: &str = "Summarize the conversation below for your own future reference. \
Keep facts about the user, decisions made, tool findings and open questions. \
Write plain prose, no preamble.";

pub const SUMMARY_PREFIX: &str = "Summary of earlier conversation:\n";

pub struct Summarizer {
    enabled: bool,
    counter: Arc<dyn TokenCounter>,
    trigger_tokens: usize,
    keep_messages: usize,
}

impl Summarizer {
    pub fn new(trigger_tokens: usize, keep_messages: usize) -> Self {
        Self {
            enabled: true,
            counter: Arc::new(CharEstimate),
            trigger_tokens,
            keep_messages,
        }
    }

    pub fn from_config(config: &SummarizationConfig) -> Self {
        Self {
            enabled: config.enabled,
            counter: config.token_counter.counter(),
            trigger_tokens: config.trigger_tokens,
            keep_messages: config.keep_messages,
        }
    }

    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Number of leading messages to fold, if compaction is possible.
    ///
    /// Starts at `len - keep_messages` and moves earlier so the cut never
    /// lands past the last user message and never leaves a tool result
    /// without its assistant call.
    pub fn cut_point(&self, messages: &[Message]) -> Option<usize> {
        let mut cut = messages.len().checked_sub(self.keep_messages)?;
        if let Some(user) = last_user_index(messages) {
            cut = cut.min(user);
        }
        if cut >= messages.len() {
            return None;
        }
        while cut > 0 && messages[cut].role == Role::Tool {
            cut -= 1;
        }
        (cut > 0).then_some(cut)
    }

    async fn summarize(&self, messages: &[Message], next: Next<'_>) -> Result<Message, AgentError> {
        let transcript = messages.iter().map(render).collect::<Vec<_>>().join("\n");
        let request = ModelRequest::new(Purpose::Summarization, vec![Message::user(transcript)])
            .with_system(SUMMARY_INSTRUCTIONS);

        let response = next
            .invoke_model(request)
            .await
            .map_err(|e| AgentError::Summarization(e.to_string()))?;
        let summary = response.message.content.trim();
        if summary.is_empty() {
            return Err(AgentError::Summarization("model returned an empty summary".into()));
        }

        let mut message = Message::system(format!("{SUMMARY_PREFIX}{summary}"));
        message
            .metadata
            .insert("summarized_messages".into(), serde_json::Value::from(messages.len()));
        Ok(message)
    }
}

fn render(message: &Message) -> String {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    };
    let mut line = match &message.name {
        Some(name) if message.role == Role::Tool => format!("{role} ({name}): {}", message.content),
        _ => format!("{role}: {}", message.content),
    };
    for call in &message.tool_calls {
        line.push_str(&format!("\n  -> {}({})", call.name, call.arguments));
    }
    line
}

#[async_trait]
impl Middleware for Summarizer {
    fn name(&self) -> &str {
        "summarizer"
    }

    async fn handle(
        &self,
        mut request: ModelRequest,
        cx: &mut CallContext,
        next: Next<'_>,
    ) -> Result<ProviderResponse, AgentError> {
        if !self.enabled {
            return next.run(request, cx).await;
        }

        let system_tokens = request.system.as_deref().map_or(0, |s| self.counter.count(s));
        let tokens = system_tokens + self.counter.count_messages(&request.messages);
        if tokens <= self.trigger_tokens {
            return next.run(request, cx).await;
        }

        let Some(cut) = self.cut_point(&request.messages) else {
            debug!(tokens, "Over token budget but nothing can be folded");
            return next.run(request, cx).await;
        };

        let summary = self.summarize(&request.messages[..cut], next).await?;
        info!(tokens, replaced = cut, kept = request.messages.len() - cut, "Compacted conversation");
        request.messages.splice(..cut, std::iter::once(summary.clone()));
        cx.record(StateUpdate::Compacted { replaced: cut, summary });
        next.run(request, cx).await
    }
}
