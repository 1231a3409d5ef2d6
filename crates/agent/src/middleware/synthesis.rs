//! Analysis masking and final-answer synthesis.
//!
//! Analysis tools produce output the user already sees verbatim. The tool
//! calling model only sees a marker in place of those results, so it cannot
//! rewrite them into generic advice. When it then answers without further
//! tool calls, its draft is dropped and a separate call on
//! [`Purpose::Synthesis`] writes the reply from the real outputs.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info};
use wayfinder_config::AgentSettings;
use wayfinder_core::message::{Message, Role, last_user_index};
use wayfinder_core::provider::{ProviderResponse, Purpose};

use super::{CallContext, Middleware, ModelRequest, Next};
use crate::error::AgentError;

/// Metadata key set to `true` on synthesized replies.
pub const SYNTHESIZED: &str = "synthesized";

const RESULT_SEPARATOR: &str = "\n\n---\n\n";

pub struct SynthesisMiddleware {
    analysis_tools: HashSet<String>,
    marker: String,
    prompt_template: String,
}

impl SynthesisMiddleware {
    pub fn new(analysis_tools: impl IntoIterator<Item = String>, settings: &AgentSettings) -> Self {
        Self {
            analysis_tools: analysis_tools.into_iter().collect(),
            marker: settings.analysis_marker.clone(),
            prompt_template: settings.synthesis_prompt.clone(),
        }
    }

    fn is_analysis(&self, message: &Message) -> bool {
        message.role == Role::Tool
            && !message.is_error
            && message.name.as_ref().is_some_and(|n| self.analysis_tools.contains(n))
    }

    /// The synthesis prompt: analysis outputs first, then the other
    /// current-turn tool outputs.
    pub fn build_prompt(&self, question: &str, analysis: &[(String, String)], others: &[(String, String)]) -> String {
        let tool_results = analysis
            .iter()
            .chain(others)
            .map(|(name, content)| format!("**{name}:**\n{content}"))
            .collect::<Vec<_>>()
            .join(RESULT_SEPARATOR);

        self.prompt_template
            .replace("{user_question}", question)
            .replace("{tool_results}", &tool_results)
    }
}

#[async_trait]
impl Middleware for SynthesisMiddleware {
    fn name(&self) -> &str {
        "synthesis"
    }

    async fn handle(
        &self,
        mut request: ModelRequest,
        cx: &mut CallContext,
        next: Next<'_>,
    ) -> Result<ProviderResponse, AgentError> {
        if self.analysis_tools.is_empty() {
            return next.run(request, cx).await;
        }

        let boundary = last_user_index(&request.messages);
        let start = boundary.map_or(0, |i| i + 1);
        let question = boundary
            .map(|i| request.messages[i].content.clone())
            .unwrap_or_default();

        let mut analysis = Vec::new();
        let mut others = Vec::new();
        for message in &mut request.messages[start..] {
            if self.is_analysis(message) {
                let name = message.name.clone().unwrap_or_default();
                let output = std::mem::replace(&mut message.content, self.marker.clone());
                analysis.push((name, output));
            } else if message.role == Role::Tool && !message.content.is_empty() {
                others.push((message.name.clone().unwrap_or_default(), message.content.clone()));
            }
        }

        if analysis.is_empty() {
            return next.run(request, cx).await;
        }
        info!(masked = analysis.len(), "Masked analysis tool results");

        let response = next.run(request, cx).await?;
        if response.message.has_tool_calls() {
            debug!("Model requested more tools; synthesis deferred");
            return Ok(response);
        }

        info!("Synthesizing final response in place of the draft");
        let prompt = self.build_prompt(&question, &analysis, &others);
        let mut synthesized = next
            .invoke_model(ModelRequest::new(Purpose::Synthesis, vec![Message::system(prompt)]))
            .await?;
        synthesized.message.tool_calls.clear();
        synthesized
            .message
            .metadata
            .insert(SYNTHESIZED.into(), serde_json::Value::Bool(true));
        Ok(synthesized)
    }
}
