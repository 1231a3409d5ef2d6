//! The agent reasoning loop implementation.
//!
//! One turn drives a small state machine:
//!
//! ```text
//! Idle -> AwaitingModel -> AwaitingTools  -> AwaitingModel -> ...
//!                       -> AwaitingConfirmation   (turn suspended)
//!                       -> Done -> Idle           (reply produced)
//! ```
//!
//! Router exhaustion moves to `Error` and ends the turn. The state lives on
//! the [`Conversation`], so one loop can drive many conversations at once. A
//! suspended turn is a return value: the pending calls and the results
//! already collected are recorded on the conversation, which the caller can
//! checkpoint and later hand to [`AgentLoop::resume`].

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wayfinder_core::event::{DomainEvent, EventBus};
use wayfinder_core::message::{Conversation, LoopState, Message, PendingCall, PendingConfirmation};
use wayfinder_core::provider::{ProviderResponse, Purpose};
use wayfinder_core::tool::{ToolCall, ToolRegistry};

use crate::error::AgentError;
use crate::middleware::synthesis::SYNTHESIZED;
use crate::middleware::{CallContext, ModelRequest, Pipeline, StateUpdate};

pub const MAX_ITERATIONS_NOTICE: &str =
    "I've reached the maximum number of tool call iterations. Please provide further guidance.";

pub const DENIED_MESSAGE: &str = "The user declined to run this tool.";

/// The caller's answer to one confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Deny,
}

/// A turn paused until the caller decides on each pending call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suspension {
    pub calls: Vec<PendingCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed { reply: Message },
    Suspended(Suspension),
}

impl TurnOutcome {
    pub fn reply(&self) -> Option<&Message> {
        match self {
            Self::Completed { reply } => Some(reply),
            Self::Suspended(_) => None,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended(_))
    }
}

/// The core agent loop that orchestrates model calls and tool execution.
pub struct AgentLoop {
    pipeline: Arc<Pipeline>,
    tools: Arc<ToolRegistry>,
    max_iterations: usize,
    event_bus: Option<Arc<EventBus>>,
}

impl AgentLoop {
    pub fn new(pipeline: Arc<Pipeline>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            pipeline,
            tools,
            max_iterations: 25,
            event_bus: None,
        }
    }

    /// Set the maximum number of model calls per turn.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Start a turn with the user's message.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        text: impl Into<String>,
    ) -> Result<TurnOutcome, AgentError> {
        if conversation.pending.is_some() {
            return Err(AgentError::AwaitingConfirmation(conversation.id.to_string()));
        }

        conversation.push(Message::user(text));
        conversation.turn += 1;
        info!(
            conversation_id = %conversation.id,
            turn = conversation.turn,
            messages = conversation.len(),
            "Starting turn"
        );
        self.publish(DomainEvent::TurnStarted {
            conversation_id: conversation.id.to_string(),
            turn: conversation.turn,
            timestamp: Utc::now(),
        });

        self.drive(conversation).await
    }

    /// Continue a suspended turn with a decision per pending call ID.
    ///
    /// Calls without a decision are treated as denied.
    pub async fn resume(
        &self,
        conversation: &mut Conversation,
        decisions: &HashMap<String, Decision>,
    ) -> Result<TurnOutcome, AgentError> {
        let pending = conversation
            .pending
            .take()
            .ok_or_else(|| AgentError::NothingToResume(conversation.id.to_string()))?;

        let approved: Vec<ToolCall> = pending
            .calls
            .iter()
            .filter(|p| decisions.get(&p.call.id) == Some(&Decision::Approve))
            .map(|p| p.call.clone())
            .collect();
        info!(
            conversation_id = %conversation.id,
            approved = approved.len(),
            denied = pending.calls.len() - approved.len(),
            "Resuming turn"
        );

        self.transition(conversation, LoopState::AwaitingTools);
        let executed = self.execute_all(&approved).await;

        let mut results: Vec<Message> = pending.collected;
        results.extend(executed);
        for PendingCall { call, .. } in &pending.calls {
            if !results.iter().any(|m| m.tool_call_id.as_deref() == Some(call.id.as_str())) {
                results.push(Message::tool_error(&call.id, &call.name, DENIED_MESSAGE));
            }
        }

        let order = self.call_order(conversation, &pending.assistant_message_id);
        for message in in_call_order(results, &order) {
            conversation.push(message);
        }

        self.drive(conversation).await
    }

    async fn drive(&self, conversation: &mut Conversation) -> Result<TurnOutcome, AgentError> {
        let mut iteration = 0;

        loop {
            if iteration >= self.max_iterations {
                warn!(
                    conversation_id = %conversation.id,
                    iterations = iteration,
                    "Max tool iterations reached, ending turn"
                );
                let reply = Message::assistant(MAX_ITERATIONS_NOTICE);
                return Ok(self.complete(conversation, reply, iteration));
            }
            iteration += 1;

            self.transition(conversation, LoopState::AwaitingModel);
            let response = match self.call_model(conversation).await {
                Ok(response) => response,
                Err(e) => {
                    self.transition(conversation, LoopState::Error);
                    warn!(conversation_id = %conversation.id, error = %e, "Turn failed");
                    return Err(e);
                }
            };

            let message = response.message;
            if !message.has_tool_calls() {
                return Ok(self.complete(conversation, message, iteration));
            }

            debug!(
                conversation_id = %conversation.id,
                iteration,
                tool_count = message.tool_calls.len(),
                "Model requested tools"
            );
            conversation.push(message.clone());
            self.transition(conversation, LoopState::AwaitingTools);

            if let Some(suspension) = self.dispatch(conversation, &message).await {
                return Ok(TurnOutcome::Suspended(suspension));
            }
        }
    }

    /// One pass through the pipeline, applying any state updates it reports.
    async fn call_model(&self, conversation: &mut Conversation) -> Result<ProviderResponse, AgentError> {
        let request = ModelRequest::new(Purpose::ToolCalling, conversation.messages().to_vec())
            .with_tools(self.tools.definitions());
        let mut cx = CallContext::new();
        let result = self.pipeline.call(request, &mut cx).await;

        for update in cx.take_updates() {
            match update {
                StateUpdate::Repaired { index, results } => {
                    conversation.insert_repairs(index, results);
                }
                StateUpdate::Compacted { replaced, summary } => {
                    conversation.compact(replaced, summary);
                    self.publish(DomainEvent::ConversationCompacted {
                        conversation_id: conversation.id.to_string(),
                        replaced,
                        timestamp: Utc::now(),
                    });
                }
            }
        }
        result
    }

    /// Run the calls that need no confirmation; suspend on the rest.
    async fn dispatch(&self, conversation: &mut Conversation, assistant: &Message) -> Option<Suspension> {
        let mut immediate = Vec::new();
        let mut guarded = Vec::new();
        for call in &assistant.tool_calls {
            match self.tools.spec(&call.name).and_then(|s| s.confirmation.clone()) {
                Some(confirmation) => guarded.push(PendingCall {
                    call: call.clone(),
                    confirmation,
                }),
                None => immediate.push(call.clone()),
            }
        }

        let results = self.execute_all(&immediate).await;

        if guarded.is_empty() {
            for result in results {
                conversation.push(result);
            }
            return None;
        }

        // Immediate results wait on the checkpoint until resume
        conversation.pending = Some(PendingConfirmation {
            assistant_message_id: assistant.id.clone(),
            calls: guarded.clone(),
            collected: results,
            suspended_at: Utc::now(),
        });
        self.transition(conversation, LoopState::AwaitingConfirmation);
        self.publish(DomainEvent::TurnSuspended {
            conversation_id: conversation.id.to_string(),
            pending_calls: guarded.len(),
            timestamp: Utc::now(),
        });
        Some(Suspension { calls: guarded })
    }

    /// Call IDs of the suspended assistant message, in the order it made them.
    fn call_order(&self, conversation: &Conversation, assistant_id: &str) -> Vec<String> {
        let ids: Vec<String> = conversation
            .messages()
            .iter()
            .rev()
            .find(|m| m.id == assistant_id)
            .map(|m| m.tool_calls.iter().map(|c| c.id.clone()).collect())
            .unwrap_or_default();
        if ids.is_empty() {
            warn!(conversation_id = %conversation.id, assistant_id, "Suspended assistant message not found");
        }
        ids
    }

    /// Execute `calls` concurrently; results come back in call order.
    async fn execute_all(&self, calls: &[ToolCall]) -> Vec<Message> {
        join_all(calls.iter().map(|call| self.execute_one(call))).await
    }

    async fn execute_one(&self, call: &ToolCall) -> Message {
        let start = std::time::Instant::now();
        let result = self.tools.execute(call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (success, message) = match result {
            Ok(output) if output.success => (true, Message::tool_result(&call.id, &call.name, output.output)),
            Ok(output) => (false, Message::tool_error(&call.id, &call.name, output.output)),
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool execution failed");
                (false, Message::tool_error(&call.id, &call.name, format!("Error: {e}")))
            }
        };

        self.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
        message
    }

    fn complete(&self, conversation: &mut Conversation, reply: Message, iterations: usize) -> TurnOutcome {
        let synthesized = reply.metadata.get(SYNTHESIZED).and_then(|v| v.as_bool()).unwrap_or(false);
        conversation.push(reply.clone());
        self.transition(conversation, LoopState::Done);
        self.publish(DomainEvent::TurnCompleted {
            conversation_id: conversation.id.to_string(),
            iterations,
            synthesized,
            timestamp: Utc::now(),
        });
        self.transition(conversation, LoopState::Idle);
        TurnOutcome::Completed { reply }
    }

    fn transition(&self, conversation: &mut Conversation, to: LoopState) {
        debug!(conversation_id = %conversation.id, from = ?conversation.state, to = ?to, "Loop transition");
        conversation.state = to;
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

/// `results` sorted by position of their call ID in `order`.
///
/// Results whose ID is not in `order` keep their relative order at the end.
fn in_call_order(mut results: Vec<Message>, order: &[String]) -> Vec<Message> {
    results.sort_by_key(|m| {
        m.tool_call_id
            .as_deref()
            .and_then(|id| order.iter().position(|o| o == id))
            .unwrap_or(order.len())
    });
    results
}
