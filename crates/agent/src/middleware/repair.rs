//! Orphaned tool call repair.
//!
//! A transcript restored from a checkpoint can hold an assistant message whose
//! tool calls never got results, which model backends reject. Before the call
//! goes out, every such call receives a synthesized error result placed right
//! after the existing result block.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::warn;
use wayfinder_core::message::{Message, Role};
use wayfinder_core::provider::ProviderResponse;

use super::{CallContext, Middleware, ModelRequest, Next, StateUpdate};
use crate::error::AgentError;

pub const REPAIR_MESSAGE: &str =
    "Tool result unavailable: it was lost before it could be recorded. You may retry the call.";

pub struct RepairMiddleware;

/// Where to insert synthesized results, and the results, if any are missing.
///
/// Only the most recent assistant message is considered. When it carries no
/// tool calls there is nothing to repair.
pub fn find_repairs(messages: &[Message]) -> Option<(usize, Vec<Message>)> {
    let at = messages.iter().rposition(|m| m.role == Role::Assistant)?;
    let assistant = &messages[at];
    if assistant.tool_calls.is_empty() {
        return None;
    }

    let answered: HashSet<&str> = messages[at + 1..]
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();

    let repairs: Vec<Message> = assistant
        .tool_calls
        .iter()
        .filter(|call| !answered.contains(call.id.as_str()))
        .map(|call| Message::tool_error(&call.id, &call.name, REPAIR_MESSAGE))
        .collect();
    if repairs.is_empty() {
        return None;
    }

    let block = messages[at + 1..].iter().take_while(|m| m.role == Role::Tool).count();
    Some((at + 1 + block, repairs))
}

#[async_trait]
impl Middleware for RepairMiddleware {
    fn name(&self) -> &str {
        "repair"
    }

    async fn handle(
        &self,
        mut request: ModelRequest,
        cx: &mut CallContext,
        next: Next<'_>,
    ) -> Result<ProviderResponse, AgentError> {
        if let Some((index, results)) = find_repairs(&request.messages) {
            let ids: Vec<&str> = results.iter().filter_map(|m| m.tool_call_id.as_deref()).collect();
            warn!(count = results.len(), ?ids, "Repairing orphaned tool calls");
            request.messages.splice(index..index, results.iter().cloned());
            cx.record(StateUpdate::Repaired { index, results });
        }
        next.run(request, cx).await
    }
}
