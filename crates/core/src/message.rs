//! Message and Conversation domain types.
//!
//! These are the core value objects that flow through the entire system:
//! the user speaks → the loop asks a model → tools run → results are appended →
//! the model answers. A [`Conversation`] is what callers checkpoint between turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::{Confirmation, ToolCall};

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions and compaction summaries
    System,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// If this is a tool result, the name of the tool that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool results only: the payload is an error marker, not real output
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (model info, synthesis markers, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            is_error: false,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content.into());
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a successful tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg.name = Some(tool_name.into());
        msg
    }

    /// Create a tool result carrying an error marker.
    pub fn tool_error(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::tool_result(tool_call_id, tool_name, content);
        msg.is_error = true;
        msg
    }

    /// Whether this is an assistant message that requested tools.
    pub fn has_tool_calls(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// Tool calls awaiting an explicit approve/deny decision from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    /// ID of the assistant message that requested the calls
    pub assistant_message_id: String,

    /// The suspended calls, in original call order
    pub calls: Vec<PendingCall>,

    /// Results of the calls that ran before suspending, held back until
    /// resume so every result lands in call order
    #[serde(default)]
    pub collected: Vec<Message>,

    /// When the loop suspended
    pub suspended_at: DateTime<Utc>,
}

/// One suspended tool call and the prompt to show the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCall {
    pub call: ToolCall,
    pub confirmation: Confirmation,
}

/// Where a conversation is within its current turn.
///
/// ```text
/// Idle -> AwaitingModel -> AwaitingTools  -> AwaitingModel -> ...
///                       -> AwaitingConfirmation   (turn suspended)
///                       -> Done -> Idle           (reply produced)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    #[default]
    Idle,
    AwaitingModel,
    AwaitingTools,
    AwaitingConfirmation,
    Done,
    Error,
}

/// A conversation is an ordered sequence of messages with shared context.
///
/// Messages are appended by the orchestration loop only. The two exceptions,
/// [`Conversation::insert_repairs`] and [`Conversation::compact`], are applied
/// on behalf of middleware and keep message order intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages
    messages: Vec<Message>,

    /// Number of user turns started in this conversation
    #[serde(default)]
    pub turn: u64,

    /// Set while the loop is suspended for confirmation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingConfirmation>,

    /// Loop state of the turn in progress, or of the last turn
    #[serde(default)]
    pub state: LoopState,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            turn: 0,
            pending: None,
            state: LoopState::Idle,
            created_at: now,
            updated_at: now,
        }
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Insert synthesized tool results at `index`, shifting later messages.
    ///
    /// `index` is clamped to the transcript length.
    pub fn insert_repairs(&mut self, index: usize, results: Vec<Message>) {
        let at = index.min(self.messages.len());
        self.messages.splice(at..at, results);
        self.updated_at = Utc::now();
    }

    /// Replace the first `replaced` messages with a single summary message.
    pub fn compact(&mut self, replaced: usize, summary: Message) {
        let cut = replaced.min(self.messages.len());
        self.messages.splice(..cut, std::iter::once(summary));
        self.updated_at = Utc::now();
    }

    /// Index of the last user message, if any.
    pub fn last_user_index(&self) -> Option<usize> {
        last_user_index(&self.messages)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of the last user message in `messages`.
pub fn last_user_index(messages: &[Message]) -> Option<usize> {
    messages.iter().rposition(|m| m.role == Role::User)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "search_knowledge".into(),
            arguments: serde_json::json!({"query": "rust"}),
        }
    }

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.tool_calls.is_empty());
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn tool_error_sets_marker() {
        let msg = Message::tool_error("call_1", "shell", "boom");
        assert_eq!(msg.role, Role::Tool);
        assert!(msg.is_error);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.name.as_deref(), Some("shell"));
    }

    #[test]
    fn conversation_tracks_updates() {
        let mut conv = Conversation::new();
        let created = conv.created_at;

        conv.push(Message::user("First message"));
        assert_eq!(conv.len(), 1);
        assert!(conv.updated_at >= created);
    }

    #[test]
    fn insert_repairs_keeps_order() {
        let mut conv = Conversation::new();
        conv.push(Message::user("q"));
        conv.push(Message::assistant_with_tools("", vec![call("a"), call("b")]));
        conv.push(Message::tool_result("a", "search_knowledge", "ok"));
        conv.push(Message::user("still there?"));

        conv.insert_repairs(3, vec![Message::tool_error("b", "search_knowledge", "lost")]);

        let ids: Vec<_> = conv
            .messages()
            .iter()
            .map(|m| m.tool_call_id.clone().unwrap_or_default())
            .collect();
        assert_eq!(ids, vec!["", "", "a", "b", ""]);
        assert_eq!(conv.last().unwrap().content, "still there?");
    }

    #[test]
    fn compact_replaces_prefix() {
        let mut conv = Conversation::new();
        for i in 0..5 {
            conv.push(Message::user(format!("m{i}")));
        }
        conv.compact(3, Message::system("summary"));
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.messages()[0].content, "summary");
        assert_eq!(conv.messages()[1].content, "m3");
    }

    #[test]
    fn checkpoint_roundtrip_preserves_pending_and_order() {
        let mut conv = Conversation::new();
        conv.turn = 2;
        conv.push(Message::user("gather everything"));
        let assistant = Message::assistant_with_tools("", vec![call("a")]);
        conv.pending = Some(PendingConfirmation {
            assistant_message_id: assistant.id.clone(),
            calls: vec![PendingCall {
                call: call("a"),
                confirmation: Confirmation::new("Proceed?"),
            }],
            collected: vec![Message::tool_result("b", "search_knowledge", "3 hits")],
            suspended_at: Utc::now(),
        });
        conv.state = LoopState::AwaitingConfirmation;
        conv.push(assistant);

        let json = serde_json::to_string(&conv).unwrap();
        let restored: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, conv);
    }
}
