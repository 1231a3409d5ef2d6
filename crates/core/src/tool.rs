//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world: search the
//! knowledge base, gather data, run an analysis. Each tool advertises a
//! [`ToolSpec`] capability descriptor; the loop reads it to decide whether a
//! call runs immediately or waits for confirmation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }
}

/// What kind of capability a tool represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Ordinary data fetch or side effect
    #[default]
    Standard,
    /// Produces analysis the user should see verbatim; triggers synthesis
    Analysis,
}

/// The question shown to the user before a guarded tool runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub question: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}

impl Confirmation {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            details: String::new(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

/// Capability descriptor for a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// The unique name of this tool (e.g., "search_knowledge")
    pub name: String,

    /// A description of what this tool does (sent to the LLM)
    pub description: String,

    /// JSON Schema describing this tool's parameters
    pub parameters: serde_json::Value,

    #[serde(default)]
    pub kind: ToolKind,

    /// Present when the loop must suspend for approval before running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<Confirmation>,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            kind: ToolKind::Standard,
            confirmation: None,
        }
    }

    pub fn analysis(mut self) -> Self {
        self.kind = ToolKind::Analysis;
        self
    }

    pub fn requires_confirmation(mut self, confirmation: Confirmation) -> Self {
        self.confirmation = Some(confirmation);
        self
    }

    /// Convert into a ToolDefinition for sending to the LLM.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// The core Tool trait.
///
/// Tool implementations are external collaborators; the loop only sees their
/// [`ToolSpec`] and the `execute` entry point.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The capability descriptor of this tool.
    fn spec(&self) -> ToolSpec;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Look up specs and execute tools when the LLM requests them
pub struct ToolRegistry {
    tools: HashMap<String, (ToolSpec, Arc<dyn Tool>)>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the per-call execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let spec = tool.spec();
        self.tools.insert(spec.name.clone(), (spec, tool));
    }

    /// Get a tool's spec by name.
    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|(spec, _)| spec)
    }

    /// Get all tool definitions (for sending to the LLM), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|(s, _)| s.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Names of every tool whose kind is [`ToolKind::Analysis`].
    pub fn analysis_tools(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .tools
            .values()
            .filter(|(s, _)| s.kind == ToolKind::Analysis)
            .map(|(s, _)| s.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Execute a tool call under the registry timeout.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let (_, tool) = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        tracing::debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        match tokio::time::timeout(self.timeout, tool.execute(call.arguments.clone())).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
