//! Shared test helpers for loop and middleware tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wayfinder_core::error::{ProviderError, ToolError};
use wayfinder_core::message::Message;
use wayfinder_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use wayfinder_core::tool::{Tool, ToolCall, ToolResult, ToolSpec};
use wayfinder_providers::{ModelDescriptor, ModelRouter};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request. Panics if more calls are made than responses provided.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no response scripted for call #{call}"))
    }
}

/// A single-model router in front of `provider`.
pub fn router_with(provider: Arc<dyn Provider>) -> Arc<ModelRouter> {
    let mut router = ModelRouter::new(vec![ModelDescriptor::new("mock-model", "mock")]);
    router.register("mock", provider);
    Arc::new(router)
}

fn response(message: Message) -> ProviderResponse {
    ProviderResponse {
        message,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// A plain text response (no tool calls).
pub fn text(content: &str) -> ProviderResponse {
    response(Message::assistant(content))
}

/// A response requesting `calls`.
pub fn tool_calls(calls: Vec<ToolCall>) -> ProviderResponse {
    response(Message::assistant_with_tools("", calls))
}

pub fn call(id: &str, name: &str) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments: serde_json::json!({}),
    }
}

/// A tool that returns a fixed output and counts its invocations.
pub struct CountingTool {
    spec: ToolSpec,
    output: String,
    delay: std::time::Duration,
    calls: AtomicUsize,
}

impl CountingTool {
    pub fn new(spec: ToolSpec, output: &str) -> Self {
        Self {
            spec,
            output: output.into(),
            delay: std::time::Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn standard(name: &str, output: &str) -> Self {
        Self::new(ToolSpec::new(name, format!("{name} tool"), serde_json::json!({})), output)
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(ToolResult::ok(self.output.clone()))
    }
}
