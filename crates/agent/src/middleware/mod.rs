//! Model-call middleware.
//!
//! Every model call the loop makes passes through a [`Pipeline`]: an ordered
//! list of [`Middleware`] stages ending at the [`ModelRouter`]. Each stage
//! gets the request, a [`CallContext`] and a [`Next`] cursor over the
//! remaining stages, and decides whether and how to call on.
//!
//! Stages never touch the conversation. Changes that must outlive the call
//! (repaired tool results, compaction) are reported as [`StateUpdate`]s and
//! applied by the loop.

pub mod prompt;
pub mod repair;
pub mod summarizer;
pub mod synthesis;

use async_trait::async_trait;
use std::sync::Arc;
use wayfinder_core::message::Message;
use wayfinder_core::provider::{ProviderRequest, ProviderResponse, Purpose, ToolDefinition};
use wayfinder_providers::ModelRouter;

use crate::error::AgentError;

pub use prompt::{KnowledgePromptContext, PromptContext, PromptInjector};
pub use repair::RepairMiddleware;
pub use summarizer::Summarizer;
pub use synthesis::SynthesisMiddleware;

/// A model call on its way through the pipeline.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub purpose: Purpose,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
}

impl ModelRequest {
    pub fn new(purpose: Purpose, messages: Vec<Message>) -> Self {
        Self {
            purpose,
            system: None,
            messages,
            tools: Vec::new(),
            temperature: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn into_provider_request(self) -> ProviderRequest {
        let mut request = ProviderRequest::new(self.messages).with_tools(self.tools);
        request.system = self.system;
        request.temperature = self.temperature;
        request
    }
}

/// A change to the conversation requested by a middleware stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    /// Insert synthesized tool results at `index`
    Repaired { index: usize, results: Vec<Message> },
    /// Replace the first `replaced` messages with `summary`
    Compacted { replaced: usize, summary: Message },
}

/// Per-call scratch space shared by the stages.
#[derive(Debug, Default)]
pub struct CallContext {
    updates: Vec<StateUpdate>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, update: StateUpdate) {
        self.updates.push(update);
    }

    pub fn updates(&self) -> &[StateUpdate] {
        &self.updates
    }

    pub fn take_updates(&mut self) -> Vec<StateUpdate> {
        std::mem::take(&mut self.updates)
    }
}

/// One stage of the pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(
        &self,
        request: ModelRequest,
        cx: &mut CallContext,
        next: Next<'_>,
    ) -> Result<ProviderResponse, AgentError>;
}

/// Cursor over the stages after the current one.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    router: &'a ModelRouter,
}

impl<'a> Next<'a> {
    /// Hand the request to the next stage, or to the router after the last one.
    pub async fn run(self, request: ModelRequest, cx: &mut CallContext) -> Result<ProviderResponse, AgentError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    router: self.router,
                };
                stage.handle(request, cx, next).await
            }
            None => {
                let purpose = request.purpose;
                Ok(self.router.invoke(purpose, request.into_provider_request()).await?)
            }
        }
    }

    /// Call the router directly, bypassing the remaining stages.
    pub async fn invoke_model(self, request: ModelRequest) -> Result<ProviderResponse, AgentError> {
        let purpose = request.purpose;
        Ok(self.router.invoke(purpose, request.into_provider_request()).await?)
    }
}

/// Ordered middleware stages in front of a router.
pub struct Pipeline {
    router: Arc<ModelRouter>,
    stages: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    /// A pipeline with no stages: calls go straight to the router.
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self {
            router,
            stages: Vec::new(),
        }
    }

    /// The standard stage order used by the agent.
    pub fn standard(
        router: Arc<ModelRouter>,
        prompt: PromptInjector,
        repair: RepairMiddleware,
        synthesis: SynthesisMiddleware,
        summarizer: Summarizer,
    ) -> Self {
        Self::new(router)
            .with_stage(Arc::new(prompt))
            .with_stage(Arc::new(repair))
            .with_stage(Arc::new(synthesis))
            .with_stage(Arc::new(summarizer))
    }

    /// Append a stage after the existing ones.
    pub fn with_stage(mut self, stage: Arc<dyn Middleware>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run `request` through every stage and the router.
    pub async fn call(&self, request: ModelRequest, cx: &mut CallContext) -> Result<ProviderResponse, AgentError> {
        let next = Next {
            stages: &self.stages,
            router: &self.router,
        };
        next.run(request, cx).await
    }
}
