//! Agent context assembly.
//!
//! An [`AgentContext`] bundles everything one configuration needs to run
//! turns: router, knowledge base, tool registry, middleware pipeline and the
//! loop itself. It is built once and passed by reference. [`ContextCache`]
//! is the only place contexts are shared, keyed by the configuration
//! fingerprint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};
use wayfinder_config::AppConfig;
use wayfinder_core::event::EventBus;
use wayfinder_core::provider::Provider;
use wayfinder_core::tool::{Tool, ToolRegistry};
use wayfinder_knowledge::KnowledgeBase;
use wayfinder_providers::ModelRouter;

use crate::error::AgentError;
use crate::loop_runner::AgentLoop;
use crate::middleware::{
    KnowledgePromptContext, Pipeline, PromptInjector, RepairMiddleware, Summarizer, SynthesisMiddleware,
};

pub struct AgentContext {
    config: AppConfig,
    fingerprint: String,
    router: Arc<ModelRouter>,
    knowledge: Arc<KnowledgeBase>,
    pipeline: Arc<Pipeline>,
    agent: AgentLoop,
    event_bus: Arc<EventBus>,
}

impl AgentContext {
    pub fn builder(config: AppConfig) -> AgentContextBuilder {
        AgentContextBuilder::new(config)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        self.agent.tools()
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn agent(&self) -> &AgentLoop {
        &self.agent
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

pub struct AgentContextBuilder {
    config: AppConfig,
    backends: Vec<(String, Arc<dyn Provider>)>,
    tools: Vec<Arc<dyn Tool>>,
    knowledge: Option<Arc<KnowledgeBase>>,
    profile: Option<String>,
    event_bus: Option<Arc<EventBus>>,
}

impl AgentContextBuilder {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            backends: Vec::new(),
            tools: Vec::new(),
            knowledge: None,
            profile: None,
            event_bus: None,
        }
    }

    /// Register the provider serving `name` in the model chains.
    pub fn backend(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.backends.push((name.into(), provider));
        self
    }

    /// Add a tool on top of the built-in knowledge tools.
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Use an existing knowledge base instead of a fresh in-memory one.
    pub fn knowledge(mut self, kb: Arc<KnowledgeBase>) -> Self {
        self.knowledge = Some(kb);
        self
    }

    pub fn profile(mut self, summary: impl Into<String>) -> Self {
        self.profile = Some(summary.into());
        self
    }

    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<AgentContext, AgentError> {
        let config = self.config;
        config.validate().map_err(wayfinder_core::Error::from)?;
        let fingerprint = config.fingerprint();
        let event_bus = self.event_bus.unwrap_or_default();

        let mut router = ModelRouter::from_config(&config.models).with_event_bus(event_bus.clone());
        for (name, provider) in self.backends {
            router.register(name, provider);
        }
        let missing: Vec<String> = config
            .backends()
            .into_iter()
            .filter(|b| !router.backends().contains(&b.as_str()))
            .collect();
        if !missing.is_empty() {
            info!(?missing, "Configured backends without a provider will be skipped");
        }
        let router = Arc::new(router);

        let knowledge = match self.knowledge {
            Some(kb) => kb,
            None => Arc::new(KnowledgeBase::in_memory(&config.knowledge).with_event_bus(event_bus.clone())),
        };

        let mut registry = wayfinder_tools::default_registry(
            knowledge.clone(),
            Duration::from_secs(config.agent.tool_timeout_secs),
        );
        for tool in self.tools {
            registry.register(tool);
        }

        let prompt_context = KnowledgePromptContext::new(knowledge.clone()).with_profile(self.profile);
        let pipeline = Arc::new(Pipeline::standard(
            router.clone(),
            PromptInjector::new(config.agent.system_prompt.clone(), Arc::new(prompt_context)),
            RepairMiddleware,
            SynthesisMiddleware::new(registry.analysis_tools(), &config.agent),
            Summarizer::from_config(&config.summarization),
        ));

        let tools = Arc::new(registry);
        let agent = AgentLoop::new(pipeline.clone(), tools.clone())
            .with_max_iterations(config.agent.max_iterations)
            .with_event_bus(event_bus.clone());

        info!(
            fingerprint = %&fingerprint[..12],
            tools = tools.len(),
            stages = ?pipeline.stage_names(),
            "Agent context built"
        );

        Ok(AgentContext {
            config,
            fingerprint,
            router,
            knowledge,
            pipeline,
            agent,
            event_bus,
        })
    }
}

/// Built contexts keyed by configuration fingerprint.
#[derive(Default)]
pub struct ContextCache {
    contexts: Mutex<HashMap<String, Arc<AgentContext>>>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached context for `config`, building it with `build` on a miss.
    pub fn get_or_build(
        &self,
        config: &AppConfig,
        build: impl FnOnce(AppConfig) -> Result<AgentContext, AgentError>,
    ) -> Result<Arc<AgentContext>, AgentError> {
        let key = config.fingerprint();
        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(context) = contexts.get(&key) {
            debug!(fingerprint = %&key[..12], "Context cache hit");
            return Ok(context.clone());
        }

        let context = Arc::new(build(config.clone())?);
        contexts.insert(key, context.clone());
        Ok(context)
    }

    /// Drop the context for `config`, returning whether one was cached.
    pub fn invalidate(&self, config: &AppConfig) -> bool {
        self.contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&config.fingerprint())
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{CountingTool, ScriptedProvider, call, text, tool_calls};
    use wayfinder_core::knowledge::Section;
    use wayfinder_core::message::Conversation;
    use wayfinder_core::tool::ToolSpec;

    fn build(config: AppConfig, provider: Arc<ScriptedProvider>) -> Result<AgentContext, AgentError> {
        AgentContext::builder(config).backend("azure", provider).build()
    }

    #[test]
    fn builds_standard_pipeline_and_tools() {
        let ctx = build(AppConfig::default(), Arc::new(ScriptedProvider::new(vec![]))).unwrap();
        assert_eq!(
            ctx.pipeline().stage_names(),
            vec!["prompt_injector", "repair", "synthesis", "summarizer"]
        );
        assert!(ctx.tools().spec("search_knowledge").is_some());
        assert_eq!(ctx.fingerprint(), AppConfig::default().fingerprint());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.models.chain.clear();
        let err = build(config, Arc::new(ScriptedProvider::new(vec![]))).err().unwrap();
        assert!(matches!(err, AgentError::Core(wayfinder_core::Error::Config { .. })));
    }

    #[tokio::test]
    async fn turn_runs_end_to_end_with_analysis_synthesis() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_calls(vec![call("1", "analyze_fit"), call("2", "search_knowledge")]),
            text("draft"),
            text("You fit the role well."),
        ]));
        let analyze = Arc::new(CountingTool::new(
            ToolSpec::new("analyze_fit", "Analyze role fit", serde_json::json!({})).analysis(),
            "FIT: 8/10",
        ));
        let ctx = AgentContext::builder(AppConfig::default())
            .backend("azure", provider.clone())
            .tool(analyze)
            .profile("Backend engineer")
            .build()
            .unwrap();
        ctx.knowledge()
            .index("resume", &[Section::new("Experience", "Five years of Rust services")])
            .await
            .unwrap();

        let mut conv = Conversation::new();
        let outcome = ctx.agent().run_turn(&mut conv, "do I fit?").await.unwrap();
        assert_eq!(outcome.reply().unwrap().content, "You fit the role well.");

        let requests = provider.requests();
        let system = requests[0].system.clone().unwrap();
        assert!(system.contains("Backend engineer"));
        assert!(system.contains("- resume: 1 chunks"));
        assert!(requests[2].messages[0].content.contains("FIT: 8/10"));
    }

    #[test]
    fn cache_reuses_contexts_per_fingerprint() {
        let cache = ContextCache::new();
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let config = AppConfig::default();

        let first = cache.get_or_build(&config, |c| build(c, provider.clone())).unwrap();
        let second = cache
            .get_or_build(&config, |_| panic!("cache hit expected"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let mut changed = config.clone();
        changed.agent.max_iterations = 3;
        cache.get_or_build(&changed, |c| build(c, provider.clone())).unwrap();
        assert_eq!(cache.len(), 2);

        assert!(cache.invalidate(&config));
        assert!(!cache.invalidate(&config));
        assert_eq!(cache.len(), 1);
    }
}
