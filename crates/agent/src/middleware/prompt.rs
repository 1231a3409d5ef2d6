//! System prompt injection from live state.
//!
//! The prompt is rebuilt on every model call: the configured template with
//! the current profile summary substituted, followed by a "Data Availability"
//! section listing what is indexed right now. Nothing is cached between calls.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use wayfinder_core::error::KnowledgeError;
use wayfinder_core::knowledge::KnowledgeStats;
use wayfinder_core::provider::ProviderResponse;
use wayfinder_knowledge::KnowledgeBase;

use super::{CallContext, Middleware, ModelRequest, Next};
use crate::error::AgentError;

const NO_PROFILE: &str = "No profile configured yet.";

/// Live state the system prompt is built from.
#[async_trait]
pub trait PromptContext: Send + Sync {
    /// A short summary of the user's profile, if one exists.
    async fn profile_summary(&self) -> Option<String>;

    /// Indexed record counts per source.
    async fn knowledge_stats(&self) -> Result<KnowledgeStats, KnowledgeError>;
}

/// [`PromptContext`] over a knowledge base and a fixed profile summary.
pub struct KnowledgePromptContext {
    kb: Arc<KnowledgeBase>,
    profile: Option<String>,
}

impl KnowledgePromptContext {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb, profile: None }
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }
}

#[async_trait]
impl PromptContext for KnowledgePromptContext {
    async fn profile_summary(&self) -> Option<String> {
        self.profile.clone()
    }

    async fn knowledge_stats(&self) -> Result<KnowledgeStats, KnowledgeError> {
        self.kb.stats().await
    }
}

/// Sets the request's system prompt from the template and live context.
pub struct PromptInjector {
    template: String,
    context: Arc<dyn PromptContext>,
}

impl PromptInjector {
    /// `template` may contain `{user_profile}`.
    pub fn new(template: impl Into<String>, context: Arc<dyn PromptContext>) -> Self {
        Self {
            template: template.into(),
            context,
        }
    }

    pub async fn render(&self) -> String {
        let profile = self
            .context
            .profile_summary()
            .await
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| NO_PROFILE.to_string());

        let stats = match self.context.knowledge_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Knowledge stats unavailable for system prompt");
                KnowledgeStats::default()
            }
        };

        format!(
            "{}{}",
            self.template.replace("{user_profile}", &profile),
            data_availability(&stats)
        )
    }
}

/// The "Data Availability (live)" section for `stats`.
pub fn data_availability(stats: &KnowledgeStats) -> String {
    let mut section = String::from("\n\n## Data Availability (live)\n");
    if stats.is_empty() {
        section.push_str(
            "No career data indexed yet. You cannot answer career questions without data. \
             Ask the user to gather or index their career data before giving advice.",
        );
        return section;
    }

    let lines: Vec<String> = stats
        .by_source
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(source, count)| format!("- {source}: {count} chunks"))
        .collect();
    section.push_str(&lines.join("\n"));
    section.push_str(
        "\n\nCareer data is indexed and available. Use it immediately and do not ask the user \
         for information that is already in the knowledge base.",
    );
    section
}

#[async_trait]
impl Middleware for PromptInjector {
    fn name(&self) -> &str {
        "prompt_injector"
    }

    async fn handle(
        &self,
        mut request: ModelRequest,
        cx: &mut CallContext,
        next: Next<'_>,
    ) -> Result<ProviderResponse, AgentError> {
        let prompt = self.render().await;
        debug!(chars = prompt.len(), "Injected system prompt");
        request.system = Some(prompt);
        next.run(request, cx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Pipeline;
    use crate::test_helpers::{ScriptedProvider, router_with, text};
    use wayfinder_config::KnowledgeConfig;
    use wayfinder_core::knowledge::Section;
    use wayfinder_core::message::Message;
    use wayfinder_core::provider::Purpose;

    #[test]
    fn empty_stats_say_nothing_is_indexed() {
        let section = data_availability(&KnowledgeStats::default());
        assert!(section.contains("## Data Availability (live)"));
        assert!(section.contains("No career data indexed yet."));
    }

    #[test]
    fn stats_list_sources_with_records() {
        let mut stats = KnowledgeStats::default();
        stats.by_source.insert("github".into(), 4);
        stats.by_source.insert("resume".into(), 2);
        stats.by_source.insert("linkedin".into(), 0);
        stats.total = 6;

        let section = data_availability(&stats);
        assert!(section.contains("- github: 4 chunks\n- resume: 2 chunks"));
        assert!(!section.contains("linkedin"));
        assert!(section.contains("Career data is indexed and available."));
    }

    #[tokio::test]
    async fn prompt_reflects_live_state_on_every_call() {
        let kb = Arc::new(KnowledgeBase::in_memory(&KnowledgeConfig::default()));
        let context = KnowledgePromptContext::new(kb.clone()).with_profile(Some("Staff engineer, Berlin".into()));
        let injector = PromptInjector::new("Profile: {user_profile}", Arc::new(context));

        let before = injector.render().await;
        assert!(before.starts_with("Profile: Staff engineer, Berlin"));
        assert!(before.contains("No career data indexed yet."));

        kb.index("resume", &[Section::new("Skills", "Rust and Go")]).await.unwrap();
        let after = injector.render().await;
        assert!(after.contains("- resume: 1 chunks"));
    }

    #[tokio::test]
    async fn missing_profile_uses_placeholder() {
        let kb = Arc::new(KnowledgeBase::in_memory(&KnowledgeConfig::default()));
        let injector = PromptInjector::new("{user_profile}", Arc::new(KnowledgePromptContext::new(kb)));
        assert!(injector.render().await.starts_with(NO_PROFILE));
    }

    #[tokio::test]
    async fn injector_sets_system_on_forwarded_request() {
        let provider = Arc::new(ScriptedProvider::new(vec![text("ok")]));
        let kb = Arc::new(KnowledgeBase::in_memory(&KnowledgeConfig::default()));
        let pipeline = Pipeline::new(router_with(provider.clone())).with_stage(Arc::new(PromptInjector::new(
            "You are Wayfinder.",
            Arc::new(KnowledgePromptContext::new(kb)),
        )));

        pipeline
            .call(
                ModelRequest::new(Purpose::ToolCalling, vec![Message::user("hi")]),
                &mut CallContext::new(),
            )
            .await
            .unwrap();

        let system = provider.requests()[0].system.clone().unwrap();
        assert!(system.starts_with("You are Wayfinder."));
        assert!(system.contains("Data Availability"));
    }
}
