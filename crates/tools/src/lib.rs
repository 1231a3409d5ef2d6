//! Built-in tool implementations for Wayfinder.
//!
//! Tools give the agent access to the user's indexed career data. Data
//! gathering and analysis tools live with their integrations and are
//! registered by the embedding application.

pub mod knowledge;

use std::sync::Arc;
use std::time::Duration;
use wayfinder_core::tool::ToolRegistry;
use wayfinder_knowledge::KnowledgeBase;

pub use knowledge::{KnowledgeClearTool, KnowledgeSearchTool, KnowledgeStatsTool};

/// Register the knowledge base tools on an existing registry.
pub fn register_knowledge_tools(registry: &mut ToolRegistry, kb: Arc<KnowledgeBase>) {
    registry.register(Arc::new(KnowledgeSearchTool::new(kb.clone())));
    registry.register(Arc::new(KnowledgeStatsTool::new(kb.clone())));
    registry.register(Arc::new(KnowledgeClearTool::new(kb)));
}

/// Create a tool registry with all built-in tools.
pub fn default_registry(kb: Arc<KnowledgeBase>, timeout: Duration) -> ToolRegistry {
    let mut registry = ToolRegistry::new().with_timeout(timeout);
    register_knowledge_tools(&mut registry, kb);
    registry
}
