//! Knowledge base tools: search, stats and clear.
//!
//! These put the [`KnowledgeBase`] behind the [`Tool`] seam so the loop can
//! reach indexed career data. Clearing is destructive and asks for
//! confirmation before it runs.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use wayfinder_core::error::ToolError;
use wayfinder_core::tool::{Confirmation, Tool, ToolResult, ToolSpec};
use wayfinder_knowledge::{KnowledgeBase, SearchQuery};

/// Longest content excerpt shown per search hit, in characters.
pub const EXCERPT_CHARS: usize = 500;

const MAX_LIMIT: u64 = 20;

/// `search_knowledge`: similarity search with source and section filters.
pub struct KnowledgeSearchTool {
    kb: Arc<KnowledgeBase>,
}

impl KnowledgeSearchTool {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "search_knowledge",
            "Search the career knowledge base for relevant information. Use this to find specific \
             details from the user's career history (projects, skills, roles) instead of relying on \
             general context.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search for, e.g. \"Python projects\" or \"leadership experience\""
                    },
                    "sources": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Only search these sources (e.g. resume, linkedin, github)"
                    },
                    "exclude_sections": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Section names to leave out of the results"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum results to return (default 5)"
                    }
                },
                "required": ["query"]
            }),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = arguments["query"]
            .as_str()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let mut query = SearchQuery::new(text)
            .with_sources(string_list(&arguments["sources"]))
            .excluding_sections(string_list(&arguments["exclude_sections"]));
        if let Some(limit) = arguments["limit"].as_u64() {
            query = query.with_limit(limit.clamp(1, MAX_LIMIT) as usize);
        }

        let hits = self.kb.search(&query).await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "search_knowledge".into(),
            reason: e.to_string(),
        })?;

        debug!(query = text, hits = hits.len(), "Knowledge search");
        if hits.is_empty() {
            return Ok(ToolResult::ok(format!(
                "No results found for '{text}'. Try a different query or check if career data has been indexed."
            )));
        }

        let mut parts = vec![format!("Found {} relevant results for '{text}':", hits.len())];
        for (i, hit) in hits.iter().enumerate() {
            let record = &hit.record;
            parts.push(format!("\n**{}. [{}] {}**", i + 1, record.source, record.chunk.section));
            parts.push(excerpt(&record.chunk.content, EXCERPT_CHARS).to_string());
        }

        let data = hits
            .iter()
            .map(|hit| {
                serde_json::json!({
                    "source": hit.record.source,
                    "section": hit.record.chunk.section,
                    "score": hit.score,
                })
            })
            .collect();

        Ok(ToolResult {
            success: true,
            output: parts.join("\n"),
            data: Some(serde_json::Value::Array(data)),
        })
    }
}

/// `knowledge_stats`: what is indexed, by source.
pub struct KnowledgeStatsTool {
    kb: Arc<KnowledgeBase>,
}

impl KnowledgeStatsTool {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl Tool for KnowledgeStatsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "knowledge_stats",
            "Show what career data is indexed and available for search.",
            serde_json::json!({ "type": "object", "properties": {} }),
        )
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let stats = self.kb.stats().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "knowledge_stats".into(),
            reason: e.to_string(),
        })?;

        if stats.is_empty() {
            return Ok(ToolResult::ok(
                "Career knowledge base is empty. Ask me to index your career data.",
            ));
        }

        let mut parts = vec![
            "Career Knowledge Base Statistics:".to_string(),
            format!("\nTotal chunks indexed: {}", stats.total),
            "\nBy source:".to_string(),
        ];
        for (source, count) in &stats.by_source {
            parts.push(format!("  - {source}: {count} chunks"));
        }

        Ok(ToolResult {
            success: true,
            output: parts.join("\n"),
            data: serde_json::to_value(&stats).ok(),
        })
    }
}

/// `clear_knowledge`: delete indexed data for one source, or everything.
pub struct KnowledgeClearTool {
    kb: Arc<KnowledgeBase>,
}

impl KnowledgeClearTool {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl Tool for KnowledgeClearTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "clear_knowledge",
            "Remove indexed data from the career knowledge base, for one source or all of them.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "source": {
                        "type": "string",
                        "description": "Source to clear; leave empty to clear everything"
                    }
                }
            }),
        )
        .requires_confirmation(
            Confirmation::new("Clear indexed career data?").with_details(
                "This will permanently remove the data from the knowledge base. \
                 You will need to re-gather to restore it.",
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let failed = |e: wayfinder_core::error::KnowledgeError| ToolError::ExecutionFailed {
            tool_name: "clear_knowledge".into(),
            reason: e.to_string(),
        };

        let source = arguments["source"].as_str().map(str::trim).unwrap_or("");
        if !source.is_empty() {
            let removed = self.kb.clear(source).await.map_err(failed)?;
            info!(source, removed, "Knowledge source cleared");
            return Ok(ToolResult::ok(format!(
                "Cleared {removed} chunks for '{source}' from the knowledge base."
            )));
        }

        let stats = self.kb.stats().await.map_err(failed)?;
        let mut removed = 0;
        for source in stats.by_source.keys() {
            removed += self.kb.clear(source).await.map_err(failed)?;
        }
        info!(sources = stats.by_source.len(), removed, "Knowledge base cleared");
        Ok(ToolResult::ok(format!("Cleared {removed} chunks from the knowledge base.")))
    }
}

fn string_list(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// At most `max` characters of `text`, cut on a char boundary.
fn excerpt(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
