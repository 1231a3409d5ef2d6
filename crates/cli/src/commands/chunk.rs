//! `wayfinder chunk`: print the chunks of a markdown file.

use anyhow::Context;
use std::path::Path;
use wayfinder_config::KnowledgeConfig;
use wayfinder_core::knowledge::Chunk;
use wayfinder_knowledge::{Chunker, sections_from_markdown};

pub fn run(path: Option<&Path>, file: &Path) -> anyhow::Result<()> {
    let config = super::load_config(path)?;
    let text = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let chunks = chunk_markdown(&text, &super::file_stem(file), &config.knowledge);
    println!("{}", serde_json::to_string_pretty(&chunks)?);
    Ok(())
}

pub fn chunk_markdown(text: &str, fallback_name: &str, config: &KnowledgeConfig) -> Vec<Chunk> {
    let chunker = Chunker::new(config.chunk_max_tokens, config.chunk_min_tokens);
    chunker.chunk_all(&sections_from_markdown(text, fallback_name))
}
