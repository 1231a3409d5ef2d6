//! `wayfinder search`: index markdown files in memory and search them.

use anyhow::Context;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use wayfinder_core::knowledge::ScoredRecord;
use wayfinder_knowledge::{KnowledgeBase, SearchQuery, sections_from_markdown};

pub async fn run(path: Option<&Path>, files: &[PathBuf], query: &SearchQuery) -> anyhow::Result<()> {
    let config = super::load_config(path)?;
    let kb = KnowledgeBase::in_memory(&config.knowledge);

    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        let text = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
        documents.push((super::file_stem(file), text));
    }

    let hits = index_and_search(&kb, &documents, query).await?;
    print!("{}", render(&query.text, &hits));
    Ok(())
}

/// Index each `(source, markdown)` pair, then run `query`.
pub async fn index_and_search(
    kb: &KnowledgeBase,
    documents: &[(String, String)],
    query: &SearchQuery,
) -> anyhow::Result<Vec<ScoredRecord>> {
    for (source, text) in documents {
        let records = kb.index(source, &sections_from_markdown(text, source)).await?;
        tracing::info!(source = %source, records, "Indexed file");
    }
    Ok(kb.search(query).await?)
}

pub fn render(query: &str, hits: &[ScoredRecord]) -> String {
    if hits.is_empty() {
        return format!("No results for '{query}'.\n");
    }

    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. [{}] {} (score {:.3})\n   {}",
            i + 1,
            hit.record.source,
            hit.record.chunk.section,
            hit.score,
            hit.record.chunk.content.replace('\n', "\n   ")
        );
    }
    out
}
