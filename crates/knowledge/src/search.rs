//! Filtered similarity search over indexed records.
//!
//! The store only knows how to return nearest neighbours. Filters are applied
//! afterwards, so the searcher over-fetches `limit × overfetch` candidates and
//! trims the survivors to `limit`. When filters reject most candidates the
//! result is shorter than `limit`; it is never padded with filtered records.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wayfinder_core::error::KnowledgeError;
use wayfinder_core::knowledge::{Embedder, KnowledgeStore, ScoredRecord};

/// One knowledge search request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,

    /// Maximum results; `None` uses the searcher default
    #[serde(default)]
    pub limit: Option<usize>,

    /// Only these sources, when non-empty
    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub excluded_sources: Vec<String>,

    #[serde(default)]
    pub excluded_sections: Vec<String>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn excluding_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn excluding_sections<I, S>(mut self, sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_sections = sections.into_iter().map(Into::into).collect();
        self
    }

    fn accepts(&self, hit: &ScoredRecord) -> bool {
        let record = &hit.record;
        (self.sources.is_empty() || self.sources.contains(&record.source))
            && !self.excluded_sources.contains(&record.source)
            && !self.excluded_sections.contains(&record.chunk.section)
    }
}

/// Embeds queries and reads the store.
pub struct Searcher {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    overfetch: usize,
    default_limit: usize,
}

impl Searcher {
    pub fn new(store: Arc<dyn KnowledgeStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            overfetch: 3,
            default_limit: 5,
        }
    }

    pub fn with_overfetch(mut self, factor: usize) -> Self {
        self.overfetch = factor.max(1);
        self
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    /// Top matches for `query`, best first, at most `limit` of them.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<ScoredRecord>, KnowledgeError> {
        let limit = query.limit.unwrap_or(self.default_limit);
        if limit == 0 || query.text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self
            .embedder
            .embed(std::slice::from_ref(&query.text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| KnowledgeError::Embedding("no embedding returned for query".into()))?;

        let fetch = limit.saturating_mul(self.overfetch);
        let candidates = self
            .store
            .nearest(&embedding, fetch)
            .await
            .map_err(|e| KnowledgeError::Search(e.to_string()))?;
        let fetched = candidates.len();

        let mut hits: Vec<ScoredRecord> = candidates.into_iter().filter(|hit| query.accepts(hit)).collect();
        hits.truncate(limit);

        tracing::debug!(
            query = %query.text,
            limit,
            fetched,
            returned = hits.len(),
            "Knowledge search"
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunker;
    use crate::embedder::HashingEmbedder;
    use crate::indexer::Indexer;
    use crate::store::InMemoryKnowledgeStore;
    use wayfinder_core::knowledge::Section;

    async fn seeded() -> Searcher {
        let store: Arc<InMemoryKnowledgeStore> = Arc::new(InMemoryKnowledgeStore::new());
        let embedder = Arc::new(HashingEmbedder::new(128));
        let indexer = Indexer::new(store.clone(), embedder.clone(), Chunker::new(500, 50));

        let github: Vec<Section> = (0..8)
            .map(|i| Section::new(format!("repo-{i}"), format!("rust async runtime crate number {i}")))
            .collect();
        indexer.index("github", &github).await.unwrap();
        indexer
            .index(
                "resume",
                &[
                    Section::new("Experience", "Built a rust async runtime at Acme"),
                    Section::new("Education", "Studied rust and compilers"),
                ],
            )
            .await
            .unwrap();

        Searcher::new(store, embedder)
    }

    #[tokio::test]
    async fn unfiltered_search_returns_limit() {
        let searcher = seeded().await;
        let hits = searcher.search(&SearchQuery::new("rust async runtime").with_limit(4)).await.unwrap();
        assert_eq!(hits.len(), 4);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn source_filter_survives_majority_of_other_sources() {
        let searcher = seeded().await;
        let query = SearchQuery::new("rust async runtime at acme").with_limit(2).with_sources(["resume"]);
        let hits = searcher.search(&query).await.unwrap();

        assert!(!hits.is_empty());
        assert!(hits.len() <= 2);
        assert!(hits.iter().all(|h| h.record.source == "resume"));
    }

    #[tokio::test]
    async fn filtered_results_are_never_padded() {
        // Only 3 candidates are fetched and github dominates them
        let searcher = seeded().await;
        let query = SearchQuery::new("rust async runtime crate number")
            .with_limit(1)
            .excluding_sources(["github"]);
        let hits = searcher.search(&query).await.unwrap();
        assert!(hits.len() <= 1);
        assert!(hits.iter().all(|h| h.record.source != "github"));
    }

    #[tokio::test]
    async fn excluded_sections_are_dropped() {
        let searcher = seeded().await;
        let query = SearchQuery::new("rust")
            .with_limit(10)
            .with_sources(["resume"])
            .excluding_sections(["Education"]);
        let hits = searcher.search(&query).await.unwrap();
        assert!(hits.iter().all(|h| h.record.chunk.section != "Education"));
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn empty_store_or_query_yields_nothing() {
        let searcher = Searcher::new(Arc::new(InMemoryKnowledgeStore::new()), Arc::new(HashingEmbedder::new(16)));
        assert!(searcher.search(&SearchQuery::new("anything")).await.unwrap().is_empty());
        assert!(searcher.search(&SearchQuery::new("   ")).await.unwrap().is_empty());
    }

    #[test]
    fn query_deserializes_with_defaults() {
        let query: SearchQuery = serde_json::from_str(r#"{"text": "kubernetes"}"#).unwrap();
        assert_eq!(query, SearchQuery::new("kubernetes"));
    }
}
