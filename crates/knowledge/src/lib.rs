//! # wayfinder-knowledge
//!
//! Retrieval over the user's career material. Sections are split into bounded
//! chunks, embedded, stored with their source tag, and searched by similarity
//! with source and section filters.

pub mod chunker;
pub mod embedder;
pub mod indexer;
pub mod search;
pub mod store;
pub mod vector;

pub use chunker::{Chunker, sections_from_markdown};
pub use embedder::{HashingEmbedder, ProviderEmbedder};
pub use indexer::Indexer;
pub use search::{SearchQuery, Searcher};
pub use store::InMemoryKnowledgeStore;
pub use vector::cosine_similarity;

use std::sync::Arc;
use wayfinder_config::KnowledgeConfig;
use wayfinder_core::error::KnowledgeError;
use wayfinder_core::event::EventBus;
use wayfinder_core::knowledge::{Embedder, KnowledgeStats, KnowledgeStore, ScoredRecord, Section};

/// An indexer and a searcher sharing one store and embedder.
pub struct KnowledgeBase {
    indexer: Indexer,
    searcher: Searcher,
}

impl KnowledgeBase {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        config: &KnowledgeConfig,
    ) -> Self {
        let chunker = Chunker::new(config.chunk_max_tokens, config.chunk_min_tokens);
        Self {
            indexer: Indexer::new(store.clone(), embedder.clone(), chunker).with_batch_size(config.batch_size),
            searcher: Searcher::new(store, embedder)
                .with_overfetch(config.overfetch_factor)
                .with_default_limit(config.default_limit),
        }
    }

    /// In-memory store with the hashing embedder.
    pub fn in_memory(config: &KnowledgeConfig) -> Self {
        Self::new(
            Arc::new(InMemoryKnowledgeStore::new()),
            Arc::new(HashingEmbedder::new(config.embedding_dimensions)),
            config,
        )
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.indexer = self.indexer.with_event_bus(bus);
        self
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    pub async fn index(&self, source: &str, sections: &[Section]) -> Result<usize, KnowledgeError> {
        self.indexer.index(source, sections).await
    }

    pub async fn reindex(&self, source: &str, sections: &[Section]) -> Result<usize, KnowledgeError> {
        self.indexer.reindex(source, sections).await
    }

    pub async fn clear(&self, source: &str) -> Result<usize, KnowledgeError> {
        self.indexer.clear(source).await
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<ScoredRecord>, KnowledgeError> {
        self.searcher.search(query).await
    }

    pub async fn stats(&self) -> Result<KnowledgeStats, KnowledgeError> {
        self.indexer.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn knowledge_base_round_trip_through_config() {
        let config = KnowledgeConfig::default();
        let kb = KnowledgeBase::in_memory(&config);

        let md = "# Experience\nStaff engineer on the payments platform.\n\n# Skills\nRust, Postgres, Kafka";
        let written = kb.index("resume", &sections_from_markdown(md, "resume")).await.unwrap();
        assert_eq!(written, 2);

        let hits = kb
            .search(&SearchQuery::new("payments platform engineer").with_limit(1))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.chunk.section, "Experience");

        assert_eq!(kb.clear("resume").await.unwrap(), 2);
        assert!(kb.stats().await.unwrap().is_empty());
    }
}
