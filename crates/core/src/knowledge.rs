//! Knowledge traits: retrievable units of source material and their store.
//!
//! Callers hand the indexer labeled [`Section`]s; the indexer splits them into
//! [`Chunk`]s, embeds them, and writes [`IndexedRecord`]s into a
//! [`KnowledgeStore`]. Search reads the store by vector similarity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::error::KnowledgeError;

/// One labeled unit of source material (e.g., "Experience › Acme Corp").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub content: String,
}

impl Section {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A bounded slice of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The text of this chunk
    pub content: String,

    /// Name of the section this chunk was cut from
    pub section: String,

    /// Position within the section, starting at 0
    pub index: usize,

    /// Token count under the indexer's counter
    pub token_count: usize,
}

/// A chunk persisted in the store with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedRecord {
    /// Stable ID derived from source, section, position and content
    pub id: String,

    /// Source tag (e.g., "resume", "linkedin", "github")
    pub source: String,

    pub chunk: Chunk,

    #[serde(skip)]
    pub embedding: Vec<f32>,

    pub indexed_at: DateTime<Utc>,
}

/// A record with its similarity to a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: IndexedRecord,
    pub score: f32,
}

/// Record counts, overall and per source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub total: usize,
    pub by_source: BTreeMap<String, usize>,
}

impl KnowledgeStats {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Storage for indexed records.
///
/// Implementations: in-memory (shipped), anything with a nearest-neighbour index.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// The backend name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Insert a batch of records. A record whose ID is already stored is skipped and the
    /// stored one kept. Returns how many were written.
    async fn insert_batch(&self, records: Vec<IndexedRecord>) -> std::result::Result<usize, KnowledgeError>;

    /// The `k` records most similar to `embedding`, best first. No filtering.
    async fn nearest(&self, embedding: &[f32], k: usize) -> std::result::Result<Vec<ScoredRecord>, KnowledgeError>;

    /// Delete every record of `source`. Returns the number removed.
    async fn delete_source(&self, source: &str) -> std::result::Result<usize, KnowledgeError>;

    /// Current record counts.
    async fn stats(&self) -> std::result::Result<KnowledgeStats, KnowledgeError>;
}

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Embed each input; the output has one vector per input, in order.
    async fn embed(&self, inputs: &[String]) -> std::result::Result<Vec<Vec<f32>>, KnowledgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_default_is_empty() {
        let stats = KnowledgeStats::default();
        assert!(stats.is_empty());
        assert!(stats.by_source.is_empty());
    }

    #[test]
    fn record_serialization_skips_embedding() {
        let record = IndexedRecord {
            id: "rec_1".into(),
            source: "resume".into(),
            chunk: Chunk {
                content: "Led the platform team".into(),
                section: "Experience".into(),
                index: 0,
                token_count: 6,
            },
            embedding: vec![0.1, 0.2],
            indexed_at: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("platform team"));
        assert!(!json.contains("embedding"));
    }
}
