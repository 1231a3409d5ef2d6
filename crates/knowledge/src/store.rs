//! In-memory knowledge store for tests and local sessions.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use wayfinder_core::error::KnowledgeError;
use wayfinder_core::knowledge::{IndexedRecord, KnowledgeStats, KnowledgeStore, ScoredRecord};

use crate::vector;

/// A knowledge store that keeps records in a Vec behind a `RwLock`.
///
/// Searches scan every record; fine for a single user's career data.
pub struct InMemoryKnowledgeStore {
    records: Arc<RwLock<Vec<IndexedRecord>>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn insert_batch(&self, batch: Vec<IndexedRecord>) -> Result<usize, KnowledgeError> {
        let mut records = self.records.write().await;
        let mut ids: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();
        let mut written = 0;
        for record in batch {
            // Stored records are immutable; a repeated id keeps the first one
            if ids.insert(record.id.clone()) {
                records.push(record);
                written += 1;
            }
        }
        Ok(written)
    }

    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredRecord>, KnowledgeError> {
        let records = self.records.read().await;
        Ok(vector::nearest(records.iter(), embedding, k))
    }

    async fn delete_source(&self, source: &str) -> Result<usize, KnowledgeError> {
        let mut records = self.records.write().await;
        let len_before = records.len();
        records.retain(|r| r.source != source);
        Ok(len_before - records.len())
    }

    async fn stats(&self) -> Result<KnowledgeStats, KnowledgeError> {
        let records = self.records.read().await;
        let mut by_source: BTreeMap<String, usize> = BTreeMap::new();
        for record in records.iter() {
            *by_source.entry(record.source.clone()).or_default() += 1;
        }
        Ok(KnowledgeStats {
            total: records.len(),
            by_source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wayfinder_core::knowledge::Chunk;

    fn record(id: &str, source: &str, embedding: Vec<f32>) -> IndexedRecord {
        IndexedRecord {
            id: id.into(),
            source: source.into(),
            chunk: Chunk {
                content: format!("content of {id}"),
                section: "Experience".into(),
                index: 0,
                token_count: 3,
            },
            embedding,
            indexed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_count_by_source() {
        let store = InMemoryKnowledgeStore::new();
        store
            .insert_batch(vec![
                record("a", "resume", vec![1.0, 0.0]),
                record("b", "linkedin", vec![0.0, 1.0]),
                record("c", "resume", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_source["resume"], 2);
        assert_eq!(stats.by_source["linkedin"], 1);
    }

    #[tokio::test]
    async fn same_id_keeps_the_stored_record() {
        let store = InMemoryKnowledgeStore::new();
        assert_eq!(store.insert_batch(vec![record("a", "resume", vec![1.0, 0.0])]).await.unwrap(), 1);

        let mut changed = record("a", "resume", vec![0.0, 1.0]);
        changed.chunk.content = "rewritten".into();
        let written = store
            .insert_batch(vec![changed, record("b", "resume", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(store.stats().await.unwrap().total, 2);

        let hits = store.nearest(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].record.id, "a");
        assert_eq!(hits[0].record.chunk.content, "content of a");
        assert_eq!(hits[0].record.embedding, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn delete_source_removes_only_that_source() {
        let store = InMemoryKnowledgeStore::new();
        store
            .insert_batch(vec![
                record("a", "resume", vec![1.0]),
                record("b", "linkedin", vec![1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_source("resume").await.unwrap(), 1);
        assert_eq!(store.delete_source("resume").await.unwrap(), 0);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 1);
        assert!(!stats.by_source.contains_key("resume"));
    }

    #[tokio::test]
    async fn nearest_ignores_source() {
        let store = InMemoryKnowledgeStore::new();
        store
            .insert_batch(vec![
                record("a", "resume", vec![0.0, 1.0]),
                record("b", "linkedin", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.nearest(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].record.id, "b");
    }
}
