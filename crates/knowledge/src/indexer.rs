//! Indexing: sections to stored, embedded records.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use wayfinder_core::error::KnowledgeError;
use wayfinder_core::event::{DomainEvent, EventBus};
use wayfinder_core::knowledge::{Chunk, Embedder, IndexedRecord, KnowledgeStats, KnowledgeStore, Section};

use crate::chunker::Chunker;

/// Writes chunks of labeled sections into a [`KnowledgeStore`].
///
/// The indexer is the only writer of records. Indexing the same source from
/// two tasks at once is not serialized here.
pub struct Indexer {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    batch_size: usize,
    event_bus: Option<Arc<EventBus>>,
}

impl Indexer {
    pub fn new(store: Arc<dyn KnowledgeStore>, embedder: Arc<dyn Embedder>, chunker: Chunker) -> Self {
        Self {
            store,
            embedder,
            chunker,
            batch_size: 64,
            event_bus: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Chunk, embed and store `sections` under `source`. Returns the number
    /// of records written.
    ///
    /// Every batch is embedded before anything is stored, so a failed
    /// embedding leaves the store untouched.
    pub async fn index(&self, source: &str, sections: &[Section]) -> Result<usize, KnowledgeError> {
        let records = self.prepare(source, sections).await?;
        if records.is_empty() {
            tracing::debug!(source, "Nothing to index");
            return Ok(0);
        }
        self.write(source, sections.len(), records).await
    }

    /// Replace everything stored for `source` with a fresh index of `sections`.
    ///
    /// The old records are only removed once the new ones are embedded.
    pub async fn reindex(&self, source: &str, sections: &[Section]) -> Result<usize, KnowledgeError> {
        let records = self.prepare(source, sections).await?;
        let removed = self.clear(source).await?;
        tracing::debug!(source, removed, "Cleared source before reindex");
        if records.is_empty() {
            return Ok(0);
        }
        self.write(source, sections.len(), records).await
    }

    async fn prepare(&self, source: &str, sections: &[Section]) -> Result<Vec<IndexedRecord>, KnowledgeError> {
        let chunks = self.chunker.chunk_all(sections);
        let mut records = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let documents: Vec<String> = batch.iter().map(|c| document_text(source, c)).collect();
            let embeddings = self.embedder.embed(&documents).await.map_err(|e| indexing(source, e))?;
            if embeddings.len() != batch.len() {
                return Err(indexing(
                    source,
                    format!("embedder returned {} vectors for {} chunks", embeddings.len(), batch.len()),
                ));
            }

            let now = Utc::now();
            records.extend(batch.iter().zip(embeddings).map(|(chunk, embedding)| IndexedRecord {
                id: record_id(source, chunk),
                source: source.to_string(),
                chunk: chunk.clone(),
                embedding,
                indexed_at: now,
            }));
            tracing::debug!(source, batch = batch.len(), embedded = records.len(), "Embedded batch");
        }
        Ok(records)
    }

    async fn write(&self, source: &str, sections: usize, records: Vec<IndexedRecord>) -> Result<usize, KnowledgeError> {
        let written = self.store.insert_batch(records).await.map_err(|e| indexing(source, e))?;
        tracing::info!(source, sections, records = written, "Indexed source");
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::KnowledgeIndexed {
                source: source.to_string(),
                records: written,
                timestamp: Utc::now(),
            });
        }
        Ok(written)
    }

    /// Delete every record of `source`. Not reversible.
    pub async fn clear(&self, source: &str) -> Result<usize, KnowledgeError> {
        let removed = self.store.delete_source(source).await?;
        if removed > 0 {
            tracing::info!(source, removed, "Cleared source");
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<KnowledgeStats, KnowledgeError> {
        self.store.stats().await
    }
}

/// The text that gets embedded for a chunk.
pub fn document_text(source: &str, chunk: &Chunk) -> String {
    format!("[{source}] {}: {}", chunk.section, chunk.content)
}

/// Stable record ID: same source, section, position and content give the same ID.
pub fn record_id(source: &str, chunk: &Chunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0]);
    hasher.update(chunk.section.as_bytes());
    hasher.update([0]);
    hasher.update(chunk.index.to_le_bytes());
    hasher.update([0]);
    hasher.update(chunk.content.as_bytes());
    let digest = hasher.finalize();
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

fn indexing(source: &str, reason: impl std::fmt::Display) -> KnowledgeError {
    KnowledgeError::Indexing {
        source_tag: source.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;
    use crate::store::InMemoryKnowledgeStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records each batch it sees.
    struct CountingEmbedder {
        batches: Mutex<Vec<usize>>,
        documents: Mutex<Vec<String>>,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                documents: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn name(&self) -> &str {
            "counting"
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError> {
            self.batches.lock().unwrap().push(inputs.len());
            self.documents.lock().unwrap().extend(inputs.iter().cloned());
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn name(&self) -> &str {
            "broken"
        }

        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError> {
            Err(KnowledgeError::Embedding("backend offline".into()))
        }
    }

    /// Succeeds for the first `ok_batches` calls, then fails.
    struct FlakyEmbedder {
        ok_batches: usize,
        calls: Mutex<usize>,
    }

    impl FlakyEmbedder {
        fn new(ok_batches: usize) -> Self {
            Self {
                ok_batches,
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls > self.ok_batches {
                return Err(KnowledgeError::Embedding("quota exceeded".into()));
            }
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn sections(n: usize) -> Vec<Section> {
        (0..n)
            .map(|i| Section::new(format!("Role {i}"), format!("Worked on project number {i}")))
            .collect()
    }

    #[tokio::test]
    async fn index_writes_in_fixed_batches() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let embedder = Arc::new(CountingEmbedder::new());
        let indexer = Indexer::new(store.clone(), embedder.clone(), Chunker::new(500, 50)).with_batch_size(2);

        let written = indexer.index("resume", &sections(5)).await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(*embedder.batches.lock().unwrap(), vec![2, 2, 1]);

        let docs = embedder.documents.lock().unwrap();
        assert_eq!(docs[0], "[resume] Role 0: Worked on project number 0");

        let stats = indexer.stats().await.unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.by_source["resume"], 5);
    }

    #[tokio::test]
    async fn reindex_replaces_only_that_source() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let indexer = Indexer::new(store, Arc::new(HashingEmbedder::new(32)), Chunker::new(500, 50));

        indexer.index("resume", &sections(3)).await.unwrap();
        indexer.index("github", &sections(2)).await.unwrap();
        indexer.reindex("resume", &sections(1)).await.unwrap();

        let stats = indexer.stats().await.unwrap();
        assert_eq!(stats.by_source["resume"], 1);
        assert_eq!(stats.by_source["github"], 2);
        assert_eq!(stats.total, 3);
    }

    #[tokio::test]
    async fn clear_is_counted_and_idempotent() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let indexer = Indexer::new(store, Arc::new(HashingEmbedder::new(32)), Chunker::new(500, 50));
        indexer.index("linkedin", &sections(4)).await.unwrap();

        assert_eq!(indexer.clear("linkedin").await.unwrap(), 4);
        assert_eq!(indexer.clear("linkedin").await.unwrap(), 0);
        assert!(indexer.stats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn indexing_same_content_twice_keeps_ids_stable() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let indexer = Indexer::new(store, Arc::new(HashingEmbedder::new(32)), Chunker::new(500, 50));
        indexer.index("resume", &sections(2)).await.unwrap();
        indexer.index("resume", &sections(2)).await.unwrap();
        assert_eq!(indexer.stats().await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn embedding_failure_is_an_indexing_error() {
        let indexer = Indexer::new(
            Arc::new(InMemoryKnowledgeStore::new()),
            Arc::new(BrokenEmbedder),
            Chunker::new(500, 50),
        );
        let err = indexer.index("resume", &sections(1)).await.unwrap_err();
        match err {
            KnowledgeError::Indexing { source_tag, reason } => {
                assert_eq!(source_tag, "resume");
                assert!(reason.contains("backend offline"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn failed_batch_stores_nothing() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let indexer =
            Indexer::new(store.clone(), Arc::new(FlakyEmbedder::new(1)), Chunker::new(500, 50)).with_batch_size(2);

        assert!(indexer.index("resume", &sections(4)).await.is_err());
        assert!(store.stats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_reindex_keeps_the_old_records() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        Indexer::new(store.clone(), Arc::new(HashingEmbedder::new(32)), Chunker::new(500, 50))
            .index("resume", &sections(3))
            .await
            .unwrap();

        let flaky =
            Indexer::new(store.clone(), Arc::new(FlakyEmbedder::new(1)), Chunker::new(500, 50)).with_batch_size(2);
        let err = flaky.reindex("resume", &sections(4)).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(store.stats().await.unwrap().by_source["resume"], 3);
    }

    #[tokio::test]
    async fn index_publishes_event() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let indexer = Indexer::new(
            Arc::new(InMemoryKnowledgeStore::new()),
            Arc::new(HashingEmbedder::new(16)),
            Chunker::new(500, 50),
        )
        .with_event_bus(bus);

        indexer.index("github", &sections(3)).await.unwrap();
        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::KnowledgeIndexed { source, records, .. } => {
                assert_eq!(source, "github");
                assert_eq!(*records, 3);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn record_id_depends_on_position() {
        let chunk = Chunk {
            content: "Rust".into(),
            section: "Skills".into(),
            index: 0,
            token_count: 1,
        };
        let moved = Chunk { index: 1, ..chunk.clone() };
        assert_eq!(record_id("resume", &chunk), record_id("resume", &chunk));
        assert_ne!(record_id("resume", &chunk), record_id("resume", &moved));
        assert_ne!(record_id("resume", &chunk), record_id("github", &chunk));
        assert_eq!(record_id("resume", &chunk).len(), 32);
    }
}
