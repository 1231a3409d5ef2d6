//! Text embedders.
//!
//! [`HashingEmbedder`] is deterministic and offline: every lowercase word is
//! hashed into one of `dimensions` signed buckets and the result is
//! L2-normalised. Texts sharing vocabulary land near each other, which is
//! enough for local search and for tests. [`ProviderEmbedder`] forwards to a
//! model backend's embedding endpoint.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use wayfinder_core::error::KnowledgeError;
use wayfinder_core::knowledge::Embedder;
use wayfinder_core::provider::{EmbeddingRequest, Provider};

/// Feature-hashing embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a single text.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError> {
        Ok(inputs.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Embedder backed by a [`Provider`]'s `embed` endpoint.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: inputs.to_vec(),
            })
            .await
            .map_err(|e| KnowledgeError::Embedding(e.to_string()))?;

        if response.embeddings.len() != inputs.len() {
            return Err(KnowledgeError::Embedding(format!(
                "expected {} embeddings from '{}', got {}",
                inputs.len(),
                self.model,
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }
}
