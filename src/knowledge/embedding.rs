//! The embedding model, modeled only by its I/O contract (§1 Out of scope).
//!
//! Multi-backend dispatch shape grounded on
//! `other_examples/12b776f7_josephleblanc-ploke__...ploke-embed-src-indexer-mod.rs.rs`'s
//! `EmbeddingProcessor`/`EmbeddingSource` pattern.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding backend error: {0}")]
    Backend(String),
}

/// Out-of-scope algorithmically; a real deployment plugs in a hosted or
/// local embedding model. Test doubles implement this directly.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn dimensions(&self) -> usize;
}

/// Multi-backend dispatch enum, mirroring `EmbeddingSource` in the pack.
/// `Deterministic` is a dependency-free fallback usable without a real
/// embedding service (e.g. in `submit_sync` small-dataset paths and tests).
pub enum EmbeddingSource {
    Deterministic(DeterministicEmbedder),
    Remote(Box<dyn EmbeddingProvider>),
}

#[async_trait]
impl EmbeddingProvider for EmbeddingSource {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        match self {
            EmbeddingSource::Deterministic(backend) => backend.embed_batch(texts).await,
            EmbeddingSource::Remote(backend) => backend.embed_batch(texts).await,
        }
    }

    fn dimensions(&self) -> usize {
        match self {
            EmbeddingSource::Deterministic(backend) => backend.dimensions(),
            EmbeddingSource::Remote(backend) => backend.dimensions(),
        }
    }
}

/// A cheap, deterministic bag-of-hashed-tokens embedder. Not a real
/// semantic embedding model — it exists only so the rest of the pipeline
/// (clustering, retrieval) has something to operate on without an external
/// dependency, and so tests are fully deterministic.
pub struct DeterministicEmbedder {
    dims: usize,
}

impl DeterministicEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for DeterministicEmbedder {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl EmbeddingProvider for DeterministicEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| hash_embed(t, self.dims)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

fn hash_embed(text: &str, dims: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dims];
    for (i, word) in text.split_whitespace().enumerate() {
        let mut hash: u64 = 1469598103934665603;
        for byte in word.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
        let bucket = (hash as usize + i) % dims;
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_embedder_is_stable() {
        let embedder = DeterministicEmbedder::default();
        let a = embedder.embed_batch(&["hello world".to_string()]).await.unwrap();
        let b = embedder.embed_batch(&["hello world".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }
}
