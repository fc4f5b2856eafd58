//! `KnowledgeCorpus`: `add(texts)` / `search(query, k) -> [(doc, score)]` (§3).

use tokio::sync::RwLock;

use super::embedding::{EmbeddingError, EmbeddingProvider};

/// An append-only set of documents with embeddings, supporting
/// nearest-neighbor search. Lifetime matches the worker process (§3); a
/// fresh instance is built per job since two workers serving overlapping
/// corpora duplicate them locally (§5 Shared-resource policy).
pub struct KnowledgeCorpus<E: EmbeddingProvider> {
    embedder: E,
    documents: RwLock<Vec<(String, Vec<f32>)>>,
}

impl<E: EmbeddingProvider> KnowledgeCorpus<E> {
    pub fn new(embedder: E) -> Self {
        Self {
            embedder,
            documents: RwLock::new(Vec::new()),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Add texts to the corpus, embedding them in one batch call.
    pub async fn add(&self, texts: Vec<String>) -> Result<(), EmbeddingError> {
        if texts.is_empty() {
            return Ok(());
        }
        let vectors = self.embedder.embed_batch(&texts).await?;
        let mut docs = self.documents.write().await;
        docs.extend(texts.into_iter().zip(vectors));
        Ok(())
    }

    /// Top-`k` nearest documents by cosine similarity, highest score first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<(String, f32)>, EmbeddingError> {
        let docs = self.documents.read().await;
        if docs.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self
            .embedder
            .embed_batch(&[query.to_string()])
            .await?
            .remove(0);

        let mut scored: Vec<(String, f32)> = docs
            .iter()
            .map(|(doc, vec)| (doc.clone(), cosine_similarity(&query_vec, vec)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
