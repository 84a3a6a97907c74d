//! Embeddings
//!
//! The `EmbeddingModel` capability used to index chunks and questions, plus a
//! local feature-hashing implementation. The hashing model needs no network
//! and is stable: the same text always produces the same vector.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Dimensionality of the feature-hashing vectors
pub const HASHING_DIM: usize = 256;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding service unavailable: {0}")]
    Unavailable(String),
    #[error("Embedding request timed out after {0}s")]
    Timeout(u64),
    #[error("Embedding generation failed: {0}")]
    GenerationFailed(String),
    #[error("Embedding service returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}

impl Serialize for EmbeddingError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Embedding vector
pub type Embedding = Vec<f32>;

/// Turns text into vectors.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Name shown in logs
    fn name(&self) -> &str;

    /// Embed document chunks; one vector per input, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError>;

    /// Embed a question
    async fn embed_query(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut embeddings = self.embed_documents(&[text.to_string()]).await?;
        if embeddings.len() != 1 {
            return Err(EmbeddingError::CountMismatch { expected: 1, got: embeddings.len() });
        }
        Ok(embeddings.remove(0))
    }
}

/// Local embeddings using feature hashing
#[derive(Debug, Default, Clone, Copy)]
pub struct HashingEmbedder;

#[async_trait]
impl EmbeddingModel for HashingEmbedder {
    fn name(&self) -> &str {
        "feature-hashing"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        Ok(texts.iter().map(|t| hashing_embedding(t)).collect())
    }
}

/// Hash a token to a bucket index in `[0, HASHING_DIM)`.
fn hash_token(token: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % HASHING_DIM
}

/// Generate an embedding for text using feature hashing.
///
/// Each token is hashed to a fixed bucket; the resulting term-frequency
/// vector is L2-normalized.
pub fn hashing_embedding(text: &str) -> Embedding {
    let mut tf = vec![0.0f32; HASHING_DIM];

    let tokens = text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty());
    for token in tokens {
        tf[hash_token(&token.to_lowercase())] += 1.0;
    }

    let norm: f32 = tf.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut tf {
            *x /= norm;
        }
    }

    tf
}

/// Cosine similarity between two embeddings. Mismatched, zero or NaN-bearing
/// vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a * norm_b);
    if similarity.is_nan() {
        0.0
    } else {
        similarity
    }
}

/// Indices of the `top_k` candidates most similar to `query`, best first.
pub fn find_similar(query: &[f32], candidates: &[Embedding], top_k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = candidates.iter()
        .enumerate()
        .map(|(i, emb)| (i, cosine_similarity(query, emb)))
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_embedding_dim() {
        let embedding = hashing_embedding("Hello world this is a test");
        assert_eq!(embedding.len(), HASHING_DIM);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_hashing_embedding_stability() {
        let emb1 = hashing_embedding("The quick brown fox");
        let _ = hashing_embedding("completely different words zebra giraffe quantum");
        let emb2 = hashing_embedding("The quick brown fox");
        assert_eq!(emb1, emb2);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        assert!(hashing_embedding("  ...  ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_mismatched() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_find_similar() {
        let query = vec![1.0, 0.0, 0.0];
        let candidates = vec![
            vec![0.0, 1.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.7, 0.7, 0.0],
        ];

        let results = find_similar(&query, &candidates, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 1);
        assert_eq!(results[1].0, 2);
    }

    #[test]
    fn test_find_similar_nan_ranks_deterministically() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            vec![f32::NAN, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
        ];

        let results = find_similar(&query, &candidates, 3);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, 1);
        assert!(results.iter().all(|(_, score)| !score.is_nan()));
        assert_eq!(results[1].1, 0.0);
        assert_eq!(results[2].1, 0.0);
    }

    #[tokio::test]
    async fn test_hashing_embedder_query_matches_documents() {
        let embedder = HashingEmbedder;
        let docs = embedder.embed_documents(&["solar panels".to_string()]).await.unwrap();
        let query = embedder.embed_query("solar panels").await.unwrap();
        assert_eq!(docs[0], query);
    }
}
