//! Similarity port and the adapters shipped with Strata
//!
//! The core never inspects a vector beyond handing it back to the port that
//! produced it. `TermVectorPort` is a dependency-free hashed bag-of-words
//! model; `FastEmbedPort` (feature `fastembed`) wraps a local e5-small model.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::{Result, StrataError};

#[cfg(feature = "fastembed")]
mod fastembed_port;

#[cfg(feature = "fastembed")]
pub use fastembed_port::FastEmbedPort;

/// Default dimension of `TermVectorPort` vectors
pub const TERM_VECTOR_DIMENSION: usize = 512;

/// External capability that turns content into vectors and scores pairs of
/// vectors.
#[async_trait]
pub trait SimilarityPort: Send + Sync {
    /// Produce a vector for `content`.
    ///
    /// Fails with `EmbeddingUnavailable` when the backing service cannot
    /// answer.
    async fn vectorize(&self, content: &str) -> Result<Vec<f32>>;

    /// Similarity of two vectors produced by this port, in [0, 1].
    fn similarity(&self, a: &[f32], b: &[f32]) -> f32;
}

/// Build the port selected by `config`.
pub fn port_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn SimilarityPort>> {
    match config.provider {
        EmbeddingProvider::Terms => Ok(Arc::new(TermVectorPort::with_dimension(config.dimension))),
        #[cfg(feature = "fastembed")]
        EmbeddingProvider::Fastembed => Ok(Arc::new(FastEmbedPort::new()?)),
        #[cfg(not(feature = "fastembed"))]
        EmbeddingProvider::Fastembed => Err(StrataError::Config(
            "embedding provider \"fastembed\" requires the `fastembed` feature".to_string(),
        )),
    }
}

/// Cosine similarity clamped to [0, 1]; zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Split content into lowercase alphanumeric terms.
pub fn terms(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_lowercase())
}

/// Hashed bag-of-words vectors compared by cosine similarity.
///
/// Identical term multisets score 1.0, disjoint ones 0.0 (modulo hash
/// collisions). Needs no model download, so it is the default port.
#[derive(Debug, Clone)]
pub struct TermVectorPort {
    dimension: usize,
}

impl TermVectorPort {
    pub fn new() -> Self {
        Self::with_dimension(TERM_VECTOR_DIMENSION)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, content: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for term in terms(content) {
            let mut hasher = DefaultHasher::new();
            term.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        vector
    }
}

impl Default for TermVectorPort {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimilarityPort for TermVectorPort {
    async fn vectorize(&self, content: &str) -> Result<Vec<f32>> {
        if content.trim().is_empty() {
            return Err(StrataError::EmbeddingUnavailable(
                "cannot vectorize empty content".to_string(),
            ));
        }
        Ok(self.embed(content))
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_bounds() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_terms_lowercases_and_strips_punctuation() {
        let collected: Vec<String> = terms("The sky, is BLUE!").collect();
        assert_eq!(collected, vec!["the", "sky", "is", "blue"]);
    }

    #[tokio::test]
    async fn test_term_vectors_have_configured_dimension() {
        let port = TermVectorPort::with_dimension(64);
        let vector = port.vectorize("Hello, world!").await.unwrap();
        assert_eq!(vector.len(), 64);
        assert_eq!(port.dimension(), 64);
    }

    #[tokio::test]
    async fn test_identical_content_scores_one() {
        let port = TermVectorPort::new();
        let a = port.vectorize("The sky is blue.").await.unwrap();
        let b = port.vectorize("the SKY is blue").await.unwrap();
        assert!((port.similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_overlapping_content_scores_higher_than_disjoint() {
        let port = TermVectorPort::new();
        let base = port.vectorize("The quick brown fox jumps over the lazy dog").await.unwrap();
        let near = port.vectorize("A quick brown fox leaps over the lazy dog").await.unwrap();
        let far = port.vectorize("Quantum computing revolutionizes cryptography").await.unwrap();

        let sim_near = port.similarity(&base, &near);
        let sim_far = port.similarity(&base, &far);
        assert!(
            sim_near > sim_far,
            "near ({sim_near:.3}) should beat far ({sim_far:.3})"
        );
    }

    #[tokio::test]
    async fn test_port_from_config_uses_dimension() {
        let config = EmbeddingConfig {
            dimension: 32,
            ..Default::default()
        };
        let port = port_from_config(&config).unwrap();
        assert_eq!(port.vectorize("hello").await.unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_empty_content_is_unavailable() {
        let port = TermVectorPort::new();
        let result = port.vectorize("   ").await;
        assert!(matches!(result, Err(StrataError::EmbeddingUnavailable(_))));
    }
}
