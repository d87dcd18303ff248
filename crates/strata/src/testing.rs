//! Test utilities for strata - deterministic similarity ports
//!
//! `MockSimilarityPort` lets tests pin exact vectors for specific content,
//! inject vectorization failures and latency, and count port calls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::embedding::{SimilarityPort, TermVectorPort, cosine_similarity};
use crate::error::{Result, StrataError};

/// Deterministic similarity port for fast unit tests.
///
/// Content with a pinned vector gets exactly that vector; anything else gets
/// a hashed bag-of-words vector, so identical content always scores 1.0.
#[derive(Debug, Default)]
pub struct MockSimilarityPort {
    pinned: HashMap<String, Vec<f32>>,
    failing: HashSet<String>,
    fail_after: Option<usize>,
    delay: Option<Duration>,
    fallback: TermVectorPort,
    vectorize_calls: AtomicUsize,
    similarity_calls: AtomicUsize,
}

impl MockSimilarityPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the vector returned for `content`.
    pub fn with_vector(mut self, content: impl Into<String>, vector: Vec<f32>) -> Self {
        self.pinned.insert(content.into(), vector);
        self
    }

    /// Make vectorization of `content` fail.
    pub fn fail_on(mut self, content: impl Into<String>) -> Self {
        self.failing.insert(content.into());
        self
    }

    /// Make every vectorization after the first `successes` calls fail.
    pub fn fail_after(mut self, successes: usize) -> Self {
        self.fail_after = Some(successes);
        self
    }

    /// Sleep before answering each vectorization.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn vectorize_calls(&self) -> usize {
        self.vectorize_calls.load(Ordering::SeqCst)
    }

    pub fn similarity_calls(&self) -> usize {
        self.similarity_calls.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.vectorize_calls.store(0, Ordering::SeqCst);
        self.similarity_calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl SimilarityPort for MockSimilarityPort {
    async fn vectorize(&self, content: &str) -> Result<Vec<f32>> {
        let call = self.vectorize_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.contains(content) {
            return Err(StrataError::EmbeddingUnavailable(format!(
                "mock port refuses {content:?}"
            )));
        }
        if let Some(successes) = self.fail_after {
            if call >= successes {
                return Err(StrataError::EmbeddingUnavailable(
                    "mock port exhausted".to_string(),
                ));
            }
        }

        match self.pinned.get(content) {
            Some(vector) => Ok(vector.clone()),
            None => self.fallback.vectorize(content).await,
        }
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        self.similarity_calls.fetch_add(1, Ordering::SeqCst);
        cosine_similarity(a, b)
    }
}

/// Unit vector at `degrees` from the x axis; two of these are
/// `cos(delta)` similar.
pub fn unit_vector(degrees: f32) -> Vec<f32> {
    let radians = degrees.to_radians();
    vec![radians.cos(), radians.sin()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_port_is_deterministic() {
        let port = MockSimilarityPort::new();
        let a = port.vectorize("hello world").await.unwrap();
        let b = port.vectorize("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(port.vectorize_calls(), 2);
    }

    #[tokio::test]
    async fn mock_port_returns_pinned_vectors() {
        let port = MockSimilarityPort::new().with_vector("a", vec![0.95, 0.312]);
        assert_eq!(port.vectorize("a").await.unwrap(), vec![0.95, 0.312]);
    }

    #[tokio::test]
    async fn mock_port_fail_on_and_fail_after() {
        let port = MockSimilarityPort::new().fail_on("bad").fail_after(2);
        assert!(port.vectorize("bad").await.is_err());
        assert!(port.vectorize("good").await.is_ok());
        assert!(port.vectorize("good").await.is_err());
    }

    #[test]
    fn unit_vectors_have_expected_similarity() {
        let port = MockSimilarityPort::new();
        let sim = port.similarity(&unit_vector(0.0), &unit_vector(18.19));
        assert!((sim - 0.95).abs() < 1e-3, "got {sim}");
        assert_eq!(port.similarity_calls(), 1);
    }
}
