use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};

use super::{SimilarityPort, cosine_similarity};
use crate::error::{Result, StrataError};

pub const EMBEDDING_DIMENSION: usize = 384;

/// Similarity port backed by a local multilingual e5-small model.
///
/// Inference is CPU bound, so each call runs on the blocking pool.
#[derive(Clone)]
pub struct FastEmbedPort {
    model: Arc<Mutex<TextEmbedding>>,
}

impl FastEmbedPort {
    pub fn new() -> Result<Self> {
        let model = TextEmbedding::try_new(InitOptions::new(FastEmbedModel::MultilingualE5Small))
            .map_err(|e| StrataError::EmbeddingUnavailable(e.to_string()))?;
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl SimilarityPort for FastEmbedPort {
    async fn vectorize(&self, content: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = content.to_string();

        tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| {
                StrataError::EmbeddingUnavailable("embedding model lock poisoned".to_string())
            })?;
            let embeddings = model
                .embed(vec![text], None)
                .map_err(|e| StrataError::EmbeddingUnavailable(e.to_string()))?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| StrataError::EmbeddingUnavailable("No embedding returned".to_string()))
        })
        .await
        .map_err(|e| StrataError::EmbeddingUnavailable(format!("embedding task failed: {e}")))?
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "downloads the e5-small model"]
    async fn test_embed_returns_correct_dimension() {
        let port = FastEmbedPort::new().expect("Failed to load model");
        let embedding = port.vectorize("Hello, world!").await.expect("Failed to embed");
        assert_eq!(embedding.len(), EMBEDDING_DIMENSION);
    }

    #[tokio::test]
    #[ignore = "downloads the e5-small model"]
    async fn test_similar_texts_have_high_similarity() {
        let port = FastEmbedPort::new().expect("Failed to load model");

        let emb1 = port.vectorize("The quick brown fox jumps over the lazy dog").await.unwrap();
        let emb2 = port.vectorize("A fast brown fox leaps over a sleepy dog").await.unwrap();
        let emb3 = port.vectorize("Quantum computing revolutionizes cryptography").await.unwrap();

        assert!(port.similarity(&emb1, &emb2) > port.similarity(&emb1, &emb3));
    }
}
