//! Relationship classification between records
//!
//! Edges are classified by semantic distance (1 - similarity):
//! - distance < very_close: `VeryClose`
//! - distance < related: `Related`
//! - otherwise: `Distant`

use serde::Deserialize;

use crate::embedding::SimilarityPort;
use crate::error::{Result, StrataError};
use crate::memory::types::{Record, RelationshipKind};

/// Distance cut-offs for relationship classification
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RelationshipThresholds {
    /// Below this distance an edge is `VeryClose` (default: 0.2)
    #[serde(default = "default_very_close")]
    pub very_close: f32,
    /// Below this distance an edge is `Related` (default: 0.5)
    #[serde(default = "default_related")]
    pub related: f32,
}

impl Default for RelationshipThresholds {
    fn default() -> Self {
        Self {
            very_close: default_very_close(),
            related: default_related(),
        }
    }
}

fn default_very_close() -> f32 {
    0.2
}

fn default_related() -> f32 {
    0.5
}

impl RelationshipThresholds {
    /// Classify a precomputed semantic distance
    pub fn classify(&self, distance: f32) -> RelationshipKind {
        if distance < self.very_close {
            RelationshipKind::VeryClose
        } else if distance < self.related {
            RelationshipKind::Related
        } else {
            RelationshipKind::Distant
        }
    }
}

/// Classify the relationship between two embedded records.
pub fn determine_relationship_type(
    a: &Record,
    b: &Record,
    port: &dyn SimilarityPort,
    thresholds: &RelationshipThresholds,
) -> Result<RelationshipKind> {
    let similarity = a.similarity_to(b, port).ok_or_else(|| {
        StrataError::EmbeddingUnavailable(format!(
            "cannot classify relationship {} -> {}: record not embedded",
            a.id, b.id
        ))
    })?;
    let distance = 1.0 - similarity.clamp(0.0, 1.0);
    Ok(thresholds.classify(distance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::Classification;
    use crate::memory::weight::ImportanceConfig;
    use crate::testing::MockSimilarityPort;

    async fn embedded(content: &str, port: &MockSimilarityPort) -> Record {
        let mut record = Record::new(content, Classification::default(), &ImportanceConfig::default());
        record.compute_vector(port).await.unwrap();
        record
    }

    #[test]
    fn test_classify_boundaries() {
        let thresholds = RelationshipThresholds::default();
        assert_eq!(thresholds.classify(0.0), RelationshipKind::VeryClose);
        assert_eq!(thresholds.classify(0.19), RelationshipKind::VeryClose);
        assert_eq!(thresholds.classify(0.2), RelationshipKind::Related);
        assert_eq!(thresholds.classify(0.49), RelationshipKind::Related);
        assert_eq!(thresholds.classify(0.5), RelationshipKind::Distant);
        assert_eq!(thresholds.classify(1.0), RelationshipKind::Distant);
    }

    #[tokio::test]
    async fn test_determine_relationship_type_uses_port() {
        let port = MockSimilarityPort::new()
            .with_vector("sky", vec![1.0, 0.0])
            .with_vector("blue sky", vec![0.9, 0.1])
            .with_vector("ocean", vec![0.6, 0.8])
            .with_vector("cats", vec![0.0, 1.0]);
        let thresholds = RelationshipThresholds::default();

        let sky = embedded("sky", &port).await;
        let blue = embedded("blue sky", &port).await;
        let ocean = embedded("ocean", &port).await;
        let cats = embedded("cats", &port).await;

        assert_eq!(
            determine_relationship_type(&sky, &blue, &port, &thresholds).unwrap(),
            RelationshipKind::VeryClose
        );
        assert_eq!(
            determine_relationship_type(&sky, &ocean, &port, &thresholds).unwrap(),
            RelationshipKind::Related
        );
        assert_eq!(
            determine_relationship_type(&sky, &cats, &port, &thresholds).unwrap(),
            RelationshipKind::Distant
        );
    }

    #[tokio::test]
    async fn test_unembedded_record_is_an_error() {
        let port = MockSimilarityPort::new();
        let a = embedded("embedded", &port).await;
        let b = Record::new("raw", Classification::default(), &ImportanceConfig::default());

        let result = determine_relationship_type(&a, &b, &port, &RelationshipThresholds::default());
        assert!(matches!(result, Err(StrataError::EmbeddingUnavailable(_))));
    }
}
