//! Record types for the Strata system
//!
//! Defines the `Record` (the atomic unit of memory), the `Classification`
//! callers attach at insert time, and the relationship edge types.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedding::SimilarityPort;
use crate::error::{Result, StrataError};
use crate::memory::relationship::{RelationshipThresholds, determine_relationship_type};
use crate::memory::weight::{ImportanceConfig, calculate_importance};

/// A single memory record.
///
/// The manager's arena owns every `Record`; tiers refer to it by `id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier, never reused
    pub id: Uuid,
    /// The payload. Edits create a new record instead of mutating this one.
    pub content: String,
    /// Classification tag
    pub kind: RecordKind,
    /// Factual (1.0) to imaginative (0.0) gradient
    pub factuality: f32,
    /// Reliability of the factuality score
    pub confidence: f32,
    /// Eviction and promotion ordering score
    pub importance: f32,
    /// Explicit importance the access curve starts from
    pub base_importance: f32,
    /// Bonus granted once by promotion
    pub promotion_boost: f32,
    /// How many retrieval hits this record has had
    pub access_count: u32,
    /// When this record was created
    pub created_at: DateTime<Utc>,
    /// Last retrieval hit, if any
    pub last_accessed: Option<DateTime<Utc>>,
    /// Cached embedding, `None` until `compute_vector` succeeds
    pub vector: Option<Vec<f32>>,
    /// Non-owning edges to other records; targets may no longer exist
    pub relationships: BTreeMap<Uuid, Relationship>,
    /// Free-form labels
    pub tags: BTreeSet<String>,
    /// Where the content came from
    pub source: Option<String>,
}

impl Record {
    /// Create an un-embedded record from content and its classification.
    pub fn new(
        content: impl Into<String>,
        classification: Classification,
        importance: &ImportanceConfig,
    ) -> Self {
        let base_importance = classification.importance.unwrap_or(importance.base);
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            kind: classification.kind,
            factuality: classification.factuality.clamp(0.0, 1.0),
            confidence: classification.confidence.clamp(0.0, 1.0),
            importance: calculate_importance(0, base_importance, 0.0, importance),
            base_importance,
            promotion_boost: 0.0,
            access_count: 0,
            created_at: Utc::now(),
            last_accessed: None,
            vector: None,
            relationships: BTreeMap::new(),
            tags: classification.tags,
            source: classification.source,
        }
    }

    /// Whether the record has a vector and can take part in similarity search
    pub fn is_embedded(&self) -> bool {
        self.vector.is_some()
    }

    /// Obtain and cache this record's vector.
    ///
    /// A record that is already embedded keeps its vector; content is
    /// immutable so the vector cannot go stale.
    pub async fn compute_vector(&mut self, port: &dyn SimilarityPort) -> Result<()> {
        if self.vector.is_some() {
            return Ok(());
        }
        let vector = port.vectorize(&self.content).await?;
        if vector.is_empty() {
            return Err(StrataError::EmbeddingUnavailable(
                "similarity port returned an empty vector".to_string(),
            ));
        }
        self.vector = Some(vector);
        Ok(())
    }

    /// Similarity between this record and another, both must be embedded.
    pub fn similarity_to(&self, other: &Record, port: &dyn SimilarityPort) -> Option<f32> {
        match (&self.vector, &other.vector) {
            (Some(a), Some(b)) => Some(port.similarity(a, b)),
            _ => None,
        }
    }

    /// Add or replace an edge to `other`, classifying it by semantic distance.
    pub fn add_relationship(
        &mut self,
        other: &Record,
        weight: f32,
        port: &dyn SimilarityPort,
        thresholds: &RelationshipThresholds,
    ) -> Result<RelationshipKind> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(StrataError::InvalidInput(format!(
                "relationship weight must be positive and finite, got {weight}"
            )));
        }
        if other.id == self.id {
            return Err(StrataError::InvalidInput(
                "a record cannot relate to itself".to_string(),
            ));
        }

        let kind = determine_relationship_type(self, other, port, thresholds)?;
        self.relationships
            .insert(other.id, Relationship { weight, kind });
        Ok(kind)
    }

    /// Register a retrieval hit and recompute importance.
    pub fn record_access(&mut self, config: &ImportanceConfig) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = Some(Utc::now());
        self.refresh_importance(config);
    }

    /// Recompute importance without lowering it.
    ///
    /// Importance only moves up through this path so promotion stays
    /// monotone even if the curve's base was lowered by reconfiguration.
    pub fn refresh_importance(&mut self, config: &ImportanceConfig) {
        let computed = calculate_importance(
            self.access_count,
            self.base_importance,
            self.promotion_boost,
            config,
        );
        self.importance = self.importance.max(computed).min(config.ceiling);
    }
}

/// Classification a caller attaches to content at insert time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: RecordKind,
    pub factuality: f32,
    pub confidence: f32,
    pub tags: BTreeSet<String>,
    pub source: Option<String>,
    /// Explicit importance flag; the configured base is used when unset
    pub importance: Option<f32>,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            kind: RecordKind::Text,
            factuality: 0.5,
            confidence: 0.5,
            tags: BTreeSet::new(),
            source: None,
            importance: None,
        }
    }
}

impl Classification {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn with_factuality(mut self, factuality: f32) -> Self {
        self.factuality = factuality.clamp(0.0, 1.0);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }
}

/// Classification tag for a record's payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Free text
    Text,
    /// Numbers and measurements
    Numerical,
    /// Pointer to an external resource
    Reference,
    /// JSON, tables and other structured data
    Structured,
    /// Abstract idea or principle
    Concept,
    /// Anything else
    Custom(String),
}

impl From<&str> for RecordKind {
    fn from(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "text" => RecordKind::Text,
            "numerical" => RecordKind::Numerical,
            "reference" => RecordKind::Reference,
            "structured" => RecordKind::Structured,
            "concept" => RecordKind::Concept,
            _ => RecordKind::Custom(tag.to_string()),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Text => write!(f, "text"),
            RecordKind::Numerical => write!(f, "numerical"),
            RecordKind::Reference => write!(f, "reference"),
            RecordKind::Structured => write!(f, "structured"),
            RecordKind::Concept => write!(f, "concept"),
            RecordKind::Custom(tag) => write!(f, "{tag}"),
        }
    }
}

/// Edge metadata cached on the source record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub weight: f32,
    pub kind: RelationshipKind,
}

/// Closeness class of a relationship edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    VeryClose,
    Related,
    Distant,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSimilarityPort;

    fn create_test_record(content: &str) -> Record {
        Record::new(content, Classification::default(), &ImportanceConfig::default())
    }

    #[test]
    fn test_record_new_defaults() {
        let record = create_test_record("The sky is blue.");

        assert_eq!(record.access_count, 0);
        assert_eq!(record.kind, RecordKind::Text);
        assert_eq!(record.factuality, 0.5);
        assert_eq!(record.confidence, 0.5);
        assert_eq!(record.importance, 5.0);
        assert!(record.vector.is_none());
        assert!(record.last_accessed.is_none());
        assert!(record.relationships.is_empty());
    }

    #[test]
    fn test_classification_builder_clamps() {
        let classification = Classification::new(RecordKind::Concept)
            .with_factuality(1.4)
            .with_confidence(-0.2)
            .with_tag("ethics")
            .with_source("notes")
            .with_importance(7.0);

        assert_eq!(classification.factuality, 1.0);
        assert_eq!(classification.confidence, 0.0);
        assert!(classification.tags.contains("ethics"));
        assert_eq!(classification.source.as_deref(), Some("notes"));

        let record = Record::new("AI ethics", classification, &ImportanceConfig::default());
        assert_eq!(record.base_importance, 7.0);
        assert_eq!(record.importance, 7.0);
    }

    #[test]
    fn test_record_access_has_diminishing_returns() {
        let config = ImportanceConfig::default();
        let mut record = create_test_record("Water is essential for life.");

        record.record_access(&config);
        let first_gain = record.importance - 5.0;
        let before = record.importance;
        record.record_access(&config);
        let second_gain = record.importance - before;

        assert_eq!(record.access_count, 2);
        assert!(record.last_accessed.is_some());
        assert!(first_gain > second_gain);
    }

    #[test]
    fn test_record_access_never_exceeds_ceiling() {
        let config = ImportanceConfig::default();
        let mut record = create_test_record("Humans are mammals.");

        for _ in 0..10_000 {
            record.record_access(&config);
        }

        assert!(record.importance <= config.ceiling);
    }

    #[test]
    fn test_record_kind_from_str() {
        assert_eq!(RecordKind::from("Text"), RecordKind::Text);
        assert_eq!(RecordKind::from("numerical"), RecordKind::Numerical);
        assert_eq!(RecordKind::from("reference"), RecordKind::Reference);
        assert_eq!(
            RecordKind::from("research"),
            RecordKind::Custom("research".to_string())
        );
        assert_eq!(RecordKind::from("research").to_string(), "research");
    }

    #[test]
    fn test_record_serialization() {
        let record = create_test_record("The capital of France is Paris");

        let json = serde_json::to_string(&record).expect("Failed to serialize record");
        let deserialized: Record =
            serde_json::from_str(&json).expect("Failed to deserialize record");

        assert_eq!(record.id, deserialized.id);
        assert_eq!(record.content, deserialized.content);
        assert_eq!(record.kind, deserialized.kind);
    }

    #[tokio::test]
    async fn test_compute_vector_caches_embedding() {
        let port = MockSimilarityPort::new();
        let mut record = create_test_record("Dogs descend from wolves.");

        record.compute_vector(&port).await.unwrap();
        let first = record.vector.clone();
        record.compute_vector(&port).await.unwrap();

        assert!(record.is_embedded());
        assert_eq!(first, record.vector);
        assert_eq!(port.vectorize_calls(), 1);
    }

    #[tokio::test]
    async fn test_compute_vector_failure_leaves_record_unembedded() {
        let port = MockSimilarityPort::new().fail_on("Cats can fly.");
        let mut record = create_test_record("Cats can fly.");

        let result = record.compute_vector(&port).await;

        assert!(matches!(result, Err(StrataError::EmbeddingUnavailable(_))));
        assert!(!record.is_embedded());
    }

    #[tokio::test]
    async fn test_add_relationship_rejects_bad_weights() {
        let port = MockSimilarityPort::new();
        let thresholds = RelationshipThresholds::default();
        let mut a = create_test_record("The sky is blue.");
        let mut b = create_test_record("The Earth revolves around the Sun.");
        a.compute_vector(&port).await.unwrap();
        b.compute_vector(&port).await.unwrap();

        for weight in [0.0, -1.0, f32::INFINITY, f32::NAN] {
            let result = a.add_relationship(&b, weight, &port, &thresholds);
            assert!(matches!(result, Err(StrataError::InvalidInput(_))));
        }
        assert!(a.relationships.is_empty());
    }

    #[tokio::test]
    async fn test_add_relationship_overwrites_existing_edge() {
        let port = MockSimilarityPort::new()
            .with_vector("a", vec![1.0, 0.0])
            .with_vector("b", vec![1.0, 0.0]);
        let thresholds = RelationshipThresholds::default();
        let mut a = create_test_record("a");
        let mut b = create_test_record("b");
        a.compute_vector(&port).await.unwrap();
        b.compute_vector(&port).await.unwrap();

        a.add_relationship(&b, 1.0, &port, &thresholds).unwrap();
        let kind = a.add_relationship(&b, 3.5, &port, &thresholds).unwrap();

        assert_eq!(kind, RelationshipKind::VeryClose);
        assert_eq!(a.relationships.len(), 1);
        assert_eq!(a.relationships[&b.id].weight, 3.5);
    }
}
