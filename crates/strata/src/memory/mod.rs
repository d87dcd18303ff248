//! Record model and the manager that coordinates tiers
//!
//! Defines the record types, the importance curve, relationship
//! classification, redundancy tracking and the `MemoryManager` itself.

pub mod manager;
pub mod relationship;
pub mod retrieval;
pub mod tracker;
pub mod types;
pub mod weight;

pub use manager::{
    MemoryManager, Placement, PromotionReport, RelatedRecord, SimilarRecord, TierStats,
};
pub use relationship::{RelationshipThresholds, determine_relationship_type};
pub use retrieval::RetrievedRecord;
pub use tracker::{Cluster, GenerationEntry, RedundancyConfig, RedundancyTracker};
pub use types::{Classification, Record, RecordKind, Relationship, RelationshipKind};
pub use weight::{ImportanceConfig, calculate_importance};
