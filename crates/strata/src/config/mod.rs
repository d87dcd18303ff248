use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, StrataError};
use crate::memory::relationship::RelationshipThresholds;
use crate::memory::tracker::RedundancyConfig;
use crate::memory::weight::ImportanceConfig;
use crate::storage::compaction::CompressionConfig;
use crate::storage::eviction::EvictionPolicy;
use crate::storage::tiers::{Admission, TierConfig};

/// Main configuration structure for Strata
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Tiers in lock and report order
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierConfig>,
    /// Importance curve
    #[serde(default)]
    pub importance: ImportanceConfig,
    /// Promotion sweep thresholds
    #[serde(default)]
    pub promotion: PromotionConfig,
    /// Redundancy and neighbor-search thresholds
    #[serde(default)]
    pub redundancy: RedundancyConfig,
    /// Merge strategy for compression passes
    #[serde(default)]
    pub compression: CompressionConfig,
    /// Relationship distance cut-offs
    #[serde(default)]
    pub relationships: RelationshipThresholds,
    /// Similarity port selection
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Housekeeping
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            importance: ImportanceConfig::default(),
            promotion: PromotionConfig::default(),
            redundancy: RedundancyConfig::default(),
            compression: CompressionConfig::default(),
            relationships: RelationshipThresholds::default(),
            embedding: EmbeddingConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig::bounded("Volatile Short-Term", 10, EvictionPolicy::Lru),
        TierConfig::unbounded("Persistent Long-Term"),
        TierConfig::bounded("Context/Working Memory", 5, EvictionPolicy::LeastImportant),
    ]
}

/// Promotion sweep configuration
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PromotionConfig {
    /// Accesses needed before the boost applies (default: 3)
    #[serde(default = "default_access_threshold")]
    pub access_threshold: u32,
    /// One-time importance bonus (default: 2.0)
    #[serde(default = "default_boost")]
    pub boost: f32,
    /// Importance at which a record joins every unbounded tier (default: 8.0)
    #[serde(default = "default_importance_ceiling")]
    pub importance_ceiling: f32,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            access_threshold: default_access_threshold(),
            boost: default_boost(),
            importance_ceiling: default_importance_ceiling(),
        }
    }
}

fn default_access_threshold() -> u32 {
    3
}

fn default_boost() -> f32 {
    2.0
}

fn default_importance_ceiling() -> f32 {
    8.0
}

/// Which similarity port backs the manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Hashed bag-of-words, no model download
    #[default]
    Terms,
    /// Local e5-small model, needs the `fastembed` feature
    Fastembed,
}

/// Similarity port configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,
    /// Upper bound on a single vectorization (default: 10)
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    /// Vector size for the `terms` provider (default: 512)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            timeout_secs: default_embedding_timeout_secs(),
            dimension: default_embedding_dimension(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_embedding_timeout_secs() -> u64 {
    10
}

fn default_embedding_dimension() -> usize {
    crate::embedding::TERM_VECTOR_DIMENSION
}

/// Housekeeping configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    /// Never-accessed records older than this are pruned (default: 30)
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            stale_after_days: default_stale_after_days(),
        }
    }
}

fn default_stale_after_days() -> i64 {
    30
}

impl Config {
    /// Load configuration from `path`, or from the first default location
    /// that exists, falling back to defaults. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                tracing::info!("Loading config from: {}", path.display());
                Self::from_file(path)?
            }
            None => match Self::default_paths().into_iter().find(|p| p.exists()) {
                Some(found) => {
                    tracing::info!("Loading config from: {}", found.display());
                    Self::from_file(&found)?
                }
                None => {
                    tracing::info!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Candidate config files in search order
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::home_dir().map(|h| h.join(".strata").join("config.toml")),
            dirs::config_dir().map(|c| c.join("strata").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StrataError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| StrataError::Config(format!("Failed to parse config: {e}")))
    }

    /// Reject configurations the manager cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tiers.is_empty() {
            return Err(StrataError::Config("at least one tier is required".to_string()));
        }

        let mut names = HashSet::new();
        for tier in &self.tiers {
            if tier.name.trim().is_empty() {
                return Err(StrataError::Config("tier names must not be empty".to_string()));
            }
            if !names.insert(tier.name.as_str()) {
                return Err(StrataError::Config(format!("duplicate tier name {:?}", tier.name)));
            }
            if tier.capacity == Some(0) {
                return Err(StrataError::Config(format!(
                    "tier {:?} must have a capacity of at least 1",
                    tier.name
                )));
            }
            if tier.admission == Admission::PromotionOnly && tier.capacity.is_some() {
                return Err(StrataError::Config(format!(
                    "promotion-only tier {:?} must be unbounded",
                    tier.name
                )));
            }
        }

        if !self.tiers.iter().any(|t| t.admission == Admission::Always) {
            return Err(StrataError::Config(
                "at least one tier must admit every insert".to_string(),
            ));
        }

        check_unit_interval("redundancy.threshold", self.redundancy.threshold)?;
        check_unit_interval("redundancy.similar_threshold", self.redundancy.similar_threshold)?;
        check_unit_interval("relationships.very_close", self.relationships.very_close)?;
        check_unit_interval("relationships.related", self.relationships.related)?;
        if self.relationships.very_close > self.relationships.related {
            return Err(StrataError::Config(
                "relationships.very_close must not exceed relationships.related".to_string(),
            ));
        }

        if !self.importance.base.is_finite()
            || !self.importance.ceiling.is_finite()
            || self.importance.base > self.importance.ceiling
        {
            return Err(StrataError::Config(
                "importance.base must be finite and not exceed importance.ceiling".to_string(),
            ));
        }
        if !self.promotion.boost.is_finite() || self.promotion.boost < 0.0 {
            return Err(StrataError::Config(
                "promotion.boost must be a non-negative number".to_string(),
            ));
        }
        if self.compression.max_terms == 0 {
            return Err(StrataError::Config(
                "compression.max_terms must be at least 1".to_string(),
            ));
        }
        if self.embedding.timeout_secs == 0 {
            return Err(StrataError::Config(
                "embedding.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.maintenance.stale_after_days < 0 {
            return Err(StrataError::Config(
                "maintenance.stale_after_days must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_unit_interval(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(StrataError::Config(format!("{name} must be within [0, 1], got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::compaction::MergeStrategyKind;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.tiers.len(), 3);
        assert_eq!(config.tiers[0].name, "Volatile Short-Term");
        assert_eq!(config.tiers[0].capacity, Some(10));
        assert_eq!(config.tiers[0].policy, EvictionPolicy::Lru);
        assert_eq!(config.tiers[1].capacity, None);
        assert_eq!(config.tiers[2].capacity, Some(5));
        assert_eq!(config.importance.base, 5.0);
        assert_eq!(config.importance.ceiling, 10.0);
        assert_eq!(config.promotion.access_threshold, 3);
        assert_eq!(config.promotion.boost, 2.0);
        assert_eq!(config.promotion.importance_ceiling, 8.0);
        assert_eq!(config.redundancy.threshold, 0.85);
        assert_eq!(config.redundancy.similar_threshold, 0.7);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Terms);
        assert_eq!(config.embedding.timeout(), Duration::from_secs(10));
        assert_eq!(config.maintenance.stale_after_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[[tiers]]
name = "Working"
capacity = 2
policy = "least_important"

[[tiers]]
name = "Archive"
admission = "promotion_only"

[promotion]
access_threshold = 5
boost = 1.5

[redundancy]
threshold = 0.9

[compression]
strategy = "keywords"
max_terms = 12

[embedding]
provider = "terms"
timeout_secs = 3
dimension = 128

[maintenance]
stale_after_days = 7
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse TOML");

        assert_eq!(config.tiers.len(), 2);
        assert_eq!(config.tiers[0].policy, EvictionPolicy::LeastImportant);
        assert_eq!(config.tiers[1].capacity, None);
        assert_eq!(config.tiers[1].admission, Admission::PromotionOnly);
        assert_eq!(config.promotion.access_threshold, 5);
        assert_eq!(config.promotion.boost, 1.5);
        assert_eq!(config.promotion.importance_ceiling, 8.0);
        assert_eq!(config.redundancy.threshold, 0.9);
        assert_eq!(config.redundancy.similar_threshold, 0.7);
        assert_eq!(config.compression.strategy, MergeStrategyKind::Keywords);
        assert_eq!(config.compression.max_terms, 12);
        assert_eq!(config.embedding.timeout_secs, 3);
        assert_eq!(config.embedding.dimension, 128);
        assert_eq!(config.maintenance.stale_after_days, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let config: Config =
            toml::from_str("[importance]\nbase = 4.0\n").expect("Failed to parse partial TOML");
        assert_eq!(config.importance.base, 4.0);
        assert_eq!(config.importance.ceiling, 10.0);
        assert_eq!(config.tiers.len(), 3);
    }

    mod validation {
        use super::*;

        #[test]
        fn test_rejects_empty_tiers() {
            let config = Config {
                tiers: Vec::new(),
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(StrataError::Config(_))));
        }

        #[test]
        fn test_rejects_zero_capacity() {
            let config = Config {
                tiers: vec![TierConfig::bounded("short", 0, EvictionPolicy::Lru)],
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(StrataError::Config(_))));
        }

        #[test]
        fn test_rejects_duplicate_names() {
            let config = Config {
                tiers: vec![TierConfig::unbounded("same"), TierConfig::unbounded("same")],
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(StrataError::Config(_))));
        }

        #[test]
        fn test_rejects_out_of_range_threshold() {
            let mut config = Config::default();
            config.redundancy.threshold = 1.5;
            assert!(matches!(config.validate(), Err(StrataError::Config(_))));
        }

        #[test]
        fn test_rejects_bounded_promotion_only_tier() {
            let config = Config {
                tiers: vec![
                    TierConfig::unbounded("long"),
                    TierConfig::bounded("hot", 3, EvictionPolicy::Lru)
                        .with_admission(Admission::PromotionOnly),
                ],
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(StrataError::Config(_))));
        }

        #[test]
        fn test_rejects_no_admitting_tier() {
            let config = Config {
                tiers: vec![TierConfig::unbounded("archive").with_admission(Admission::PromotionOnly)],
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(StrataError::Config(_))));
        }
    }

    mod loading {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn test_load_from_explicit_path() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("config.toml");
            std::fs::write(&path, "[redundancy]\nthreshold = 0.95\n").unwrap();

            let config = Config::load(Some(&path)).unwrap();
            assert_eq!(config.redundancy.threshold, 0.95);
        }

        #[test]
        fn test_load_missing_file_is_config_error() {
            let dir = TempDir::new().unwrap();
            let result = Config::load(Some(&dir.path().join("missing.toml")));
            assert!(matches!(result, Err(StrataError::Config(_))));
        }

        #[test]
        fn test_load_invalid_file_fails_validation() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("config.toml");
            std::fs::write(&path, "tiers = []\n").unwrap();

            assert!(matches!(Config::load(Some(&path)), Err(StrataError::Config(_))));
        }
    }
}
