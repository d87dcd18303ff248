//! Importance calculation for records
//!
//! Importance starts at a base value (explicitly flagged or configured),
//! grows logarithmically with access count, and saturates at a ceiling.

use serde::Deserialize;

/// Configuration for the importance curve
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ImportanceConfig {
    /// Importance of a record nobody has flagged (default: 5.0)
    #[serde(default = "default_base")]
    pub base: f32,
    /// Hard upper bound for importance (default: 10.0)
    #[serde(default = "default_ceiling")]
    pub ceiling: f32,
}

impl Default for ImportanceConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            ceiling: default_ceiling(),
        }
    }
}

impl ImportanceConfig {
    pub fn new(base: f32, ceiling: f32) -> Self {
        Self { base, ceiling }
    }
}

fn default_base() -> f32 {
    5.0
}

fn default_ceiling() -> f32 {
    10.0
}

/// Calculate importance for a record
///
/// Formula: min(ceiling, base + boost + ln(access_count + 1))
///
/// - `base` is the explicit importance flag or the configured default
/// - `boost` is the one-time promotion bonus
/// - the access term gives diminishing returns for repeated hits
pub fn calculate_importance(access_count: u32, base: f32, boost: f32, config: &ImportanceConfig) -> f32 {
    let access_factor = (access_count as f32 + 1.0).ln();
    (base + boost + access_factor).min(config.ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importance_config_default() {
        let config = ImportanceConfig::default();
        assert_eq!(config.base, 5.0);
        assert_eq!(config.ceiling, 10.0);
    }

    #[test]
    fn test_importance_starts_at_base() {
        let config = ImportanceConfig::default();
        assert_eq!(calculate_importance(0, 5.0, 0.0, &config), 5.0);
        assert_eq!(calculate_importance(0, 3.0, 0.0, &config), 3.0);
    }

    #[test]
    fn test_importance_is_monotone_in_access_count() {
        let config = ImportanceConfig::default();
        let mut previous = calculate_importance(0, 5.0, 0.0, &config);
        for count in 1..200 {
            let current = calculate_importance(count, 5.0, 0.0, &config);
            assert!(current >= previous, "count={count}");
            previous = current;
        }
    }

    #[test]
    fn test_importance_saturates_at_ceiling() {
        let config = ImportanceConfig::new(5.0, 8.0);
        assert_eq!(calculate_importance(u32::MAX, 5.0, 0.0, &config), 8.0);
        assert_eq!(calculate_importance(0, 5.0, 10.0, &config), 8.0);
    }

    #[test]
    fn test_boost_adds_to_curve() {
        let config = ImportanceConfig::default();
        let plain = calculate_importance(3, 5.0, 0.0, &config);
        let boosted = calculate_importance(3, 5.0, 2.0, &config);
        assert!((boosted - plain - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_importance_config_from_toml() {
        let config: ImportanceConfig = toml::from_str("ceiling = 12.0").unwrap();
        assert_eq!(config.base, 5.0);
        assert_eq!(config.ceiling, 12.0);
    }
}
