//! Eviction policies for capacity-bounded tiers
//!
//! A policy picks exactly one victim from a tier's members when an insert
//! would exceed capacity. Ordering keys:
//! - `Lru`: oldest `created_at`, then earliest insertion
//! - `LeastImportant`: lowest importance, then oldest `created_at`, then
//!   earliest insertion

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot of the fields a policy needs to rank a tier member
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionCandidate {
    pub id: Uuid,
    /// Position in the tier's insertion order
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub importance: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Evict the member created longest ago
    #[default]
    Lru,
    /// Evict the member with the lowest importance
    LeastImportant,
}

impl EvictionPolicy {
    /// Choose the member to evict, `None` only when there are no candidates.
    pub fn select_victim(&self, candidates: &[EvictionCandidate]) -> Option<Uuid> {
        candidates
            .iter()
            .min_by(|a, b| self.compare(a, b))
            .map(|c| c.id)
    }

    /// `Less` means `a` is evicted before `b`.
    fn compare(&self, a: &EvictionCandidate, b: &EvictionCandidate) -> Ordering {
        let by_age = a
            .created_at
            .cmp(&b.created_at)
            .then_with(|| a.sequence.cmp(&b.sequence));
        match self {
            EvictionPolicy::Lru => by_age,
            EvictionPolicy::LeastImportant => a.importance.total_cmp(&b.importance).then(by_age),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionPolicy::Lru => write!(f, "lru"),
            EvictionPolicy::LeastImportant => write!(f, "least_important"),
        }
    }
}
