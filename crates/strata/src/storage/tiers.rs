//! Storage tiers for Strata
//!
//! A tier is a bounded or unbounded set of record ids with one eviction
//! policy. Records themselves live in the manager's `RecordArena`; a tier
//! only remembers which ids it holds and in what order they arrived.
//!
//! Each tier serializes its own mutations against its reads with a
//! `tokio::sync::RwLock`, so concurrent retrievals never see a torn member
//! set.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::embedding::SimilarityPort;
use crate::error::{Result, StrataError};
use crate::storage::arena::RecordArena;
use crate::storage::eviction::{EvictionCandidate, EvictionPolicy};

/// How records enter a tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    /// Every inserted record is placed in this tier
    #[default]
    Always,
    /// Only promotion and consolidation place records here
    PromotionOnly,
}

impl fmt::Display for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Admission::Always => write!(f, "always"),
            Admission::PromotionOnly => write!(f, "promotion_only"),
        }
    }
}

/// Configuration for a single tier
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TierConfig {
    /// Human readable, unique tier name
    pub name: String,
    /// Maximum number of members; `None` means unbounded
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Victim selection when the tier is full
    #[serde(default)]
    pub policy: EvictionPolicy,
    /// Whether plain inserts land here
    #[serde(default)]
    pub admission: Admission,
}

impl TierConfig {
    /// A capacity-bounded tier
    pub fn bounded(name: impl Into<String>, capacity: usize, policy: EvictionPolicy) -> Self {
        Self {
            name: name.into(),
            capacity: Some(capacity),
            policy,
            admission: Admission::Always,
        }
    }

    /// A tier that never evicts
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: None,
            policy: EvictionPolicy::LeastImportant,
            admission: Admission::Always,
        }
    }

    pub fn with_admission(mut self, admission: Admission) -> Self {
        self.admission = admission;
        self
    }
}

/// A scored tier member returned by `Tier::retrieve`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierHit {
    pub id: Uuid,
    pub score: f32,
}

#[derive(Debug, Default)]
struct Members {
    /// Record id -> insertion sequence
    entries: HashMap<Uuid, u64>,
    next_sequence: u64,
}

#[derive(Debug)]
pub struct Tier {
    config: TierConfig,
    members: RwLock<Members>,
}

impl Tier {
    pub fn new(config: TierConfig) -> Result<Self> {
        if config.capacity == Some(0) {
            return Err(StrataError::Config(format!(
                "tier {:?} must have a capacity of at least 1",
                config.name
            )));
        }
        Ok(Self {
            config,
            members: RwLock::new(Members::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    pub fn capacity(&self) -> Option<usize> {
        self.config.capacity
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.config.policy
    }

    pub fn admission(&self) -> Admission {
        self.config.admission
    }

    pub fn is_unbounded(&self) -> bool {
        self.config.capacity.is_none()
    }

    /// Add `id` to the tier, evicting one member first if the tier is full.
    ///
    /// Inserting an existing member is a no-op. Returns the evicted id.
    /// `id` and every current member must be present in `arena`.
    pub async fn insert(&self, id: Uuid, arena: &RecordArena) -> Result<Option<Uuid>> {
        if !arena.contains(&id) {
            return Err(StrataError::InvariantViolation(format!(
                "tier {:?} asked to hold {id}, which is not in the canonical set",
                self.config.name
            )));
        }

        let mut members = self.members.write().await;
        if members.entries.contains_key(&id) {
            return Ok(None);
        }

        let evicted = match self.config.capacity {
            Some(capacity) if members.entries.len() >= capacity => {
                self.evict_locked(&mut members, arena)?
            }
            _ => None,
        };

        let sequence = members.next_sequence;
        members.next_sequence += 1;
        members.entries.insert(id, sequence);

        Ok(evicted)
    }

    /// Evict one member chosen by the tier's policy.
    pub async fn evict(&self, arena: &RecordArena) -> Result<Option<Uuid>> {
        let mut members = self.members.write().await;
        self.evict_locked(&mut members, arena)
    }

    fn evict_locked(&self, members: &mut Members, arena: &RecordArena) -> Result<Option<Uuid>> {
        let candidates = members
            .entries
            .iter()
            .map(|(id, sequence)| {
                let record = arena.get(id).ok_or_else(|| {
                    StrataError::InvariantViolation(format!(
                        "tier {:?} holds {id}, which is not in the canonical set",
                        self.config.name
                    ))
                })?;
                Ok(EvictionCandidate {
                    id: *id,
                    sequence: *sequence,
                    created_at: record.created_at,
                    importance: record.importance,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let victim = self.config.policy.select_victim(&candidates);
        if let Some(victim) = victim {
            members.entries.remove(&victim);
            tracing::debug!(tier = %self.config.name, %victim, policy = %self.config.policy, "evicted record");
        }
        Ok(victim)
    }

    /// Remove `id`; absent ids are ignored. Returns whether it was a member.
    pub async fn remove(&self, id: &Uuid) -> bool {
        self.members.write().await.entries.remove(id).is_some()
    }

    pub async fn contains(&self, id: &Uuid) -> bool {
        self.members.read().await.entries.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.entries.is_empty()
    }

    /// Member ids in insertion order
    pub async fn member_ids(&self) -> Vec<Uuid> {
        let members = self.members.read().await;
        let mut entries: Vec<(Uuid, u64)> = members.entries.iter().map(|(id, seq)| (*id, *seq)).collect();
        entries.sort_by_key(|(_, seq)| *seq);
        entries.into_iter().map(|(id, _)| id).collect()
    }

    /// Score every embedded member against `query` and return the best
    /// `top_k`.
    ///
    /// Makes exactly one `similarity` call per embedded member. Ordering is
    /// score descending, then importance descending, then `created_at`
    /// ascending, then id.
    pub async fn retrieve(
        &self,
        query: &[f32],
        port: &dyn SimilarityPort,
        arena: &RecordArena,
        top_k: usize,
    ) -> Vec<TierHit> {
        if top_k == 0 {
            return Vec::new();
        }

        let members = self.members.read().await;
        let mut scored: Vec<(TierHit, f32, chrono::DateTime<chrono::Utc>)> = members
            .entries
            .keys()
            .filter_map(|id| arena.get(id))
            .filter_map(|record| {
                let vector = record.vector.as_deref()?;
                let score = port.similarity(query, vector);
                Some((
                    TierHit { id: record.id, score },
                    record.importance,
                    record.created_at,
                ))
            })
            .collect();
        drop(members);

        scored.sort_by(|(a, a_importance, a_created), (b, b_importance, b_created)| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b_importance.total_cmp(a_importance))
                .then_with(|| a_created.cmp(b_created))
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        scored.into_iter().map(|(hit, _, _)| hit).collect()
    }
}
