//! Redundancy tracking and provenance
//!
//! The `RedundancyTracker` keeps a generation entry for every live record:
//! how it was created, which records it descends from, how many near
//! duplicates it currently has, and its recent retrieval hits. It also picks
//! the clusters a compression pass should merge.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedding::SimilarityPort;
use crate::memory::types::Record;
use crate::storage::arena::RecordArena;

/// Maximum retrieval hits remembered per record
pub const ACCESS_HISTORY_LIMIT: usize = 64;

/// Similarity thresholds for redundancy and neighbor search
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RedundancyConfig {
    /// Similarity at or above which two records are redundant (default: 0.85)
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Default cut-off for `find_similar` (default: 0.7)
    #[serde(default = "default_similar_threshold")]
    pub similar_threshold: f32,
}

impl Default for RedundancyConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            similar_threshold: default_similar_threshold(),
        }
    }
}

fn default_threshold() -> f32 {
    0.85
}

fn default_similar_threshold() -> f32 {
    0.7
}

/// One retrieval hit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub at: DateTime<Utc>,
    /// The record's access count after this hit
    pub access_count: u32,
}

/// Provenance of a tracked record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationEntry {
    pub created_at: DateTime<Utc>,
    /// Operation that produced the record, e.g. "insert" or "consolidation"
    pub source_operation: String,
    pub parents: Vec<Uuid>,
    /// Ancestor ids in order, ending with the record's own id
    pub lineage: Vec<Uuid>,
    /// Number of near duplicates found by the latest detection
    pub redundancy_score: usize,
    pub access_history: Vec<AccessEvent>,
}

/// A near duplicate found by `detect_redundancy`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedundantMatch {
    pub id: Uuid,
    pub similarity: f32,
}

/// A group of mutually redundant records selected for merging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    /// The oldest record; every other member is redundant with it
    pub base: Uuid,
    /// All members, base first
    pub members: Vec<Uuid>,
}

#[derive(Debug, Default)]
pub struct RedundancyTracker {
    generations: HashMap<Uuid, GenerationEntry>,
}

impl RedundancyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `record` the first time it is seen.
    ///
    /// The lineage is every parent's lineage in order (an untracked parent
    /// contributes just its own id) followed by the record's id. Tracking an
    /// id twice keeps the first entry.
    pub fn track_generation(&mut self, record: &Record, source_operation: &str, parents: &[Uuid]) {
        if self.generations.contains_key(&record.id) {
            return;
        }

        let mut lineage = Vec::new();
        for parent in parents {
            match self.generations.get(parent) {
                Some(entry) => lineage.extend(entry.lineage.iter().copied()),
                None => lineage.push(*parent),
            }
        }
        lineage.push(record.id);

        self.generations.insert(
            record.id,
            GenerationEntry {
                created_at: record.created_at,
                source_operation: source_operation.to_string(),
                parents: parents.to_vec(),
                lineage,
                redundancy_score: 0,
                access_history: Vec::new(),
            },
        );
    }

    /// Find every other tracked record at least `threshold` similar to `id`,
    /// best first, and store the match count as its redundancy score.
    pub fn detect_redundancy(
        &mut self,
        id: &Uuid,
        arena: &RecordArena,
        port: &dyn SimilarityPort,
        threshold: f32,
    ) -> Vec<RedundantMatch> {
        let Some(record) = arena.get(id) else {
            return Vec::new();
        };

        let mut matches: Vec<RedundantMatch> = self
            .generations
            .keys()
            .filter(|other| *other != id)
            .filter_map(|other| arena.get(other))
            .filter_map(|other| {
                let similarity = record.similarity_to(other, port)?;
                (similarity >= threshold).then_some(RedundantMatch {
                    id: other.id,
                    similarity,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then_with(|| a.id.cmp(&b.id)));

        if let Some(entry) = self.generations.get_mut(id) {
            entry.redundancy_score = matches.len();
        }
        matches
    }

    /// Re-run detection for every tracked record, in id order, and return
    /// how many have at least one near duplicate.
    pub fn refresh_redundancy(
        &mut self,
        arena: &RecordArena,
        port: &dyn SimilarityPort,
        threshold: f32,
    ) -> usize {
        let mut ids: Vec<Uuid> = self.generations.keys().copied().collect();
        ids.sort();
        for id in &ids {
            self.detect_redundancy(id, arena, port, threshold);
        }
        self.redundant_count()
    }

    /// Count tracked records with at least one tracked near duplicate,
    /// computed from the current arena without touching stored scores.
    pub fn count_redundant(
        &self,
        arena: &RecordArena,
        port: &dyn SimilarityPort,
        threshold: f32,
    ) -> usize {
        let tracked: Vec<&Record> = self
            .generations
            .keys()
            .filter_map(|id| arena.get(id))
            .collect();

        tracked
            .iter()
            .filter(|record| {
                tracked.iter().any(|other| {
                    other.id != record.id
                        && record
                            .similarity_to(other, port)
                            .is_some_and(|similarity| similarity >= threshold)
                })
            })
            .count()
    }

    /// Group redundant records into merge clusters.
    ///
    /// Tracked records are visited oldest first. Each record not yet in a
    /// cluster becomes a base and claims every other unassigned record at
    /// least `threshold` similar to it. Records appear in at most one
    /// cluster; bases with no matches form no cluster.
    pub fn select_compression_candidates(
        &self,
        arena: &RecordArena,
        port: &dyn SimilarityPort,
        threshold: f32,
    ) -> Vec<Cluster> {
        let ordered: Vec<&Record> = arena
            .oldest_first()
            .into_iter()
            .filter(|record| self.generations.contains_key(&record.id) && record.is_embedded())
            .collect();

        let mut assigned: HashSet<Uuid> = HashSet::new();
        let mut clusters = Vec::new();

        for (position, base) in ordered.iter().enumerate() {
            if assigned.contains(&base.id) {
                continue;
            }

            let mut members = vec![base.id];
            for candidate in &ordered[position + 1..] {
                if assigned.contains(&candidate.id) {
                    continue;
                }
                if base
                    .similarity_to(candidate, port)
                    .is_some_and(|similarity| similarity >= threshold)
                {
                    members.push(candidate.id);
                }
            }

            if members.len() > 1 {
                assigned.extend(members.iter().copied());
                clusters.push(Cluster {
                    base: base.id,
                    members,
                });
            }
        }

        clusters
    }

    /// Append a retrieval hit to the record's history.
    pub fn record_access(&mut self, id: &Uuid, access_count: u32) {
        if let Some(entry) = self.generations.get_mut(id) {
            if entry.access_history.len() >= ACCESS_HISTORY_LIMIT {
                entry.access_history.remove(0);
            }
            entry.access_history.push(AccessEvent {
                at: Utc::now(),
                access_count,
            });
        }
    }

    /// Drop the entry for `id`. Lineages of descendants keep the id.
    pub fn forget(&mut self, id: &Uuid) -> Option<GenerationEntry> {
        self.generations.remove(id)
    }

    pub fn entry(&self, id: &Uuid) -> Option<&GenerationEntry> {
        self.generations.get(id)
    }

    pub fn is_tracked(&self, id: &Uuid) -> bool {
        self.generations.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &Uuid> {
        self.generations.keys()
    }

    /// Records whose latest detection found at least one near duplicate
    pub fn redundant_count(&self) -> usize {
        self.generations
            .values()
            .filter(|entry| entry.redundancy_score > 0)
            .count()
    }
}
