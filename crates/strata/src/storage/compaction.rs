//! Consolidation of redundant records
//!
//! The `CompressionEngine` turns a cluster of near-duplicate records into a
//! single `MergedDraft`. The manager embeds the draft, commits it as a new
//! record and retires the originals; this module only builds drafts and the
//! pass/report types.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedding::terms;
use crate::error::{Result, StrataError};
use crate::memory::tracker::Cluster;
use crate::memory::types::{Record, RecordKind, Relationship};
use crate::storage::arena::RecordArena;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "this", "that", "these",
    "those", "it", "its", "they", "them", "their", "we", "you", "your", "our", "i", "me", "my",
    "he", "she", "his", "her", "not", "no", "yes", "what", "which", "who", "when", "where", "why",
    "how", "all", "each", "every", "both", "few", "more", "most", "other", "some", "such", "than",
    "too", "very", "just", "also", "only", "then", "there", "here", "now", "about", "into",
    "over", "after", "before", "between", "under", "again", "further", "once", "during", "can",
];

/// Which summary a merge produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategyKind {
    #[default]
    TermUnion,
    Keywords,
}

/// Configuration for the compression engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompressionConfig {
    /// Summary style (default: term_union)
    #[serde(default)]
    pub strategy: MergeStrategyKind,
    /// Maximum terms kept in the merged content (default: 20)
    #[serde(default = "default_max_terms")]
    pub max_terms: usize,
    /// Shortest word `keywords` keeps (default: 4)
    #[serde(default = "default_min_word_length")]
    pub min_word_length: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            strategy: MergeStrategyKind::default(),
            max_terms: default_max_terms(),
            min_word_length: default_min_word_length(),
        }
    }
}

fn default_max_terms() -> usize {
    20
}

fn default_min_word_length() -> usize {
    4
}

impl CompressionConfig {
    pub fn merge_strategy(&self) -> MergeStrategy {
        match self.strategy {
            MergeStrategyKind::TermUnion => MergeStrategy::TermUnion {
                max_terms: self.max_terms,
            },
            MergeStrategyKind::Keywords => MergeStrategy::Keywords {
                max_terms: self.max_terms,
                min_word_length: self.min_word_length,
            },
        }
    }
}

/// How merged content is summarized from the members' contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Unique lowercase terms in first-seen order
    TermUnion { max_terms: usize },
    /// Unique lowercase terms minus stop words and short words
    Keywords {
        max_terms: usize,
        min_word_length: usize,
    },
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::TermUnion {
            max_terms: default_max_terms(),
        }
    }
}

impl MergeStrategy {
    /// Summarize `contents`, which must already be in canonical order.
    pub fn summarize<'a>(&self, contents: impl IntoIterator<Item = &'a str>) -> String {
        let mut seen = HashSet::new();
        let words = contents.into_iter().flat_map(terms);

        match *self {
            MergeStrategy::TermUnion { max_terms } => words
                .filter(|word| seen.insert(word.clone()))
                .take(max_terms)
                .collect::<Vec<_>>()
                .join(" "),
            MergeStrategy::Keywords {
                max_terms,
                min_word_length,
            } => words
                .filter(|word| {
                    word.chars().count() >= min_word_length
                        && !STOP_WORDS.contains(&word.as_str())
                        && seen.insert(word.clone())
                })
                .take(max_terms)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// A consolidated record waiting to be embedded and committed
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDraft {
    pub content: String,
    pub kind: RecordKind,
    pub factuality: f32,
    pub confidence: f32,
    pub base_importance: f32,
    pub tags: BTreeSet<String>,
    pub source: Option<String>,
    /// Edges to records outside the cluster
    pub relationships: BTreeMap<Uuid, Relationship>,
    /// Cluster members in `(created_at, id)` order
    pub parents: Vec<Uuid>,
}

/// Builds merged drafts from clusters
#[derive(Debug, Clone, Default)]
pub struct CompressionEngine {
    strategy: MergeStrategy,
}

impl CompressionEngine {
    pub fn new(strategy: MergeStrategy) -> Self {
        Self { strategy }
    }

    pub fn from_config(config: &CompressionConfig) -> Self {
        Self::new(config.merge_strategy())
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Merge every member of `cluster` into one draft.
    ///
    /// Fails with `Compression` if a member is missing from `arena` or the
    /// summary comes out empty.
    pub fn merge_cluster(&self, cluster: &Cluster, arena: &RecordArena) -> Result<MergedDraft> {
        let base = arena.get(&cluster.base).ok_or_else(|| {
            StrataError::Compression(format!("cluster base {} no longer exists", cluster.base))
        })?;

        let mut members: Vec<&Record> = cluster
            .members
            .iter()
            .map(|id| {
                arena.get(id).ok_or_else(|| {
                    StrataError::Compression(format!("cluster member {id} no longer exists"))
                })
            })
            .collect::<Result<_>>()?;
        members.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        members.dedup_by_key(|record| record.id);

        let content = self
            .strategy
            .summarize(members.iter().map(|record| record.content.as_str()));
        if content.is_empty() {
            return Err(StrataError::Compression(format!(
                "cluster based on {} produced an empty summary",
                cluster.base
            )));
        }

        let member_ids: HashSet<Uuid> = members.iter().map(|record| record.id).collect();
        let mut relationships: BTreeMap<Uuid, Relationship> = BTreeMap::new();
        for record in &members {
            for (target, edge) in &record.relationships {
                if member_ids.contains(target) {
                    continue;
                }
                relationships
                    .entry(*target)
                    .and_modify(|existing| {
                        if edge.weight > existing.weight {
                            *existing = *edge;
                        }
                    })
                    .or_insert(*edge);
            }
        }

        Ok(MergedDraft {
            content,
            kind: base.kind.clone(),
            factuality: members.iter().map(|r| r.factuality).fold(0.0, f32::max),
            confidence: members.iter().map(|r| r.confidence).fold(0.0, f32::max),
            base_importance: members
                .iter()
                .map(|r| r.base_importance)
                .fold(f32::MIN, f32::max),
            tags: members.iter().flat_map(|r| r.tags.iter().cloned()).collect(),
            source: base.source.clone(),
            relationships,
            parents: members.iter().map(|record| record.id).collect(),
        })
    }
}

/// A cluster a compression pass could not merge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterFailure {
    pub base: Uuid,
    pub members: Vec<Uuid>,
    pub reason: String,
}

/// Summary of one compression pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionPass {
    pub at: DateTime<Utc>,
    /// Canonical records when the pass started
    pub records_before: usize,
    pub clusters_found: usize,
    pub clusters_merged: usize,
    /// Originals retired by successful merges
    pub records_merged_away: usize,
    /// Ids of the consolidated records created
    pub merged_ids: Vec<Uuid>,
    pub failed: Vec<ClusterFailure>,
}

impl CompressionPass {
    pub fn new(records_before: usize, clusters_found: usize) -> Self {
        Self {
            at: Utc::now(),
            records_before,
            clusters_found,
            clusters_merged: 0,
            records_merged_away: 0,
            merged_ids: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Fraction of the starting records this pass retired
    pub fn ratio(&self) -> f32 {
        if self.records_before == 0 {
            0.0
        } else {
            self.records_merged_away as f32 / self.records_before as f32
        }
    }
}

/// Compression metrics derived from current state and the last pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionReport {
    pub total_records: usize,
    pub redundant_records: usize,
    pub compression_ratio: f32,
    pub last_compression_at: Option<DateTime<Utc>>,
    pub failed_clusters: usize,
}

impl CompressionReport {
    pub fn derive(
        total_records: usize,
        redundant_records: usize,
        last_pass: Option<&CompressionPass>,
    ) -> Self {
        Self {
            total_records,
            redundant_records,
            compression_ratio: last_pass.map(CompressionPass::ratio).unwrap_or(0.0),
            last_compression_at: last_pass.map(|pass| pass.at),
            failed_clusters: last_pass.map(|pass| pass.failed.len()).unwrap_or(0),
        }
    }
}
