//! Fan-in of per-tier retrieval results
//!
//! Each tier answers a query independently; the same record can come back
//! from several tiers. This module merges those answers by record id,
//! keeping the best score and every tier that returned the record, then
//! orders and truncates the merged list.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::memory::types::Record;
use crate::storage::arena::RecordArena;
use crate::storage::tiers::TierHit;

/// A record returned by `MemoryManager::retrieve`
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedRecord {
    /// Snapshot taken after the access was recorded
    pub record: Record,
    /// Best similarity any tier reported
    pub score: f32,
    /// Names of the tiers that returned this record, in configuration order
    pub tiers: Vec<String>,
}

/// The answer of a single tier
#[derive(Debug, Clone)]
pub struct TierResult {
    pub tier: String,
    pub hits: Vec<TierHit>,
}

/// A merged hit before the access is recorded
#[derive(Debug, Clone, PartialEq)]
pub struct MergedHit {
    pub id: Uuid,
    pub score: f32,
    pub tiers: Vec<String>,
}

/// Merge tier answers by id and return the best `top_k`.
///
/// `results` must be in tier configuration order. Ordering is best score
/// descending, then importance descending, then `created_at` ascending, then
/// id. Hits whose record has left the arena are dropped.
pub fn merge_tier_results(
    results: Vec<TierResult>,
    arena: &RecordArena,
    top_k: usize,
) -> Vec<MergedHit> {
    let mut merged: HashMap<Uuid, MergedHit> = HashMap::new();

    for result in results {
        for hit in result.hits {
            if !arena.contains(&hit.id) {
                continue;
            }
            let entry = merged.entry(hit.id).or_insert_with(|| MergedHit {
                id: hit.id,
                score: hit.score,
                tiers: Vec::new(),
            });
            entry.score = entry.score.max(hit.score);
            if !entry.tiers.contains(&result.tier) {
                entry.tiers.push(result.tier.clone());
            }
        }
    }

    let mut hits: Vec<(MergedHit, &Record)> = merged
        .into_values()
        .filter_map(|hit| arena.get(&hit.id).map(|record| (hit, record)))
        .collect();

    hits.sort_by(|(a, a_record), (b, b_record)| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b_record.importance.total_cmp(&a_record.importance))
            .then_with(|| a_record.created_at.cmp(&b_record.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(top_k);
    hits.into_iter().map(|(hit, _)| hit).collect()
}
