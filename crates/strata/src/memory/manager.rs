//! The memory manager
//!
//! `MemoryManager` owns the canonical record arena, the redundancy tracker
//! and every tier, and keeps them consistent. Lock order is always manager
//! state first, then tiers in configuration order. Vectorization is the only
//! suspending external call and never runs with a lock held.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::{SimilarityPort, port_from_config};
use crate::error::{Result, StrataError};
use crate::memory::retrieval::{MergedHit, RetrievedRecord, TierResult, merge_tier_results};
use crate::memory::tracker::{Cluster, RedundancyTracker};
use crate::memory::types::{Classification, Record, Relationship, RelationshipKind};
use crate::storage::arena::RecordArena;
use crate::storage::compaction::{
    ClusterFailure, CompressionEngine, CompressionPass, CompressionReport, MergedDraft,
};
use crate::storage::eviction::EvictionPolicy;
use crate::storage::tiers::{Admission, Tier};

#[derive(Debug, Default)]
struct State {
    records: RecordArena,
    tracker: RedundancyTracker,
    last_pass: Option<CompressionPass>,
}

/// A tier a record was placed into by `promote`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub id: Uuid,
    pub tier: String,
}

/// Outcome of a promotion sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PromotionReport {
    /// Records that received the one-time boost
    pub boosted: Vec<Uuid>,
    /// New unbounded-tier memberships
    pub placements: Vec<Placement>,
}

impl PromotionReport {
    pub fn is_empty(&self) -> bool {
        self.boosted.is_empty() && self.placements.is_empty()
    }
}

/// A record reachable through a relationship edge
#[derive(Debug, Clone, Serialize)]
pub struct RelatedRecord {
    pub record: Record,
    pub relationship: Relationship,
}

/// A neighbor returned by `find_similar`
#[derive(Debug, Clone, Serialize)]
pub struct SimilarRecord {
    pub record: Record,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierStats {
    pub name: String,
    pub len: usize,
    pub capacity: Option<usize>,
    pub policy: EvictionPolicy,
    pub admission: Admission,
}

pub struct MemoryManager {
    state: Arc<RwLock<State>>,
    tiers: Vec<Arc<Tier>>,
    port: Arc<dyn SimilarityPort>,
    engine: CompressionEngine,
    config: Config,
}

impl MemoryManager {
    /// Create a manager over `port`. The configuration is validated first.
    pub fn new(config: Config, port: Arc<dyn SimilarityPort>) -> Result<Self> {
        config.validate()?;
        let tiers = config
            .tiers
            .iter()
            .cloned()
            .map(|tier| Tier::new(tier).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            state: Arc::new(RwLock::new(State::default())),
            tiers,
            port,
            engine: CompressionEngine::from_config(&config.compression),
            config,
        })
    }

    /// Create a manager with the similarity port named in `config.embedding`.
    pub fn from_config(config: Config) -> Result<Self> {
        let port = port_from_config(&config.embedding)?;
        Self::new(config, port)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tier_names(&self) -> Vec<String> {
        self.tiers.iter().map(|t| t.name().to_string()).collect()
    }

    /// Create, embed and place a new record in every `Always` tier.
    ///
    /// An embedding failure or timeout leaves no trace anywhere.
    pub async fn insert(
        &self,
        content: impl Into<String>,
        classification: Classification,
    ) -> Result<Record> {
        let mut record = Record::new(content, classification, &self.config.importance);
        self.embed(&mut record).await?;

        let snapshot = record.clone();
        let targets: Vec<&Arc<Tier>> = self
            .tiers
            .iter()
            .filter(|tier| tier.admission() == Admission::Always)
            .collect();

        let threshold = self.config.redundancy.threshold;
        let port = self.port.as_ref();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        self.commit(state, record, &targets, "insert", &[]).await?;

        let matches = state
            .tracker
            .detect_redundancy(&snapshot.id, &state.records, port, threshold);
        for matched in &matches {
            state
                .tracker
                .detect_redundancy(&matched.id, &state.records, port, threshold);
        }
        debug!(
            id = %snapshot.id,
            kind = %snapshot.kind,
            redundant_with = matches.len(),
            "inserted record"
        );
        Ok(snapshot)
    }

    /// Query every tier concurrently and return the best `top_k` records.
    ///
    /// Each returned record has its access registered exactly once.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedRecord>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = Arc::new(self.vectorize(query).await?);

        let merged = {
            let state = Arc::new(Arc::clone(&self.state).read_owned().await);
            let handles: Vec<_> = self
                .tiers
                .iter()
                .map(|tier| {
                    let tier = Arc::clone(tier);
                    let port = Arc::clone(&self.port);
                    let state = Arc::clone(&state);
                    let query_vector = Arc::clone(&query_vector);
                    tokio::spawn(async move {
                        let hits = tier
                            .retrieve(&query_vector, port.as_ref(), &state.records, top_k)
                            .await;
                        TierResult {
                            tier: tier.name().to_string(),
                            hits,
                        }
                    })
                })
                .collect();

            let mut results = Vec::with_capacity(handles.len());
            for joined in join_all(handles).await {
                results.push(joined.map_err(|e| {
                    StrataError::InvariantViolation(format!("tier retrieval task failed: {e}"))
                })?);
            }
            merge_tier_results(results, &state.records, top_k)
        };

        Ok(self.register_hits(merged).await)
    }

    /// Query a single tier by name.
    pub async fn retrieve_from(
        &self,
        tier_name: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedRecord>> {
        let tier = self
            .tiers
            .iter()
            .find(|tier| tier.name() == tier_name)
            .ok_or_else(|| StrataError::InvalidInput(format!("unknown tier {tier_name:?}")))?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.vectorize(query).await?;

        let merged = {
            let state = self.state.read().await;
            let hits = tier
                .retrieve(&query_vector, self.port.as_ref(), &state.records, top_k)
                .await;
            merge_tier_results(
                vec![TierResult {
                    tier: tier.name().to_string(),
                    hits,
                }],
                &state.records,
                top_k,
            )
        };

        Ok(self.register_hits(merged).await)
    }

    /// Boost frequently accessed records once and give important records a
    /// place in every unbounded tier.
    ///
    /// Importance never decreases. A second sweep with unchanged access
    /// counts changes nothing.
    pub async fn promote(&self) -> Result<PromotionReport> {
        let promotion = self.config.promotion;
        let unbounded: Vec<&Arc<Tier>> = self.tiers.iter().filter(|t| t.is_unbounded()).collect();
        let mut report = PromotionReport::default();

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let ids: Vec<Uuid> = state.records.oldest_first().iter().map(|r| r.id).collect();

        for id in ids {
            let Some(record) = state.records.get_mut(&id) else {
                continue;
            };
            if promotion.boost > 0.0
                && record.promotion_boost == 0.0
                && record.access_count >= promotion.access_threshold
            {
                record.promotion_boost = promotion.boost;
                record.refresh_importance(&self.config.importance);
                debug!(%id, importance = record.importance, "boosted record");
                report.boosted.push(id);
            }
            if record.importance < promotion.importance_ceiling {
                continue;
            }

            for tier in &unbounded {
                if tier.contains(&id).await {
                    continue;
                }
                tier.insert(id, &state.records).await?;
                debug!(%id, tier = tier.name(), "promoted record");
                report.placements.push(Placement {
                    id,
                    tier: tier.name().to_string(),
                });
            }
        }

        info!(
            boosted = report.boosted.len(),
            placed = report.placements.len(),
            "promotion sweep complete"
        );
        Ok(report)
    }

    /// Remove a record from every tier, the arena and the tracker.
    ///
    /// Returns whether anything was removed. Edges pointing at the record
    /// are left to dangle.
    pub async fn remove(&self, id: &Uuid) -> bool {
        let mut guard = self.state.write().await;
        let removed = self.purge(&mut guard, id).await;
        if removed {
            debug!(%id, "removed record");
        }
        removed
    }

    /// Add or replace the edge `a -> b`.
    pub async fn relate(&self, a: &Uuid, b: &Uuid, weight: f32) -> Result<RelationshipKind> {
        let mut guard = self.state.write().await;
        let other = guard
            .records
            .get(b)
            .cloned()
            .ok_or(StrataError::NotFound(*b))?;
        let record = guard.records.get_mut(a).ok_or(StrataError::NotFound(*a))?;
        record.add_relationship(&other, weight, self.port.as_ref(), &self.config.relationships)
    }

    /// Resolve the outgoing edges of `id`, heaviest first, skipping targets
    /// that no longer exist.
    pub async fn related(&self, id: &Uuid) -> Result<Vec<RelatedRecord>> {
        let state = self.state.read().await;
        let record = state.records.get(id).ok_or(StrataError::NotFound(*id))?;

        let mut related: Vec<RelatedRecord> = record
            .relationships
            .iter()
            .filter_map(|(target, relationship)| {
                state.records.get(target).map(|other| RelatedRecord {
                    record: other.clone(),
                    relationship: *relationship,
                })
            })
            .collect();
        related.sort_by(|a, b| {
            b.relationship
                .weight
                .total_cmp(&a.relationship.weight)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        Ok(related)
    }

    /// Every other record at least `threshold` similar to `id`, best first.
    ///
    /// `None` uses `redundancy.similar_threshold`.
    pub async fn find_similar(&self, id: &Uuid, threshold: Option<f32>) -> Result<Vec<SimilarRecord>> {
        let threshold = threshold.unwrap_or(self.config.redundancy.similar_threshold);
        let state = self.state.read().await;
        let record = state.records.get(id).ok_or(StrataError::NotFound(*id))?;

        let mut similar: Vec<SimilarRecord> = state
            .records
            .iter()
            .filter(|other| other.id != *id)
            .filter_map(|other| {
                let similarity = record.similarity_to(other, self.port.as_ref())?;
                (similarity >= threshold).then(|| SimilarRecord {
                    record: other.clone(),
                    similarity,
                })
            })
            .collect();
        similar.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        Ok(similar)
    }

    /// Refresh every record's redundancy score without merging anything.
    ///
    /// Returns the number of records with at least one near duplicate.
    pub async fn scan_redundancy(&self) -> usize {
        let threshold = self.config.redundancy.threshold;
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let redundant =
            state
                .tracker
                .refresh_redundancy(&state.records, self.port.as_ref(), threshold);
        info!(scanned = state.tracker.len(), redundant, "redundancy scan complete");
        redundant
    }

    /// Merge every redundant cluster into one consolidated record.
    ///
    /// Clusters are all-or-nothing: a cluster whose merge, embedding or
    /// commit fails keeps all of its originals and is listed in the pass
    /// summary. Only invariant violations are returned as errors.
    pub async fn compress(&self) -> Result<CompressionPass> {
        let threshold = self.config.redundancy.threshold;

        let (mut pass, drafts) = {
            let state = self.state.read().await;
            let clusters = state.tracker.select_compression_candidates(
                &state.records,
                self.port.as_ref(),
                threshold,
            );
            let pass = CompressionPass::new(state.records.len(), clusters.len());
            let drafts: Vec<(Cluster, Result<MergedDraft>)> = clusters
                .into_iter()
                .map(|cluster| {
                    let draft = self.engine.merge_cluster(&cluster, &state.records);
                    (cluster, draft)
                })
                .collect();
            (pass, drafts)
        };

        let mut prepared: Vec<(Cluster, Record)> = Vec::with_capacity(drafts.len());
        for (cluster, draft) in drafts {
            let outcome = match draft {
                Ok(draft) => {
                    let mut record = self.record_from_draft(draft);
                    self.embed(&mut record).await.map(|_| record)
                }
                Err(e) => Err(e),
            };
            match outcome {
                Ok(record) => prepared.push((cluster, record)),
                Err(e) => record_failure(&mut pass, &cluster, e),
            }
        }

        let targets: Vec<&Arc<Tier>> = self
            .tiers
            .iter()
            .filter(|tier| tier.admission() == Admission::Always || tier.is_unbounded())
            .collect();

        let mut guard = self.state.write().await;
        for (cluster, record) in prepared {
            if let Some(missing) = cluster.members.iter().find(|id| !guard.records.contains(id)) {
                let reason = StrataError::Compression(format!(
                    "cluster member {missing} disappeared before commit"
                ));
                record_failure(&mut pass, &cluster, reason);
                continue;
            }

            // Lineage is taken from the originals, then their tier slots are
            // freed before the merged record is placed.
            let merged_id = record.id;
            guard
                .tracker
                .track_generation(&record, "consolidation", &cluster.members);
            for original in &cluster.members {
                self.purge(&mut guard, original).await;
            }
            self.commit(&mut guard, record, &targets, "consolidation", &cluster.members)
                .await?;

            debug!(%merged_id, originals = cluster.members.len(), "consolidated cluster");
            pass.clusters_merged += 1;
            pass.records_merged_away += cluster.members.len();
            pass.merged_ids.push(merged_id);
        }

        let state = &mut *guard;
        state
            .tracker
            .refresh_redundancy(&state.records, self.port.as_ref(), threshold);
        state.last_pass = Some(pass.clone());

        info!(
            clusters = pass.clusters_found,
            merged = pass.clusters_merged,
            retired = pass.records_merged_away,
            failed = pass.failed.len(),
            "compression pass complete"
        );
        Ok(pass)
    }

    /// Remove never-accessed records older than
    /// `maintenance.stale_after_days`.
    pub async fn prune_stale(&self) -> Vec<Uuid> {
        let cutoff = Utc::now() - ChronoDuration::days(self.config.maintenance.stale_after_days);
        let mut guard = self.state.write().await;

        let stale: Vec<Uuid> = guard
            .records
            .oldest_first()
            .into_iter()
            .filter(|r| r.access_count == 0 && r.created_at < cutoff)
            .map(|r| r.id)
            .collect();
        for id in &stale {
            self.purge(&mut guard, id).await;
        }

        info!(pruned = stale.len(), "stale pruning complete");
        stale
    }

    /// Metrics derived from current state and the last compression pass.
    pub async fn get_compression_report(&self) -> CompressionReport {
        let state = self.state.read().await;
        let redundant = state.tracker.count_redundant(
            &state.records,
            self.port.as_ref(),
            self.config.redundancy.threshold,
        );
        CompressionReport::derive(state.records.len(), redundant, state.last_pass.as_ref())
    }

    /// Check that tier membership, the arena and the tracker agree.
    pub async fn verify_consistency(&self) -> Result<()> {
        let state = self.state.read().await;

        for tier in &self.tiers {
            for id in tier.member_ids().await {
                if !state.records.contains(&id) {
                    return Err(StrataError::InvariantViolation(format!(
                        "tier {:?} holds {id}, which is not in the canonical set",
                        tier.name()
                    )));
                }
            }
            if let Some(capacity) = tier.capacity() {
                let len = tier.len().await;
                if len > capacity {
                    return Err(StrataError::InvariantViolation(format!(
                        "tier {:?} holds {len} records, above its capacity of {capacity}",
                        tier.name()
                    )));
                }
            }
        }

        for id in state.records.ids() {
            if self.tiers_holding(id).await.is_empty() {
                return Err(StrataError::InvariantViolation(format!(
                    "record {id} is in the canonical set but in no tier"
                )));
            }
            if !state.tracker.is_tracked(id) {
                return Err(StrataError::InvariantViolation(format!(
                    "record {id} is not tracked"
                )));
            }
        }

        if state.tracker.len() != state.records.len() {
            return Err(StrataError::InvariantViolation(format!(
                "tracker holds {} entries for {} records",
                state.tracker.len(),
                state.records.len()
            )));
        }

        Ok(())
    }

    pub async fn tier_stats(&self) -> Vec<TierStats> {
        let mut stats = Vec::with_capacity(self.tiers.len());
        for tier in &self.tiers {
            stats.push(TierStats {
                name: tier.name().to_string(),
                len: tier.len().await,
                capacity: tier.capacity(),
                policy: tier.policy(),
                admission: tier.admission(),
            });
        }
        stats
    }

    /// Names of the tiers currently holding `id`, in configuration order.
    pub async fn tiers_of(&self, id: &Uuid) -> Vec<String> {
        let _state = self.state.read().await;
        self.tiers_holding(id).await
    }

    pub async fn get(&self, id: &Uuid) -> Option<Record> {
        self.state.read().await.records.get(id).cloned()
    }

    /// Snapshot of every live record, oldest first
    pub async fn records(&self) -> Vec<Record> {
        let state = self.state.read().await;
        state.records.oldest_first().into_iter().cloned().collect()
    }

    pub async fn lineage(&self, id: &Uuid) -> Option<Vec<Uuid>> {
        let state = self.state.read().await;
        state.tracker.entry(id).map(|entry| entry.lineage.clone())
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }

    async fn vectorize(&self, content: &str) -> Result<Vec<f32>> {
        let timeout = self.config.embedding.timeout();
        match tokio::time::timeout(timeout, self.port.vectorize(content)).await {
            Ok(Ok(vector)) if vector.is_empty() => Err(StrataError::EmbeddingUnavailable(
                "similarity port returned an empty vector".to_string(),
            )),
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "vectorization timed out");
                Err(StrataError::EmbeddingUnavailable(format!(
                    "vectorization timed out after {}s",
                    timeout.as_secs()
                )))
            }
        }
    }

    async fn embed(&self, record: &mut Record) -> Result<()> {
        let timeout = self.config.embedding.timeout();
        match tokio::time::timeout(timeout, record.compute_vector(self.port.as_ref())).await {
            Ok(result) => result,
            Err(_) => {
                warn!(id = %record.id, timeout_secs = timeout.as_secs(), "vectorization timed out");
                Err(StrataError::EmbeddingUnavailable(format!(
                    "vectorization timed out after {}s",
                    timeout.as_secs()
                )))
            }
        }
    }

    fn record_from_draft(&self, draft: MergedDraft) -> Record {
        let classification = Classification {
            kind: draft.kind,
            factuality: draft.factuality,
            confidence: draft.confidence,
            tags: draft.tags,
            source: draft.source,
            importance: Some(draft.base_importance),
        };
        let mut record = Record::new(draft.content, classification, &self.config.importance);
        record.relationships = draft.relationships;
        record
    }

    /// Place an embedded record into the arena, the tracker and `targets`.
    ///
    /// Records evicted along the way that end up in no tier are retired.
    async fn commit(
        &self,
        state: &mut State,
        record: Record,
        targets: &[&Arc<Tier>],
        source_operation: &str,
        parents: &[Uuid],
    ) -> Result<()> {
        let id = record.id;
        state.tracker.track_generation(&record, source_operation, parents);
        state.records.insert(record);

        for tier in targets {
            if let Some(evicted) = tier.insert(id, &state.records).await? {
                self.retire_if_orphaned(state, evicted).await;
            }
        }

        for tier in targets {
            if !tier.contains(&id).await {
                return Err(StrataError::InvariantViolation(format!(
                    "record {id} missing from tier {:?} right after insert",
                    tier.name()
                )));
            }
        }
        Ok(())
    }

    async fn retire_if_orphaned(&self, state: &mut State, id: Uuid) {
        if !self.tiers_holding(&id).await.is_empty() {
            return;
        }
        state.records.remove(&id);
        state.tracker.forget(&id);
        debug!(%id, "retired record evicted from its last tier");
    }

    async fn purge(&self, state: &mut State, id: &Uuid) -> bool {
        let mut removed = false;
        for tier in &self.tiers {
            removed |= tier.remove(id).await;
        }
        removed |= state.records.remove(id).is_some();
        removed |= state.tracker.forget(id).is_some();
        removed
    }

    async fn tiers_holding(&self, id: &Uuid) -> Vec<String> {
        let mut names = Vec::new();
        for tier in &self.tiers {
            if tier.contains(id).await {
                names.push(tier.name().to_string());
            }
        }
        names
    }

    async fn register_hits(&self, hits: Vec<MergedHit>) -> Vec<RetrievedRecord> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let mut retrieved = Vec::with_capacity(hits.len());
        for hit in hits {
            // Removed between the scan and now
            let Some(record) = state.records.get_mut(&hit.id) else {
                continue;
            };
            record.record_access(&self.config.importance);
            state.tracker.record_access(&hit.id, record.access_count);
            debug!(id = %hit.id, access_count = record.access_count, "recorded access");
            retrieved.push(RetrievedRecord {
                record: record.clone(),
                score: hit.score,
                tiers: hit.tiers,
            });
        }
        retrieved
    }
}

fn record_failure(pass: &mut CompressionPass, cluster: &Cluster, error: StrataError) {
    warn!(base = %cluster.base, error = %error, "cluster merge failed");
    pass.failed.push(ClusterFailure {
        base: cluster.base,
        members: cluster.members.clone(),
        reason: error.to_string(),
    });
}
