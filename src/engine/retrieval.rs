//! Resilient retrieval orchestration
//!
//! Composes the primary store, cache tier, dataset snapshot, and cold
//! fallback stores into the read/write surface of the engine. Reads walk
//! the tiers in a fixed order and return the first hit; writes always go to
//! the primary first, mirroring into the cache tier on success and queueing
//! for replay on failure. One shared [`HealthTracker`] gates every primary
//! attempt so a failing store is observed once, process-wide.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::constants::CACHE_TYPE_QUESTIONNAIRE;
use crate::engine::assembler::{self, EntityPools, FlatQuestionnaire};
use crate::engine::health::HealthTracker;
use crate::engine::pending::PendingWriteQueue;
use crate::engine::rules;
use crate::engine::storage::{AuditStamp, LifecycleChange, PrimaryStore};
use crate::engine::types::{CacheRecord, EntityKind, FlowRule, QuestionnaireGraph};
use crate::fallback::cache::CacheTier;
use crate::fallback::cold::ColdStore;
use crate::fallback::snapshot::SnapshotStore;
use crate::metrics;

/// Primary-store failure classification, for metrics and the breaker.
#[derive(Debug)]
enum PrimaryFailure {
    Timeout,
    Error(anyhow::Error),
}

impl PrimaryFailure {
    fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Error(_) => "error",
        }
    }
}

/// Outcome of a tiered questionnaire read.
#[derive(Debug)]
pub enum RetrievalOutcome {
    /// Served from the named tier.
    Hit {
        graph: QuestionnaireGraph,
        tier: &'static str,
    },
    /// The primary is healthy and authoritative: the action does not exist
    /// (or is soft-deleted). Fallback tiers are deliberately not consulted.
    NotFound,
    /// Every tier missed. A normal result with a fixed status code, not an
    /// exception.
    Unavailable,
}

/// Outcome of a questionnaire save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Committed to the primary store.
    Applied,
    /// Primary unreachable; queued for FIFO replay after recovery. The
    /// caller is told nothing has been committed yet.
    Queued,
}

/// A save plus the action id it landed under (generated when the incoming
/// graph carried none).
#[derive(Debug)]
pub struct SaveResult {
    pub outcome: SaveOutcome,
    pub action_id: String,
}

pub struct RetrievalEngine {
    primary: Arc<dyn PrimaryStore>,
    cache: CacheTier,
    snapshot: Arc<SnapshotStore>,
    cold: Arc<Vec<ColdStore>>,
    health: Arc<HealthTracker>,
    pending: Arc<PendingWriteQueue>,
    primary_timeout: Duration,
}

impl RetrievalEngine {
    pub fn new(
        primary: Arc<dyn PrimaryStore>,
        cache: CacheTier,
        snapshot: Arc<SnapshotStore>,
        cold: Vec<ColdStore>,
        health: Arc<HealthTracker>,
        pending: Arc<PendingWriteQueue>,
        primary_timeout: Duration,
    ) -> Self {
        Self {
            primary,
            cache,
            snapshot,
            cold: Arc::new(cold),
            health,
            pending,
            primary_timeout,
        }
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn pending(&self) -> &Arc<PendingWriteQueue> {
        &self.pending
    }

    pub fn snapshot(&self) -> &Arc<SnapshotStore> {
        &self.snapshot
    }

    /// Warm the cold stores that rebuild state from disk at startup.
    pub async fn warm_cold_stores(&self) {
        for store in self.cold.iter() {
            store.warm().await;
        }
    }

    /// Flush buffered primary-store writes. Called on shutdown.
    pub fn flush_primary(&self) -> anyhow::Result<()> {
        self.primary.flush()
    }

    // =========================================================================
    // PRIMARY-STORE CALL PLUMBING
    // =========================================================================

    /// Run one blocking primary-store call off the async runtime, bounded by
    /// the per-tier timeout. A timeout abandons the blocking task; the
    /// rocksdb call finishes (or fails) on its own without a waiter.
    async fn primary_call<T, F>(&self, f: F) -> Result<T, PrimaryFailure>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn PrimaryStore>) -> anyhow::Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.primary);
        let call = tokio::task::spawn_blocking(move || f(store));
        match tokio::time::timeout(self.primary_timeout, call).await {
            Err(_) => Err(PrimaryFailure::Timeout),
            Ok(Err(join)) => Err(PrimaryFailure::Error(anyhow::anyhow!(
                "primary call panicked: {join}"
            ))),
            Ok(Ok(Err(e))) => Err(PrimaryFailure::Error(e)),
            Ok(Ok(Ok(v))) => Ok(v),
        }
    }

    fn note_primary_failure(&self, failure: &PrimaryFailure) {
        metrics::PRIMARY_FAILURES_TOTAL
            .with_label_values(&[failure.kind()])
            .inc();
        self.health.record_failure();
    }

    // =========================================================================
    // PENDING-WRITE REPLAY
    // =========================================================================

    /// Replay queued writes once primary health is observed restored.
    ///
    /// Called at the top of every public operation. The drain claims the
    /// queue's guard so exactly one replay loop runs; concurrent callers see
    /// the guard taken and proceed to their own work immediately, reads are
    /// never blocked. The loop runs on its own task so a caller hanging up
    /// mid-request cannot cancel a replay serving everyone else.
    async fn drain_pending(&self) {
        if self.pending.is_empty() || !self.pending.begin_drain() {
            return;
        }
        if !self.health.try_acquire() {
            self.pending.end_drain();
            return;
        }

        let primary = Arc::clone(&self.primary);
        let health = Arc::clone(&self.health);
        let pending = Arc::clone(&self.pending);
        let timeout = self.primary_timeout;

        let drain = tokio::spawn(async move {
            let mut replayed = 0usize;
            let mut acquired = true;
            while let Some(write) = pending.pop_front() {
                if !acquired && !health.try_acquire() {
                    pending.push_front(write);
                    break;
                }
                acquired = false;

                let flat = assembler::flatten(&write.graph);
                let store = Arc::clone(&primary);
                let call =
                    tokio::task::spawn_blocking(move || store.save_questionnaire(&flat));
                let outcome = match tokio::time::timeout(timeout, call).await {
                    Ok(Ok(Ok(()))) => Ok(()),
                    Ok(Ok(Err(e))) => Err(e),
                    Ok(Err(join)) => Err(anyhow::anyhow!("replay panicked: {join}")),
                    Err(_) => Err(anyhow::anyhow!("replay timed out")),
                };

                match outcome {
                    Ok(()) => {
                        health.record_success();
                        metrics::PENDING_REPLAYED_TOTAL
                            .with_label_values(&["ok"])
                            .inc();
                        replayed += 1;
                    }
                    Err(e) => {
                        warn!(
                            action_id = %write.graph.action_id,
                            "pending replay failed, requeueing: {e:#}"
                        );
                        health.record_failure();
                        metrics::PENDING_REPLAYED_TOTAL
                            .with_label_values(&["error"])
                            .inc();
                        pending.push_front(write);
                        break;
                    }
                }
            }
            pending.end_drain();
            if replayed > 0 {
                info!(replayed, "pending writes replayed after recovery");
            }
        });

        // Await completion so this operation observes the replayed state,
        // but on a detached task: dropping this future does not stop it.
        let _ = drain.await;
    }

    // =========================================================================
    // RULE RESOLUTION
    // =========================================================================

    /// Resolve a flow + context attributes to an action id. A miss is a
    /// normal `None`, never an error.
    pub async fn resolve_action(
        &self,
        flow: &str,
        attributes: &HashMap<String, String>,
    ) -> Option<String> {
        self.drain_pending().await;
        let rules = self.load_rules(flow).await;
        rules::resolve_action(flow, &rules, attributes)
    }

    /// List every rule of a flow, inactive ones included.
    pub async fn list_rules(&self, flow: &str) -> Vec<FlowRule> {
        self.drain_pending().await;
        self.load_rules(flow).await
    }

    async fn load_rules(&self, flow: &str) -> Vec<FlowRule> {
        if self.health.try_acquire() {
            let flow_owned = flow.to_string();
            match self
                .primary_call(move |store| store.rules_for_flow(&flow_owned))
                .await
            {
                Ok(rules) => {
                    self.health.record_success();
                    return rules;
                }
                Err(failure) => {
                    warn!(flow, "primary rule read failed ({})", failure.kind());
                    self.note_primary_failure(&failure);
                }
            }
        }
        self.snapshot.rules_for_flow(flow).await.unwrap_or_default()
    }

    /// Author or update one flow rule. Rules are low-churn authoring data;
    /// unlike questionnaire saves they are not queued during an outage.
    pub async fn put_rule(&self, rule: FlowRule) -> anyhow::Result<()> {
        self.drain_pending().await;
        let flow = rule.flow.clone();
        let result = self
            .primary_call(move |store| store.put_rule(&rule))
            .await;
        match result {
            Ok(()) => {
                self.health.record_success();
                // The snapshot rule group is stale until the next rebuild;
                // drop it so an outdated rule cannot fire from fallback.
                self.cache
                    .delete(crate::constants::CACHE_TYPE_DATASET_RULES, &flow)
                    .await;
                Ok(())
            }
            Err(failure) => {
                self.note_primary_failure(&failure);
                Err(match failure {
                    PrimaryFailure::Timeout => anyhow::anyhow!("rule write timed out"),
                    PrimaryFailure::Error(e) => e,
                })
            }
        }
    }

    // =========================================================================
    // QUESTIONNAIRE READS
    // =========================================================================

    /// Tiered questionnaire read: primary (breaker permitting), then cache
    /// entry, then snapshot group, then cold stores, then `Unavailable`.
    pub async fn get_questionnaire(&self, action_id: &str) -> RetrievalOutcome {
        self.drain_pending().await;
        let timer = std::time::Instant::now();
        let outcome = self.get_questionnaire_inner(action_id).await;
        metrics::RETRIEVAL_DURATION.observe(timer.elapsed().as_secs_f64());

        let (tier, result) = match &outcome {
            RetrievalOutcome::Hit { tier, .. } => (*tier, "hit"),
            RetrievalOutcome::NotFound => ("primary", "not_found"),
            RetrievalOutcome::Unavailable => ("none", "unavailable"),
        };
        metrics::RETRIEVAL_TOTAL
            .with_label_values(&[tier, result])
            .inc();
        outcome
    }

    async fn get_questionnaire_inner(&self, action_id: &str) -> RetrievalOutcome {
        if self.health.try_acquire() {
            match self.fetch_primary(action_id).await {
                Ok(Some(graph)) => {
                    self.health.record_success();
                    self.mirror_cache(graph.clone());
                    return RetrievalOutcome::Hit {
                        graph,
                        tier: "primary",
                    };
                }
                Ok(None) => {
                    // Authoritative miss: do not resurrect from stale tiers.
                    self.health.record_success();
                    return RetrievalOutcome::NotFound;
                }
                Err(failure) => {
                    warn!(
                        action_id,
                        "primary questionnaire read failed ({})",
                        failure.kind()
                    );
                    self.note_primary_failure(&failure);
                }
            }
        }
        self.read_fallbacks(action_id).await
    }

    /// Fetch and assemble from the primary store. The four entity reads run
    /// concurrently and join before assembly; assembly itself is pure.
    async fn fetch_primary(
        &self,
        action_id: &str,
    ) -> Result<Option<QuestionnaireGraph>, PrimaryFailure> {
        let id_a = action_id.to_string();
        let id_q = action_id.to_string();
        let id_o = action_id.to_string();
        let id_d = action_id.to_string();

        let (action, questions, options, details) = tokio::join!(
            self.primary_call(move |store| store.get_action(&id_a)),
            self.primary_call(move |store| store.questions_for_action(&id_q)),
            self.primary_call(move |store| store.options_for_action(&id_o)),
            self.primary_call(move |store| store.details_for_action(&id_d)),
        );

        let (action, questions, options, details) = (action?, questions?, options?, details?);
        let Some(action) = action.filter(|a| a.active) else {
            return Ok(None);
        };

        let pools = EntityPools {
            questions,
            answer_options: options,
            details,
        };
        Ok(Some(assembler::assemble(&action, &pools)))
    }

    async fn read_fallbacks(&self, action_id: &str) -> RetrievalOutcome {
        // Tier 2: per-action cache entry.
        if let Some(value) = self.cache.get(CACHE_TYPE_QUESTIONNAIRE, action_id).await {
            match serde_json::from_value::<QuestionnaireGraph>(value) {
                Ok(graph) => {
                    return RetrievalOutcome::Hit {
                        graph,
                        tier: "cache",
                    }
                }
                Err(e) => warn!(action_id, "cached questionnaire failed to decode: {}", e),
            }
        }

        // Tier 3: dataset snapshot group, reassembled locally.
        if let Some(group) = self.snapshot.lookup(action_id).await {
            if let Some(action) = group.action.as_ref().filter(|a| a.active) {
                let pools = EntityPools {
                    questions: group.questions.clone(),
                    answer_options: group.answer_options.clone(),
                    details: group.details.clone(),
                };
                return RetrievalOutcome::Hit {
                    graph: assembler::assemble(action, &pools),
                    tier: "snapshot",
                };
            }
        }

        // Tier 4: cold stores, in configured order.
        for cold in self.cold.iter() {
            if let Some(graph) = cold.fetch(action_id).await {
                return RetrievalOutcome::Hit {
                    graph,
                    tier: cold.name(),
                };
            }
        }

        RetrievalOutcome::Unavailable
    }

    // =========================================================================
    // QUESTIONNAIRE WRITES
    // =========================================================================

    /// Persist a questionnaire. Primary first, always; success mirrors into
    /// the cache and cold tiers, failure queues the write for FIFO replay
    /// and reports `Queued` so the caller knows nothing is committed yet.
    pub async fn save_questionnaire(
        &self,
        graph: &QuestionnaireGraph,
        author: &str,
    ) -> SaveResult {
        self.drain_pending().await;

        let mut flat = assembler::flatten(graph);
        stamp_audits(&mut flat, author);
        let action_id = flat.action.action_id.clone();
        // Replay and mirroring both use the normalized tree so generated
        // ids stay stable from here on.
        let normalized = assembler::assemble(
            &flat.action,
            &EntityPools {
                questions: flat.questions.clone(),
                answer_options: flat.answer_options.clone(),
                details: flat.details.clone(),
            },
        );

        if self.health.try_acquire() {
            let to_store = flat.clone();
            match self
                .primary_call(move |store| store.save_questionnaire(&to_store))
                .await
            {
                Ok(()) => {
                    self.health.record_success();
                    self.mirror_cache(normalized.clone());
                    self.mirror_cold(normalized);
                    return SaveResult {
                        outcome: SaveOutcome::Applied,
                        action_id,
                    };
                }
                Err(failure) => {
                    warn!(
                        action_id = %flat.action.action_id,
                        "primary save failed ({}), queueing write",
                        failure.kind()
                    );
                    self.note_primary_failure(&failure);
                }
            }
        }

        self.pending.enqueue(normalized);
        SaveResult {
            outcome: SaveOutcome::Queued,
            action_id,
        }
    }

    /// Hard-delete a questionnaire: the explicit purge path. Not queueable;
    /// a delete during an outage is an error, not a pending write.
    pub async fn delete_questionnaire(&self, action_id: &str) -> anyhow::Result<bool> {
        self.drain_pending().await;

        let id = action_id.to_string();
        let result = self
            .primary_call(move |store| store.purge_action(&id))
            .await;
        match result {
            Ok(found) => {
                self.health.record_success();
                if found {
                    self.invalidate_tiers(action_id, true);
                }
                Ok(found)
            }
            Err(failure) => {
                self.note_primary_failure(&failure);
                Err(match failure {
                    PrimaryFailure::Timeout => anyhow::anyhow!("delete timed out"),
                    PrimaryFailure::Error(e) => e,
                })
            }
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Soft-delete one entity. `Ok(None)` when the entity is unknown.
    pub async fn soft_delete(
        &self,
        kind: EntityKind,
        key: &str,
        stamp: AuditStamp,
    ) -> anyhow::Result<Option<LifecycleChange>> {
        self.lifecycle(kind, key, stamp, false).await
    }

    /// Restore one soft-deleted entity. `Ok(None)` when the entity is
    /// unknown.
    pub async fn restore(
        &self,
        kind: EntityKind,
        key: &str,
        stamp: AuditStamp,
    ) -> anyhow::Result<Option<LifecycleChange>> {
        self.lifecycle(kind, key, stamp, true).await
    }

    async fn lifecycle(
        &self,
        kind: EntityKind,
        key: &str,
        stamp: AuditStamp,
        restore: bool,
    ) -> anyhow::Result<Option<LifecycleChange>> {
        self.drain_pending().await;

        let key_owned = key.to_string();
        let result = self
            .primary_call(move |store| {
                if restore {
                    store.restore(kind, &key_owned, &stamp)
                } else {
                    store.soft_delete(kind, &key_owned, &stamp)
                }
            })
            .await;

        match result {
            Ok(change) => {
                self.health.record_success();
                if let Some(change) = &change {
                    // Whichever sub-entity changed, the owning action's
                    // assembled graph is no longer valid.
                    if let Some(action_id) = &change.owning_action {
                        self.invalidate_tiers(action_id, false);
                        self.refresh_mirrors(action_id.clone());
                    }
                    if let Some(flow) = &change.owning_flow {
                        self.cache
                            .delete(crate::constants::CACHE_TYPE_DATASET_RULES, flow)
                            .await;
                    }
                }
                Ok(change)
            }
            Err(failure) => {
                self.note_primary_failure(&failure);
                Err(match failure {
                    PrimaryFailure::Timeout => anyhow::anyhow!("lifecycle write timed out"),
                    PrimaryFailure::Error(e) => e,
                })
            }
        }
    }

    // =========================================================================
    // MIRRORING / INVALIDATION
    // =========================================================================

    /// Fire-and-forget mirror of an assembled graph into the cache tier.
    fn mirror_cache(&self, graph: QuestionnaireGraph) {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            match serde_json::to_value(&graph) {
                Ok(value) => {
                    cache
                        .put(CacheRecord::new(
                            CACHE_TYPE_QUESTIONNAIRE,
                            &graph.action_id,
                            value,
                        ))
                        .await;
                }
                Err(e) => warn!(action_id = %graph.action_id, "mirror encode failed: {}", e),
            }
        });
    }

    /// Fire-and-forget mirror into the cold stores.
    fn mirror_cold(&self, graph: QuestionnaireGraph) {
        let cold = Arc::clone(&self.cold);
        tokio::spawn(async move {
            for store in cold.iter() {
                store.store(&graph).await;
            }
        });
    }

    /// Drop the cached assembled graph (and, on purge, the cold copies and
    /// snapshot group) for one action.
    fn invalidate_tiers(&self, action_id: &str, purge: bool) {
        let cache = self.cache.clone();
        let cold = Arc::clone(&self.cold);
        let action_id = action_id.to_string();
        tokio::spawn(async move {
            cache.delete(CACHE_TYPE_QUESTIONNAIRE, &action_id).await;
            if purge {
                cache
                    .delete(crate::constants::CACHE_TYPE_DATASET, &action_id)
                    .await;
                for store in cold.iter() {
                    store.delete(&action_id).await;
                }
            }
        });
    }

    /// Re-read one action from the primary and push the fresh assembly into
    /// every mirror tier. Used after lifecycle mutations so fallbacks do not
    /// serve the pre-mutation tree for a full TTL.
    fn refresh_mirrors(&self, action_id: String) {
        let primary = Arc::clone(&self.primary);
        let cache = self.cache.clone();
        let cold = Arc::clone(&self.cold);
        tokio::spawn(async move {
            let id = action_id.clone();
            let fetched = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
                let action = primary.get_action(&id)?;
                let questions = primary.questions_for_action(&id)?;
                let answer_options = primary.options_for_action(&id)?;
                let details = primary.details_for_action(&id)?;
                Ok((action, questions, answer_options, details))
            })
            .await;

            let Ok(Ok((Some(action), questions, answer_options, details))) = fetched else {
                return;
            };
            if !action.active {
                return;
            }
            let graph = assembler::assemble(
                &action,
                &EntityPools {
                    questions,
                    answer_options,
                    details,
                },
            );
            match serde_json::to_value(&graph) {
                Ok(value) => {
                    cache
                        .put(CacheRecord::new(CACHE_TYPE_QUESTIONNAIRE, &action_id, value))
                        .await;
                }
                Err(e) => warn!(action_id = %action_id, "refresh encode failed: {}", e),
            }
            for store in cold.iter() {
                store.store(&graph).await;
            }
        });
    }
}

/// Stamp creation/modification audit fields across a flattened
/// questionnaire before it reaches the store.
fn stamp_audits(flat: &mut FlatQuestionnaire, author: &str) {
    fn stamp(audit: &mut crate::engine::types::Audit, author: &str) {
        if audit.created_ts.is_none() {
            *audit = crate::engine::types::Audit::created_now(author);
        } else {
            audit.touch(author, None);
        }
    }
    stamp(&mut flat.action.audit, author);
    for q in &mut flat.questions {
        stamp(&mut q.audit, author);
    }
    for o in &mut flat.answer_options {
        stamp(&mut o.audit, author);
    }
    for d in &mut flat.details {
        stamp(&mut d.audit, author);
    }
}
