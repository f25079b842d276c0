//! Dataset snapshot: a periodically rebuilt full copy of the primary store
//!
//! Held in the cache tier as one entry per group: questionnaire entities
//! grouped by action id, flow rules grouped by flow. The snapshot is the
//! principal fallback once an outage outlives the per-key cache TTL, because
//! a rebuild refreshes every group wholesale instead of relying on per-read
//! mirroring.
//!
//! Rebuilds run at startup and on a fixed schedule. A rebuild observed in
//! flight causes the next one to be skipped rather than queued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::constants::{CACHE_TYPE_DATASET, CACHE_TYPE_DATASET_RULES};
use crate::engine::storage::PrimaryStore;
use crate::engine::types::{CacheRecord, DatasetGroup, FlowRule};
use crate::fallback::cache::CacheTier;
use crate::metrics;

pub struct SnapshotStore {
    primary: Arc<dyn PrimaryStore>,
    cache: CacheTier,
    rebuilding: AtomicBool,
}

impl SnapshotStore {
    pub fn new(primary: Arc<dyn PrimaryStore>, cache: CacheTier) -> Self {
        Self {
            primary,
            cache,
            rebuilding: AtomicBool::new(false),
        }
    }

    /// Rebuild every snapshot group from the primary store.
    ///
    /// Self-excluding: returns immediately when another rebuild holds the
    /// flag. Returns the number of groups written.
    pub async fn rebuild(&self) -> anyhow::Result<usize> {
        if self
            .rebuilding
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("snapshot rebuild already in flight, skipping");
            return Ok(0);
        }
        let result = self.rebuild_inner().await;
        self.rebuilding.store(false, Ordering::Release);

        match &result {
            Ok(groups) => {
                metrics::SNAPSHOT_REBUILDS_TOTAL
                    .with_label_values(&["ok"])
                    .inc();
                info!(groups, "snapshot rebuild complete");
            }
            Err(e) => {
                metrics::SNAPSHOT_REBUILDS_TOTAL
                    .with_label_values(&["error"])
                    .inc();
                warn!("snapshot rebuild failed: {e:#}");
            }
        }
        result
    }

    async fn rebuild_inner(&self) -> anyhow::Result<usize> {
        let primary = Arc::clone(&self.primary);
        let scan = tokio::task::spawn_blocking(move || primary.scan_all()).await??;

        // Group questionnaire entities by owning action.
        let mut groups: HashMap<String, DatasetGroup> = HashMap::new();
        for action in scan.actions {
            groups
                .entry(action.action_id.clone())
                .or_default()
                .action = Some(action);
        }
        for q in scan.questions {
            groups
                .entry(q.action_id.clone())
                .or_default()
                .questions
                .push(q);
        }
        for o in scan.answer_options {
            groups
                .entry(o.action_id.clone())
                .or_default()
                .answer_options
                .push(o);
        }
        for d in scan.details {
            groups
                .entry(d.action_id.clone())
                .or_default()
                .details
                .push(d);
        }

        // Group rules by flow.
        let mut rule_groups: HashMap<String, Vec<FlowRule>> = HashMap::new();
        for rule in scan.rules {
            rule_groups.entry(rule.flow.clone()).or_default().push(rule);
        }

        let mut written = 0usize;
        for (action_id, group) in &groups {
            let value = serde_json::to_value(group)?;
            self.cache
                .put(CacheRecord::new(CACHE_TYPE_DATASET, action_id, value))
                .await;
            written += 1;
        }
        for (flow, rules) in &rule_groups {
            let value = serde_json::to_value(rules)?;
            self.cache
                .put(CacheRecord::new(CACHE_TYPE_DATASET_RULES, flow, value))
                .await;
            written += 1;
        }
        Ok(written)
    }

    /// Snapshot group for one action, if a rebuild has captured it.
    pub async fn lookup(&self, action_id: &str) -> Option<DatasetGroup> {
        let value = self.cache.get(CACHE_TYPE_DATASET, action_id).await?;
        match serde_json::from_value(value) {
            Ok(group) => Some(group),
            Err(e) => {
                warn!(action_id, "snapshot group failed to decode: {}", e);
                None
            }
        }
    }

    /// Snapshot rule group for one flow.
    pub async fn rules_for_flow(&self, flow: &str) -> Option<Vec<FlowRule>> {
        let value = self.cache.get(CACHE_TYPE_DATASET_RULES, flow).await?;
        match serde_json::from_value(value) {
            Ok(rules) => Some(rules),
            Err(e) => {
                warn!(flow, "snapshot rule group failed to decode: {}", e);
                None
            }
        }
    }

    /// Start the fixed-interval rebuild schedule. The first tick fires after
    /// one full interval; the startup rebuild is triggered separately so the
    /// server can come up before the store has been fully scanned.
    pub fn spawn_schedule(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                if let Err(e) = store.rebuild().await {
                    warn!("scheduled snapshot rebuild failed: {e:#}");
                }
            }
        })
    }
}
