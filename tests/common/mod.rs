//! Shared test fixtures
//!
//! `MemoryStore` is an in-memory [`PrimaryStore`] with a failure toggle so
//! the resilience tests can force an outage without a real database, plus a
//! save log for FIFO/exactly-once assertions.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prashna::engine::assembler::FlatQuestionnaire;
use prashna::engine::storage::{
    AuditStamp, DatasetScan, LifecycleChange, PrimaryStore,
};
use prashna::engine::types::{
    Action, AnswerOption, AnswerOptionNode, AnswerType, Audit, Condition, Detail, EntityKind,
    FlowRule, Question, QuestionNode, QuestionnaireGraph,
};

// =============================================================================
// IN-MEMORY PRIMARY STORE WITH FAILURE INJECTION
// =============================================================================

#[derive(Default)]
pub struct MemoryStore {
    pub actions: DashMap<String, Action>,
    pub rules: DashMap<String, FlowRule>,
    pub questions: DashMap<String, Question>,
    pub options: DashMap<String, AnswerOption>,
    pub details: DashMap<String, Detail>,
    failing: AtomicBool,
    pub calls: AtomicUsize,
    /// Action ids in the order saves were applied.
    pub save_log: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(anyhow!("injected store outage"))
        } else {
            Ok(())
        }
    }

    /// Seed entities directly, bypassing the failure toggle. Sub-entities
    /// are keyed `{action_id}:{entity_id}` like the real store.
    pub fn seed(&self, flat: &FlatQuestionnaire) {
        let aid = &flat.action.action_id;
        self.actions.insert(aid.clone(), flat.action.clone());
        for q in &flat.questions {
            self.questions
                .insert(format!("{aid}:{}", q.question_id), q.clone());
        }
        for o in &flat.answer_options {
            self.options
                .insert(format!("{aid}:{}", o.answer_option_id), o.clone());
        }
        for d in &flat.details {
            self.details
                .insert(format!("{aid}:{}", d.detail_id), d.clone());
        }
    }

    /// Fetch one question row by bare id, wherever it lives.
    pub fn question_row(&self, question_id: &str) -> Option<Question> {
        self.questions
            .iter()
            .find(|q| q.question_id == question_id)
            .map(|q| q.clone())
    }
}

impl PrimaryStore for MemoryStore {
    fn get_action(&self, action_id: &str) -> Result<Option<Action>> {
        self.check()?;
        Ok(self.actions.get(action_id).map(|a| a.clone()))
    }

    fn questions_for_action(&self, action_id: &str) -> Result<Vec<Question>> {
        self.check()?;
        Ok(self
            .questions
            .iter()
            .filter(|q| q.action_id == action_id)
            .map(|q| q.clone())
            .collect())
    }

    fn options_for_action(&self, action_id: &str) -> Result<Vec<AnswerOption>> {
        self.check()?;
        Ok(self
            .options
            .iter()
            .filter(|o| o.action_id == action_id)
            .map(|o| o.clone())
            .collect())
    }

    fn details_for_action(&self, action_id: &str) -> Result<Vec<Detail>> {
        self.check()?;
        Ok(self
            .details
            .iter()
            .filter(|d| d.action_id == action_id)
            .map(|d| d.clone())
            .collect())
    }

    fn rules_for_flow(&self, flow: &str) -> Result<Vec<FlowRule>> {
        self.check()?;
        Ok(self
            .rules
            .iter()
            .filter(|r| r.flow == flow)
            .map(|r| r.clone())
            .collect())
    }

    fn put_rule(&self, rule: &FlowRule) -> Result<()> {
        self.check()?;
        self.rules
            .insert(format!("{}:{}", rule.flow, rule.rule_id), rule.clone());
        Ok(())
    }

    fn save_questionnaire(&self, flat: &FlatQuestionnaire) -> Result<()> {
        self.check()?;
        self.seed(flat);
        self.save_log.lock().push(flat.action.action_id.clone());
        Ok(())
    }

    fn purge_action(&self, action_id: &str) -> Result<bool> {
        self.check()?;
        let found = self.actions.remove(action_id).is_some();
        self.questions.retain(|_, q| q.action_id != action_id);
        self.options.retain(|_, o| o.action_id != action_id);
        self.details.retain(|_, d| d.action_id != action_id);
        Ok(found)
    }

    fn soft_delete(
        &self,
        kind: EntityKind,
        key: &str,
        stamp: &AuditStamp,
    ) -> Result<Option<LifecycleChange>> {
        self.set_active(kind, key, false, stamp)
    }

    fn restore(
        &self,
        kind: EntityKind,
        key: &str,
        stamp: &AuditStamp,
    ) -> Result<Option<LifecycleChange>> {
        self.set_active(kind, key, true, stamp)
    }

    fn scan_all(&self) -> Result<DatasetScan> {
        self.check()?;
        Ok(DatasetScan {
            actions: self.actions.iter().map(|a| a.clone()).collect(),
            rules: self.rules.iter().map(|r| r.clone()).collect(),
            questions: self.questions.iter().map(|q| q.clone()).collect(),
            answer_options: self.options.iter().map(|o| o.clone()).collect(),
            details: self.details.iter().map(|d| d.clone()).collect(),
        })
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

impl MemoryStore {
    fn set_active(
        &self,
        kind: EntityKind,
        key: &str,
        active: bool,
        stamp: &AuditStamp,
    ) -> Result<Option<LifecycleChange>> {
        self.check()?;
        let change = |owning_action: Option<String>| {
            Some(LifecycleChange {
                kind,
                key: key.to_string(),
                owning_action,
                owning_flow: None,
            })
        };
        // Sub-entities are addressed by bare id; resolve the composite map
        // key first, mirroring the real store's id index.
        match kind {
            EntityKind::Action => match self.actions.get_mut(key) {
                Some(mut a) => {
                    a.active = active;
                    a.audit.touch(&stamp.by, stamp.remarks.clone());
                    Ok(change(Some(key.to_string())))
                }
                None => Ok(None),
            },
            EntityKind::Question => {
                let found = self
                    .questions
                    .iter()
                    .find(|q| q.question_id == key)
                    .map(|q| q.key().clone());
                match found {
                    Some(map_key) => {
                        let mut q = self.questions.get_mut(&map_key).unwrap();
                        q.active = active;
                        q.audit.touch(&stamp.by, stamp.remarks.clone());
                        Ok(change(Some(q.action_id.clone())))
                    }
                    None => Ok(None),
                }
            }
            EntityKind::AnswerOption => {
                let found = self
                    .options
                    .iter()
                    .find(|o| o.answer_option_id == key)
                    .map(|o| o.key().clone());
                match found {
                    Some(map_key) => {
                        let mut o = self.options.get_mut(&map_key).unwrap();
                        o.active = active;
                        o.audit.touch(&stamp.by, stamp.remarks.clone());
                        Ok(change(Some(o.action_id.clone())))
                    }
                    None => Ok(None),
                }
            }
            EntityKind::Detail => {
                let found = self
                    .details
                    .iter()
                    .find(|d| d.detail_id == key)
                    .map(|d| d.key().clone());
                match found {
                    Some(map_key) => {
                        let mut d = self.details.get_mut(&map_key).unwrap();
                        d.active = active;
                        d.audit.touch(&stamp.by, stamp.remarks.clone());
                        Ok(change(Some(d.action_id.clone())))
                    }
                    None => Ok(None),
                }
            }
            EntityKind::FlowRule => {
                let found = self
                    .rules
                    .iter()
                    .find(|r| r.rule_id == key)
                    .map(|r| r.key().clone());
                match found {
                    Some(map_key) => {
                        let mut r = self.rules.get_mut(&map_key).unwrap();
                        r.active = active;
                        r.audit.touch(&stamp.by, stamp.remarks.clone());
                        let flow = r.flow.clone();
                        Ok(Some(LifecycleChange {
                            kind,
                            key: key.to_string(),
                            owning_action: None,
                            owning_flow: Some(flow),
                        }))
                    }
                    None => Ok(None),
                }
            }
        }
    }
}

// =============================================================================
// FIXTURE BUILDERS
// =============================================================================

pub fn question(id: &str, action_id: &str, text: &str, option_ids: &[&str], seq: u32) -> Question {
    Question {
        question_id: id.to_string(),
        action_id: action_id.to_string(),
        question_text: text.to_string(),
        answer_type: AnswerType::SingleSelect,
        validation: None,
        answer_option_ids: option_ids.iter().map(|s| s.to_string()).collect(),
        sequence_id: Some(seq),
        active: true,
        audit: Audit::default(),
    }
}

pub fn answer_option(
    id: &str,
    question_id: &str,
    action_id: &str,
    text: &str,
    seq: u32,
    related: &[&str],
) -> AnswerOption {
    AnswerOption {
        answer_option_id: id.to_string(),
        question_id: question_id.to_string(),
        action_id: action_id.to_string(),
        option_text: text.to_string(),
        option_value: None,
        sequence_id: Some(seq),
        related_question_ids: related.iter().map(|s| s.to_string()).collect(),
        active: true,
        audit: Audit::default(),
    }
}

pub fn detail(id: &str, action_id: &str, title: &str, seq: u32) -> Detail {
    Detail {
        detail_id: id.to_string(),
        action_id: action_id.to_string(),
        title: title.to_string(),
        instructions: Some("Read carefully".to_string()),
        helper_text: None,
        footer: None,
        page_number: 1,
        sequence_id: Some(seq),
        active: true,
        audit: Audit::default(),
    }
}

pub fn flow_rule(flow: &str, rule_id: &str, attr: &str, value: &str, salience: i32, action: &str) -> FlowRule {
    FlowRule {
        flow: flow.to_string(),
        rule_id: rule_id.to_string(),
        rule_name: format!("rule {rule_id}"),
        condition: Condition {
            attribute: attr.to_string(),
            equals: value.to_string(),
        },
        lob: None,
        salience,
        action_id: action.to_string(),
        active: true,
        audit: Audit::default(),
    }
}

/// Two questions (one with a nested follow-up) and one detail panel.
pub fn sample_graph(action_id: &str) -> QuestionnaireGraph {
    QuestionnaireGraph {
        action_id: action_id.to_string(),
        action_text: "Pre-visit screening".to_string(),
        questions: vec![
            QuestionNode {
                question: question("q1", action_id, "Any allergies?", &["o1", "o2"], 1),
                answer_options: vec![
                    AnswerOptionNode {
                        option: answer_option("o1", "q1", action_id, "Yes", 1, &["q3"]),
                        related_questions: vec![QuestionNode {
                            question: question("q3", action_id, "Which ones?", &[], 1),
                            answer_options: vec![],
                        }],
                    },
                    AnswerOptionNode {
                        option: answer_option("o2", "q1", action_id, "No", 2, &[]),
                        related_questions: vec![],
                    },
                ],
            },
            QuestionNode {
                question: question("q2", action_id, "Age?", &[], 2),
                answer_options: vec![],
            },
        ],
        details: vec![detail("d1", action_id, "Before you arrive", 1)],
    }
}

// =============================================================================
// ENGINE HARNESS
// =============================================================================

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub cache: prashna::fallback::CacheTier,
    pub engine: prashna::engine::RetrievalEngine,
}

/// Engine over a `MemoryStore`, an in-process cache tier, and the given
/// cold stores. The returned cache handle is a clone of the tier the engine
/// uses, so tests can observe mirroring and invalidation directly.
pub fn harness(
    breaker: prashna::engine::BreakerConfig,
    cold: Vec<prashna::fallback::ColdStore>,
) -> Harness {
    use prashna::engine::{HealthTracker, PendingWriteQueue, RetrievalEngine};
    use prashna::fallback::{CacheTier, SnapshotStore};

    let store = MemoryStore::new();
    let primary: Arc<dyn PrimaryStore> = store.clone();
    let cache = CacheTier::memory(Duration::from_secs(300));
    let snapshot = Arc::new(SnapshotStore::new(Arc::clone(&primary), cache.clone()));
    let engine = RetrievalEngine::new(
        primary,
        cache.clone(),
        snapshot,
        cold,
        Arc::new(HealthTracker::new(breaker)),
        Arc::new(PendingWriteQueue::new()),
        Duration::from_millis(500),
    );
    Harness {
        store,
        cache,
        engine,
    }
}

/// Breaker tuning used across the resilience tests: small window, fast
/// cooldown, trips after two failures.
pub fn fast_breaker() -> prashna::engine::BreakerConfig {
    prashna::engine::BreakerConfig {
        window: Duration::from_secs(10),
        failure_rate_threshold: 0.5,
        min_samples: 2,
        cooldown: Duration::from_millis(50),
    }
}

/// Poll `check` until it returns true or the timeout elapses.
pub async fn wait_for<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Async variant of [`wait_for`] for checks that must await (cache reads,
/// cold-store fetches).
pub async fn wait_for_async<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check().await
}
