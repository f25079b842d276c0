//! Primary store backend for questionnaire entities
//!
//! RocksDB-backed durable store. Entities live in the main database under
//! kind-prefixed composite keys; a secondary index database maps bare entity
//! ids back to their owning action (or flow) so lifecycle operations can be
//! addressed by id alone.
//!
//! Key layout, main db:
//!   `action:{action_id}`
//!   `rule:{flow}:{rule_id}`
//!   `question:{action_id}:{question_id}`
//!   `option:{action_id}:{answer_option_id}`
//!   `detail:{action_id}:{detail_id}`
//!
//! Key layout, index db:
//!   `{kind}:{entity_id}` -> owning action id (or flow for rules)

use anyhow::{anyhow, Context, Result};
use rocksdb::{IteratorMode, Options, WriteBatch, WriteOptions, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::assembler::FlatQuestionnaire;
use super::types::{Action, AnswerOption, Detail, EntityKind, FlowRule, Question};

/// Helper trait to safely iterate over RocksDB results with error logging.
/// Unlike `.flatten()` which silently ignores errors, this logs them.
trait LogErrors<T> {
    fn log_errors(self) -> impl Iterator<Item = T>;
}

impl<I, T, E> LogErrors<T> for I
where
    I: Iterator<Item = Result<T, E>>,
    E: std::fmt::Display,
{
    fn log_errors(self) -> impl Iterator<Item = T> {
        self.filter_map(|r| match r {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("RocksDB iterator error (continuing): {}", e);
                None
            }
        })
    }
}

/// Write mode for storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// fsync() on every write. Durable across power loss, 2-10ms per write.
    Sync,
    /// No fsync(), data buffered in the OS page cache, <1ms per write.
    /// Survives process crashes but not power loss before the next fsync.
    Async,
}

impl Default for WriteMode {
    fn default() -> Self {
        match std::env::var("PRASHNA_WRITE_MODE") {
            Ok(mode) if mode.to_lowercase() == "sync" => WriteMode::Sync,
            _ => WriteMode::Async,
        }
    }
}

/// Audit fields supplied by the caller of a lifecycle mutation.
#[derive(Debug, Clone)]
pub struct AuditStamp {
    pub by: String,
    pub remarks: Option<String>,
}

/// What a lifecycle mutation touched, for cache invalidation.
#[derive(Debug, Clone)]
pub struct LifecycleChange {
    pub kind: EntityKind,
    pub key: String,
    /// Action whose assembled graph must be invalidated, when the entity
    /// belongs to one.
    pub owning_action: Option<String>,
    /// Flow whose rule group must be invalidated, for rule mutations.
    pub owning_flow: Option<String>,
}

/// Full contents of the store, input to a dataset snapshot rebuild.
#[derive(Debug, Default)]
pub struct DatasetScan {
    pub actions: Vec<Action>,
    pub rules: Vec<FlowRule>,
    pub questions: Vec<Question>,
    pub answer_options: Vec<AnswerOption>,
    pub details: Vec<Detail>,
}

/// Durable store consumed by the retrieval engine.
///
/// Implementations are synchronous; callers cross the async boundary with
/// `spawn_blocking` and bound every call with the per-tier timeout.
pub trait PrimaryStore: Send + Sync {
    fn get_action(&self, action_id: &str) -> Result<Option<Action>>;
    fn questions_for_action(&self, action_id: &str) -> Result<Vec<Question>>;
    fn options_for_action(&self, action_id: &str) -> Result<Vec<AnswerOption>>;
    fn details_for_action(&self, action_id: &str) -> Result<Vec<Detail>>;

    fn rules_for_flow(&self, flow: &str) -> Result<Vec<FlowRule>>;
    fn put_rule(&self, rule: &FlowRule) -> Result<()>;

    /// Upsert every entity of one questionnaire atomically.
    fn save_questionnaire(&self, flat: &FlatQuestionnaire) -> Result<()>;

    /// Hard-delete every entity of one action. Returns false when the action
    /// does not exist. The only hard-delete path in the system.
    fn purge_action(&self, action_id: &str) -> Result<bool>;

    /// Mark one entity inactive. `Ok(None)` when the entity is unknown.
    fn soft_delete(
        &self,
        kind: EntityKind,
        key: &str,
        stamp: &AuditStamp,
    ) -> Result<Option<LifecycleChange>>;

    /// Mark one entity active again. `Ok(None)` when the entity is unknown.
    fn restore(
        &self,
        kind: EntityKind,
        key: &str,
        stamp: &AuditStamp,
    ) -> Result<Option<LifecycleChange>>;

    /// Read the entire store, grouped downstream by the snapshot rebuild.
    fn scan_all(&self) -> Result<DatasetScan>;

    /// Flush any buffered writes to disk. Called on shutdown.
    fn flush(&self) -> Result<()>;
}

/// RocksDB-backed [`PrimaryStore`].
pub struct RocksStore {
    db: Arc<DB>,
    index_db: Arc<DB>,
    storage_path: PathBuf,
    write_mode: WriteMode,
}

impl RocksStore {
    pub fn new(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_max_write_buffer_number(4);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_level_compaction_dynamic_level_bytes(true);
        opts.set_max_background_jobs(4);

        use rocksdb::{BlockBasedOptions, Cache};
        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&Cache::new_lru_cache(128 * 1024 * 1024));
        block_opts.set_cache_index_and_filter_blocks(true);
        opts.set_block_based_table_factory(&block_opts);

        let db = Arc::new(DB::open(&opts, path.join("entities"))?);
        let index_db = Arc::new(DB::open(&opts, path.join("entity_index"))?);

        let write_mode = WriteMode::default();
        tracing::info!("Primary store opened at {:?} ({:?} writes)", path, write_mode);

        Ok(Self {
            db,
            index_db,
            storage_path: path.to_path_buf(),
            write_mode,
        })
    }

    pub fn path(&self) -> &Path {
        &self.storage_path
    }

    fn write_opts(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.write_mode == WriteMode::Sync);
        write_opts
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| anyhow!("serialize failed: {e}"))
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        bincode::serde::decode_from_slice::<T, _>(bytes, bincode::config::standard())
            .map(|(v, _)| v)
            .map_err(|e| anyhow!("deserialize failed: {e}"))
    }

    fn get_decoded<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Collect every value under `prefix` in the main db.
    fn scan_prefix<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        let iter = self.db.prefix_iterator(prefix.as_bytes());
        for (key, value) in iter.log_errors() {
            // prefix_iterator seeks but does not stop at the prefix end
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            out.push(Self::decode(&value)?);
        }
        Ok(out)
    }

    fn index_put(&self, kind: EntityKind, id: &str, owner: &str) {
        let key = format!("{}:{}", kind.as_str(), id);
        if let Err(e) = self.index_db.put(key.as_bytes(), owner.as_bytes()) {
            tracing::warn!("index write failed for {}: {}", key, e);
        }
    }

    fn index_lookup(&self, kind: EntityKind, id: &str) -> Result<Option<String>> {
        let key = format!("{}:{}", kind.as_str(), id);
        Ok(self
            .index_db
            .get(key.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).to_string()))
    }

    /// Resolve the main-db key for a lifecycle target, plus its owners.
    fn locate(&self, kind: EntityKind, key: &str) -> Result<Option<(String, LifecycleChange)>> {
        let change = |owning_action: Option<String>, owning_flow: Option<String>| LifecycleChange {
            kind,
            key: key.to_string(),
            owning_action,
            owning_flow,
        };

        let located = match kind {
            EntityKind::Action => Some((
                format!("action:{key}"),
                change(Some(key.to_string()), None),
            )),
            EntityKind::FlowRule => match self.index_lookup(kind, key)? {
                Some(flow) => Some((format!("rule:{flow}:{key}"), change(None, Some(flow)))),
                None => None,
            },
            EntityKind::Question => match self.index_lookup(kind, key)? {
                Some(aid) => Some((format!("question:{aid}:{key}"), change(Some(aid), None))),
                None => None,
            },
            EntityKind::AnswerOption => match self.index_lookup(kind, key)? {
                Some(aid) => Some((format!("option:{aid}:{key}"), change(Some(aid), None))),
                None => None,
            },
            EntityKind::Detail => match self.index_lookup(kind, key)? {
                Some(aid) => Some((format!("detail:{aid}:{key}"), change(Some(aid), None))),
                None => None,
            },
        };
        Ok(located)
    }

    /// Flip the `active` flag and restamp audit on whatever entity lives at
    /// `main_key`.
    fn set_active(&self, kind: EntityKind, main_key: &str, active: bool, stamp: &AuditStamp) -> Result<bool> {
        macro_rules! flip {
            ($ty:ty) => {{
                match self.get_decoded::<$ty>(main_key)? {
                    Some(mut entity) => {
                        entity.active = active;
                        entity.audit.touch(&stamp.by, stamp.remarks.clone());
                        self.db
                            .put_opt(main_key.as_bytes(), Self::encode(&entity)?, &self.write_opts())
                            .context("lifecycle write failed")?;
                        true
                    }
                    None => false,
                }
            }};
        }

        let found = match kind {
            EntityKind::Action => flip!(Action),
            EntityKind::FlowRule => flip!(FlowRule),
            EntityKind::Question => flip!(Question),
            EntityKind::AnswerOption => flip!(AnswerOption),
            EntityKind::Detail => flip!(Detail),
        };
        Ok(found)
    }

    fn lifecycle(
        &self,
        kind: EntityKind,
        key: &str,
        active: bool,
        stamp: &AuditStamp,
    ) -> Result<Option<LifecycleChange>> {
        let Some((main_key, chg)) = self.locate(kind, key)? else {
            return Ok(None);
        };
        if self.set_active(kind, &main_key, active, stamp)? {
            Ok(Some(chg))
        } else {
            Ok(None)
        }
    }
}

impl PrimaryStore for RocksStore {
    fn get_action(&self, action_id: &str) -> Result<Option<Action>> {
        self.get_decoded(&format!("action:{action_id}"))
    }

    fn questions_for_action(&self, action_id: &str) -> Result<Vec<Question>> {
        self.scan_prefix(&format!("question:{action_id}:"))
    }

    fn options_for_action(&self, action_id: &str) -> Result<Vec<AnswerOption>> {
        self.scan_prefix(&format!("option:{action_id}:"))
    }

    fn details_for_action(&self, action_id: &str) -> Result<Vec<Detail>> {
        self.scan_prefix(&format!("detail:{action_id}:"))
    }

    fn rules_for_flow(&self, flow: &str) -> Result<Vec<FlowRule>> {
        self.scan_prefix(&format!("rule:{flow}:"))
    }

    fn put_rule(&self, rule: &FlowRule) -> Result<()> {
        let key = format!("rule:{}:{}", rule.flow, rule.rule_id);
        self.db
            .put_opt(key.as_bytes(), Self::encode(rule)?, &self.write_opts())
            .context("rule write failed")?;
        self.index_db
            .put(
                format!("{}:{}", EntityKind::FlowRule.as_str(), rule.rule_id).as_bytes(),
                rule.flow.as_bytes(),
            )
            .context("rule index write failed")?;
        Ok(())
    }

    fn save_questionnaire(&self, flat: &FlatQuestionnaire) -> Result<()> {
        let aid = &flat.action.action_id;
        let mut batch = WriteBatch::default();

        batch.put(
            format!("action:{aid}").as_bytes(),
            Self::encode(&flat.action)?,
        );
        for q in &flat.questions {
            batch.put(
                format!("question:{aid}:{}", q.question_id).as_bytes(),
                Self::encode(q)?,
            );
        }
        for o in &flat.answer_options {
            batch.put(
                format!("option:{aid}:{}", o.answer_option_id).as_bytes(),
                Self::encode(o)?,
            );
        }
        for d in &flat.details {
            batch.put(
                format!("detail:{aid}:{}", d.detail_id).as_bytes(),
                Self::encode(d)?,
            );
        }

        // One batch: the questionnaire lands whole or not at all.
        self.db
            .write_opt(batch, &self.write_opts())
            .context(format!("save failed for action {aid}"))?;

        for q in &flat.questions {
            self.index_put(EntityKind::Question, &q.question_id, aid);
        }
        for o in &flat.answer_options {
            self.index_put(EntityKind::AnswerOption, &o.answer_option_id, aid);
        }
        for d in &flat.details {
            self.index_put(EntityKind::Detail, &d.detail_id, aid);
        }
        Ok(())
    }

    fn purge_action(&self, action_id: &str) -> Result<bool> {
        if self.get_action(action_id)?.is_none() {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        batch.delete(format!("action:{action_id}").as_bytes());
        for prefix in ["question", "option", "detail"] {
            let full = format!("{prefix}:{action_id}:");
            let iter = self.db.prefix_iterator(full.as_bytes());
            for (key, _) in iter.log_errors() {
                if !key.starts_with(full.as_bytes()) {
                    break;
                }
                batch.delete(&key);
            }
        }
        self.db
            .write_opt(batch, &self.write_opts())
            .context(format!("purge failed for action {action_id}"))?;
        Ok(true)
    }

    fn soft_delete(
        &self,
        kind: EntityKind,
        key: &str,
        stamp: &AuditStamp,
    ) -> Result<Option<LifecycleChange>> {
        self.lifecycle(kind, key, false, stamp)
    }

    fn restore(
        &self,
        kind: EntityKind,
        key: &str,
        stamp: &AuditStamp,
    ) -> Result<Option<LifecycleChange>> {
        self.lifecycle(kind, key, true, stamp)
    }

    fn scan_all(&self) -> Result<DatasetScan> {
        let mut scan = DatasetScan::default();
        let iter = self.db.iterator(IteratorMode::Start);
        for (key, value) in iter.log_errors() {
            let Ok(key_str) = std::str::from_utf8(&key) else {
                continue;
            };
            let Some((prefix, _)) = key_str.split_once(':') else {
                continue;
            };
            match prefix {
                "action" => scan.actions.push(Self::decode(&value)?),
                "rule" => scan.rules.push(Self::decode(&value)?),
                "question" => scan.questions.push(Self::decode(&value)?),
                "option" => scan.answer_options.push(Self::decode(&value)?),
                "detail" => scan.details.push(Self::decode(&value)?),
                other => tracing::warn!("unknown key prefix in store: {}", other),
            }
        }
        Ok(scan)
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().context("entity db flush failed")?;
        self.index_db.flush().context("index db flush failed")?;
        Ok(())
    }
}
