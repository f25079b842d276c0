//! Questionnaire resolution engine
//!
//! Core of the service: the data model, the rule matcher, the pure graph
//! assembler, the RocksDB primary store, and the resilience machinery
//! (health tracking, pending writes, tiered retrieval) that keeps reads
//! flowing while the primary is degraded.

pub mod assembler;
pub mod health;
pub mod pending;
pub mod retrieval;
pub mod rules;
pub mod storage;
pub mod types;

pub use assembler::{assemble, flatten, EntityPools, FlatQuestionnaire};
pub use health::{BreakerConfig, BreakerState, HealthTracker};
pub use pending::PendingWriteQueue;
pub use retrieval::{RetrievalEngine, RetrievalOutcome, SaveOutcome, SaveResult};
pub use storage::{AuditStamp, LifecycleChange, PrimaryStore, RocksStore};
pub use types::{
    Action, AnswerOption, AnswerOptionNode, AnswerType, Audit, CacheRecord, Condition,
    DatasetGroup, Detail, EntityKind, FlowRule, Question, QuestionNode, QuestionnaireGraph,
};
