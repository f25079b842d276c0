//! Prashna Library
//!
//! Resilient questionnaire resolution engine for scheduling flows.
//!
//! # Key Features
//! - Rule matching: flow + context attributes to an action id, salience
//!   ordered, first match wins
//! - Recursive questionnaire assembly (questions, answer options, nested
//!   follow-ups, detail panels) preserving authoring order
//! - Layered resilient retrieval: RocksDB primary, read-through cache,
//!   dataset snapshot, cold object-storage/file fallbacks
//! - Circuit-breaker health tracking and FIFO write replay after outages

pub mod auth;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod fallback;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod validation;

#[cfg(feature = "telemetry")]
pub mod tracing_setup;

// Re-export dependencies so tests and benchmarks use the same versions
pub use chrono;
pub use parking_lot;
pub use uuid;
