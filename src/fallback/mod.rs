//! Fallback tiers: cache service, dataset snapshot, cold stores
//!
//! Everything in this module is derivable from the primary store and owns
//! no authoritative data. Failures here degrade freshness, never
//! correctness of the write path.

pub mod cache;
pub mod cold;
pub mod snapshot;

pub use cache::CacheTier;
pub use cold::{ColdStore, LocalFileStore, ObjectStorageStore};
pub use snapshot::SnapshotStore;
