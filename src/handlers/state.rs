//! Service state: wiring the engine together from configuration

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::{CacheMode, ServerConfig};
use crate::engine::health::HealthTracker;
use crate::engine::pending::PendingWriteQueue;
use crate::engine::retrieval::RetrievalEngine;
use crate::engine::storage::{PrimaryStore, RocksStore};
use crate::fallback::cache::CacheTier;
use crate::fallback::cold::{ColdStore, LocalFileStore, ObjectStorageStore};
use crate::fallback::snapshot::SnapshotStore;

/// Application state type alias
pub type AppState = Arc<ServiceState>;

pub struct ServiceState {
    pub engine: RetrievalEngine,
    pub config: ServerConfig,
    started_at: std::time::Instant,
}

impl ServiceState {
    /// Build the full tier stack from configuration.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let primary: Arc<dyn PrimaryStore> =
            Arc::new(RocksStore::new(&config.data_dir.join("store"))?);

        let cache = match (config.cache.mode, config.cache.base_url.as_deref()) {
            (CacheMode::Remote, Some(url)) => {
                info!("cache tier: remote service at {}", url);
                CacheTier::remote(url, config.cache.timeout)?
            }
            (CacheMode::Remote, None) | (CacheMode::Off, _) => {
                info!("cache tier: disabled");
                CacheTier::disabled()
            }
            (CacheMode::Memory, _) => {
                info!("cache tier: in-process (ttl {:?})", config.cache.ttl);
                CacheTier::memory(config.cache.ttl)
            }
        };

        let snapshot = Arc::new(SnapshotStore::new(Arc::clone(&primary), cache.clone()));

        // Attempt order is build order: object storage before local file.
        let mut cold = Vec::new();
        if config.object_store.enabled {
            cold.push(ColdStore::Object(ObjectStorageStore::new(
                &config.object_store.endpoint,
                &config.object_store.bucket,
                config.object_store.timeout,
            )?));
        }
        if config.file_store.enabled {
            cold.push(ColdStore::File(LocalFileStore::new(&config.file_store.dir)?));
        }

        let health = Arc::new(HealthTracker::new(config.breaker.clone()));
        let pending = Arc::new(PendingWriteQueue::new());

        let engine = RetrievalEngine::new(
            primary,
            cache,
            snapshot,
            cold,
            health,
            pending,
            config.primary_timeout,
        );

        Ok(Self {
            engine,
            config,
            started_at: std::time::Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Flush the primary store to disk. Called on shutdown.
    pub fn flush(&self) -> Result<()> {
        self.engine.flush_primary()
    }
}
