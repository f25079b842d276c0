//! Read-through cache tier
//!
//! First fallback read source and the write-behind mirror target. Two
//! backends behind one interface, selected by configuration: the external
//! cache service spoken over HTTP with the `CacheRecord` envelope, or an
//! in-process map with per-entry TTL for offline and single-node deploys.
//!
//! Cache failures are never escalated. Every error on this tier is logged
//! and reported to the caller as a miss.

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::engine::types::CacheRecord;
use crate::metrics;

/// Cache service lookup envelope. The service has been observed answering
/// with either `cacheobject` or `cacheObject`; accept both.
#[derive(Debug, Deserialize)]
struct CacheLookupResponse {
    #[serde(default, alias = "cacheObject")]
    cacheobject: Option<Value>,
}

/// HTTP backend speaking the external cache-service protocol.
pub struct HttpCache {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCache {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, cachetype: &str, key: &str) -> anyhow::Result<Option<Value>> {
        let resp = self
            .client
            .post(format!("{}/cache/get", self.base_url))
            .json(&serde_json::json!({ "cachetype": cachetype, "key": key }))
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        let envelope: CacheLookupResponse = resp.json().await?;
        Ok(envelope.cacheobject)
    }

    async fn put(&self, record: &CacheRecord) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/cache/put", self.base_url))
            .json(record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete(&self, cachetype: &str, key: &str) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/cache/delete", self.base_url))
            .json(&serde_json::json!({ "cachetype": cachetype, "key": key }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// In-process backend: `(cachetype, key)` to value with per-entry TTL.
pub struct MemoryCache {
    entries: DashMap<(String, String), (Value, Instant)>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn get(&self, cachetype: &str, key: &str) -> Option<Value> {
        let map_key = (cachetype.to_string(), key.to_string());
        // The read guard must drop before the expired-entry removal: DashMap
        // will deadlock on a same-shard remove under a live Ref.
        let expired = match self.entries.get(&map_key) {
            Some(entry) if entry.1.elapsed() <= self.ttl => return Some(entry.0.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(&map_key);
        }
        None
    }

    fn put(&self, record: &CacheRecord) {
        self.entries.insert(
            (record.cachetype.clone(), record.key.clone()),
            (record.cacheobject.clone(), Instant::now()),
        );
    }

    fn delete(&self, cachetype: &str, key: &str) {
        self.entries
            .remove(&(cachetype.to_string(), key.to_string()));
    }
}

enum Backend {
    Remote(HttpCache),
    Memory(MemoryCache),
    Disabled,
}

/// Cache tier handle shared across the engine. Cheap to clone.
#[derive(Clone)]
pub struct CacheTier {
    backend: Arc<Backend>,
}

impl CacheTier {
    pub fn remote(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            backend: Arc::new(Backend::Remote(HttpCache::new(base_url, timeout)?)),
        })
    }

    pub fn memory(ttl: Duration) -> Self {
        Self {
            backend: Arc::new(Backend::Memory(MemoryCache::new(ttl))),
        }
    }

    pub fn disabled() -> Self {
        Self {
            backend: Arc::new(Backend::Disabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(*self.backend, Backend::Disabled)
    }

    /// Look up one entry. Errors surface as a miss.
    pub async fn get(&self, cachetype: &str, key: &str) -> Option<Value> {
        let result = match &*self.backend {
            Backend::Remote(http) => match http.get(cachetype, key).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(cachetype, key, "cache get failed: {e:#}");
                    metrics::CACHE_OPS_TOTAL
                        .with_label_values(&["get", "error"])
                        .inc();
                    return None;
                }
            },
            Backend::Memory(mem) => mem.get(cachetype, key),
            Backend::Disabled => return None,
        };

        let outcome = if result.is_some() { "hit" } else { "miss" };
        metrics::CACHE_OPS_TOTAL
            .with_label_values(&["get", outcome])
            .inc();
        debug!(cachetype, key, outcome, "cache get");
        result
    }

    /// Store one entry. Failures are logged and dropped.
    pub async fn put(&self, record: CacheRecord) {
        match &*self.backend {
            Backend::Remote(http) => {
                if let Err(e) = http.put(&record).await {
                    warn!(
                        cachetype = %record.cachetype,
                        key = %record.key,
                        "cache put failed: {e:#}"
                    );
                    metrics::CACHE_OPS_TOTAL
                        .with_label_values(&["put", "error"])
                        .inc();
                    return;
                }
            }
            Backend::Memory(mem) => mem.put(&record),
            Backend::Disabled => return,
        }
        metrics::CACHE_OPS_TOTAL
            .with_label_values(&["put", "ok"])
            .inc();
    }

    /// Drop one entry. Failures are logged and dropped.
    pub async fn delete(&self, cachetype: &str, key: &str) {
        match &*self.backend {
            Backend::Remote(http) => {
                if let Err(e) = http.delete(cachetype, key).await {
                    warn!(cachetype, key, "cache delete failed: {e:#}");
                    metrics::CACHE_OPS_TOTAL
                        .with_label_values(&["delete", "error"])
                        .inc();
                    return;
                }
            }
            Backend::Memory(mem) => mem.delete(cachetype, key),
            Backend::Disabled => return,
        }
        metrics::CACHE_OPS_TOTAL
            .with_label_values(&["delete", "ok"])
            .inc();
    }
}
