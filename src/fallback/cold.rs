//! Cold fallback stores: slow, durable, last-resort read sources
//!
//! Consulted only when the primary store and the whole cache tier have
//! failed. One interface, two backends selected by configuration: an
//! S3-style object-storage bucket reached over HTTP, and a local directory
//! of one JSON file per action. Either can be disabled independently; the
//! configured order is the attempt order.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::types::QuestionnaireGraph;

/// Object-storage backend: `GET/PUT {endpoint}/{bucket}/{action_id}.json`.
pub struct ObjectStorageStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
}

impl ObjectStorageStore {
    pub fn new(endpoint: &str, bucket: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
        })
    }

    fn blob_url(&self, action_id: &str) -> String {
        format!("{}/{}/{}.json", self.endpoint, self.bucket, action_id)
    }

    async fn fetch(&self, action_id: &str) -> anyhow::Result<Option<QuestionnaireGraph>> {
        let resp = self.client.get(self.blob_url(action_id)).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let graph = resp.error_for_status()?.json().await?;
        Ok(Some(graph))
    }

    async fn store(&self, graph: &QuestionnaireGraph) -> anyhow::Result<()> {
        self.client
            .put(self.blob_url(&graph.action_id))
            .json(graph)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete(&self, action_id: &str) -> anyhow::Result<()> {
        let resp = self.client.delete(self.blob_url(action_id)).send().await?;
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            resp.error_for_status()?;
        }
        Ok(())
    }
}

/// Local-file backend: `{data_dir}/{action_id}.json`, one file per action,
/// same JSON shape as the primary response DTO. The directory listing is the
/// only index; it is walked once at startup to warm an in-memory copy.
pub struct LocalFileStore {
    dir: PathBuf,
    warm: DashMap<String, QuestionnaireGraph>,
}

impl LocalFileStore {
    pub fn new(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            warm: DashMap::new(),
        })
    }

    fn file_path(&self, action_id: &str) -> PathBuf {
        self.dir.join(format!("{action_id}.json"))
    }

    /// Walk the directory and load every questionnaire into memory.
    /// Unparseable files are skipped, not fatal.
    pub async fn warm_from_disk(&self) -> anyhow::Result<usize> {
        let mut loaded = 0usize;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<QuestionnaireGraph>(&bytes) {
                    Ok(graph) => {
                        self.warm.insert(graph.action_id.clone(), graph);
                        loaded += 1;
                    }
                    Err(e) => warn!(?path, "skipping unreadable fallback file: {}", e),
                },
                Err(e) => warn!(?path, "skipping unreadable fallback file: {}", e),
            }
        }
        info!(loaded, dir = ?self.dir, "file fallback warmed from disk");
        Ok(loaded)
    }

    async fn fetch(&self, action_id: &str) -> anyhow::Result<Option<QuestionnaireGraph>> {
        if let Some(graph) = self.warm.get(action_id) {
            return Ok(Some(graph.clone()));
        }
        match tokio::fs::read(self.file_path(action_id)).await {
            Ok(bytes) => {
                let graph: QuestionnaireGraph = serde_json::from_slice(&bytes)?;
                self.warm.insert(action_id.to_string(), graph.clone());
                Ok(Some(graph))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, graph: &QuestionnaireGraph) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(graph)?;
        tokio::fs::write(self.file_path(&graph.action_id), bytes).await?;
        self.warm.insert(graph.action_id.clone(), graph.clone());
        Ok(())
    }

    async fn delete(&self, action_id: &str) -> anyhow::Result<()> {
        self.warm.remove(action_id);
        match tokio::fs::remove_file(self.file_path(action_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// One cold-store interface over the configured backends.
pub enum ColdStore {
    Object(ObjectStorageStore),
    File(LocalFileStore),
}

impl ColdStore {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Object(_) => "object_storage",
            Self::File(_) => "local_file",
        }
    }

    /// Startup warm-up. Only the file backend has state to rebuild.
    pub async fn warm(&self) {
        if let Self::File(store) = self {
            if let Err(e) = store.warm_from_disk().await {
                warn!("file fallback warm-up failed: {e:#}");
            }
        }
    }

    /// Read one questionnaire. Errors are reported as misses; by the time a
    /// cold store is consulted there is no healthier tier to escalate to.
    pub async fn fetch(&self, action_id: &str) -> Option<QuestionnaireGraph> {
        let result = match self {
            Self::Object(s) => s.fetch(action_id).await,
            Self::File(s) => s.fetch(action_id).await,
        };
        match result {
            Ok(hit) => {
                debug!(tier = self.name(), action_id, hit = hit.is_some(), "cold fetch");
                hit
            }
            Err(e) => {
                warn!(tier = self.name(), action_id, "cold fetch failed: {e:#}");
                None
            }
        }
    }

    /// Mirror one questionnaire. Best effort, failures logged only.
    pub async fn store(&self, graph: &QuestionnaireGraph) {
        let result = match self {
            Self::Object(s) => s.store(graph).await,
            Self::File(s) => s.store(graph).await,
        };
        if let Err(e) = result {
            warn!(tier = self.name(), action_id = %graph.action_id, "cold store failed: {e:#}");
        }
    }

    /// Remove one questionnaire. Best effort, failures logged only.
    pub async fn delete(&self, action_id: &str) {
        let result = match self {
            Self::Object(s) => s.delete(action_id).await,
            Self::File(s) => s.delete(action_id).await,
        };
        if let Err(e) = result {
            warn!(tier = self.name(), action_id, "cold delete failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn graph(action_id: &str) -> QuestionnaireGraph {
        QuestionnaireGraph {
            action_id: action_id.to_string(),
            action_text: "Screening".to_string(),
            questions: vec![],
            details: vec![],
        }
    }

    #[tokio::test]
    async fn file_store_round_trips_one_file_per_action() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(dir.path()).unwrap();

        store.store(&graph("act1")).await.unwrap();
        assert!(dir.path().join("act1.json").exists());

        let fetched = store.fetch("act1").await.unwrap().unwrap();
        assert_eq!(fetched.action_id, "act1");
        assert!(store.fetch("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn directory_listing_rebuilds_warm_cache() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalFileStore::new(dir.path()).unwrap();
            store.store(&graph("act1")).await.unwrap();
            store.store(&graph("act2")).await.unwrap();
        }

        // Fresh instance over the same directory: only the listing exists.
        let store = LocalFileStore::new(dir.path()).unwrap();
        let loaded = store.warm_from_disk().await.unwrap();
        assert_eq!(loaded, 2);
        assert!(store.fetch("act2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unparseable_files_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("junk.json"), b"not json")
            .await
            .unwrap();
        let store = LocalFileStore::new(dir.path()).unwrap();
        store.store(&graph("act1")).await.unwrap();

        let loaded = store.warm_from_disk().await.unwrap();
        assert_eq!(loaded, 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = ColdStore::File(LocalFileStore::new(dir.path()).unwrap());
        store.store(&graph("act1")).await;
        store.delete("act1").await;
        store.delete("act1").await;
        assert!(store.fetch("act1").await.is_none());
    }
}
