use crate::error::RecordStoreError;
use crate::records::{load_json, save_json_atomic};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// repository url -> branch -> commit hash
type Checkpoints = HashMap<String, HashMap<String, String>>;

/// Per-branch resume points for interrupted runs
pub struct CheckpointStore {
    path: Option<PathBuf>,
    checkpoints: RwLock<Checkpoints>,
}

impl CheckpointStore {
    /// Load checkpoints from `path`; a missing file starts empty
    pub async fn open(path: &Path) -> Result<Self, RecordStoreError> {
        let checkpoints: Checkpoints = load_json(path).await?.unwrap_or_default();
        if !checkpoints.is_empty() {
            tracing::info!(
                "Loaded checkpoints for {} repositories from {}",
                checkpoints.len(),
                path.display()
            );
        }

        Ok(Self {
            path: Some(path.to_path_buf()),
            checkpoints: RwLock::new(checkpoints),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            checkpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Stored checkpoint for a branch
    pub async fn get(&self, url: &str, branch: &str) -> Option<String> {
        self.checkpoints
            .read()
            .await
            .get(url)
            .and_then(|branches| branches.get(branch))
            .cloned()
    }

    /// Record the commit a branch should resume from
    pub async fn set(&self, url: &str, branch: &str, hash: &str) -> Result<(), RecordStoreError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints
            .entry(url.to_string())
            .or_default()
            .insert(branch.to_string(), hash.to_string());

        tracing::info!("Checkpoint for {} [{}] set to {}", url, branch, hash);
        self.persist(&checkpoints).await
    }

    /// Forget a branch's checkpoint once it has been fully traversed
    pub async fn clear(&self, url: &str, branch: &str) -> Result<(), RecordStoreError> {
        let mut checkpoints = self.checkpoints.write().await;

        let Some(branches) = checkpoints.get_mut(url) else {
            return Ok(());
        };
        if branches.remove(branch).is_none() {
            return Ok(());
        }
        if branches.is_empty() {
            checkpoints.remove(url);
        }

        tracing::debug!("Cleared checkpoint for {} [{}]", url, branch);
        self.persist(&checkpoints).await
    }

    async fn persist(&self, checkpoints: &Checkpoints) -> Result<(), RecordStoreError> {
        match &self.path {
            Some(path) => save_json_atomic(path, checkpoints).await,
            None => Ok(()),
        }
    }
}
