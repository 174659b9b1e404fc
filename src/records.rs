//! Repository record store
//!
//! The indexer only reads a record to find its URL and writes back the final
//! status. [`JsonRepositoryStore`] keeps the records in a JSON file.

use crate::error::RecordStoreError;
use crate::types::{IndexingStatus, Repository};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Trait for repository record access
#[async_trait::async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Read one repository by identifier
    async fn get(&self, id: &str) -> Result<Repository, RecordStoreError>;

    /// Set the indexing status of a repository
    async fn set_status(&self, id: &str, status: IndexingStatus) -> Result<(), RecordStoreError>;
}

/// Records kept in memory and persisted to a JSON array on every change
pub struct JsonRepositoryStore {
    path: Option<PathBuf>,
    records: RwLock<Vec<Repository>>,
}

impl JsonRepositoryStore {
    /// Load records from `path`; a missing file starts an empty store
    pub async fn open(path: &Path) -> Result<Self, RecordStoreError> {
        let records: Vec<Repository> = load_json(path).await?.unwrap_or_default();
        tracing::info!(
            "Loaded {} repository records from {}",
            records.len(),
            path.display()
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            records: RwLock::new(records),
        })
    }

    /// A store that is never written to disk
    pub fn in_memory(records: Vec<Repository>) -> Self {
        Self {
            path: None,
            records: RwLock::new(records),
        }
    }

    /// Insert a record, replacing any record with the same id
    pub async fn insert(&self, repository: Repository) -> Result<(), RecordStoreError> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == repository.id) {
            Some(existing) => *existing = repository,
            None => records.push(repository),
        }
        self.persist(&records).await
    }

    async fn persist(&self, records: &[Repository]) -> Result<(), RecordStoreError> {
        match &self.path {
            Some(path) => save_json_atomic(path, &records).await,
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl RepositoryStore for JsonRepositoryStore {
    async fn get(&self, id: &str) -> Result<Repository, RecordStoreError> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| RecordStoreError::NotFound(id.to_string()))
    }

    async fn set_status(&self, id: &str, status: IndexingStatus) -> Result<(), RecordStoreError> {
        // Hold the write lock across the save so updates persist in order
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RecordStoreError::NotFound(id.to_string()))?;

        tracing::info!(
            "Repository {} status: {} -> {}",
            id,
            record.indexing_status,
            status
        );
        record.indexing_status = status;

        self.persist(&records).await
    }
}

/// Read a JSON document, `None` when the file does not exist
pub(crate) async fn load_json<T: DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, RecordStoreError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("{} not found, starting empty", path.display());
            return Ok(None);
        }
        Err(e) => {
            return Err(RecordStoreError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            });
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| RecordStoreError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Write a JSON document through a temporary file and a rename
pub(crate) async fn save_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), RecordStoreError> {
    let fail = |reason: String| RecordStoreError::SaveFailed {
        path: path.display().to_string(),
        reason,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| fail(e.to_string()))?;
    }

    let content = serde_json::to_string_pretty(value).map_err(|e| fail(e.to_string()))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| fail(e.to_string()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| fail(e.to_string()))?;

    tracing::debug!("Saved {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo(id: &str) -> Repository {
        Repository {
            id: id.to_string(),
            name: format!("repo-{}", id),
            url: format!("https://example.com/{}.git", id),
            indexing_status: IndexingStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_get_and_missing() {
        let store = JsonRepositoryStore::in_memory(vec![repo("r1")]);

        assert_eq!(store.get("r1").await.unwrap().url, "https://example.com/r1.git");
        assert!(matches!(
            store.get("r2").await,
            Err(RecordStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_status() {
        let store = JsonRepositoryStore::in_memory(vec![repo("r1")]);
        store.set_status("r1", IndexingStatus::Indexed).await.unwrap();
        assert_eq!(
            store.get("r1").await.unwrap().indexing_status,
            IndexingStatus::Indexed
        );

        assert!(store.set_status("nope", IndexingStatus::Indexed).await.is_err());
    }

    #[tokio::test]
    async fn test_status_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("repositories.json");

        let store = JsonRepositoryStore::open(&path).await.unwrap();
        assert!(store.get("r1").await.is_err());
        store.insert(repo("r1")).await.unwrap();
        store.set_status("r1", IndexingStatus::Failed).await.unwrap();

        let reopened = JsonRepositoryStore::open(&path).await.unwrap();
        let record = reopened.get("r1").await.unwrap();
        assert_eq!(record.indexing_status, IndexingStatus::Failed);
        assert!(!dir.path().join("nested").join("repositories.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_insert_replaces_same_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repositories.json");
        let store = JsonRepositoryStore::open(&path).await.unwrap();
        store.insert(repo("r1")).await.unwrap();

        let mut updated = repo("r1");
        updated.url = "https://example.com/moved.git".to_string();
        store.insert(updated).await.unwrap();

        assert_eq!(store.get("r1").await.unwrap().url, "https://example.com/moved.git");
        let saved: Vec<Repository> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.len(), 1);
    }

    #[tokio::test]
    async fn test_open_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repositories.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            JsonRepositoryStore::open(&path).await,
            Err(RecordStoreError::LoadFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_reads_records_written_by_hand() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repositories.json");
        std::fs::write(
            &path,
            r#"[{"id": "r1", "name": "docs", "url": "https://example.com/docs.git", "status": "pending"}]"#,
        )
        .unwrap();

        let store = JsonRepositoryStore::open(&path).await.unwrap();
        assert_eq!(store.get("r1").await.unwrap().name, "docs");
    }
}
