// In-memory store for dry runs and tests
pub mod memory;
pub use memory::MemoryVectorStore;

// Pinecone REST upserts (default backend)
pub mod pinecone_client;
pub use pinecone_client::PineconeVectorStore;

// Qdrant is optional (requires external server)
#[cfg(feature = "qdrant-backend")]
pub mod qdrant_client;
#[cfg(feature = "qdrant-backend")]
pub use qdrant_client::QdrantVectorStore;

use crate::config::VectorStoreConfig;
use crate::error::VectorStoreError;
use crate::types::EmbeddingVector;
use std::sync::Arc;
use std::time::Duration;

/// Trait for vector store operations
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite vectors by id, returning how many were written
    async fn upsert(&self, vectors: Vec<EmbeddingVector>) -> Result<usize, VectorStoreError>;

    /// Namespace (or collection) the vectors land in
    fn namespace(&self) -> &str;

    fn backend_name(&self) -> &str;
}

/// Batching and retry settings for [`upsert_with_retry`]
#[derive(Debug, Clone)]
pub struct UpsertPolicy {
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_base: Duration,
}

impl UpsertPolicy {
    pub fn from_config(config: &VectorStoreConfig) -> Self {
        Self {
            batch_size: config.upsert_batch_size.max(1),
            max_retries: config.max_retries,
            retry_base: Duration::from_millis(500),
        }
    }
}

impl Default for UpsertPolicy {
    fn default() -> Self {
        Self::from_config(&VectorStoreConfig::default())
    }
}

/// Upsert `vectors` in batches, retrying transient failures with backoff.
///
/// Non-retryable errors and exhausted retries fail the whole call; batches
/// written before the failure stay written.
pub async fn upsert_with_retry(
    store: &dyn VectorStore,
    vectors: Vec<EmbeddingVector>,
    policy: &UpsertPolicy,
) -> Result<usize, VectorStoreError> {
    let mut written = 0;

    for batch in vectors.chunks(policy.batch_size.max(1)) {
        let mut attempt = 0;
        loop {
            match store.upsert(batch.to_vec()).await {
                Ok(count) => {
                    written += count;
                    break;
                }
                Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                    let delay = policy.retry_base * (1u32 << attempt.min(5));
                    attempt += 1;
                    tracing::warn!(
                        "Upsert to {} failed (attempt {}/{}), retrying in {:?}: {}",
                        store.backend_name(),
                        attempt,
                        policy.max_retries + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(written)
}

/// Build the store selected by the configuration
pub fn create_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryVectorStore::new(&config.namespace))),
        "pinecone" => Ok(Arc::new(PineconeVectorStore::new(config)?)),
        #[cfg(feature = "qdrant-backend")]
        "qdrant" => Ok(Arc::new(QdrantVectorStore::new(config)?)),
        #[cfg(not(feature = "qdrant-backend"))]
        "qdrant" => Err(VectorStoreError::ConnectionFailed(
            "the qdrant backend requires building with --features qdrant-backend".to_string(),
        )),
        other => Err(VectorStoreError::ConnectionFailed(format!(
            "unknown vector store backend '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests;
