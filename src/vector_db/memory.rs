use super::VectorStore;
use crate::error::VectorStoreError;
use crate::types::EmbeddingVector;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Vector store keeping everything in a map keyed by vector id
pub struct MemoryVectorStore {
    namespace: String,
    vectors: RwLock<HashMap<String, EmbeddingVector>>,
    upsert_calls: AtomicUsize,
}

impl MemoryVectorStore {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            vectors: RwLock::new(HashMap::new()),
            upsert_calls: AtomicUsize::new(0),
        }
    }

    pub async fn len(&self) -> usize {
        self.vectors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.vectors.read().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<EmbeddingVector> {
        self.vectors.read().await.get(id).cloned()
    }

    /// Stored ids, sorted
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.vectors.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of upsert calls received
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, vectors: Vec<EmbeddingVector>) -> Result<usize, VectorStoreError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let count = vectors.len();
        let mut stored = self.vectors.write().await;
        for vector in vectors {
            stored.insert(vector.id.clone(), vector);
        }

        tracing::debug!("Stored {} vectors in memory ({} total)", count, stored.len());
        Ok(count)
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
