use super::VectorStore;
use crate::config::VectorStoreConfig;
use crate::error::VectorStoreError;
use crate::types::EmbeddingVector;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Qdrant collection used as a vector store; the namespace is the collection
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    initialized: OnceCell<()>,
}

impl QdrantVectorStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let url = config.url.as_deref().unwrap_or("http://localhost:6334");
        tracing::info!("Connecting to Qdrant at {}", url);

        let mut builder = Qdrant::from_url(url);
        if let Some(key) = &config.api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.namespace.clone(),
            initialized: OnceCell::new(),
        })
    }

    /// Create the collection on first use, sized to the first vector seen
    async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorStoreError> {
        self.initialized
            .get_or_try_init(|| self.create_if_missing(dimension))
            .await
            .map(|_| ())
    }

    async fn create_if_missing(&self, dimension: usize) -> Result<(), VectorStoreError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| VectorStoreError::ConnectionFailed(e.to_string()))?;

        if exists {
            tracing::info!("Collection '{}' already exists", self.collection);
            return Ok(());
        }

        tracing::info!(
            "Creating collection '{}' with dimension {}",
            self.collection,
            dimension
        );

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| VectorStoreError::CollectionCreationFailed {
                collection: self.collection.clone(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

/// Qdrant only accepts integer or UUID point ids
pub fn point_id(vector_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, vector_id.as_bytes()).to_string()
}

fn to_point(vector: EmbeddingVector) -> Result<PointStruct, VectorStoreError> {
    let payload: Payload = json!({
        "id": vector.id,
        "text": vector.metadata.text,
        "commit_id": vector.metadata.commit_id,
        "repository_url": vector.metadata.repository_url,
        "author": vector.metadata.author,
        "chunk_index": vector.metadata.chunk_index,
    })
    .try_into()
    .map_err(|e: qdrant_client::QdrantError| VectorStoreError::InvalidPayload(e.to_string()))?;

    Ok(PointStruct::new(point_id(&vector.id), vector.values, payload))
}

#[async_trait::async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(&self, vectors: Vec<EmbeddingVector>) -> Result<usize, VectorStoreError> {
        let Some(first) = vectors.first() else {
            return Ok(0);
        };
        self.ensure_collection(first.values.len()).await?;

        let count = vectors.len();
        let points = vectors
            .into_iter()
            .map(to_point)
            .collect::<Result<Vec<_>, _>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| VectorStoreError::UpsertFailed(e.to_string()))?;

        tracing::debug!("Upserted {} points to '{}'", count, self.collection);
        Ok(count)
    }

    fn namespace(&self) -> &str {
        &self.collection
    }

    fn backend_name(&self) -> &str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_stable_uuid() {
        let a = point_id("e531c61632f0d4382c7d53213b7a8dfc36351cf9");
        let b = point_id("e531c61632f0d4382c7d53213b7a8dfc36351cf9");
        let c = point_id("e531c61632f0d4382c7d53213b7a8dfc36351cf9-1");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[tokio::test]
    async fn test_client_builds_without_connecting() {
        let config = VectorStoreConfig {
            backend: "qdrant".to_string(),
            url: Some("http://localhost:6334".to_string()),
            ..Default::default()
        };
        let store = QdrantVectorStore::new(&config).unwrap();
        assert_eq!(store.namespace(), "commits");
        assert_eq!(store.backend_name(), "qdrant");
    }
}
