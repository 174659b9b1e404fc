use super::VectorStore;
use crate::config::VectorStoreConfig;
use crate::error::VectorStoreError;
use crate::types::{EmbeddingVector, VectorMetadata};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pinecone index reached over its REST data plane
pub struct PineconeVectorStore {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    namespace: String,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector<'a>>,
    namespace: &'a str,
}

#[derive(Serialize)]
struct PineconeVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a VectorMetadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: Option<usize>,
}

impl PineconeVectorStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let url = config.url.as_deref().ok_or_else(|| {
            VectorStoreError::ConnectionFailed(
                "vector_store.url (PINECONE_API_URL) is not set".to_string(),
            )
        })?;
        let api_key = config.api_key.clone().ok_or_else(|| {
            VectorStoreError::ConnectionFailed(
                "vector_store.api_key (PINECONE_API_KEY) is not set".to_string(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VectorStoreError::ConnectionFailed(e.to_string()))?;

        tracing::info!(
            "Using Pinecone index at {} (namespace '{}')",
            url,
            config.namespace
        );

        Ok(Self {
            client,
            endpoint: format!("{}/vectors/upsert", url.trim_end_matches('/')),
            api_key,
            namespace: config.namespace.clone(),
        })
    }
}

#[async_trait::async_trait]
impl VectorStore for PineconeVectorStore {
    async fn upsert(&self, vectors: Vec<EmbeddingVector>) -> Result<usize, VectorStoreError> {
        if vectors.is_empty() {
            return Ok(0);
        }

        let count = vectors.len();
        let request = UpsertRequest {
            vectors: vectors
                .iter()
                .map(|v| PineconeVector {
                    id: &v.id,
                    values: &v.values,
                    metadata: &v.metadata,
                })
                .collect(),
            namespace: &self.namespace,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| VectorStoreError::UpsertFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VectorStoreError::UpsertFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(VectorStoreError::UpsertRejected {
                status: status.as_u16(),
                body,
            });
        }

        // Older index versions answer with an empty body
        let upserted = serde_json::from_str::<UpsertResponse>(&body)
            .ok()
            .and_then(|r| r.upserted_count)
            .unwrap_or(count);

        tracing::debug!("Upserted {} vectors to Pinecone", upserted);
        Ok(upserted)
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn backend_name(&self) -> &str {
        "pinecone"
    }
}
