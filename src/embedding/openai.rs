use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Embedding provider for OpenAI-compatible `/embeddings` endpoints
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
    /// Checked against every response when configured
    expected_dimension: Option<usize>,
    timeout_secs: u64,
    max_retries: u32,
    retry_base: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            EmbeddingError::InitializationFailed(
                "OPENAI_API_KEY is not set for the openai provider".to_string(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::InitializationFailed(e.to_string()))?;

        let dimension = config
            .dimension
            .unwrap_or_else(|| default_dimension(&config.model));

        tracing::info!(
            "Using OpenAI embeddings: model={}, dimension={}",
            config.model,
            dimension
        );

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dimension,
            expected_dimension: config.dimension,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            retry_base: Duration::from_secs(1),
        })
    }

    /// Override the first backoff delay (doubles per retry)
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    async fn request_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout(self.timeout_secs)
                } else {
                    EmbeddingError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EmbeddingError::RequestFailed(e.to_string()))?;

        if status.as_u16() == 429 {
            return Err(EmbeddingError::RateLimited(body));
        }

        if !status.is_success() {
            return Err(EmbeddingError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        decode_response(&body, texts.len(), self.expected_dimension)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut attempt = 0;
        loop {
            match self.request_once(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    // 1x, 2x, 4x ... the base delay, capped at 32x
                    let delay = self.retry_base * (1u32 << attempt.min(5));
                    attempt += 1;
                    tracing::warn!(
                        "Embedding request failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt,
                        self.max_retries + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn default_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

/// Decode an embeddings response, failing on any unexpected shape.
///
/// Vectors come back in input order, whatever order `data` lists them in.
fn decode_response(
    body: &str,
    expected: usize,
    dimension: Option<usize>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let response: EmbeddingResponse =
        serde_json::from_str(body).map_err(|e| EmbeddingError::Decode(e.to_string()))?;

    if response.data.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: response.data.len(),
        });
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in response.data {
        let slot = slots.get_mut(item.index).ok_or_else(|| {
            EmbeddingError::Decode(format!("embedding index {} out of range", item.index))
        })?;
        if slot.is_some() {
            return Err(EmbeddingError::Decode(format!(
                "duplicate embedding index {}",
                item.index
            )));
        }
        *slot = Some(item.embedding);
    }

    let vectors: Vec<Vec<f32>> = slots.into_iter().flatten().collect();

    if let Some(expected_dim) = dimension
        && let Some(bad) = vectors.iter().find(|v| v.len() != expected_dim)
    {
        return Err(EmbeddingError::DimensionMismatch {
            expected: expected_dim,
            actual: bad.len(),
        });
    }

    Ok(vectors)
}
