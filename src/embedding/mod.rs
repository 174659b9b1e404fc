//! Embedding providers
//!
//! The pipeline only talks to [`EmbeddingProvider`]; [`create_provider`]
//! picks the implementation named by `embedding.provider`.

#[cfg(feature = "local-embeddings")]
mod fastembed_manager;
mod openai;

#[cfg(feature = "local-embeddings")]
pub use fastembed_manager::FastEmbedManager;
pub use openai::OpenAiEmbedder;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use std::sync::Arc;

/// Trait for embedding generation
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate one embedding per text, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Generate the embedding of a single text
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }

    /// Get the dimension of the embeddings
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Build the provider selected by the configuration
pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(FastEmbedManager::from_config(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => Err(EmbeddingError::InitializationFailed(
            "local embeddings require building with --features local-embeddings".to_string(),
        )),
        other => Err(EmbeddingError::InitializationFailed(format!(
            "unknown embedding provider '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_unknown() {
        let config = EmbeddingConfig {
            provider: "davinci".to_string(),
            ..Default::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("davinci"));
    }

    #[test]
    fn test_create_openai_provider_requires_key() {
        let config = EmbeddingConfig::default();
        assert!(matches!(
            create_provider(&config),
            Err(EmbeddingError::InitializationFailed(_))
        ));
    }

    #[test]
    fn test_create_openai_provider() {
        let config = EmbeddingConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "text-embedding-ada-002");
        assert_eq!(provider.dimension(), 1536);
    }

    #[cfg(not(feature = "local-embeddings"))]
    #[test]
    fn test_local_provider_needs_feature() {
        let config = EmbeddingConfig {
            provider: "local".to_string(),
            ..Default::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("local-embeddings"));
    }
}
