use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};

/// Local embedding provider backed by FastEmbed
pub struct FastEmbedManager {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedManager {
    /// Create a new FastEmbedManager with the default model (all-MiniLM-L6-v2)
    pub fn new() -> Result<Self, EmbeddingError> {
        Self::with_model(EmbeddingModel::AllMiniLML6V2)
    }

    /// Pick the model named in the configuration
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model = model_for_name(&config.model).unwrap_or_else(|| {
            tracing::warn!(
                "Unknown local embedding model '{}', using all-MiniLM-L6-v2",
                config.model
            );
            EmbeddingModel::AllMiniLML6V2
        });
        Self::with_model(model)
    }

    /// Create a new FastEmbedManager with a specific model
    pub fn with_model(model: EmbeddingModel) -> Result<Self, EmbeddingError> {
        tracing::info!("Initializing FastEmbed model: {:?}", model);

        let (model_name, dimension) = describe(&model);

        let mut options = InitOptions::default();
        options.model_name = model;
        options.show_download_progress = true;

        let embedding_model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitializationFailed(e.to_string()))?;

        Ok(Self {
            model: Arc::new(Mutex::new(embedding_model)),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

fn model_for_name(name: &str) -> Option<EmbeddingModel> {
    match name {
        "all-MiniLM-L6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "all-MiniLM-L12-v2" => Some(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Some(EmbeddingModel::BGEBaseENV15),
        _ => None,
    }
}

fn describe(model: &EmbeddingModel) -> (&'static str, usize) {
    match model {
        EmbeddingModel::AllMiniLML12V2 => ("all-MiniLM-L12-v2", 384),
        EmbeddingModel::BGESmallENV15 => ("bge-small-en-v1.5", 384),
        EmbeddingModel::BGEBaseENV15 => ("bge-base-en-v1.5", 768),
        _ => ("all-MiniLM-L6-v2", 384),
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FastEmbedManager {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let model = self.model.clone();
        let texts = texts.to_vec();

        // Inference is CPU bound and needs exclusive access to the model
        tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| {
                EmbeddingError::RequestFailed("embedding model lock poisoned".to_string())
            })?;
            model
                .embed(texts, None)
                .map_err(|e| EmbeddingError::RequestFailed(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::RequestFailed(format!("embedding task failed: {}", e)))?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
