/// Configuration system for commit-indexer
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, IndexerError};
use crate::paths::PlatformPaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Clone and traversal configuration
    #[serde(default)]
    pub git: GitConfig,

    /// Chunking and concurrency configuration
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector store configuration
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Record and checkpoint file locations
    #[serde(default)]
    pub storage: StorageConfig,
}

/// What to do when a checkpoint hash never shows up in a branch's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointMissPolicy {
    /// Process nothing for the branch
    #[default]
    SkipBranch,
    /// Walk the branch again from its tip, processing every commit
    FullTraversal,
}

/// Clone and traversal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Directory holding working copies of cloned repositories
    #[serde(default = "default_clone_dir")]
    pub clone_dir: PathBuf,

    /// Clone depth, 0 fetches the full history
    #[serde(default = "default_clone_depth")]
    pub clone_depth: u32,

    /// Branch allow-list, matched against short branch names
    #[serde(default = "default_branches")]
    pub branches: Vec<String>,

    /// Fetch from origin when a working copy already exists
    #[serde(default)]
    pub refresh_existing: bool,

    /// Behavior when the checkpoint commit is not found in a branch
    #[serde(default)]
    pub checkpoint_miss: CheckpointMissPolicy,
}

/// Chunking and concurrency configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Embedding input window size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Windows kept per commit, later windows are dropped
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,

    /// Diffs are truncated to this many characters before chunking
    #[serde(default = "default_max_diff_length")]
    pub max_diff_length: usize,

    /// Commit pipelines allowed in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Deadline for a whole indexing run
    #[serde(default = "default_run_timeout")]
    pub timeout_secs: u64,

    /// Mark the repository failed when more than this share of commits fail.
    /// Unset keeps reporting "indexed" regardless of per-commit failures.
    #[serde(default)]
    pub max_failure_ratio: Option<f64>,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: "openai" or "local"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Model name (e.g., "text-embedding-ada-002", "all-MiniLM-L6-v2")
    #[serde(default = "default_model_name")]
    pub model: String,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// API key, normally supplied through the environment
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Expected vector dimension, checked on every response when set
    #[serde(default)]
    pub dimension: Option<usize>,

    /// Timeout in seconds for one embedding request
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Retries for rate limits and transient failures
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Backend: "pinecone", "qdrant" or "memory"
    #[serde(default = "default_vector_backend")]
    pub backend: String,

    /// Index URL (Pinecone) or server URL (Qdrant)
    #[serde(default)]
    pub url: Option<String>,

    /// API key, normally supplied through the environment
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Namespace (Pinecone) or collection (Qdrant)
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Vectors per upsert request
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,

    /// Retries for transient upsert failures
    #[serde(default = "default_upsert_retries")]
    pub max_retries: u32,

    /// Timeout in seconds for one upsert request
    #[serde(default = "default_upsert_timeout")]
    pub timeout_secs: u64,
}

/// Record and checkpoint file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding repository records
    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,

    /// JSON file holding per-branch checkpoints
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
}

// Default value functions
fn default_clone_dir() -> PathBuf {
    PlatformPaths::default_clone_dir()
}

fn default_clone_depth() -> u32 {
    20_000
}

fn default_branches() -> Vec<String> {
    vec!["main".to_string(), "master".to_string()]
}

fn default_chunk_size() -> usize {
    8_000
}

fn default_max_chunks() -> usize {
    2
}

fn default_max_diff_length() -> usize {
    32_000
}

fn default_max_concurrency() -> usize {
    4
}

fn default_run_timeout() -> u64 {
    600
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}

fn default_model_name() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_embedding_retries() -> u32 {
    3
}

fn default_vector_backend() -> String {
    "pinecone".to_string()
}

fn default_namespace() -> String {
    "commits".to_string()
}

fn default_upsert_batch_size() -> usize {
    100
}

fn default_upsert_retries() -> u32 {
    2
}

fn default_upsert_timeout() -> u64 {
    30
}

fn default_records_path() -> PathBuf {
    PlatformPaths::default_records_path()
}

fn default_checkpoint_path() -> PathBuf {
    PlatformPaths::default_checkpoint_path()
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            clone_dir: default_clone_dir(),
            clone_depth: default_clone_depth(),
            branches: default_branches(),
            refresh_existing: false,
            checkpoint_miss: CheckpointMissPolicy::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_chunks: default_max_chunks(),
            max_diff_length: default_max_diff_length(),
            max_concurrency: default_max_concurrency(),
            timeout_secs: default_run_timeout(),
            max_failure_ratio: None,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_model_name(),
            api_base: default_api_base(),
            api_key: None,
            dimension: None,
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            url: None,
            api_key: None,
            namespace: default_namespace(),
            upsert_batch_size: default_upsert_batch_size(),
            max_retries: default_upsert_retries(),
            timeout_secs: default_upsert_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            records_path: default_records_path(),
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> IndexerError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
    .into()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, IndexerError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, IndexerError> {
        let config_path = PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.git.branches.is_empty() {
            return Err(invalid("git.branches", "must name at least one branch"));
        }

        if self.indexing.chunk_size == 0 {
            return Err(invalid("indexing.chunk_size", "must be greater than 0"));
        }

        if self.indexing.max_chunks == 0 {
            return Err(invalid("indexing.max_chunks", "must be greater than 0"));
        }

        if self.indexing.max_diff_length == 0 {
            return Err(invalid("indexing.max_diff_length", "must be greater than 0"));
        }

        if self.indexing.max_concurrency == 0 {
            return Err(invalid("indexing.max_concurrency", "must be greater than 0"));
        }

        if self.indexing.timeout_secs == 0 {
            return Err(invalid("indexing.timeout_secs", "must be greater than 0"));
        }

        if let Some(ratio) = self.indexing.max_failure_ratio
            && !(0.0..=1.0).contains(&ratio)
        {
            return Err(invalid(
                "indexing.max_failure_ratio",
                format!("must be between 0.0 and 1.0, got {}", ratio),
            ));
        }

        if self.embedding.provider != "openai" && self.embedding.provider != "local" {
            return Err(invalid(
                "embedding.provider",
                format!("must be 'openai' or 'local', got '{}'", self.embedding.provider),
            ));
        }

        if !["pinecone", "qdrant", "memory"].contains(&self.vector_store.backend.as_str()) {
            return Err(invalid(
                "vector_store.backend",
                format!(
                    "must be 'pinecone', 'qdrant' or 'memory', got '{}'",
                    self.vector_store.backend
                ),
            ));
        }

        if self.vector_store.upsert_batch_size == 0 {
            return Err(invalid("vector_store.upsert_batch_size", "must be greater than 0"));
        }

        if self.vector_store.namespace.trim().is_empty() {
            return Err(invalid("vector_store.namespace", "must not be empty"));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup (the environment in production)
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(dir) = get("COMMIT_INDEXER_CLONE_DIR") {
            self.git.clone_dir = PathBuf::from(dir);
        }

        if let Some(depth) = get("COMMIT_INDEXER_CLONE_DEPTH")
            && let Ok(depth) = depth.parse()
        {
            self.git.clone_depth = depth;
        }

        if let Some(branches) = get("COMMIT_INDEXER_BRANCHES") {
            self.git.branches = branches
                .split(',')
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect();
        }

        if let Some(max) = get("COMMIT_INDEXER_MAX_CONCURRENCY")
            && let Ok(max) = max.parse()
        {
            self.indexing.max_concurrency = max;
        }

        if let Some(timeout) = get("COMMIT_INDEXER_TIMEOUT_SECS")
            && let Ok(timeout) = timeout.parse()
        {
            self.indexing.timeout_secs = timeout;
        }

        if let Some(provider) = get("COMMIT_INDEXER_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }

        if let Some(model) = get("COMMIT_INDEXER_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }

        if let Some(base) = get("COMMIT_INDEXER_EMBEDDING_API_BASE") {
            self.embedding.api_base = base;
        }

        // OPEN_AI_KEY is the name older deployments use
        if let Some(key) = get("OPENAI_API_KEY").or_else(|| get("OPEN_AI_KEY")) {
            self.embedding.api_key = Some(key);
        }

        if let Some(backend) = get("COMMIT_INDEXER_VECTOR_BACKEND") {
            self.vector_store.backend = backend;
        }

        if let Some(url) = get("COMMIT_INDEXER_VECTOR_URL").or_else(|| get("PINECONE_API_URL")) {
            self.vector_store.url = Some(url);
        }

        if let Some(key) = get("COMMIT_INDEXER_VECTOR_API_KEY").or_else(|| get("PINECONE_API_KEY")) {
            self.vector_store.api_key = Some(key);
        }

        if let Some(namespace) = get("COMMIT_INDEXER_NAMESPACE") {
            self.vector_store.namespace = namespace;
        }

        if let Some(path) = get("COMMIT_INDEXER_RECORDS_PATH") {
            self.storage.records_path = PathBuf::from(path);
        }

        if let Some(path) = get("COMMIT_INDEXER_CHECKPOINT_PATH") {
            self.storage.checkpoint_path = PathBuf::from(path);
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, IndexerError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
