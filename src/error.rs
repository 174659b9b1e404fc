/// Centralized error types for commit-indexer using thiserror
///
/// Component errors are kept separate so the pipeline can tell fatal
/// traversal failures apart from per-commit failures that are only logged.
use thiserror::Error;

/// Main error type for an indexing run
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("Record store error: {0}")]
    Records(#[from] RecordStoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Indexing was cancelled")]
    Cancelled,

    #[error("Indexing timed out after {0} seconds")]
    TimedOut(u64),

    #[error("{failed} of {total} commits failed, above the configured failure ratio")]
    TooManyFailures { failed: usize, total: usize },

    #[error("{0}")]
    Other(String),
}

/// Errors related to the source history (clone, branches, commits, diffs)
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Repository URL is empty")]
    EmptyUrl,

    #[error("Failed to clone '{url}': {reason}")]
    CloneFailed { url: String, reason: String },

    #[error("Failed to open git repository: {0}")]
    OpenFailed(String),

    #[error("Failed to fetch updates: {0}")]
    FetchFailed(String),

    #[error("Failed to list branches: {0}")]
    BranchListFailed(String),

    #[error("Branch has no target commit: {0}")]
    BranchWithoutTarget(String),

    #[error("Failed to read commit {hash}: {reason}")]
    CommitUnreadable { hash: String, reason: String },

    #[error("Invalid commit hash: {0}")]
    InvalidCommitHash(String),

    #[error("Git task failed: {0}")]
    TaskFailed(String),
}

/// Errors related to embedding generation
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding provider: {0}")]
    InitializationFailed(String),

    #[error("Embedding request failed: {0}")]
    RequestFailed(String),

    #[error("Embedding provider rate limited the request: {0}")]
    RateLimited(String),

    #[error("Embedding provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Failed to decode embedding response: {0}")]
    Decode(String),

    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding generation timed out after {0} seconds")]
    Timeout(u64),
}

/// Errors related to vector store operations
#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Failed to connect to vector store: {0}")]
    ConnectionFailed(String),

    #[error("Failed to create collection '{collection}': {reason}")]
    CollectionCreationFailed { collection: String, reason: String },

    #[error("Upsert rejected with status {status}: {body}")]
    UpsertRejected { status: u16, body: String },

    #[error("Failed to upsert vectors: {0}")]
    UpsertFailed(String),

    #[error("Invalid vector payload: {0}")]
    InvalidPayload(String),
}

/// Errors related to the repository record store
#[derive(Error, Debug)]
pub enum RecordStoreError {
    #[error("Repository not found: {0}")]
    NotFound(String),

    #[error("Failed to load records from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to save records to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

// Conversion from anyhow::Error to IndexerError
impl From<anyhow::Error> for IndexerError {
    fn from(err: anyhow::Error) -> Self {
        IndexerError::Other(format!("{:#}", err))
    }
}

impl IndexerError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        IndexerError::Other(msg.into())
    }

    /// Errors that abort a whole run rather than a single commit
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IndexerError::Git(_)
                | IndexerError::Records(_)
                | IndexerError::Config(_)
                | IndexerError::Io(_)
        )
    }

    /// Whether the run was stopped by cancellation or its deadline
    pub fn is_cancellation(&self) -> bool {
        matches!(self, IndexerError::Cancelled | IndexerError::TimedOut(_))
    }
}

impl EmbeddingError {
    /// Rate limits, 5xx responses, transport failures and timeouts are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::RateLimited(_)
            | EmbeddingError::RequestFailed(_)
            | EmbeddingError::Timeout(_) => true,
            EmbeddingError::Provider { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl VectorStoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            VectorStoreError::ConnectionFailed(_) | VectorStoreError::UpsertFailed(_) => true,
            VectorStoreError::UpsertRejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
