//! # Commit Indexer - git history to vector store
//!
//! Walks the history of a git repository, turns every commit into one or
//! more text payloads (metadata plus a bounded slice of its diff), embeds
//! them and upserts the vectors so a retrieval service can search commits
//! semantically.
//!
//! ## Pipeline
//!
//! ```text
//! repository id ──► record store ──► url
//!                                     │
//!                       clone / open (git2)
//!                                     │
//!          branches (allow-list) ──► first-parent walk, newest first
//!                                     │   skip until checkpoint
//!                                     ▼
//!                         Dispatcher (K permits)
//!                    ┌────────┬───────┴────┬────────┐
//!                  commit   commit       commit   commit
//!                    │  diff ─► chunks ─► embed ─► upsert
//!                    └────────┴───────┬────┴────────┘
//!                                     ▼
//!                 join ─► checkpoints ─► final status
//! ```
//!
//! ## Modules
//!
//! - [`indexer`]: traversal controller, bounded dispatcher, per-commit pipeline
//! - [`git`]: clone, branch enumeration, history cursor, diffs and chunking
//! - [`embedding`]: OpenAI-compatible HTTP provider and optional local models
//! - [`vector_db`]: Pinecone, Qdrant and in-memory stores
//! - [`records`]: repository records and their indexing status
//! - [`checkpoint`]: per-branch resume points
//! - [`queue`]: message-driven serving loop
//! - [`config`]: configuration with file, environment and default layers
//! - [`types`]: domain types shared by every stage
//! - [`error`]: error types
//! - [`paths`]: platform directories
//!
//! ## Usage Example
//!
//! ```no_run
//! use commit_indexer::config::Config;
//! use commit_indexer::indexer::CommitIndexer;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let indexer = CommitIndexer::from_config(Config::new()?).await?;
//!
//!     let report = indexer
//!         .index_repository("my-repository-id", CancellationToken::new())
//!         .await?;
//!     println!("{} commits indexed", report.commits_indexed);
//!
//!     Ok(())
//! }
//! ```

/// Per-branch resume points for interrupted runs
pub mod checkpoint;

/// Configuration management with environment variable overrides
pub mod config;

/// Embedding generation behind a provider trait
pub mod embedding;

/// Error types and utilities
pub mod error;

/// Git repository access and commit chunking
pub mod git;

/// Traversal, bounded dispatch and the per-commit pipeline
pub mod indexer;

/// Platform-specific default locations
pub mod paths;

/// Message-driven indexing loop
pub mod queue;

/// Repository record store
pub mod records;

/// Domain types
pub mod types;

/// Vector store abstraction
pub mod vector_db;

#[cfg(test)]
mod test_http;

pub use error::IndexerError;
pub use indexer::CommitIndexer;
pub use types::{IndexReport, IndexingStatus, Repository};
