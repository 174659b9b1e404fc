//! Domain types shared by the traversal, transformation and storage stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Indexing state of a repository record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexingStatus {
    #[default]
    Pending,
    Indexing,
    Indexed,
    Failed,
}

impl fmt::Display for IndexingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexingStatus::Pending => "pending",
            IndexingStatus::Indexing => "indexing",
            IndexingStatus::Indexed => "indexed",
            IndexingStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A repository record, owned by the record store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default, alias = "status")]
    pub indexing_status: IndexingStatus,
}

/// Information about a git commit, as yielded by traversal
#[derive(Debug, Clone, PartialEq)]
pub struct CommitInfo {
    /// Full commit SHA hash (40 characters)
    pub hash: String,
    /// Author's name
    pub author_name: String,
    /// Author's email address
    pub author_email: String,
    /// Commit message (first line and body)
    pub message: String,
    /// Commit timestamp (Unix epoch seconds)
    pub commit_date: i64,
    /// SHA hashes of parent commits, first parent first
    pub parent_hashes: Vec<String>,
}

/// A bounded slice of a commit diff, embedded on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub commit_hash: String,
    pub index: usize,
    pub text: String,
}

impl Chunk {
    /// Identifier of the vector this chunk becomes
    pub fn vector_id(&self) -> String {
        vector_id(&self.commit_hash, self.index)
    }
}

/// Stable vector identifier: the commit hash for chunk 0, `<hash>-<index>` otherwise.
///
/// Re-indexing a commit must land on the same ids so the upsert overwrites.
pub fn vector_id(commit_hash: &str, chunk_index: usize) -> String {
    if chunk_index == 0 {
        commit_hash.to_string()
    } else {
        format!("{}-{}", commit_hash, chunk_index)
    }
}

/// Metadata stored next to each vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorMetadata {
    /// The full payload that was embedded
    pub text: String,
    pub commit_id: String,
    pub repository_url: String,
    pub author: String,
    pub chunk_index: usize,
}

/// A vector record ready for upsert
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// Summary of one indexing run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexReport {
    pub repository_url: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Branches that were traversed, in traversal order
    pub branches: Vec<String>,
    /// Commits handed to the dispatcher
    pub commits_dispatched: usize,
    /// Commits whose vectors were all upserted
    pub commits_indexed: usize,
    /// Commits whose pipeline failed (their vectors are absent)
    pub commits_failed: usize,
    /// Commits visited before the checkpoint was reached
    pub commits_skipped: usize,
    pub vectors_upserted: usize,
    /// Highest number of commit pipelines observed in flight at once
    pub max_in_flight: usize,
    pub duration_ms: u64,
}

impl IndexReport {
    /// Ratio of failed commits among the dispatched ones
    pub fn failure_ratio(&self) -> f64 {
        if self.commits_dispatched == 0 {
            0.0
        } else {
            self.commits_failed as f64 / self.commits_dispatched as f64
        }
    }
}

#[cfg(test)]
mod tests;
