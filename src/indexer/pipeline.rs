use crate::embedding::EmbeddingProvider;
use crate::error::{GitError, IndexerError};
use crate::git::{CommitChunker, read_commit_diff};
use crate::types::{CommitInfo, EmbeddingVector, VectorMetadata};
use crate::vector_db::{UpsertPolicy, VectorStore, upsert_with_retry};
use super::dispatcher::Tally;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything one commit pipeline needs, cloned into each task
#[derive(Clone)]
pub(crate) struct PipelineContext {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn VectorStore>,
    pub chunker: Arc<CommitChunker>,
    pub upsert_policy: UpsertPolicy,
    pub max_diff_length: usize,
    pub repo_path: PathBuf,
    pub repository_url: Arc<str>,
}

/// Result of one commit's pipeline
#[derive(Debug)]
pub struct CommitOutcome {
    /// Position of the branch in traversal order
    pub branch: usize,
    /// Position of the commit in its branch's traversal
    pub seq: u64,
    pub hash: String,
    /// Vectors upserted, or why the commit has none
    pub result: Result<usize, IndexerError>,
}

/// Running totals over reaped outcomes
#[derive(Debug, Default)]
pub(crate) struct OutcomeTally {
    pub indexed: usize,
    pub failed: usize,
    pub vectors: usize,
    /// Earliest cancelled commit per branch, as (seq, hash)
    pub first_unfinished: HashMap<usize, (u64, String)>,
}

impl Tally<CommitOutcome> for OutcomeTally {
    fn record(&mut self, outcome: CommitOutcome) {
        match outcome.result {
            Ok(count) => {
                self.indexed += 1;
                self.vectors += count;
            }
            Err(ref e) if e.is_cancellation() => {
                let earliest = self
                    .first_unfinished
                    .get(&outcome.branch)
                    .is_none_or(|(seq, _)| outcome.seq < *seq);
                if earliest {
                    self.first_unfinished
                        .insert(outcome.branch, (outcome.seq, outcome.hash));
                }
            }
            Err(_) => self.failed += 1,
        }
    }
}

/// Run the pipeline for one commit, giving up as soon as `cancel` fires
pub(crate) async fn process_commit(
    ctx: PipelineContext,
    branch: usize,
    seq: u64,
    commit: CommitInfo,
    cancel: CancellationToken,
) -> CommitOutcome {
    let hash = commit.hash.clone();

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(IndexerError::Cancelled),
        result = index_commit(&ctx, commit) => result,
    };

    match &result {
        Ok(count) => tracing::info!("Indexed commit {} ({} vectors)", short(&hash), count),
        Err(e) if e.is_cancellation() => {
            tracing::debug!("Commit {} interrupted: {}", short(&hash), e)
        }
        Err(e) => tracing::warn!("Failed to index commit {}: {}", short(&hash), e),
    }

    CommitOutcome {
        branch,
        seq,
        hash,
        result,
    }
}

/// diff -> chunks -> one embedding per chunk -> vectors -> upsert
async fn index_commit(ctx: &PipelineContext, commit: CommitInfo) -> Result<usize, IndexerError> {
    let diff = {
        let repo_path = ctx.repo_path.clone();
        let hash = commit.hash.clone();
        let max_len = ctx.max_diff_length;
        tokio::task::spawn_blocking(move || read_commit_diff(&repo_path, &hash, max_len))
            .await
            .map_err(|e| GitError::TaskFailed(e.to_string()))??
    };

    let payloads = ctx
        .chunker
        .commit_payloads(&commit, &ctx.repository_url, &diff);

    tracing::debug!(
        "Commit {}: {} characters of diff, {} chunks",
        short(&commit.hash),
        diff.chars().count(),
        payloads.len()
    );

    let mut vectors = Vec::with_capacity(payloads.len());
    for payload in payloads {
        let values = ctx.embedder.embed_one(&payload.text).await?;
        vectors.push(EmbeddingVector {
            id: payload.chunk.vector_id(),
            values,
            metadata: VectorMetadata {
                text: payload.text,
                commit_id: commit.hash.clone(),
                repository_url: ctx.repository_url.to_string(),
                author: commit.author_name.clone(),
                chunk_index: payload.chunk.index,
            },
        });
    }

    let written = upsert_with_retry(ctx.store.as_ref(), vectors, &ctx.upsert_policy).await?;
    Ok(written)
}

pub(crate) fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}
