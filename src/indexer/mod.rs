//! Commit indexing: traversal controller, dispatcher and per-commit pipeline
//!
//! [`CommitIndexer`] walks each allowed branch from its tip through
//! first-parent history, skipping commits until the checkpoint is reached,
//! and hands every remaining commit to a bounded [`Dispatcher`]. Each commit
//! runs its own pipeline (diff, chunks, embeddings, upsert); a failing
//! commit is logged and does not stop its siblings.

/// Bounded concurrent task admission
pub mod dispatcher;
/// Per-commit diff, embed and upsert pipeline
pub mod pipeline;

pub use dispatcher::{DispatchSummary, Dispatcher};
pub use pipeline::CommitOutcome;

use crate::checkpoint::CheckpointStore;
use crate::config::{CheckpointMissPolicy, Config};
use crate::embedding::{EmbeddingProvider, create_provider};
use crate::error::{GitError, IndexerError};
use crate::git::{BranchTip, CommitChunker, CommitCursor, LocalCheckout};
use crate::records::{JsonRepositoryStore, RepositoryStore};
use crate::types::{CommitInfo, IndexReport, IndexingStatus};
use crate::vector_db::{UpsertPolicy, VectorStore, create_store};
use pipeline::{OutcomeTally, PipelineContext, process_commit, short};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Shared context for indexing runs, built once and cloned cheaply
#[derive(Clone)]
pub struct CommitIndexer {
    config: Arc<Config>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    records: Arc<dyn RepositoryStore>,
    checkpoints: Arc<CheckpointStore>,
    chunker: Arc<CommitChunker>,
    upsert_policy: UpsertPolicy,
}

/// How the traversal of one branch ended
#[derive(Debug, Default)]
struct BranchProgress {
    name: String,
    /// Every commit of the branch was visited
    exhausted: bool,
    /// Commits walked past before the checkpoint
    skipped: usize,
    /// Highest seq handed to the dispatcher and its hash
    last_dispatched: Option<(u64, String)>,
}

impl CommitIndexer {
    /// Build the providers, stores and record files named by `config`
    pub async fn from_config(config: Config) -> Result<Self, IndexerError> {
        config.validate()?;

        let embedder = create_provider(&config.embedding)?;
        let store = create_store(&config.vector_store)?;
        let records = JsonRepositoryStore::open(&config.storage.records_path).await?;
        let checkpoints = CheckpointStore::open(&config.storage.checkpoint_path).await?;

        tracing::info!(
            "Commit indexer ready: embeddings={} ({}), vector store={} (namespace '{}'), concurrency={}",
            config.embedding.provider,
            embedder.model_name(),
            store.backend_name(),
            store.namespace(),
            config.indexing.max_concurrency
        );

        Ok(Self::with_components(
            config,
            embedder,
            store,
            Arc::new(records),
            Arc::new(checkpoints),
        ))
    }

    /// Assemble an indexer from already built components
    pub fn with_components(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        records: Arc<dyn RepositoryStore>,
        checkpoints: Arc<CheckpointStore>,
    ) -> Self {
        let chunker = Arc::new(CommitChunker::from_config(&config.indexing));
        let upsert_policy = UpsertPolicy::from_config(&config.vector_store);

        Self {
            config: Arc::new(config),
            embedder,
            store,
            records,
            checkpoints,
            chunker,
            upsert_policy,
        }
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Index the repository behind a record and write back its final status.
    ///
    /// Fatal errors (missing record or URL, clone or branch failures,
    /// cancellation, deadline) leave the status untouched. Per-commit
    /// failures only change the outcome when `indexing.max_failure_ratio`
    /// is set and exceeded, in which case the status becomes `failed`.
    pub async fn index_repository(
        &self,
        id: &str,
        cancel: CancellationToken,
    ) -> Result<IndexReport, IndexerError> {
        let repository = self.records.get(id).await?;
        if repository.url.trim().is_empty() {
            return Err(GitError::EmptyUrl.into());
        }

        tracing::info!(
            "Indexing repository {} ({}) from {}",
            repository.id,
            repository.name,
            repository.url
        );

        let report = self
            .process_repository(&repository.url, None, cancel)
            .await
            .inspect_err(|e| {
                if e.is_fatal() {
                    tracing::error!("Indexing repository {} failed, status unchanged: {}", id, e)
                } else {
                    tracing::warn!("Indexing repository {} interrupted: {}", id, e)
                }
            })?;

        if let Some(max_ratio) = self.config.indexing.max_failure_ratio
            && report.failure_ratio() > max_ratio
        {
            tracing::error!(
                "Repository {}: {} of {} commits failed (limit {:.0}%)",
                id,
                report.commits_failed,
                report.commits_dispatched,
                max_ratio * 100.0
            );
            self.records.set_status(id, IndexingStatus::Failed).await?;
            return Err(IndexerError::TooManyFailures {
                failed: report.commits_failed,
                total: report.commits_dispatched,
            });
        }

        self.records.set_status(id, IndexingStatus::Indexed).await?;
        Ok(report)
    }

    /// Traverse, dispatch and join every commit of `url`.
    ///
    /// An explicit `checkpoint` applies to every branch; otherwise each
    /// branch resumes from its stored checkpoint, if any. The run is bounded
    /// by `indexing.timeout_secs`; when the deadline passes or `cancel`
    /// fires, in-flight work is abandoned, resume points are stored and the
    /// run fails.
    pub async fn process_repository(
        &self,
        url: &str,
        checkpoint: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<IndexReport, IndexerError> {
        let run = cancel.child_token();
        let timeout = Duration::from_secs(self.config.indexing.timeout_secs);

        let work = self.run(url, checkpoint, &cancel, &run);
        tokio::pin!(work);

        tokio::select! {
            result = &mut work => result,
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(
                    "Indexing {} exceeded its {}s deadline, cancelling",
                    url,
                    timeout.as_secs()
                );
                run.cancel();
                work.await
            }
        }
    }

    async fn run(
        &self,
        url: &str,
        checkpoint: Option<&str>,
        parent: &CancellationToken,
        run: &CancellationToken,
    ) -> Result<IndexReport, IndexerError> {
        let start = Instant::now();

        let (repo_path, branches) = tokio::select! {
            biased;
            _ = run.cancelled() => return Err(self.interruption(parent)),
            result = self.open_checkout(url) => result?,
        };

        if branches.is_empty() {
            tracing::warn!(
                "No branch of {} matches the allow-list {:?}",
                url,
                self.config.git.branches
            );
        }

        let mut report = IndexReport {
            repository_url: url.to_string(),
            started_at: chrono::Utc::now(),
            ..Default::default()
        };

        let ctx = PipelineContext {
            embedder: self.embedder.clone(),
            store: self.store.clone(),
            chunker: self.chunker.clone(),
            upsert_policy: self.upsert_policy.clone(),
            max_diff_length: self.config.indexing.max_diff_length,
            repo_path: repo_path.clone(),
            repository_url: Arc::from(url),
        };

        let mut dispatcher = Dispatcher::new(
            self.config.indexing.max_concurrency,
            run.clone(),
            OutcomeTally::default(),
        );
        let mut progress = Vec::with_capacity(branches.len());

        for (index, branch) in branches.iter().enumerate() {
            if run.is_cancelled() {
                break;
            }

            let branch_checkpoint = match checkpoint {
                Some(hash) => Some(hash.to_string()),
                None => self.checkpoints.get(url, &branch.name).await,
            };

            report.branches.push(branch.name.clone());
            let branch_progress = self
                .traverse_branch(
                    &ctx,
                    &repo_path,
                    index,
                    branch,
                    branch_checkpoint.as_deref(),
                    &mut dispatcher,
                    &mut report,
                )
                .await?;
            progress.push(branch_progress);
        }

        let summary = dispatcher.join().await;
        report.max_in_flight = summary.max_in_flight;
        let tally = summary.tally;
        report.commits_indexed = tally.indexed;
        report.vectors_upserted = tally.vectors;
        report.commits_failed += tally.failed + summary.panicked;

        self.update_checkpoints(url, &progress, &tally.first_unfinished, run.is_cancelled())
            .await;

        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Finished {}: {} commits dispatched, {} indexed, {} failed, {} skipped, {} vectors in {}ms (peak concurrency {})",
            url,
            report.commits_dispatched,
            report.commits_indexed,
            report.commits_failed,
            report.commits_skipped,
            report.vectors_upserted,
            report.duration_ms,
            report.max_in_flight
        );

        if run.is_cancelled() {
            return Err(self.interruption(parent));
        }

        Ok(report)
    }

    /// Clone or open the working copy and list the branches to walk
    async fn open_checkout(&self, url: &str) -> Result<(PathBuf, Vec<BranchTip>), IndexerError> {
        let url = url.to_string();
        let git = self.config.git.clone();

        let (repo_path, branches) = tokio::task::spawn_blocking(move || {
            let checkout = LocalCheckout::open_or_clone(
                &url,
                &git.clone_dir,
                git.clone_depth,
                git.refresh_existing,
            )?;
            let branches = checkout.branches(&git.branches)?;
            Ok::<_, GitError>((checkout.repo_path().to_path_buf(), branches))
        })
        .await
        .map_err(|e| GitError::TaskFailed(e.to_string()))??;

        tracing::info!(
            "Branches to index: {:?}",
            branches.iter().map(|b| b.name.as_str()).collect::<Vec<_>>()
        );
        Ok((repo_path, branches))
    }

    /// Walk one branch and dispatch its commits from the checkpoint on
    #[allow(clippy::too_many_arguments)]
    async fn traverse_branch(
        &self,
        ctx: &PipelineContext,
        repo_path: &Path,
        index: usize,
        branch: &BranchTip,
        checkpoint: Option<&str>,
        dispatcher: &mut Dispatcher<CommitOutcome, OutcomeTally>,
        report: &mut IndexReport,
    ) -> Result<BranchProgress, IndexerError> {
        tracing::info!(
            "Traversing branch {} from {}{}",
            branch.name,
            short(&branch.tip),
            checkpoint
                .map(|c| format!(", resuming at {}", short(c)))
                .unwrap_or_default()
        );

        let mut progress = BranchProgress {
            name: branch.name.clone(),
            ..Default::default()
        };

        let reached = self
            .walk(ctx, repo_path, index, branch, checkpoint, dispatcher, report, &mut progress)
            .await?;

        if reached || !progress.exhausted {
            return Ok(progress);
        }

        // Only a fully walked branch can prove the checkpoint is absent
        match self.config.git.checkpoint_miss {
            CheckpointMissPolicy::SkipBranch => {
                tracing::warn!(
                    "Checkpoint {} not found in branch {}, nothing indexed for it",
                    checkpoint.map(short).unwrap_or_default(),
                    branch.name
                );
                Ok(progress)
            }
            CheckpointMissPolicy::FullTraversal => {
                tracing::warn!(
                    "Checkpoint {} not found in branch {}, indexing the whole branch",
                    checkpoint.map(short).unwrap_or_default(),
                    branch.name
                );
                // Commits walked past while looking for the checkpoint get indexed now
                report.commits_skipped -= progress.skipped;
                let mut retry = BranchProgress {
                    name: branch.name.clone(),
                    ..Default::default()
                };
                self.walk(ctx, repo_path, index, branch, None, dispatcher, report, &mut retry)
                    .await?;
                Ok(retry)
            }
        }
    }

    /// One pass over a branch; returns whether the checkpoint was reached
    #[allow(clippy::too_many_arguments)]
    async fn walk(
        &self,
        ctx: &PipelineContext,
        repo_path: &Path,
        index: usize,
        branch: &BranchTip,
        checkpoint: Option<&str>,
        dispatcher: &mut Dispatcher<CommitOutcome, OutcomeTally>,
        report: &mut IndexReport,
        progress: &mut BranchProgress,
    ) -> Result<bool, IndexerError> {
        let cursor = {
            let repo_path = repo_path.to_path_buf();
            let tip = branch.tip.clone();
            tokio::task::spawn_blocking(move || CommitCursor::open(&repo_path, &tip))
                .await
                .map_err(|e| GitError::TaskFailed(e.to_string()))??
        };
        let cursor = Arc::new(cursor);

        let mut reached = checkpoint.is_none();
        let run = dispatcher.cancel_token();

        loop {
            if run.is_cancelled() {
                return Ok(reached);
            }

            let next = {
                let cursor = cursor.clone();
                tokio::task::spawn_blocking(move || cursor.next_commit())
                    .await
                    .map_err(|e| GitError::TaskFailed(e.to_string()))??
            };

            let Some((seq, commit)) = next else {
                progress.exhausted = true;
                return Ok(reached);
            };

            if !reached {
                if checkpoint == Some(commit.hash.as_str()) {
                    tracing::info!("Reached checkpoint {} in {}", short(&commit.hash), branch.name);
                    reached = true;
                } else {
                    tracing::debug!("Skipping commit {} before checkpoint", short(&commit.hash));
                    report.commits_skipped += 1;
                    progress.skipped += 1;
                    continue;
                }
            }

            let hash = commit.hash.clone();
            if !self.dispatch_commit(ctx, dispatcher, index, seq, commit).await {
                return Ok(reached);
            }

            report.commits_dispatched += 1;
            progress.last_dispatched = Some((seq, hash));
        }
    }

    /// Returns false when the run was cancelled while waiting for admission
    async fn dispatch_commit(
        &self,
        ctx: &PipelineContext,
        dispatcher: &mut Dispatcher<CommitOutcome, OutcomeTally>,
        branch: usize,
        seq: u64,
        commit: CommitInfo,
    ) -> bool {
        let task = process_commit(ctx.clone(), branch, seq, commit, dispatcher.cancel_token());
        dispatcher.dispatch(task).await.is_ok()
    }

    /// Store resume points for interrupted branches, clear finished ones
    async fn update_checkpoints(
        &self,
        url: &str,
        progress: &[BranchProgress],
        first_unfinished: &HashMap<usize, (u64, String)>,
        interrupted: bool,
    ) {
        for (index, branch) in progress.iter().enumerate() {
            let resume_at = match first_unfinished.get(&index) {
                Some((_, hash)) => Some(hash.as_str()),
                None if interrupted && !branch.exhausted => {
                    branch.last_dispatched.as_ref().map(|(_, hash)| hash.as_str())
                }
                None => None,
            };

            let result = match resume_at {
                Some(hash) => self.checkpoints.set(url, &branch.name, hash).await,
                None if branch.exhausted => self.checkpoints.clear(url, &branch.name).await,
                None => Ok(()),
            };

            if let Err(e) = result {
                tracing::warn!("Could not update checkpoint for {}: {}", branch.name, e);
            }
        }
    }

    fn interruption(&self, parent: &CancellationToken) -> IndexerError {
        if parent.is_cancelled() {
            IndexerError::Cancelled
        } else {
            IndexerError::TimedOut(self.config.indexing.timeout_secs)
        }
    }
}
