use crate::error::GitError;
use crate::git::chunker::truncate_chars;
use crate::paths::checkout_folder_name;
use crate::types::CommitInfo;
use git2::build::RepoBuilder;
use git2::{BranchType, DiffFormat, DiffOptions, FetchOptions, Oid, Repository};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A branch selected for traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchTip {
    /// Short branch name, remote prefix stripped
    pub name: String,
    /// Hash of the branch tip commit
    pub tip: String,
}

/// Local working copy of a repository
pub struct LocalCheckout {
    repo: Repository,
    repo_path: PathBuf,
}

impl LocalCheckout {
    /// Open `url` in place when it is a local repository, otherwise open or
    /// clone a working copy under `clone_dir`.
    ///
    /// `depth` of 0 clones the full history.
    pub fn open_or_clone(
        url: &str,
        clone_dir: &Path,
        depth: u32,
        refresh: bool,
    ) -> Result<Self, GitError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(GitError::EmptyUrl);
        }

        let local = Path::new(url);
        if local.is_dir()
            && let Ok(repo) = Repository::open(local)
        {
            tracing::info!("Opened local repository in place: {}", local.display());
            return Ok(Self::from_repo(repo));
        }

        let target = clone_dir.join(checkout_folder_name(url));

        if target.exists() {
            match Repository::open(&target) {
                Ok(repo) if has_checked_out_head(&repo) => {
                    tracing::info!("Reusing working copy at: {}", target.display());
                    if refresh {
                        fetch_origin(&repo, depth)?;
                    }
                    return Ok(Self::from_repo(repo));
                }
                _ => {
                    tracing::warn!(
                        "Discarding incomplete working copy at: {}",
                        target.display()
                    );
                    std::fs::remove_dir_all(&target).map_err(|e| {
                        GitError::OpenFailed(format!(
                            "cannot remove incomplete {}: {}",
                            target.display(),
                            e
                        ))
                    })?;
                }
            }
        }

        std::fs::create_dir_all(clone_dir).map_err(|e| GitError::CloneFailed {
            url: url.to_string(),
            reason: format!("cannot create {}: {}", clone_dir.display(), e),
        })?;

        // Clone next to the target and move it into place only once complete
        let staging = staging_path(&target);
        if staging.exists() {
            let _ = std::fs::remove_dir_all(&staging);
        }

        tracing::info!("Cloning repository: {} (depth {})", url, depth);

        let mut fetch_options = FetchOptions::new();
        if depth > 0 {
            fetch_options.depth(depth.min(i32::MAX as u32) as i32);
        }

        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_options);

        let repo = builder.clone(url, &staging).map_err(|e| {
            let _ = std::fs::remove_dir_all(&staging);
            GitError::CloneFailed {
                url: url.to_string(),
                reason: e.message().to_string(),
            }
        })?;
        drop(repo);

        std::fs::rename(&staging, &target).map_err(|e| {
            let _ = std::fs::remove_dir_all(&staging);
            GitError::CloneFailed {
                url: url.to_string(),
                reason: format!("cannot move clone into {}: {}", target.display(), e),
            }
        })?;

        let repo = Repository::open(&target).map_err(|e| {
            GitError::OpenFailed(format!("{}: {}", target.display(), e.message()))
        })?;

        tracing::info!("Cloning completed: {}", url);
        Ok(Self::from_repo(repo))
    }

    /// Open an existing repository
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        let repo = Repository::open(path)
            .map_err(|e| GitError::OpenFailed(format!("{}: {}", path.display(), e.message())))?;
        Ok(Self::from_repo(repo))
    }

    fn from_repo(repo: Repository) -> Self {
        let repo_path = repo.path().to_path_buf();
        Self { repo, repo_path }
    }

    /// Path of the git directory, used to open further handles
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Branches to traverse, in enumeration order.
    ///
    /// Local branches come first, then remote-tracking ones with the remote
    /// prefix stripped. A name seen twice keeps its first occurrence.
    pub fn branches(&self, allow_list: &[String]) -> Result<Vec<BranchTip>, GitError> {
        let mut seen = HashSet::new();
        let mut tips = Vec::new();

        for kind in [BranchType::Local, BranchType::Remote] {
            let branches = self
                .repo
                .branches(Some(kind))
                .map_err(|e| GitError::BranchListFailed(e.message().to_string()))?;

            for item in branches {
                let (branch, _) =
                    item.map_err(|e| GitError::BranchListFailed(e.message().to_string()))?;

                let Some(name) = branch
                    .name()
                    .map_err(|e| GitError::BranchListFailed(e.message().to_string()))?
                else {
                    continue;
                };

                let short = match kind {
                    BranchType::Remote => name.split_once('/').map(|(_, b)| b).unwrap_or(name),
                    BranchType::Local => name,
                };

                if short == "HEAD" || !allow_list.iter().any(|allowed| allowed == short) {
                    continue;
                }

                if !seen.insert(short.to_string()) {
                    continue;
                }

                let target = branch.get().resolve().ok().and_then(|r| r.target());
                match target {
                    Some(oid) => tips.push(BranchTip {
                        name: short.to_string(),
                        tip: oid.to_string(),
                    }),
                    None => {
                        tracing::warn!("{}", GitError::BranchWithoutTarget(name.to_string()));
                    }
                }
            }
        }

        Ok(tips)
    }
}

/// A finished clone has HEAD pointing at a commit
fn has_checked_out_head(repo: &Repository) -> bool {
    repo.head()
        .ok()
        .and_then(|head| head.target())
        .is_some_and(|oid| repo.find_commit(oid).is_ok())
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    target.with_file_name(name)
}

fn fetch_origin(repo: &Repository, depth: u32) -> Result<(), GitError> {
    let mut remote = repo
        .find_remote("origin")
        .map_err(|e| GitError::FetchFailed(e.message().to_string()))?;

    let mut fetch_options = FetchOptions::new();
    if depth > 0 {
        fetch_options.depth(depth.min(i32::MAX as u32) as i32);
    }

    remote
        .fetch(&[] as &[&str], Some(&mut fetch_options), None)
        .map_err(|e| GitError::FetchFailed(e.message().to_string()))?;

    tracing::info!("Fetched updates from origin");
    Ok(())
}

struct CursorState {
    repo: Repository,
    next: Option<Oid>,
    seq: u64,
}

/// First-parent history cursor for one branch.
///
/// The only way to advance is [`CommitCursor::next_commit`], which holds the
/// cursor lock for the whole read-and-advance step.
pub struct CommitCursor {
    state: Mutex<CursorState>,
}

impl CommitCursor {
    /// Start a cursor at `tip` using a fresh handle on `repo_path`
    pub fn open(repo_path: &Path, tip: &str) -> Result<Self, GitError> {
        let repo = Repository::open(repo_path).map_err(|e| {
            GitError::OpenFailed(format!("{}: {}", repo_path.display(), e.message()))
        })?;
        let oid = Oid::from_str(tip).map_err(|_| GitError::InvalidCommitHash(tip.to_string()))?;

        Ok(Self {
            state: Mutex::new(CursorState {
                repo,
                next: Some(oid),
                seq: 0,
            }),
        })
    }

    /// Read the next commit and advance to its first parent.
    ///
    /// Returns the commit's position in traversal order alongside it.
    pub fn next_commit(&self) -> Result<Option<(u64, CommitInfo)>, GitError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| GitError::TaskFailed("commit cursor lock poisoned".to_string()))?;

        let Some(oid) = state.next else {
            return Ok(None);
        };

        let (info, parent) = {
            let commit = state
                .repo
                .find_commit(oid)
                .map_err(|e| GitError::CommitUnreadable {
                    hash: oid.to_string(),
                    reason: e.message().to_string(),
                })?;
            (commit_info(&commit), commit.parent_id(0).ok())
        };

        let seq = state.seq;
        state.seq += 1;
        state.next = parent;

        Ok(Some((seq, info)))
    }
}

fn commit_info(commit: &git2::Commit) -> CommitInfo {
    let author = commit.author();
    CommitInfo {
        hash: commit.id().to_string(),
        author_name: author.name().unwrap_or("Unknown").to_string(),
        author_email: author.email().unwrap_or("").to_string(),
        message: commit.message().unwrap_or("").to_string(),
        commit_date: commit.time().seconds(),
        parent_hashes: commit.parent_ids().map(|p| p.to_string()).collect(),
    }
}

/// Unified diff of a commit against its first parent, at most `max_len` characters.
///
/// Root commits have an empty diff. When the parent or the diff cannot be
/// computed the diff degrades to empty; only an unreadable commit is an error.
pub fn read_commit_diff(repo_path: &Path, hash: &str, max_len: usize) -> Result<String, GitError> {
    let repo = Repository::open(repo_path)
        .map_err(|e| GitError::OpenFailed(format!("{}: {}", repo_path.display(), e.message())))?;
    let oid = Oid::from_str(hash).map_err(|_| GitError::InvalidCommitHash(hash.to_string()))?;
    let commit = repo
        .find_commit(oid)
        .map_err(|e| GitError::CommitUnreadable {
            hash: hash.to_string(),
            reason: e.message().to_string(),
        })?;

    if commit.parent_count() == 0 {
        return Ok(String::new());
    }

    match diff_against_first_parent(&repo, &commit, max_len) {
        Ok(diff) => Ok(diff),
        Err(e) => {
            tracing::warn!(
                "Could not compute diff for commit {}, using empty diff: {}",
                hash,
                e.message()
            );
            Ok(String::new())
        }
    }
}

fn diff_against_first_parent(
    repo: &Repository,
    commit: &git2::Commit,
    max_len: usize,
) -> Result<String, git2::Error> {
    let parent_tree = commit.parent(0)?.tree()?;
    let tree = commit.tree()?;

    let mut diff_opts = DiffOptions::new();
    diff_opts
        .context_lines(3)
        .interhunk_lines(0)
        .ignore_whitespace(false);

    let diff = repo.diff_tree_to_tree(Some(&parent_tree), Some(&tree), Some(&mut diff_opts))?;

    let mut diff_content = String::new();
    let mut collected_chars = 0usize;

    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        // Keep returning true, a false return makes libgit2 report an error
        if collected_chars >= max_len || line.origin() == 'B' {
            return true;
        }

        let Ok(content) = std::str::from_utf8(line.content()) else {
            tracing::debug!("Skipping diff line with invalid UTF-8");
            return true;
        };

        let origin = line.origin();
        match origin {
            '+' | '-' | ' ' => {
                diff_content.push(origin);
                diff_content.push_str(content);
                collected_chars += 1 + content.chars().count();
            }
            'F' | 'H' => {
                diff_content.push_str(content);
                collected_chars += content.chars().count();
            }
            _ => {}
        }

        true
    })?;

    let truncated = truncate_chars(&diff_content, max_len);
    if truncated.len() < diff_content.len() {
        tracing::debug!("Truncated large diff for commit {}", commit.id());
    }
    Ok(truncated.to_string())
}
