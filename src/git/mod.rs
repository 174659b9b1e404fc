//! Git history access and commit transformation
//!
//! [`walker`] opens or clones repositories, enumerates branches and walks
//! first-parent history; [`chunker`] turns a commit and its diff into the
//! chunk payloads that get embedded.

/// Commit chunking for converting git commits into embedding payloads
pub mod chunker;
/// Repository checkout, branch enumeration and history traversal
pub mod walker;

pub use chunker::{ChunkPayload, CommitChunker};
pub use walker::{BranchTip, CommitCursor, LocalCheckout, read_commit_diff};

#[cfg(test)]
pub(crate) mod test_support {
    use git2::{Repository, Signature, Time};
    use std::cell::Cell;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    pub(crate) fn file_change(path: &str, content: &str) -> (String, String) {
        (path.to_string(), content.to_string())
    }

    /// Throwaway repository with a linear history on one branch
    pub(crate) struct FixtureRepo {
        _dir: TempDir,
        repo: Repository,
        commits: Cell<i64>,
    }

    impl FixtureRepo {
        pub(crate) fn new(branch: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let repo = Repository::init(dir.path()).unwrap();
            repo.set_head(&format!("refs/heads/{}", branch)).unwrap();
            Self {
                _dir: dir,
                repo,
                commits: Cell::new(0),
            }
        }

        pub(crate) fn path(&self) -> &Path {
            self.repo.workdir().unwrap()
        }

        pub(crate) fn git_dir(&self) -> PathBuf {
            self.repo.path().to_path_buf()
        }

        /// Write the files and commit them on top of HEAD, returning the hash
        pub(crate) fn commit(&self, message: &str, files: &[(String, String)]) -> String {
            let workdir = self.path().to_path_buf();
            let mut index = self.repo.index().unwrap();

            for (path, content) in files {
                let full = workdir.join(path);
                if let Some(parent) = full.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                std::fs::write(&full, content).unwrap();
                index.add_path(Path::new(path)).unwrap();
            }
            index.write().unwrap();

            let tree_id = index.write_tree().unwrap();
            let tree = self.repo.find_tree(tree_id).unwrap();

            let n = self.commits.get();
            self.commits.set(n + 1);
            let time = Time::new(1_704_067_200 + n * 60, 0);
            let sig = Signature::new("Test Author", "author@example.com", &time).unwrap();

            let parent = self
                .repo
                .head()
                .ok()
                .and_then(|h| h.target())
                .map(|oid| self.repo.find_commit(oid).unwrap());
            let parents: Vec<&git2::Commit> = parent.iter().collect();

            self.repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
                .unwrap()
                .to_string()
        }

        pub(crate) fn create_branch(&self, name: &str, target: &str) {
            let oid = git2::Oid::from_str(target).unwrap();
            let commit = self.repo.find_commit(oid).unwrap();
            self.repo.branch(name, &commit, false).unwrap();
        }

        pub(crate) fn tree_of(&self, commit: &str) -> String {
            let oid = git2::Oid::from_str(commit).unwrap();
            self.repo.find_commit(oid).unwrap().tree_id().to_string()
        }

        /// Delete a loose object, as a corrupted or partial object store would lack it
        pub(crate) fn remove_object(&self, id: &str) {
            let path = self.git_dir().join("objects").join(&id[..2]).join(&id[2..]);
            std::fs::remove_file(path).unwrap();
        }
    }
}
