//! Shared fixtures for integration tests
#![allow(dead_code)]

use commit_indexer::embedding::EmbeddingProvider;
use commit_indexer::error::EmbeddingError;
use git2::{Repository, Signature, Time};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

/// Repository with a linear history on `main`
pub struct GitFixture {
    pub dir: TempDir,
    repo: Repository,
    commits: usize,
}

impl GitFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        repo.set_head("refs/heads/main").unwrap();
        Self {
            dir,
            repo,
            commits: 0,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn url(&self) -> String {
        self.dir.path().to_string_lossy().to_string()
    }

    /// Commit one file change on top of HEAD and return the hash
    pub fn commit(&mut self, message: &str, path: &str, content: &str) -> String {
        let full = self.dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full, content).unwrap();

        let mut index = self.repo.index().unwrap();
        index.add_path(Path::new(path)).unwrap();
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();

        let time = Time::new(1_704_067_200 + self.commits as i64 * 3600, 0);
        self.commits += 1;
        let sig = Signature::new("Integration Tester", "tester@example.com", &time).unwrap();

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

    /// `n` commits editing one file, oldest first
    pub fn history(&mut self, n: usize) -> Vec<String> {
        (0..n)
            .map(|i| {
                self.commit(
                    &format!("Change {}", i + 1),
                    "src/lib.rs",
                    &format!("pub fn version() -> u32 {{ {} }}\n", i + 1),
                )
            })
            .collect()
    }
}

/// Embedder that can be stalled to simulate a stuck provider
pub struct StallingEmbedder {
    pub stalled: AtomicBool,
    pub calls: AtomicUsize,
}

impl StallingEmbedder {
    pub fn new() -> Self {
        Self {
            stalled: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn stall(&self, on: bool) {
        self.stalled.store(on, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for StallingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(texts
            .iter()
            .map(|t| vec![t.chars().count() as f32, 0.0, 1.0, 0.0])
            .collect())
    }

    fn dimension(&self) -> usize {
        4
    }

    fn model_name(&self) -> &str {
        "stalling"
    }
}
