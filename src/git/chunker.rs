use crate::config::IndexingConfig;
use crate::types::{Chunk, CommitInfo};

/// A chunk together with the text that gets embedded for it
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPayload {
    pub chunk: Chunk,
    /// Embedding input, also stored as the vector's metadata text
    pub text: String,
}

/// Converts commits into size-bounded chunks and their embedding payloads
#[derive(Debug, Clone)]
pub struct CommitChunker {
    /// Window size in characters
    chunk_size: usize,
    /// Windows kept per commit
    max_chunks: usize,
    /// Diffs are cut to this many characters first
    max_diff_length: usize,
}

impl CommitChunker {
    /// Create a new commit chunker with default settings
    pub fn new() -> Self {
        Self::from_config(&IndexingConfig::default())
    }

    pub fn from_config(config: &IndexingConfig) -> Self {
        Self::with_limits(
            config.chunk_size,
            config.max_chunks,
            config.max_diff_length,
        )
    }

    /// Zero limits are bumped to 1
    pub fn with_limits(chunk_size: usize, max_chunks: usize, max_diff_length: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            max_chunks: max_chunks.max(1),
            max_diff_length: max_diff_length.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn max_chunks(&self) -> usize {
        self.max_chunks
    }

    /// Split a diff into the windows that get embedded.
    ///
    /// A diff of at most `chunk_size` characters (including the empty diff)
    /// is a single window. Longer diffs are cut into consecutive windows and
    /// only the first `max_chunks` are kept.
    pub fn split_diff<'a>(&self, diff: &'a str) -> Vec<&'a str> {
        let diff = truncate_chars(diff, self.max_diff_length);
        let mut windows = split_windows(diff, self.chunk_size);
        windows.truncate(self.max_chunks);
        windows
    }

    /// Chunks for a commit, in diff order
    pub fn chunk_commit(&self, commit_hash: &str, diff: &str) -> Vec<Chunk> {
        self.split_diff(diff)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                commit_hash: commit_hash.to_string(),
                index,
                text: text.to_string(),
            })
            .collect()
    }

    /// Chunks for a commit with their embedding payloads
    pub fn commit_payloads(
        &self,
        commit: &CommitInfo,
        repository_url: &str,
        diff: &str,
    ) -> Vec<ChunkPayload> {
        let diff = truncate_chars(diff, self.max_diff_length);
        let chunked = diff.chars().count() > self.chunk_size;

        self.chunk_commit(&commit.hash, diff)
            .into_iter()
            .map(|chunk| {
                let text = build_payload(commit, repository_url, &chunk, chunked);
                ChunkPayload { chunk, text }
            })
            .collect()
    }
}

impl Default for CommitChunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the structured text for one chunk.
///
/// `Author:` and `Email:` stay on their own lines; the retrieval side
/// matches on them.
pub fn build_payload(
    commit: &CommitInfo,
    repository_url: &str,
    chunk: &Chunk,
    chunked: bool,
) -> String {
    let mut content = String::with_capacity(chunk.text.len() + commit.message.len() + 256);

    content.push_str("Author: ");
    content.push_str(&commit.author_name);
    content.push('\n');

    content.push_str("Email: ");
    content.push_str(&commit.author_email);
    content.push('\n');

    content.push_str("Repository: ");
    content.push_str(repository_url);
    content.push('\n');

    content.push_str("Commit: ");
    content.push_str(&commit.hash);
    content.push('\n');

    content.push_str("Commit-Message:\n");
    content.push_str(commit.message.trim_end());
    content.push('\n');

    if chunked {
        content.push_str("Chunk: ");
        content.push_str(&chunk.index.to_string());
        content.push('\n');
    }

    content.push_str("Diff:\n");
    content.push_str(&chunk.text);

    content
}

/// Split `text` into consecutive windows of `size` characters.
///
/// Every window but the last holds exactly `size` characters. Text of at
/// most `size` characters, including empty text, is one window.
pub fn split_windows(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (offset, _) in text.char_indices() {
        if count == size {
            windows.push(&text[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }

    windows.push(&text[start..]);
    windows
}

/// Longest prefix of `text` holding at most `max` characters
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}
