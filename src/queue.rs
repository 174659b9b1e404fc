//! Message trigger: one repository id per message, acknowledged once
//!
//! [`serve`] pulls messages from a [`MessageSource`], indexes the repository
//! each one names and acknowledges it after the run ends, whatever the
//! outcome. [`LineMessageSource`] reads ids from any line-oriented reader
//! and writes acknowledgements as JSON lines.

use crate::error::IndexerError;
use crate::indexer::CommitIndexer;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio_util::sync::CancellationToken;

/// A request to index one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub repository_id: String,
    /// Delivery counter assigned by the source
    pub delivery: u64,
}

/// How the run triggered by a message ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Indexed,
    Failed(String),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Indexed => "indexed",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// Source of indexing requests
#[async_trait::async_trait]
pub trait MessageSource: Send {
    /// Next message, `None` once the source is drained
    async fn receive(&mut self) -> Result<Option<Message>, IndexerError>;

    /// Acknowledge a message after its run finished
    async fn complete(&mut self, message: &Message, outcome: &Outcome) -> Result<(), IndexerError>;
}

#[derive(Serialize)]
struct Ack<'a> {
    repository_id: &'a str,
    outcome: &'static str,
    error: Option<&'a str>,
}

/// Repository ids read line by line; acknowledgements written as JSON lines
pub struct LineMessageSource<R, W> {
    lines: Lines<R>,
    writer: W,
    delivered: u64,
}

impl<R, W> LineMessageSource<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: reader.lines(),
            writer,
            delivered: 0,
        }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

#[async_trait::async_trait]
impl<R, W> MessageSource for LineMessageSource<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn receive(&mut self) -> Result<Option<Message>, IndexerError> {
        while let Some(line) = self.lines.next_line().await? {
            let id = line.trim();
            if id.is_empty() {
                continue;
            }

            self.delivered += 1;
            return Ok(Some(Message {
                repository_id: id.to_string(),
                delivery: self.delivered,
            }));
        }
        Ok(None)
    }

    async fn complete(&mut self, message: &Message, outcome: &Outcome) -> Result<(), IndexerError> {
        let ack = Ack {
            repository_id: &message.repository_id,
            outcome: outcome.as_str(),
            error: match outcome {
                Outcome::Indexed => None,
                Outcome::Failed(reason) => Some(reason.as_str()),
            },
        };

        let mut line = serde_json::to_string(&ack).map_err(|e| IndexerError::other(e.to_string()))?;
        line.push('\n');

        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Counts for one [`serve`] session
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ServeStats {
    pub received: usize,
    pub indexed: usize,
    pub failed: usize,
}

/// Index every message until the source drains or `cancel` fires.
///
/// Each received message is acknowledged exactly once, after its run ends.
/// A run interrupted by `cancel` is acknowledged as failed and no further
/// message is taken.
pub async fn serve<S: MessageSource>(
    indexer: &CommitIndexer,
    source: &mut S,
    cancel: CancellationToken,
) -> Result<ServeStats, IndexerError> {
    let mut stats = ServeStats::default();

    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = source.receive() => received?,
        };
        let Some(message) = received else {
            tracing::info!("Message source drained");
            break;
        };

        stats.received += 1;
        tracing::info!(
            "Received message #{} for repository {}",
            message.delivery,
            message.repository_id
        );

        let outcome = match indexer
            .index_repository(&message.repository_id, cancel.child_token())
            .await
        {
            Ok(report) => {
                tracing::info!(
                    "Repository {} indexed: {} commits, {} vectors",
                    message.repository_id,
                    report.commits_indexed,
                    report.vectors_upserted
                );
                stats.indexed += 1;
                Outcome::Indexed
            }
            Err(e) => {
                stats.failed += 1;
                Outcome::Failed(e.to_string())
            }
        };

        source.complete(&message, &outcome).await?;

        if cancel.is_cancelled() {
            break;
        }
    }

    tracing::info!(
        "Served {} messages ({} indexed, {} failed)",
        stats.received,
        stats.indexed,
        stats.failed
    );
    Ok(stats)
}
