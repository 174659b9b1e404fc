use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commit_indexer::config::Config;
use commit_indexer::indexer::CommitIndexer;
use commit_indexer::queue::{LineMessageSource, serve};
use std::path::PathBuf;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\nbuilt:    ",
    env!("BUILD_TIMESTAMP"),
    "\ncommit:   ",
    env!("GIT_COMMIT_HASH"),
    "\nbackends: ",
    env!("VECTOR_STORE_BACKENDS"),
);

/// Index git commit history into a vector store
#[derive(Parser)]
#[command(name = "commit-indexer", version, long_version = LONG_VERSION)]
struct Cli {
    /// Configuration file (TOML); defaults to the platform config directory
    #[arg(long, global = true, env = "COMMIT_INDEXER_CONFIG")]
    config: Option<PathBuf>,

    /// Override indexing.max_concurrency
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index the repository behind a record and update its status
    Index {
        /// Repository record identifier
        id: String,
    },
    /// Index a repository by URL without touching any record
    IndexUrl {
        /// Clone URL or path to a local repository
        url: String,
        /// Resume every branch from this commit (inclusive)
        #[arg(long)]
        checkpoint: Option<String>,
    },
    /// Read repository ids from stdin, one per line, and acknowledge each on stdout
    Listen,
    /// Print the effective configuration
    ShowConfig,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default().context("Failed to load default config")?,
    };
    config.apply_env_overrides();

    if let Some(concurrency) = cli.concurrency {
        config.indexing.max_concurrency = concurrency;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Token cancelled on Ctrl-C
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping");
            trigger.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout carries reports and acknowledgements
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Command::ShowConfig = cli.command {
        let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
        println!("{}", rendered);
        return Ok(());
    }

    let indexer = CommitIndexer::from_config(config)
        .await
        .context("Failed to initialize indexer")?;
    let cancel = shutdown_token();

    match cli.command {
        Command::Index { id } => {
            let report = indexer
                .index_repository(&id, cancel)
                .await
                .with_context(|| format!("Indexing repository {} failed", id))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::IndexUrl { url, checkpoint } => {
            let report = indexer
                .process_repository(&url, checkpoint.as_deref(), cancel)
                .await
                .with_context(|| format!("Indexing {} failed", url))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Listen => {
            let mut source =
                LineMessageSource::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout());
            let stats = serve(&indexer, &mut source, cancel).await?;
            tracing::info!(
                "Listener stopped after {} messages ({} failed)",
                stats.received,
                stats.failed
            );
        }
        Command::ShowConfig => {}
    }

    Ok(())
}
