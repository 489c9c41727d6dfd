//! # File Finder CLI (`file-finder`)
//!
//! Builds an in-memory semantic index over a directory tree and answers
//! natural-language queries against it, or summarizes files with a local
//! language model.
//!
//! ## Usage
//!
//! ```bash
//! file-finder --config ./config/file-finder.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `file-finder serve` | Start the HTTP server |
//! | `file-finder index <root>` | Build an index and print its status |
//! | `file-finder search <root> "<query>"` | Build an index, then search it |
//! | `file-finder summarize <file>` | Summarize one file |
//! | `file-finder chat "<message>"` | Send a message to the language model |
//! | `file-finder test-connection` | Check the language model server |
//!
//! The index lives only for the lifetime of the process, so `search`
//! rebuilds it on every invocation. Use `serve` to keep it warm.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use file_finder::config;
use file_finder::engine::Engine;
use file_finder::server;

/// File Finder: natural-language search and summarization over local files.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Built-in defaults are used when the file does not exist.
#[derive(Parser)]
#[command(
    name = "file-finder",
    about = "Natural-language search and summarization over a local directory tree",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/file-finder.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind`. The index is built by `POST /initialize`.
    Serve,

    /// Index a directory and print the resulting status.
    Index {
        /// Root directory to index.
        root: PathBuf,

        /// Embedding model for this build (defaults to `[embedding].model`).
        #[arg(long)]
        embedding_model: Option<String>,
    },

    /// Index a directory, then search it.
    Search {
        /// Root directory to index.
        root: PathBuf,

        /// Natural-language query.
        query: String,

        /// Maximum number of results.
        #[arg(long, default_value_t = 10)]
        limit: i64,

        #[arg(long)]
        embedding_model: Option<String>,
    },

    /// Summarize a file with the language model.
    Summarize {
        file: PathBuf,

        /// Language model server URL (defaults to `[llm].url`).
        #[arg(long)]
        url: Option<String>,

        /// Model name (defaults to `[llm].model`).
        #[arg(long)]
        model: Option<String>,
    },

    /// Send a message to the language model.
    Chat {
        message: String,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        model: Option<String>,
    },

    /// Check that the language model server is reachable and serves the model.
    TestConnection {
        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        model: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    if let Commands::Serve = cli.command {
        let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
        return runtime.block_on(server::run_server(&cfg));
    }

    let engine = Engine::from_config(&cfg)?;
    match cli.command {
        Commands::Serve => {}
        Commands::Index {
            root,
            embedding_model,
        } => {
            let status = engine.initialize_with_model(&root, embedding_model.as_deref())?;
            println!(
                "Indexed {} entries under {} ({} skipped).",
                status.document_count,
                status
                    .root
                    .as_deref()
                    .unwrap_or(root.as_path())
                    .display(),
                status.skipped_count
            );
        }
        Commands::Search {
            root,
            query,
            limit,
            embedding_model,
        } => {
            engine.initialize_with_model(&root, embedding_model.as_deref())?;
            let results = engine.search(&query, limit)?;
            if results.is_empty() {
                println!("No results.");
            }
            for result in &results {
                println!(
                    "{}. [{:.2}] {}",
                    result.rank,
                    result.score,
                    result.document.path.display()
                );
                println!("    {}", result.document.description);
                println!();
            }
        }
        Commands::Summarize { file, url, model } => {
            let target = engine.llm_target(url.as_deref(), model.as_deref());
            println!("{}", engine.summarize(&file, &target)?);
        }
        Commands::Chat {
            message,
            url,
            model,
        } => {
            let target = engine.llm_target(url.as_deref(), model.as_deref());
            println!("{}", engine.chat(&message, &target)?);
        }
        Commands::TestConnection { url, model } => {
            let target = engine.llm_target(url.as_deref(), model.as_deref());
            engine.test_connection(&target)?;
            println!(
                "Connection successful! Model {} is available at {}.",
                target.model, target.server_url
            );
        }
    }

    Ok(())
}
