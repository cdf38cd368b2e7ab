//! # Thesis Harness CLI (`tsh`)
//!
//! The `tsh` binary drives the full pipeline: database initialization, PDF
//! ingestion through GROBID, embedding backfill, hybrid search, and corpus
//! statistics.
//!
//! ## Usage
//!
//! ```bash
//! tsh --config ./config/tsh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tsh init` | Create the SQLite database and run schema migrations |
//! | `tsh ingest <path>` | Extract, classify, and chunk PDFs via GROBID |
//! | `tsh index pending` | Embed chunks that have no vector yet |
//! | `tsh search "<query>"` | Hybrid search with section and metadata filters |
//! | `tsh stats` | Corpus-level counts |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! tsh init
//!
//! # Ingest a directory of theses
//! tsh ingest ./pdfs
//!
//! # Backfill embeddings for everything still pending
//! tsh index pending
//!
//! # Search only methodology and results sections of one author's work
//! tsh search "diseño experimental" \
//!     --sections metodologia,resultados \
//!     --filter author=García --filter year=2021
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use thesis_harness::{config, index_cmd, ingest, migrate, search_cmd, stats};

/// Thesis Harness CLI — GROBID-backed ingestion and hybrid retrieval for
/// academic documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tsh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tsh",
    about = "Thesis Harness — ingestion and hybrid retrieval for academic theses and papers",
    version,
    long_about = "Thesis Harness ingests PDF theses and papers through a GROBID server, \
    classifies their sections into a fixed Spanish/English taxonomy, chunks the text with \
    overlap, and serves hybrid search (vector ranking plus section and metadata filters) \
    from a single SQLite database."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tsh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (documents,
    /// sections, chunks, vectors, bib_references). Idempotent — running it
    /// multiple times is safe.
    Init,

    /// Ingest PDFs through GROBID.
    ///
    /// Walks the given path for PDF files, extracts each one with GROBID,
    /// classifies and chunks the body sections, and stores everything in
    /// SQLite. Documents already ingested (same content hash) are skipped.
    /// When an embedding provider is configured, new chunks are embedded
    /// inline; otherwise they stay pending for `tsh index pending`.
    Ingest {
        /// A PDF file or a directory to scan recursively.
        path: PathBuf,

        /// Report what would be ingested without extracting or writing.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of files to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Manage the vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Search the corpus.
    ///
    /// Embeds the query, ranks chunks by vector distance, and applies
    /// section and metadata filters without disturbing the ranking.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Comma-separated section categories to keep
        /// (e.g. `metodologia,resultados`).
        #[arg(long)]
        sections: Option<String>,

        /// Metadata filter as `key=value`; repeatable, all must match.
        /// Keys: title, author, year, journal, editorial, doi, conference,
        /// isbn, abstract, keyword, affiliation, filename, language.
        #[arg(long = "filter")]
        filters: Vec<String>,
    },

    /// Print corpus statistics.
    Stats,
}

/// Vector index subcommands.
#[derive(Subcommand)]
enum IndexAction {
    /// Embed chunks that have no vector yet.
    ///
    /// Drains the backlog in batches; a failed batch is skipped and stays
    /// pending for the next run.
    Pending {
        /// Override the batch size from config (texts per API call).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            dry_run,
            limit,
        } => {
            ingest::run_ingest(&cfg, &path, ingest::IngestOptions { dry_run, limit }).await?;
        }
        Commands::Index {
            action: IndexAction::Pending {
                batch_size,
                dry_run,
            },
        } => {
            index_cmd::run_index_pending(
                &cfg,
                index_cmd::IndexOptions {
                    batch_size,
                    dry_run,
                },
            )
            .await?;
        }
        Commands::Search {
            query,
            limit,
            sections,
            filters,
        } => {
            search_cmd::run_search(
                &cfg,
                search_cmd::SearchOptions {
                    query,
                    limit,
                    sections,
                    filters,
                },
            )
            .await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
