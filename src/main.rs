//! # Gleaner CLI
//!
//! The `gleaner` binary ingests scraped NDJSON article exports into a
//! deduplicated SQLite dataset.
//!
//! ## Usage
//!
//! ```bash
//! gleaner --config ./config/gleaner.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gleaner init` | Create the SQLite database and schema |
//! | `gleaner import <source>` | Ingest one source's NDJSON export |
//! | `gleaner import <source> --batch` | Same, with buffered bulk writes |
//! | `gleaner stats` | Print author/article counts per source |

mod authors;
mod batch;
mod config;
mod db;
mod ingest;
mod line_reader;
mod migrate;
mod models;
mod normalize;
mod report;
mod sanitize;
mod stats;
mod upsert;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::report::RunReport;

/// Gleaner — ingest scraped NDJSON article exports into a consistent,
/// deduplicated relational dataset.
#[derive(Parser)]
#[command(
    name = "gleaner",
    about = "Gleaner — NDJSON article ingestion into a deduplicated SQLite dataset",
    version,
    long_about = "Gleaner streams newline-delimited JSON article exports, normalizes \
    heterogeneous records (key synonyms, mixed date formats, unsafe HTML), and upserts \
    them idempotently into SQLite keyed by source URL, skipping unchanged content by \
    fingerprint. Every run produces a persisted report of counters and per-line errors."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gleaner.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the authors/articles tables.
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Ingest one source's NDJSON export.
    ///
    /// Reads `<data_root>/<source>/<filename>` line by line, normalizes
    /// each record, and upserts it by source URL. Malformed or invalid
    /// lines are reported and skipped; the run always completes.
    Import {
        /// Source identifier (subdirectory of `ingest.data_root`).
        source: String,

        /// Buffer records and write in bulk batches instead of row by row.
        #[arg(long)]
        batch: bool,

        /// Read this file instead of the resolved source path.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Print store statistics.
    ///
    /// Shows author/article totals and a per-source breakdown with the
    /// time of the last successful ingest.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import {
            source,
            batch,
            file,
        } => {
            let report = if batch {
                batch::run_import_batched(&cfg, &source, file).await?
            } else {
                ingest::run_import(&cfg, &source, file).await?
            };
            print_summary(&report);
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("import {}", report.source);
    println!("  file: {}", report.file.display());
    println!("  lines: {}", report.totals.lines);
    println!("  valid: {}", report.totals.valid);
    println!("  inserted: {}", report.totals.inserted);
    println!("  updated: {}", report.totals.updated);
    println!("  skipped: {}", report.totals.skipped);
    println!("  errors: {}", report.totals.errors);
    for entry in report.errors.iter().take(10) {
        println!("    line {}: {} ({})", entry.line, entry.code, entry.message);
    }
    if report.errors.len() > 10 {
        println!("    ... and {} more", report.errors.len() - 10);
    }
    println!("ok");
}
