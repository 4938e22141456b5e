//! Per-line import orchestration.
//!
//! One run wires the pipeline end to end: open file → stream lines →
//! normalize → resolve author → upsert → record outcome → finalize report.
//! Every non-blank line produces exactly one counter increment or one
//! error entry, and no failure mode escapes as a fault — a run always
//! finalizes and returns its report.

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::authors::AuthorResolver;
use crate::config::Config;
use crate::db;
use crate::line_reader::{LineOutcome, LineReader};
use crate::models::UpsertOutcome;
use crate::normalize::Normalizer;
use crate::report::{Counter, RunReport};
use crate::upsert;

/// Where a source's export lives: `<data_root>/<source>/<filename>`.
pub fn source_file(config: &Config, source: &str) -> PathBuf {
    config
        .ingest
        .data_root
        .join(source)
        .join(&config.ingest.filename)
}

pub async fn run_import(
    config: &Config,
    source: &str,
    file_override: Option<PathBuf>,
) -> Result<RunReport> {
    let pool = db::connect(config).await?;
    let report = import_into(&pool, config, source, file_override).await;
    pool.close().await;
    report
}

pub async fn import_into(
    pool: &SqlitePool,
    config: &Config,
    source: &str,
    file_override: Option<PathBuf>,
) -> Result<RunReport> {
    let file = file_override.unwrap_or_else(|| source_file(config, source));
    let mut report = RunReport::new(source, &file);
    let normalizer = Normalizer::new(source);
    let mut resolver = AuthorResolver::new();

    info!(source, file = %file.display(), "starting import");

    for outcome in LineReader::open(&file) {
        match outcome {
            LineOutcome::Missing => {
                warn!(source, file = %file.display(), "data file not found");
                break;
            }
            LineOutcome::Malformed { line, message } => {
                report.incr(Counter::Lines);
                report.add_error(line, "json_parse_error", message);
            }
            LineOutcome::Record { line, value } => {
                report.incr(Counter::Lines);
                let rec = match normalizer.normalize(&value) {
                    Ok(rec) => rec,
                    Err(err) => {
                        report.add_error(line, err.code(), "normalization failed");
                        continue;
                    }
                };
                report.incr(Counter::Valid);
                match upsert::upsert_article(pool, &mut resolver, &rec).await {
                    UpsertOutcome::Inserted => report.incr(Counter::Inserted),
                    UpsertOutcome::Updated => report.incr(Counter::Updated),
                    UpsertOutcome::Skipped => report.incr(Counter::Skipped),
                    UpsertOutcome::Error(message) => {
                        report.add_error(line, "upsert_error", message)
                    }
                }
            }
        }
    }

    Ok(finalize(report, &config.report.dir))
}

/// Stamp the report, persist its artifact, and log the totals. An artifact
/// write failure is a warning, never a run failure.
pub(crate) fn finalize(report: RunReport, report_dir: &Path) -> RunReport {
    let report = report.finish();
    match report.write_artifact(report_dir) {
        Ok(path) => info!(report = %path.display(), "report written"),
        Err(err) => warn!(error = %err, "failed to write report artifact"),
    }
    info!(
        source = %report.source,
        lines = report.totals.lines,
        valid = report.totals.valid,
        inserted = report.totals.inserted,
        updated = report.totals.updated,
        skipped = report.totals.skipped,
        errors = report.totals.errors,
        "import finished"
    );
    report
}
