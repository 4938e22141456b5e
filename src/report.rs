//! Per-run accounting: counters, ordered error entries, and the persisted
//! report artifact.
//!
//! A report accumulates during a run, is stamped immutable by [`RunReport::finish`],
//! and is serialized to a timestamped JSON file for audit.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Named run counters. Closed so every call site handles a known counter.
#[derive(Debug, Clone, Copy)]
pub enum Counter {
    Lines,
    Valid,
    Inserted,
    Updated,
    Skipped,
    Errors,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Totals {
    pub lines: u64,
    pub valid: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub line: u64,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub source: String,
    pub file: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub totals: Totals,
    pub errors: Vec<ErrorEntry>,
}

impl RunReport {
    pub fn new(source: &str, file: &Path) -> Self {
        Self {
            source: source.to_string(),
            file: file.to_path_buf(),
            started_at: Utc::now(),
            finished_at: None,
            totals: Totals::default(),
            errors: Vec::new(),
        }
    }

    pub fn incr(&mut self, counter: Counter) {
        self.incr_by(counter, 1);
    }

    pub fn incr_by(&mut self, counter: Counter, by: u64) {
        let slot = match counter {
            Counter::Lines => &mut self.totals.lines,
            Counter::Valid => &mut self.totals.valid,
            Counter::Inserted => &mut self.totals.inserted,
            Counter::Updated => &mut self.totals.updated,
            Counter::Skipped => &mut self.totals.skipped,
            Counter::Errors => &mut self.totals.errors,
        };
        *slot += by;
    }

    /// Record one per-line failure; also counts toward `errors`.
    pub fn add_error(&mut self, line: u64, code: &str, message: impl Into<String>) {
        self.errors.push(ErrorEntry {
            line,
            code: code.to_string(),
            message: message.into(),
        });
        self.incr(Counter::Errors);
    }

    /// Stamp completion time. Consuming the builder keeps finished reports
    /// from accumulating further.
    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn duration_s(&self) -> f64 {
        match self.finished_at {
            Some(finished) => {
                (finished - self.started_at).num_milliseconds() as f64 / 1000.0
            }
            None => 0.0,
        }
    }

    pub fn to_artifact(&self) -> serde_json::Value {
        json!({
            "source": self.source,
            "file": self.file.display().to_string(),
            "started_at": self.started_at,
            "finished_at": self.finished_at,
            "duration_s": self.duration_s(),
            "totals": self.totals,
            "errors": self.errors,
        })
    }

    /// Persist the artifact as `ingest_<source>_<stamp>.json` under `dir`.
    pub fn write_artifact(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let stamp = self
            .finished_at
            .unwrap_or_else(Utc::now)
            .format("%Y%m%d-%H%M%S");
        let path = dir.join(format!("ingest_{}_{}.json", self.source, stamp));
        std::fs::write(&path, serde_json::to_string_pretty(&self.to_artifact())?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_error_bumps_the_errors_counter() {
        let mut report = RunReport::new("s", Path::new("f.ndjson"));
        report.add_error(3, "json_parse_error", "bad line");
        report.add_error(7, "missing_url", "normalization failed");
        assert_eq!(report.totals.errors, 2);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].line, 3);
        assert_eq!(report.errors[1].code, "missing_url");
    }

    #[test]
    fn finish_stamps_completion_time() {
        let report = RunReport::new("s", Path::new("f.ndjson")).finish();
        assert!(report.finished_at.is_some());
        assert!(report.duration_s() >= 0.0);
    }

    #[test]
    fn artifact_carries_counters_and_errors_in_order() {
        let mut report = RunReport::new("metras", Path::new("parsed.ndjson"));
        report.incr(Counter::Lines);
        report.incr(Counter::Valid);
        report.incr(Counter::Inserted);
        report.add_error(2, "json_parse_error", "oops");
        let artifact = report.finish().to_artifact();
        assert_eq!(artifact["source"], "metras");
        assert_eq!(artifact["totals"]["lines"], 1);
        assert_eq!(artifact["totals"]["inserted"], 1);
        assert_eq!(artifact["totals"]["errors"], 1);
        assert_eq!(artifact["errors"][0]["line"], 2);
    }

    #[test]
    fn write_artifact_creates_a_timestamped_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let report = RunReport::new("metras", Path::new("parsed.ndjson")).finish();
        let path = report.write_artifact(tmp.path()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("ingest_metras_"));
        assert!(name.ends_with(".json"));
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["totals"]["lines"], 0);
    }
}
