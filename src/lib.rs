//! # Gleaner
//!
//! Turns externally scraped, loosely-structured NDJSON article exports into
//! a consistent, deduplicated relational dataset.
//!
//! Upstream exporters disagree on key names, date formats, and markup
//! hygiene, and the same logical article may appear across re-exports.
//! Gleaner streams each export file line by line, normalizes every record
//! into a canonical shape, and writes it idempotently against a SQLite
//! store keyed by source URL, skipping writes when a content fingerprint
//! says nothing changed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌───────────┐   ┌──────────┐
//! │  NDJSON  │──▶│ LineReader │──▶│ Normalizer│──▶│ Upserter  │
//! │  export  │   │ (streaming)│   │ sanitize+ │   │ authors + │
//! └──────────┘   └────────────┘   │   hash    │   │ articles  │
//!                                 └───────────┘   └────┬─────┘
//!                                                      │
//!                                                ┌─────▼─────┐
//!                                                │ RunReport │
//!                                                │ (artifact)│
//!                                                └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`line_reader`] | Streaming NDJSON reader |
//! | [`sanitize`] | Allow-list HTML sanitizer |
//! | [`normalize`] | Record validation and canonicalization |
//! | [`authors`] | Author resolution with run-scoped cache |
//! | [`upsert`] | Idempotent article writes |
//! | [`report`] | Run counters and persisted report artifact |
//! | [`ingest`] | Per-line import orchestration |
//! | [`batch`] | Batch-oriented import variant |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema setup |
//! | [`stats`] | Store statistics |

pub mod authors;
pub mod batch;
pub mod config;
pub mod db;
pub mod ingest;
pub mod line_reader;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod report;
pub mod sanitize;
pub mod stats;
pub mod upsert;
