//! Core data types that flow through the ingestion pipeline.
//!
//! A raw NDJSON line becomes a [`NormalizedRecord`] once validated and
//! canonicalized; the upsert engine reports what it did with each record
//! as an [`UpsertOutcome`].

use chrono::NaiveDate;

/// Validated, canonical form of one article record.
///
/// `content_hash` is a digest over the fields that define "the content
/// changed"; two records with the same hash never trigger a write.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub source_id: String,
    /// Natural key — unique across all articles regardless of source.
    pub source_url: String,
    pub title: String,
    pub author_name: Option<String>,
    pub author_avatar_url: Option<String>,
    pub publish_date: Option<NaiveDate>,
    /// Sanitized HTML body.
    pub body_html: Option<String>,
    pub article_image: Option<String>,
    pub excerpt: Option<String>,
    pub category: Option<String>,
    /// Comma-joined tag list, kept as the source supplied it.
    pub tags: Option<String>,
    pub content_hash: String,
}

/// What the upsert engine did with one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Content hash matched the stored row; no write performed.
    Skipped,
    /// Store-level failure; the message comes from the store client.
    Error(String),
}
