//! Record normalization: validation, sanitization, canonicalization, and
//! change-detection hashing.
//!
//! Maps a raw, loosely-typed record into a [`NormalizedRecord`]. Exporters
//! disagree on key names, so each logical field is extracted by trying a
//! fixed, ordered list of known keys — arbitrary keys are never reflected
//! over. Only `url` and `title` are hard requirements; everything else
//! degrades to absence.

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::models::NormalizedRecord;
use crate::sanitize;

/// Longest title persisted; anything over is cut at a char boundary.
const TITLE_MAX_CHARS: usize = 500;
/// Character budget for a derived excerpt, ellipsis included.
const EXCERPT_MAX_CHARS: usize = 240;
const ELLIPSIS: &str = "...";
/// Joins the hash tuple; cannot occur in any field.
const HASH_SEPARATOR: char = '\u{1}';

const URL_KEYS: &[&str] = &["url", "source_url"];
const BODY_HTML_KEYS: &[&str] = &["body_html", "content_html"];
const BODY_TEXT_KEYS: &[&str] = &["body_text", "content"];
const IMAGE_KEYS: &[&str] = &["article_image", "article_image_url"];
const CATEGORY_KEYS: &[&str] = &["category", "categorie"];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%Y-%m-%dT%H:%M:%S",
];

/// Why a record failed validation. The code strings are stable and end up
/// in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeError {
    MissingUrl,
    MissingTitle,
}

impl NormalizeError {
    pub fn code(&self) -> &'static str {
        match self {
            NormalizeError::MissingUrl => "missing_url",
            NormalizeError::MissingTitle => "missing_title",
        }
    }
}

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::error::Error for NormalizeError {}

pub struct Normalizer {
    source_id: String,
}

impl Normalizer {
    pub fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
        }
    }

    pub fn normalize(&self, input: &Value) -> Result<NormalizedRecord, NormalizeError> {
        let empty = Map::new();
        let obj = input.as_object().unwrap_or(&empty);

        let source_url = first_str(obj, URL_KEYS).ok_or(NormalizeError::MissingUrl)?;
        let title = first_str(obj, &["title"]).ok_or(NormalizeError::MissingTitle)?;
        let title = clamp_chars(&title, TITLE_MAX_CHARS);

        let author_name = first_str(obj, &["author"]);
        let author_avatar_url = first_str(obj, &["author_avatar"]);

        // Body preference: HTML > text. A plain-text body is escaped and
        // wrapped into paragraphs; both paths go through the sanitizer.
        let body_html = first_str(obj, BODY_HTML_KEYS)
            .or_else(|| first_str(obj, BODY_TEXT_KEYS).map(|text| text_to_html(&text)))
            .map(|html| sanitize::sanitize_html(&html));

        let publish_date = parse_publish_date(obj);
        let category = extract_category(obj);
        let tags = extract_tags(obj);
        let article_image = first_str(obj, IMAGE_KEYS);

        let excerpt = first_str(obj, &["excerpt"])
            .or_else(|| body_html.as_deref().and_then(derive_excerpt));

        let content_hash = content_hash(
            &title,
            author_name.as_deref(),
            publish_date,
            body_html.as_deref(),
            article_image.as_deref(),
            excerpt.as_deref(),
            category.as_deref(),
        );

        Ok(NormalizedRecord {
            source_id: self.source_id.clone(),
            source_url,
            title,
            author_name,
            author_avatar_url,
            publish_date,
            body_html,
            article_image,
            excerpt,
            category,
            tags,
            content_hash,
        })
    }
}

/// First key whose value is a non-blank string, trimmed.
fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = obj.get(*key).and_then(Value::as_str) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

fn clamp_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Escape a plain-text body and wrap blank-line-separated paragraphs.
fn text_to_html(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|para| !para.is_empty())
        .map(|para| format!("<p>{}</p>", sanitize::escape_text(para)))
        .collect()
}

fn parse_publish_date(obj: &Map<String, Value>) -> Option<NaiveDate> {
    if let Some(ts) = obj.get("published_at_ts").and_then(epoch_seconds) {
        return DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive());
    }
    match obj.get("published_at") {
        Some(Value::String(s)) => parse_date_str(s.trim()),
        Some(value) => epoch_seconds(value)
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.date_naive()),
        None => None,
    }
}

fn epoch_seconds(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Absence over failure: an unparseable date stores no date.
fn parse_date_str(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }
    for format in DATE_FORMATS {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date());
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }
    None
}

/// Single-category model: first usable entry of a list, else the scalar keys.
fn extract_category(obj: &Map<String, Value>) -> Option<String> {
    if let Some(list) = obj.get("categories").and_then(Value::as_array) {
        for item in list {
            if let Some(s) = item.as_str() {
                let trimmed = s.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    first_str(obj, CATEGORY_KEYS)
}

fn extract_tags(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("tags") {
        Some(Value::Array(items)) => {
            let joined = items
                .iter()
                .filter_map(|v| v.as_str().map(str::trim))
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(",");
            (!joined.is_empty()).then_some(joined)
        }
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

/// Strip tags, collapse whitespace, and truncate at the last word boundary
/// so text plus the ellipsis never exceeds the budget.
fn derive_excerpt(body_html: &str) -> Option<String> {
    let text = sanitize::strip_tags(body_html);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.chars().count() <= EXCERPT_MAX_CHARS {
        return Some(collapsed);
    }
    let budget = EXCERPT_MAX_CHARS - ELLIPSIS.len();
    let head: String = collapsed.chars().take(budget).collect();
    let head = match head.rfind(' ') {
        Some(pos) => &head[..pos],
        None => head.as_str(),
    };
    Some(format!("{head}{ELLIPSIS}"))
}

#[allow(clippy::too_many_arguments)]
fn content_hash(
    title: &str,
    author_name: Option<&str>,
    publish_date: Option<NaiveDate>,
    body_html: Option<&str>,
    article_image: Option<&str>,
    excerpt: Option<&str>,
    category: Option<&str>,
) -> String {
    let date_iso = publish_date.map(|d| d.to_string()).unwrap_or_default();
    let fields = [
        title,
        author_name.unwrap_or(""),
        date_iso.as_str(),
        body_html.unwrap_or(""),
        article_image.unwrap_or(""),
        excerpt.unwrap_or(""),
        category.unwrap_or(""),
    ];
    let mut joined = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            joined.push(HASH_SEPARATOR);
        }
        joined.push_str(field);
    }
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    format!("{:x}", hasher.finalize())
}
