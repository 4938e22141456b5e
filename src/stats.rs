//! Store statistics and health overview.
//!
//! A quick summary of what the pipeline has ingested: author and article
//! counts with a per-source breakdown. Used by `gleaner stats` to give
//! confidence that imports are landing where expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

struct SourceStats {
    source: String,
    article_count: i64,
    last_ingested: Option<String>,
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_authors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authors")
        .fetch_one(&pool)
        .await?;

    let total_articles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Gleaner — Store Stats");
    println!("=====================");
    println!();
    println!("  Database:  {}", config.db.path.display());
    println!("  Size:      {}", format_bytes(db_size));
    println!();
    println!("  Authors:   {}", total_authors);
    println!("  Articles:  {}", total_articles);

    let source_rows = sqlx::query(
        r#"
        SELECT
            COALESCE(source_id, '(none)') AS source,
            COUNT(*) AS article_count,
            MAX(ingested_at) AS last_ingested
        FROM articles
        GROUP BY source_id
        ORDER BY article_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let source_stats: Vec<SourceStats> = source_rows
        .iter()
        .map(|row| SourceStats {
            source: row.get("source"),
            article_count: row.get("article_count"),
            last_ingested: row.get("last_ingested"),
        })
        .collect();

    if !source_stats.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<24} {:>8}   {}", "SOURCE", "ARTICLES", "LAST INGESTED");
        println!("  {}", "-".repeat(60));
        for s in &source_stats {
            println!(
                "  {:<24} {:>8}   {}",
                s.source,
                s.article_count,
                s.last_ingested.as_deref().unwrap_or("never")
            );
        }
    }

    let top_authors = sqlx::query(
        "SELECT name, articles_count FROM authors \
         ORDER BY articles_count DESC, name ASC LIMIT 10",
    )
    .fetch_all(&pool)
    .await?;

    if !top_authors.is_empty() {
        println!();
        println!("  Top authors:");
        for row in &top_authors {
            let name: String = row.get("name");
            let count: i64 = row.get("articles_count");
            println!("  {:<24} {:>8}", name, count);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
