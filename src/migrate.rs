use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an already-open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS authors (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            bio TEXT,
            avatar_url TEXT,
            social_links TEXT NOT NULL DEFAULT '{}',
            articles_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            id TEXT PRIMARY KEY,
            source_url TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            article_image TEXT,
            excerpt TEXT,
            category TEXT,
            publish_date TEXT,
            body TEXT NOT NULL DEFAULT '',
            tags TEXT,
            source_id TEXT,
            content_hash TEXT NOT NULL,
            ingested_at TEXT NOT NULL,
            author_id TEXT NOT NULL,
            FOREIGN KEY (author_id) REFERENCES authors(id) ON DELETE RESTRICT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_author_id ON articles(author_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_content_hash ON articles(content_hash)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_source_id ON articles(source_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_authors_articles_count ON authors(articles_count)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
