//! Idempotent article writes keyed by the natural key (`source_url`).
//!
//! An unchanged content hash short-circuits to a skip with no write.
//! Store failures never escape; they come back as [`UpsertOutcome::Error`]
//! so a bad record cannot abort the run.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::authors::AuthorResolver;
use crate::models::{NormalizedRecord, UpsertOutcome};

pub async fn upsert_article(
    pool: &SqlitePool,
    resolver: &mut AuthorResolver,
    rec: &NormalizedRecord,
) -> UpsertOutcome {
    match try_upsert(pool, resolver, rec).await {
        Ok(outcome) => outcome,
        Err(err) => UpsertOutcome::Error(err.to_string()),
    }
}

async fn try_upsert(
    pool: &SqlitePool,
    resolver: &mut AuthorResolver,
    rec: &NormalizedRecord,
) -> Result<UpsertOutcome, sqlx::Error> {
    let author_id = resolver
        .resolve(
            pool,
            rec.author_name.as_deref(),
            rec.author_avatar_url.as_deref(),
        )
        .await?;

    let existing =
        sqlx::query("SELECT id, content_hash, author_id FROM articles WHERE source_url = ?")
            .bind(&rec.source_url)
            .fetch_optional(pool)
            .await?;

    let publish_date = rec.publish_date.map(|d| d.to_string());
    let ingested_at = Utc::now().to_rfc3339();

    match existing {
        Some(row) => {
            let id: String = row.get("id");
            let stored_hash: String = row.get("content_hash");
            let old_author_id: String = row.get("author_id");

            if stored_hash == rec.content_hash {
                return Ok(UpsertOutcome::Skipped);
            }

            let mut tx = pool.begin().await?;
            sqlx::query(
                r#"
                UPDATE articles SET
                    title = ?, article_image = ?, excerpt = ?, category = ?,
                    publish_date = ?, body = ?, tags = ?, source_id = ?,
                    content_hash = ?, ingested_at = ?, author_id = ?
                WHERE id = ?
                "#,
            )
            .bind(&rec.title)
            .bind(&rec.article_image)
            .bind(&rec.excerpt)
            .bind(&rec.category)
            .bind(&publish_date)
            .bind(rec.body_html.as_deref().unwrap_or(""))
            .bind(&rec.tags)
            .bind(&rec.source_id)
            .bind(&rec.content_hash)
            .bind(&ingested_at)
            .bind(&author_id)
            .bind(&id)
            .execute(&mut *tx)
            .await?;

            // An article that moved between authors shifts one count each way.
            if old_author_id != author_id {
                sqlx::query("UPDATE authors SET articles_count = articles_count - 1 WHERE id = ?")
                    .bind(&old_author_id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("UPDATE authors SET articles_count = articles_count + 1 WHERE id = ?")
                    .bind(&author_id)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;

            Ok(UpsertOutcome::Updated)
        }
        None => {
            let mut tx = pool.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO articles (
                    id, source_url, title, article_image, excerpt, category,
                    publish_date, body, tags, source_id, content_hash,
                    ingested_at, author_id
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&rec.source_url)
            .bind(&rec.title)
            .bind(&rec.article_image)
            .bind(&rec.excerpt)
            .bind(&rec.category)
            .bind(&publish_date)
            .bind(rec.body_html.as_deref().unwrap_or(""))
            .bind(&rec.tags)
            .bind(&rec.source_id)
            .bind(&rec.content_hash)
            .bind(&ingested_at)
            .bind(&author_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE authors SET articles_count = articles_count + 1 WHERE id = ?")
                .bind(&author_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            Ok(UpsertOutcome::Inserted)
        }
    }
}
