//! Author identity resolution with a run-scoped cache.
//!
//! Maps an author display name to a stable row id, creating the row on
//! first sighting. The cache belongs to one import run; concurrent runs
//! coordinate only through the store's unique index on `name`.

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

/// Sentinel display name for records that carry no author.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Default)]
pub struct AuthorResolver {
    cache: HashMap<String, String>,
}

impl AuthorResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `name` to an author id, creating the author if absent.
    ///
    /// A supplied avatar URL refreshes the stored one when it differs;
    /// no other field of an existing author changes through this path.
    pub async fn resolve(
        &mut self,
        pool: &SqlitePool,
        name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<String, sqlx::Error> {
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => UNKNOWN_AUTHOR.to_string(),
        };

        let id = match self.cache.get(&name) {
            Some(id) => id.clone(),
            None => {
                let id = find_or_create(pool, &name).await?;
                self.cache.insert(name, id.clone());
                id
            }
        };

        if let Some(avatar) = avatar_url.map(str::trim).filter(|a| !a.is_empty()) {
            sqlx::query(
                "UPDATE authors SET avatar_url = ?1 \
                 WHERE id = ?2 AND (avatar_url IS NULL OR avatar_url <> ?1)",
            )
            .bind(avatar)
            .bind(&id)
            .execute(pool)
            .await?;
        }

        Ok(id)
    }
}

async fn find_or_create(pool: &SqlitePool, name: &str) -> Result<String, sqlx::Error> {
    let existing: Option<String> = sqlx::query_scalar("SELECT id FROM authors WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    // A concurrent run may create the same name between the lookup and this
    // insert; the unique index decides the winner and the re-read below
    // returns the surviving row either way.
    sqlx::query(
        "INSERT INTO authors (id, name, social_links, articles_count, created_at) \
         VALUES (?, ?, '{}', 0, ?) ON CONFLICT(name) DO NOTHING",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    sqlx::query_scalar("SELECT id FROM authors WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await
}
