//! End-to-end import tests over a temporary SQLite store.

use std::fs;
use std::path::Path;

use sqlx::{Row, SqlitePool};
use tempfile::TempDir;

use gleaner::authors::AuthorResolver;
use gleaner::batch;
use gleaner::config::{Config, DbConfig, IngestConfig, ReportConfig};
use gleaner::db;
use gleaner::ingest;
use gleaner::migrate;

fn test_config(root: &Path) -> Config {
    Config {
        db: DbConfig {
            path: root.join("gleaner.sqlite"),
        },
        ingest: IngestConfig {
            data_root: root.join("sources"),
            filename: "parsed.ndjson".to_string(),
            batch_size: 1000,
        },
        report: ReportConfig {
            dir: root.join("reports"),
        },
    }
}

async fn setup(root: &Path) -> (Config, SqlitePool) {
    let config = test_config(root);
    migrate::run_migrations(&config).await.unwrap();
    let pool = db::connect(&config).await.unwrap();
    (config, pool)
}

fn write_source(config: &Config, source: &str, lines: &[&str]) {
    let dir = config.ingest.data_root.join(source);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(&config.ingest.filename), lines.join("\n")).unwrap();
}

async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

/// Article rows joined with their author, in a comparable shape.
async fn snapshot(pool: &SqlitePool) -> Vec<Vec<Option<String>>> {
    let rows = sqlx::query(
        r#"
        SELECT a.source_url, a.title, a.body, a.excerpt, a.category,
               a.publish_date, a.tags, a.source_id, a.content_hash,
               au.name AS author_name,
               CAST(au.articles_count AS TEXT) AS articles_count
        FROM articles a
        JOIN authors au ON au.id = a.author_id
        ORDER BY a.source_url
        "#,
    )
    .fetch_all(pool)
    .await
    .unwrap();

    rows.iter()
        .map(|row| {
            (0..11)
                .map(|i| row.try_get::<Option<String>, _>(i).unwrap())
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn end_to_end_three_line_scenario() {
    let tmp = TempDir::new().unwrap();
    let (config, pool) = setup(tmp.path()).await;

    write_source(
        &config,
        "metras",
        &[
            r#"{"url": "https://x.test/a", "title": "First", "author": "A"}"#,
            "",
            "{not valid json",
        ],
    );

    let report = ingest::run_import(&config, "metras", None).await.unwrap();

    assert_eq!(report.totals.lines, 2);
    assert_eq!(report.totals.valid, 1);
    assert_eq!(report.totals.inserted, 1);
    assert_eq!(report.totals.errors, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].line, 3);
    assert_eq!(report.errors[0].code, "json_parse_error");

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM authors").await, 1);
    let name: String = sqlx::query_scalar("SELECT name FROM authors")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(name, "A");

    let title: String =
        sqlx::query_scalar("SELECT title FROM articles WHERE source_url = 'https://x.test/a'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(title, "First");

    // One persisted artifact with the same counters.
    let artifacts: Vec<_> = fs::read_dir(&config.report.dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(artifacts.len(), 1);
    let parsed: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&artifacts[0]).unwrap()).unwrap();
    assert_eq!(parsed["totals"]["lines"], 2);
    assert_eq!(parsed["totals"]["inserted"], 1);
    assert_eq!(parsed["errors"][0]["code"], "json_parse_error");
}

#[tokio::test]
async fn importing_the_same_file_twice_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let (config, pool) = setup(tmp.path()).await;

    write_source(
        &config,
        "metras",
        &[
            r#"{"url": "https://x.test/a", "title": "A1", "author": "Alice"}"#,
            r#"{"url": "https://x.test/b", "title": "B1", "author": "Bob"}"#,
        ],
    );

    let first = ingest::run_import(&config, "metras", None).await.unwrap();
    assert_eq!(first.totals.inserted, 2);
    assert_eq!(first.totals.skipped, 0);

    let second = ingest::run_import(&config, "metras", None).await.unwrap();
    assert_eq!(second.totals.inserted, 0);
    assert_eq!(second.totals.updated, 0);
    assert_eq!(second.totals.skipped, 2);

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM articles").await, 2);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM authors").await, 2);
}

#[tokio::test]
async fn changed_title_updates_the_row_in_place() {
    let tmp = TempDir::new().unwrap();
    let (config, pool) = setup(tmp.path()).await;

    write_source(
        &config,
        "metras",
        &[r#"{"url": "https://x.test/a", "title": "Old title", "author": "A"}"#],
    );
    ingest::run_import(&config, "metras", None).await.unwrap();

    write_source(
        &config,
        "metras",
        &[r#"{"url": "https://x.test/a", "title": "New title", "author": "A"}"#],
    );
    let report = ingest::run_import(&config, "metras", None).await.unwrap();

    assert_eq!(report.totals.updated, 1);
    assert_eq!(report.totals.inserted, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM articles").await, 1);
    let title: String = sqlx::query_scalar("SELECT title FROM articles")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(title, "New title");
}

#[tokio::test]
async fn tags_only_change_counts_as_skipped() {
    let tmp = TempDir::new().unwrap();
    let (config, pool) = setup(tmp.path()).await;

    write_source(
        &config,
        "metras",
        &[r#"{"url": "https://x.test/a", "title": "T", "tags": ["x"]}"#],
    );
    ingest::run_import(&config, "metras", None).await.unwrap();

    write_source(
        &config,
        "metras",
        &[r#"{"url": "https://x.test/a", "title": "T", "tags": ["y"]}"#],
    );
    let report = ingest::run_import(&config, "metras", None).await.unwrap();

    assert_eq!(report.totals.skipped, 1);
    let tags: Option<String> = sqlx::query_scalar("SELECT tags FROM articles")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(tags.as_deref(), Some("x"));
}

#[tokio::test]
async fn articles_count_matches_owned_rows_after_author_move() {
    let tmp = TempDir::new().unwrap();
    let (config, pool) = setup(tmp.path()).await;

    write_source(
        &config,
        "metras",
        &[
            r#"{"url": "https://x.test/1", "title": "One", "author": "Alice"}"#,
            r#"{"url": "https://x.test/2", "title": "Two", "author": "Alice"}"#,
            r#"{"url": "https://x.test/3", "title": "Three", "author": "Bob"}"#,
        ],
    );
    ingest::run_import(&config, "metras", None).await.unwrap();
    assert_counts_exact(&pool).await;

    // Article 2 changes hands.
    write_source(
        &config,
        "metras",
        &[
            r#"{"url": "https://x.test/1", "title": "One", "author": "Alice"}"#,
            r#"{"url": "https://x.test/2", "title": "Two", "author": "Bob"}"#,
            r#"{"url": "https://x.test/3", "title": "Three", "author": "Bob"}"#,
        ],
    );
    let report = ingest::run_import(&config, "metras", None).await.unwrap();
    assert_eq!(report.totals.updated, 1);
    assert_eq!(report.totals.skipped, 2);
    assert_counts_exact(&pool).await;

    let alice: i64 =
        sqlx::query_scalar("SELECT articles_count FROM authors WHERE name = 'Alice'")
            .fetch_one(&pool)
            .await
            .unwrap();
    let bob: i64 = sqlx::query_scalar("SELECT articles_count FROM authors WHERE name = 'Bob'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(alice, 1);
    assert_eq!(bob, 2);
}

async fn assert_counts_exact(pool: &SqlitePool) {
    let mismatched: i64 = count(
        pool,
        "SELECT COUNT(*) FROM authors WHERE articles_count <> \
         (SELECT COUNT(*) FROM articles WHERE articles.author_id = authors.id)",
    )
    .await;
    assert_eq!(mismatched, 0);
}

#[tokio::test]
async fn records_missing_required_fields_are_rejected_without_writes() {
    let tmp = TempDir::new().unwrap();
    let (config, pool) = setup(tmp.path()).await;

    write_source(
        &config,
        "metras",
        &[
            r#"{"title": "No url here", "author": "A"}"#,
            r#"{"url": "https://x.test/a", "author": "B"}"#,
        ],
    );
    let report = ingest::run_import(&config, "metras", None).await.unwrap();

    assert_eq!(report.totals.lines, 2);
    assert_eq!(report.totals.valid, 0);
    assert_eq!(report.totals.errors, 2);
    assert_eq!(report.errors[0].code, "missing_url");
    assert_eq!(report.errors[1].code, "missing_title");

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM articles").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM authors").await, 0);
}

#[tokio::test]
async fn malformed_line_does_not_stop_later_lines() {
    let tmp = TempDir::new().unwrap();
    let (config, pool) = setup(tmp.path()).await;

    write_source(
        &config,
        "metras",
        &[
            "{broken json",
            r#"{"url": "https://x.test/after", "title": "Still ingested"}"#,
        ],
    );
    let report = ingest::run_import(&config, "metras", None).await.unwrap();

    assert_eq!(report.totals.errors, 1);
    assert_eq!(report.errors[0].line, 1);
    assert_eq!(report.errors[0].code, "json_parse_error");
    assert_eq!(report.totals.inserted, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM articles").await, 1);
}

#[tokio::test]
async fn missing_file_finalizes_a_zero_activity_report() {
    let tmp = TempDir::new().unwrap();
    let (config, _pool) = setup(tmp.path()).await;

    let report = ingest::run_import(&config, "ghost", None).await.unwrap();

    assert_eq!(report.totals.lines, 0);
    assert_eq!(report.totals.errors, 0);
    assert!(report.finished_at.is_some());

    // The artifact is still persisted for audit.
    let artifacts: Vec<_> = fs::read_dir(&config.report.dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(artifacts.len(), 1);
}

#[tokio::test]
async fn records_without_author_get_the_unknown_sentinel() {
    let tmp = TempDir::new().unwrap();
    let (config, pool) = setup(tmp.path()).await;

    write_source(
        &config,
        "metras",
        &[r#"{"url": "https://x.test/anon", "title": "Anonymous piece"}"#],
    );
    ingest::run_import(&config, "metras", None).await.unwrap();

    let name: String = sqlx::query_scalar(
        "SELECT au.name FROM articles a JOIN authors au ON au.id = a.author_id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(name, "Unknown");
}

#[tokio::test]
async fn avatar_url_is_refreshed_on_existing_author() {
    let tmp = TempDir::new().unwrap();
    let (config, pool) = setup(tmp.path()).await;

    write_source(
        &config,
        "metras",
        &[r#"{"url": "https://x.test/a", "title": "T1", "author": "A", "author_avatar": "https://img.test/old.png"}"#],
    );
    ingest::run_import(&config, "metras", None).await.unwrap();

    write_source(
        &config,
        "metras",
        &[r#"{"url": "https://x.test/a", "title": "T2", "author": "A", "author_avatar": "https://img.test/new.png"}"#],
    );
    ingest::run_import(&config, "metras", None).await.unwrap();

    let avatar: Option<String> =
        sqlx::query_scalar("SELECT avatar_url FROM authors WHERE name = 'A'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(avatar.as_deref(), Some("https://img.test/new.png"));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM authors").await, 1);
}

#[tokio::test]
async fn two_runs_with_independent_caches_share_one_author_row() {
    let tmp = TempDir::new().unwrap();
    let (_config, pool) = setup(tmp.path()).await;

    let mut first = AuthorResolver::new();
    let mut second = AuthorResolver::new();

    let id_a = first.resolve(&pool, Some("Zed"), None).await.unwrap();
    let id_b = second.resolve(&pool, Some("Zed"), None).await.unwrap();

    assert_eq!(id_a, id_b);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM authors").await, 1);
}

#[tokio::test]
async fn resolver_reuses_a_row_created_by_another_writer() {
    let tmp = TempDir::new().unwrap();
    let (_config, pool) = setup(tmp.path()).await;

    // Another run won the creation race for this name.
    sqlx::query(
        "INSERT INTO authors (id, name, social_links, articles_count, created_at) \
         VALUES ('winner-id', 'Raced', '{}', 0, '2026-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let mut resolver = AuthorResolver::new();
    let id = resolver.resolve(&pool, Some("Raced"), None).await.unwrap();
    assert_eq!(id, "winner-id");
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM authors").await, 1);
}

#[tokio::test]
async fn batch_and_per_line_imports_produce_identical_state() {
    let lines = [
        r#"{"url": "https://x.test/1", "title": "One", "author": "Alice", "category": "News"}"#,
        r#"{"url": "https://x.test/2", "title": "Two", "author": "Bob", "body_html": "<p>body</p>"}"#,
        r#"{"url": "https://x.test/1", "title": "One revised", "author": "Alice"}"#,
        r#"{"url": "https://x.test/3", "title": "Three", "published_at": "2024-03-05T00:00:00Z"}"#,
        r#"{"url": "https://x.test/4", "title": "Four", "author": "Alice", "tags": ["a", "b"]}"#,
    ];

    let tmp_a = TempDir::new().unwrap();
    let (config_a, pool_a) = setup(tmp_a.path()).await;
    write_source(&config_a, "metras", &lines);
    ingest::run_import(&config_a, "metras", None).await.unwrap();

    let tmp_b = TempDir::new().unwrap();
    let (mut config_b, pool_b) = setup(tmp_b.path()).await;
    // Small batches force several flushes, including a mid-batch duplicate.
    config_b.ingest.batch_size = 2;
    write_source(&config_b, "metras", &lines);
    batch::run_import_batched(&config_b, "metras", None)
        .await
        .unwrap();

    let snap_a = snapshot(&pool_a).await;
    let snap_b = snapshot(&pool_b).await;
    assert_eq!(snap_a.len(), 4);
    assert_eq!(snap_a, snap_b);

    assert_counts_exact(&pool_a).await;
    assert_counts_exact(&pool_b).await;
}

#[tokio::test]
async fn batch_import_recomputes_author_counts_exactly() {
    let tmp = TempDir::new().unwrap();
    let (mut config, pool) = setup(tmp.path()).await;
    config.ingest.batch_size = 2;

    write_source(
        &config,
        "metras",
        &[
            r#"{"url": "https://x.test/1", "title": "One", "author": "Alice"}"#,
            r#"{"url": "https://x.test/2", "title": "Two", "author": "Alice"}"#,
            r#"{"url": "https://x.test/3", "title": "Three", "author": "Bob"}"#,
            r#"{"url": "https://x.test/4", "title": "Four"}"#,
        ],
    );
    let report = batch::run_import_batched(&config, "metras", None)
        .await
        .unwrap();

    assert_eq!(report.totals.inserted, 4);
    assert_counts_exact(&pool).await;

    let alice: i64 =
        sqlx::query_scalar("SELECT articles_count FROM authors WHERE name = 'Alice'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(alice, 2);
    let unknown: i64 =
        sqlx::query_scalar("SELECT articles_count FROM authors WHERE name = 'Unknown'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(unknown, 1);
}

#[tokio::test]
async fn batch_dedup_keeps_the_last_record_for_a_url() {
    let tmp = TempDir::new().unwrap();
    let (config, pool) = setup(tmp.path()).await;

    write_source(
        &config,
        "metras",
        &[
            r#"{"url": "https://x.test/dup", "title": "Earlier"}"#,
            r#"{"url": "https://x.test/dup", "title": "Later"}"#,
        ],
    );
    let report = batch::run_import_batched(&config, "metras", None)
        .await
        .unwrap();

    assert_eq!(report.totals.inserted, 1);
    assert_eq!(report.totals.skipped, 1);
    let title: String = sqlx::query_scalar("SELECT title FROM articles")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(title, "Later");
}
