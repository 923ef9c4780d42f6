use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            spec TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metadata_formats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            prefix TEXT NOT NULL UNIQUE,
            schema TEXT NOT NULL,
            namespace TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS headers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identifier TEXT NOT NULL UNIQUE,
            timestamp TEXT,
            harvested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS header_sets (
            header_id INTEGER NOT NULL,
            set_id INTEGER NOT NULL,
            PRIMARY KEY (header_id, set_id),
            FOREIGN KEY (header_id) REFERENCES headers(id),
            FOREIGN KEY (set_id) REFERENCES sets(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS header_formats (
            header_id INTEGER NOT NULL,
            format_id INTEGER NOT NULL,
            PRIMARY KEY (header_id, format_id),
            FOREIGN KEY (header_id) REFERENCES headers(id),
            FOREIGN KEY (format_id) REFERENCES metadata_formats(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Decoded Dublin Core payloads, one JSON object per (header, format)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dc_records (
            header_id INTEGER NOT NULL,
            format_id INTEGER NOT NULL,
            dc_json TEXT NOT NULL,
            title TEXT,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (header_id, format_id),
            FOREIGN KEY (header_id) REFERENCES headers(id),
            FOREIGN KEY (format_id) REFERENCES metadata_formats(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Raw payloads for every other format
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS xml_records (
            header_id INTEGER NOT NULL,
            format_id INTEGER NOT NULL,
            xml_metadata TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (header_id, format_id),
            FOREIGN KEY (header_id) REFERENCES headers(id),
            FOREIGN KEY (format_id) REFERENCES metadata_formats(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_header_sets_set_id ON header_sets(set_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_header_formats_format_id ON header_formats(format_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_headers_timestamp ON headers(timestamp DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
