//! Store statistics.
//!
//! `oai-harvest stats` prints what the last harvests left behind: set,
//! record, format and payload counts, records without a set, and a per-set
//! breakdown.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;
use crate::store::Store;

struct SetStats {
    spec: String,
    name: String,
    record_count: i64,
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let store = SqliteStore::new(pool.clone());

    let counts = store.counts().await?;
    let unlinked = store.unlinked_record_count().await?;
    let last_harvest: Option<i64> = sqlx::query_scalar("SELECT MAX(harvested_at) FROM headers")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("OAI store stats");
    println!("===============");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!(
        "  Last run:    {}",
        last_harvest
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    println!("  Sets:        {}", counts.sets);
    println!("  Records:     {}", counts.records);
    println!("  Unlinked:    {}", unlinked);
    println!("  Formats:     {}", counts.formats);
    println!("  Payloads:    {}", counts.payloads);

    let rows = sqlx::query(
        r#"
        SELECT s.spec, s.name, COUNT(hs.header_id) AS record_count
        FROM sets s
        LEFT JOIN header_sets hs ON hs.set_id = s.id
        GROUP BY s.id
        ORDER BY record_count DESC, s.spec
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let sets: Vec<SetStats> = rows
        .iter()
        .map(|row| SetStats {
            spec: row.get("spec"),
            name: row.get("name"),
            record_count: row.get("record_count"),
        })
        .collect();

    if !sets.is_empty() {
        println!();
        println!("  By set:");
        println!("  {:<24} {:>8}   {}", "SPEC", "RECORDS", "NAME");
        println!("  {}", "-".repeat(60));
        for s in &sets {
            println!("  {:<24} {:>8}   {}", s.spec, s.record_count, s.name);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Unix seconds as "3 hours ago", falling back to a date past 30 days.
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 || delta >= 86400 * 30 {
        return chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| ts.to_string());
    }

    let (n, unit) = match delta {
        0..=59 => return "just now".to_string(),
        60..=3599 => (delta / 60, "min"),
        3600..=86399 => (delta / 3600, "hour"),
        _ => (delta / 86400, "day"),
    };
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}
