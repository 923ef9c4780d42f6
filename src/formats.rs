//! `oai-harvest formats`: register and list metadata formats.
//!
//! A harvest only stores payloads for prefixes that are both configured
//! under `[formats.*]` and registered in the store.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::MetadataFormat;
use crate::sqlite_store::SqliteStore;
use crate::store::Store;

/// Register (or update) the format `prefix`. Idempotent.
pub async fn add_format(
    store: &dyn Store,
    prefix: &str,
    schema: &str,
    namespace: &str,
) -> Result<MetadataFormat> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        bail!("format prefix must not be empty");
    }
    if prefix.contains(char::is_whitespace) {
        bail!("format prefix '{}' must not contain whitespace", prefix);
    }
    store.register_format(prefix, schema.trim(), namespace.trim()).await
}

pub async fn run_formats_add(
    config: &Config,
    prefix: &str,
    schema: &str,
    namespace: &str,
) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let store = SqliteStore::new(pool);

    let format = add_format(&store, prefix, schema, namespace).await?;
    println!("registered format {} (id {})", format.prefix, format.id);
    if !config.formats.contains_key(&format.prefix) {
        println!(
            "  note: no [formats.{}] section in the config; it will not be harvested",
            format.prefix
        );
    }

    store.pool().close().await;
    Ok(())
}

pub async fn run_formats_list(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let store = SqliteStore::new(pool);

    let formats = store.list_formats().await?;
    let per_format = store.records_per_format().await?;

    if formats.is_empty() {
        println!("No metadata formats registered.");
    } else {
        println!(
            "{:<16} {:>8}  {:<10} {}",
            "PREFIX", "RECORDS", "CONFIGURED", "SCHEMA"
        );
        for format in &formats {
            let records = per_format
                .iter()
                .find(|(prefix, _)| *prefix == format.prefix)
                .map(|(_, n)| *n)
                .unwrap_or(0);
            let configured = if config.formats.contains_key(&format.prefix) {
                "yes"
            } else {
                "no"
            };
            println!(
                "{:<16} {:>8}  {:<10} {}",
                format.prefix, records, configured, format.schema
            );
        }
    }

    for prefix in config.formats.keys() {
        if !formats.iter().any(|f| &f.prefix == prefix) {
            println!("configured but not registered: {}", prefix);
        }
    }

    store.pool().close().await;
    Ok(())
}
