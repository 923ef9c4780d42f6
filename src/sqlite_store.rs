//! SQLite-backed [`Store`] implementation.
//!
//! Every upsert maps to one `INSERT ... ON CONFLICT ... DO UPDATE` keyed on
//! the table's UNIQUE business key, and every association to an
//! `INSERT OR IGNORE`, so re-harvesting never duplicates rows.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::dublin_core::DublinCore;
use crate::models::{Header, HarvestSet, MetadataFormat, MetadataPayload, StoreCounts};
use crate::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of records with no set association.
    pub async fn unlinked_record_count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM headers h WHERE NOT EXISTS \
             (SELECT 1 FROM header_sets hs WHERE hs.header_id = h.id)",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }

    /// Number of records associated with each format, by prefix.
    pub async fn records_per_format(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT f.prefix, COUNT(hf.header_id) AS n
            FROM metadata_formats f
            LEFT JOIN header_formats hf ON hf.format_id = f.id
            GROUP BY f.id
            ORDER BY f.prefix
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>("prefix"), r.get::<i64, _>("n")))
            .collect())
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn header_from_row(row: &SqliteRow) -> Header {
    Header {
        id: row.get("id"),
        identifier: row.get("identifier"),
        timestamp: parse_timestamp(row.get("timestamp")),
    }
}

fn set_from_row(row: &SqliteRow) -> HarvestSet {
    HarvestSet {
        id: row.get("id"),
        spec: row.get("spec"),
        name: row.get("name"),
        description: row.get("description"),
    }
}

fn format_from_row(row: &SqliteRow) -> MetadataFormat {
    MetadataFormat {
        id: row.get("id"),
        prefix: row.get("prefix"),
        schema: row.get("schema"),
        namespace: row.get("namespace"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_set(&self, spec: &str, name: &str) -> Result<HarvestSet> {
        let row = sqlx::query(
            r#"
            INSERT INTO sets (spec, name) VALUES (?, ?)
            ON CONFLICT(spec) DO UPDATE SET name = excluded.name
            RETURNING id, spec, name, description
            "#,
        )
        .bind(spec)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("upserting set {}", spec))?;
        Ok(set_from_row(&row))
    }

    async fn upsert_record(
        &self,
        identifier: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Header> {
        let now = Utc::now().timestamp();
        let row = sqlx::query(
            r#"
            INSERT INTO headers (identifier, timestamp, harvested_at) VALUES (?, ?, ?)
            ON CONFLICT(identifier) DO UPDATE SET
                timestamp = excluded.timestamp,
                harvested_at = excluded.harvested_at
            RETURNING id, identifier, timestamp
            "#,
        )
        .bind(identifier)
        .bind(timestamp.as_ref().map(format_timestamp))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("upserting record {}", identifier))?;
        Ok(header_from_row(&row))
    }

    async fn upsert_metadata_payload(
        &self,
        header: &Header,
        format: &MetadataFormat,
        payload: &MetadataPayload,
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        match payload {
            MetadataPayload::Structured(dc) => {
                sqlx::query(
                    r#"
                    INSERT INTO dc_records (header_id, format_id, dc_json, title, updated_at)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(header_id, format_id) DO UPDATE SET
                        dc_json = excluded.dc_json,
                        title = excluded.title,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(header.id)
                .bind(format.id)
                .bind(serde_json::to_string(dc)?)
                .bind(dc.title.first().cloned())
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
            MetadataPayload::Raw(xml) => {
                sqlx::query(
                    r#"
                    INSERT INTO xml_records (header_id, format_id, xml_metadata, updated_at)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(header_id, format_id) DO UPDATE SET
                        xml_metadata = excluded.xml_metadata,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(header.id)
                .bind(format.id)
                .bind(xml)
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    async fn add_format_association(
        &self,
        header: &Header,
        format: &MetadataFormat,
    ) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO header_formats (header_id, format_id) VALUES (?, ?)")
            .bind(header.id)
            .bind(format.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_set_association(&self, header: &Header, set: &HarvestSet) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO header_sets (header_id, set_id) VALUES (?, ?)")
            .bind(header.id)
            .bind(set.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn lookup_format_by_prefix(&self, prefix: &str) -> Result<Option<MetadataFormat>> {
        let row = sqlx::query(
            "SELECT id, prefix, schema, namespace FROM metadata_formats WHERE prefix = ?",
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(format_from_row))
    }

    async fn lookup_set_by_spec(&self, spec: &str) -> Result<Option<HarvestSet>> {
        let row = sqlx::query("SELECT id, spec, name, description FROM sets WHERE spec = ?")
            .bind(spec)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(set_from_row))
    }

    async fn register_format(
        &self,
        prefix: &str,
        schema: &str,
        namespace: &str,
    ) -> Result<MetadataFormat> {
        let row = sqlx::query(
            r#"
            INSERT INTO metadata_formats (prefix, schema, namespace) VALUES (?, ?, ?)
            ON CONFLICT(prefix) DO UPDATE SET
                schema = excluded.schema,
                namespace = excluded.namespace
            RETURNING id, prefix, schema, namespace
            "#,
        )
        .bind(prefix)
        .bind(schema)
        .bind(namespace)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("registering format {}", prefix))?;
        Ok(format_from_row(&row))
    }

    async fn list_formats(&self) -> Result<Vec<MetadataFormat>> {
        let rows = sqlx::query(
            "SELECT id, prefix, schema, namespace FROM metadata_formats ORDER BY prefix",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(format_from_row).collect())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let sets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sets")
            .fetch_one(&self.pool)
            .await?;
        let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM headers")
            .fetch_one(&self.pool)
            .await?;
        let formats: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metadata_formats")
            .fetch_one(&self.pool)
            .await?;
        let payloads: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM dc_records) + (SELECT COUNT(*) FROM xml_records)",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreCounts {
            sets,
            records,
            formats,
            payloads,
        })
    }

    async fn get_record(&self, identifier: &str) -> Result<Option<Header>> {
        let row = sqlx::query("SELECT id, identifier, timestamp FROM headers WHERE identifier = ?")
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(header_from_row))
    }

    async fn record_set_specs(&self, identifier: &str) -> Result<Vec<String>> {
        let specs: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT s.spec FROM sets s
            JOIN header_sets hs ON hs.set_id = s.id
            JOIN headers h ON h.id = hs.header_id
            WHERE h.identifier = ?
            ORDER BY s.spec
            "#,
        )
        .bind(identifier)
        .fetch_all(&self.pool)
        .await?;
        Ok(specs)
    }

    async fn record_format_prefixes(&self, identifier: &str) -> Result<Vec<String>> {
        let prefixes: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT f.prefix FROM metadata_formats f
            JOIN header_formats hf ON hf.format_id = f.id
            JOIN headers h ON h.id = hf.header_id
            WHERE h.identifier = ?
            ORDER BY f.prefix
            "#,
        )
        .bind(identifier)
        .fetch_all(&self.pool)
        .await?;
        Ok(prefixes)
    }

    async fn get_payload(
        &self,
        identifier: &str,
        prefix: &str,
    ) -> Result<Option<MetadataPayload>> {
        let dc_json: Option<String> = sqlx::query_scalar(
            r#"
            SELECT d.dc_json FROM dc_records d
            JOIN headers h ON h.id = d.header_id
            JOIN metadata_formats f ON f.id = d.format_id
            WHERE h.identifier = ? AND f.prefix = ?
            "#,
        )
        .bind(identifier)
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(json) = dc_json {
            let dc: DublinCore = serde_json::from_str(&json)
                .with_context(|| format!("corrupt dc_json for {}", identifier))?;
            return Ok(Some(MetadataPayload::Structured(dc)));
        }

        let xml: Option<String> = sqlx::query_scalar(
            r#"
            SELECT x.xml_metadata FROM xml_records x
            JOIN headers h ON h.id = x.header_id
            JOIN metadata_formats f ON f.id = x.format_id
            WHERE h.identifier = ? AND f.prefix = ?
            "#,
        )
        .bind(identifier)
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(xml.map(MetadataPayload::Raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("oai.sqlite"))
            .await
            .unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let (_tmp, store) = store().await;
        migrate::migrate_pool(store.pool()).await.unwrap();
        assert_eq!(store.counts().await.unwrap(), StoreCounts::default());
    }

    #[tokio::test]
    async fn test_record_upsert_keeps_id_and_updates_timestamp() {
        let (_tmp, store) = store().await;
        let ts = Utc.with_ymd_and_hms(2021, 3, 4, 10, 11, 12).unwrap();
        let first = store.upsert_record("rec-1", None).await.unwrap();
        let second = store.upsert_record("rec-1", Some(ts)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.timestamp, Some(ts));
        assert_eq!(store.counts().await.unwrap().records, 1);
        assert_eq!(
            store.get_record("rec-1").await.unwrap().unwrap().timestamp,
            Some(ts)
        );
    }

    #[tokio::test]
    async fn test_set_upsert_by_spec() {
        let (_tmp, store) = store().await;
        let a = store.upsert_set("s1", "Set One").await.unwrap();
        let b = store.upsert_set("s1", "Set 1").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(
            store.lookup_set_by_spec("s1").await.unwrap().unwrap().name,
            "Set 1"
        );
        assert!(store.lookup_set_by_spec("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_payloads_and_associations() {
        let (_tmp, store) = store().await;
        let dc_fmt = store
            .register_format(
                "oai_dc",
                "http://www.openarchives.org/OAI/2.0/oai_dc.xsd",
                "http://www.openarchives.org/OAI/2.0/oai_dc/",
            )
            .await
            .unwrap();
        let marc = store
            .register_format("marcxml", "http://marc.xsd", "http://www.loc.gov/MARC21/slim")
            .await
            .unwrap();
        let set = store.upsert_set("s1", "Set One").await.unwrap();
        let header = store.upsert_record("rec-1", None).await.unwrap();

        let dc = DublinCore {
            title: vec!["A title".to_string()],
            ..Default::default()
        };
        store
            .upsert_metadata_payload(&header, &dc_fmt, &MetadataPayload::Structured(dc.clone()))
            .await
            .unwrap();
        store
            .upsert_metadata_payload(&header, &marc, &MetadataPayload::Raw("<record/>".into()))
            .await
            .unwrap();
        for _ in 0..2 {
            store.add_format_association(&header, &dc_fmt).await.unwrap();
            store.add_format_association(&header, &marc).await.unwrap();
            store.add_set_association(&header, &set).await.unwrap();
        }

        assert_eq!(
            store.record_format_prefixes("rec-1").await.unwrap(),
            vec!["marcxml", "oai_dc"]
        );
        assert_eq!(store.record_set_specs("rec-1").await.unwrap(), vec!["s1"]);
        assert_eq!(
            store.get_payload("rec-1", "oai_dc").await.unwrap(),
            Some(MetadataPayload::Structured(dc))
        );
        assert_eq!(
            store.get_payload("rec-1", "marcxml").await.unwrap(),
            Some(MetadataPayload::Raw("<record/>".into()))
        );
        assert_eq!(store.counts().await.unwrap().payloads, 2);
        assert_eq!(store.unlinked_record_count().await.unwrap(), 0);
        assert_eq!(
            store.records_per_format().await.unwrap(),
            vec![("marcxml".to_string(), 1), ("oai_dc".to_string(), 1)]
        );
    }
}
