//! Storage abstraction for harvested sets, records and payloads.
//!
//! The [`Store`] trait defines every operation the harvesting engine needs,
//! so the engine runs unchanged against SQLite ([`SqliteStore`]) or the
//! in-memory [`memory::InMemoryStore`].
//!
//! All writes are idempotent: upserts key on the business identifier (set
//! spec, record identifier, (record, format) pair) and associations ignore
//! duplicates.
//!
//! [`SqliteStore`]: crate::sqlite_store::SqliteStore

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Header, HarvestSet, MetadataFormat, MetadataPayload, StoreCounts};

/// Abstract storage backend for the harvester.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_set`](Store::upsert_set) | Insert or update a set by spec |
/// | [`upsert_record`](Store::upsert_record) | Insert or update a header by identifier |
/// | [`upsert_metadata_payload`](Store::upsert_metadata_payload) | Store a payload for a (header, format) pair |
/// | [`add_format_association`](Store::add_format_association) | Link a header to a format |
/// | [`add_set_association`](Store::add_set_association) | Link a header to a set |
/// | [`lookup_format_by_prefix`](Store::lookup_format_by_prefix) | Find a registered format |
/// | [`lookup_set_by_spec`](Store::lookup_set_by_spec) | Find a set |
#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_set(&self, spec: &str, name: &str) -> Result<HarvestSet>;

    async fn upsert_record(
        &self,
        identifier: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Header>;

    async fn upsert_metadata_payload(
        &self,
        header: &Header,
        format: &MetadataFormat,
        payload: &MetadataPayload,
    ) -> Result<()>;

    async fn add_format_association(&self, header: &Header, format: &MetadataFormat)
        -> Result<()>;

    async fn add_set_association(&self, header: &Header, set: &HarvestSet) -> Result<()>;

    async fn lookup_format_by_prefix(&self, prefix: &str) -> Result<Option<MetadataFormat>>;

    async fn lookup_set_by_spec(&self, spec: &str) -> Result<Option<HarvestSet>>;

    /// Register a metadata format. Administrative; the harvester itself
    /// never creates formats.
    async fn register_format(
        &self,
        prefix: &str,
        schema: &str,
        namespace: &str,
    ) -> Result<MetadataFormat>;

    async fn list_formats(&self) -> Result<Vec<MetadataFormat>>;

    async fn counts(&self) -> Result<StoreCounts>;

    async fn get_record(&self, identifier: &str) -> Result<Option<Header>>;

    /// Specs of the sets a record belongs to, sorted.
    async fn record_set_specs(&self, identifier: &str) -> Result<Vec<String>>;

    /// Prefixes of the formats a record is associated with, sorted.
    async fn record_format_prefixes(&self, identifier: &str) -> Result<Vec<String>>;

    async fn get_payload(&self, identifier: &str, prefix: &str)
        -> Result<Option<MetadataPayload>>;
}
