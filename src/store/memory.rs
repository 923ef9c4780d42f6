//! In-memory [`Store`] implementation for tests and dry runs.
//!
//! Everything lives behind one `std::sync::RwLock`; ids are assigned from a
//! single counter.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Header, HarvestSet, MetadataFormat, MetadataPayload, StoreCounts};

use super::Store;

#[derive(Default)]
struct Inner {
    next_id: i64,
    sets: BTreeMap<String, HarvestSet>,
    headers: BTreeMap<String, Header>,
    formats: BTreeMap<String, MetadataFormat>,
    header_sets: BTreeSet<(i64, i64)>,
    header_formats: BTreeSet<(i64, i64)>,
    payloads: HashMap<(i64, i64), MetadataPayload>,
}

impl Inner {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory store for testing.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| anyhow!("store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| anyhow!("store lock poisoned"))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_set(&self, spec: &str, name: &str) -> Result<HarvestSet> {
        let mut inner = self.write()?;
        if let Some(existing) = inner.sets.get_mut(spec) {
            existing.name = name.to_string();
            return Ok(existing.clone());
        }
        let set = HarvestSet {
            id: inner.allocate_id(),
            spec: spec.to_string(),
            name: name.to_string(),
            description: None,
        };
        inner.sets.insert(spec.to_string(), set.clone());
        Ok(set)
    }

    async fn upsert_record(
        &self,
        identifier: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Header> {
        let mut inner = self.write()?;
        if let Some(existing) = inner.headers.get_mut(identifier) {
            existing.timestamp = timestamp;
            return Ok(existing.clone());
        }
        let header = Header {
            id: inner.allocate_id(),
            identifier: identifier.to_string(),
            timestamp,
        };
        inner.headers.insert(identifier.to_string(), header.clone());
        Ok(header)
    }

    async fn upsert_metadata_payload(
        &self,
        header: &Header,
        format: &MetadataFormat,
        payload: &MetadataPayload,
    ) -> Result<()> {
        let mut inner = self.write()?;
        inner
            .payloads
            .insert((header.id, format.id), payload.clone());
        Ok(())
    }

    async fn add_format_association(
        &self,
        header: &Header,
        format: &MetadataFormat,
    ) -> Result<()> {
        self.write()?.header_formats.insert((header.id, format.id));
        Ok(())
    }

    async fn add_set_association(&self, header: &Header, set: &HarvestSet) -> Result<()> {
        self.write()?.header_sets.insert((header.id, set.id));
        Ok(())
    }

    async fn lookup_format_by_prefix(&self, prefix: &str) -> Result<Option<MetadataFormat>> {
        Ok(self.read()?.formats.get(prefix).cloned())
    }

    async fn lookup_set_by_spec(&self, spec: &str) -> Result<Option<HarvestSet>> {
        Ok(self.read()?.sets.get(spec).cloned())
    }

    async fn register_format(
        &self,
        prefix: &str,
        schema: &str,
        namespace: &str,
    ) -> Result<MetadataFormat> {
        let mut inner = self.write()?;
        if let Some(existing) = inner.formats.get_mut(prefix) {
            existing.schema = schema.to_string();
            existing.namespace = namespace.to_string();
            return Ok(existing.clone());
        }
        let format = MetadataFormat {
            id: inner.allocate_id(),
            prefix: prefix.to_string(),
            schema: schema.to_string(),
            namespace: namespace.to_string(),
        };
        inner.formats.insert(prefix.to_string(), format.clone());
        Ok(format)
    }

    async fn list_formats(&self) -> Result<Vec<MetadataFormat>> {
        Ok(self.read()?.formats.values().cloned().collect())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let inner = self.read()?;
        Ok(StoreCounts {
            sets: inner.sets.len() as i64,
            records: inner.headers.len() as i64,
            formats: inner.formats.len() as i64,
            payloads: inner.payloads.len() as i64,
        })
    }

    async fn get_record(&self, identifier: &str) -> Result<Option<Header>> {
        Ok(self.read()?.headers.get(identifier).cloned())
    }

    async fn record_set_specs(&self, identifier: &str) -> Result<Vec<String>> {
        let inner = self.read()?;
        let Some(header) = inner.headers.get(identifier) else {
            return Ok(Vec::new());
        };
        let mut specs: Vec<String> = inner
            .sets
            .values()
            .filter(|s| inner.header_sets.contains(&(header.id, s.id)))
            .map(|s| s.spec.clone())
            .collect();
        specs.sort();
        Ok(specs)
    }

    async fn record_format_prefixes(&self, identifier: &str) -> Result<Vec<String>> {
        let inner = self.read()?;
        let Some(header) = inner.headers.get(identifier) else {
            return Ok(Vec::new());
        };
        let mut prefixes: Vec<String> = inner
            .formats
            .values()
            .filter(|f| inner.header_formats.contains(&(header.id, f.id)))
            .map(|f| f.prefix.clone())
            .collect();
        prefixes.sort();
        Ok(prefixes)
    }

    async fn get_payload(
        &self,
        identifier: &str,
        prefix: &str,
    ) -> Result<Option<MetadataPayload>> {
        let inner = self.read()?;
        let (Some(header), Some(format)) =
            (inner.headers.get(identifier), inner.formats.get(prefix))
        else {
            return Ok(None);
        };
        Ok(inner.payloads.get(&(header.id, format.id)).cloned())
    }
}
