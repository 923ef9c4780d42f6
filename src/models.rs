//! Core data models used throughout the harvester.
//!
//! These mirror the OAI-PMH data model: sets, record headers, metadata
//! formats and the per-format payloads attached to a header.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dublin_core::DublinCore;

/// An OAI set, keyed by its unique `spec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarvestSet {
    pub id: i64,
    pub spec: String,
    pub name: String,
    pub description: Option<String>,
}

/// A record header, keyed by its unique `identifier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub id: i64,
    pub identifier: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A metadata format registered in the store before harvesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataFormat {
    pub id: i64,
    pub prefix: String,
    pub schema: String,
    pub namespace: String,
}

/// A payload stored for one (header, format) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataPayload {
    /// Decoded Dublin Core, for the structural format.
    Structured(DublinCore),
    /// Verbatim payload text for every other format.
    Raw(String),
}

/// Row counts used for the run summary and `stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub sets: i64,
    pub records: i64,
    pub formats: i64,
    pub payloads: i64,
}
