//! Metadata dispatch: per-format payload fetch, decode and store.
//!
//! At run start every configured format prefix is resolved against the
//! store ([`resolve_formats`]); prefixes with no registered format are
//! reported and left out of the run. For each record, [`dispatch_metadata`]
//! then walks the resolved formats, locates each payload on the resource,
//! fetches it, and stores it. A format association is added only after its
//! payload has been stored.

use anyhow::Result;
use tracing::{debug, warn};

use crate::config::{Config, FormatConfig};
use crate::dublin_core::DublinCore;
use crate::fetch::FetchClient;
use crate::linked_data::LdResource;
use crate::models::{Header, MetadataFormat, MetadataPayload};
use crate::store::Store;

/// How to find a format's payload for a given resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadLocation {
    /// `@id` of the first value of `predicate` on the resource.
    LinkedBinary { predicate: String },
    /// The resource URI with `suffix` appended.
    Suffix { suffix: String },
}

impl PayloadLocation {
    pub fn resolve(&self, resource: &LdResource) -> Option<String> {
        match self {
            PayloadLocation::LinkedBinary { predicate } => {
                resource.first_id(predicate).map(str::to_string)
            }
            PayloadLocation::Suffix { suffix } => {
                let base = if suffix.starts_with('/') {
                    resource.location.trim_end_matches('/')
                } else {
                    resource.location.as_str()
                };
                Some(format!("{}{}", base, suffix))
            }
        }
    }
}

impl From<&FormatConfig> for PayloadLocation {
    fn from(config: &FormatConfig) -> Self {
        match config {
            FormatConfig::LinkedBinary { predicate } => PayloadLocation::LinkedBinary {
                predicate: predicate.clone(),
            },
            FormatConfig::Suffix { suffix } => PayloadLocation::Suffix {
                suffix: suffix.clone(),
            },
        }
    }
}

/// A configured format that exists in the store.
#[derive(Debug, Clone)]
pub struct ResolvedFormat {
    pub format: MetadataFormat,
    pub location: PayloadLocation,
    /// Decode as Dublin Core instead of storing verbatim.
    pub structural: bool,
}

/// Look up every configured format prefix. Returns the resolved formats
/// (in prefix order) and the prefixes missing from the store.
pub async fn resolve_formats(
    store: &dyn Store,
    config: &Config,
) -> Result<(Vec<ResolvedFormat>, Vec<String>)> {
    let mut resolved = Vec::new();
    let mut missing = Vec::new();

    for (prefix, format_config) in &config.formats {
        match store.lookup_format_by_prefix(prefix).await? {
            Some(format) => resolved.push(ResolvedFormat {
                format,
                location: PayloadLocation::from(format_config),
                structural: *prefix == config.harvest.structural_format,
            }),
            None => {
                warn!(prefix = %prefix, "metadata format is configured but not registered in the store");
                missing.push(prefix.clone());
            }
        }
    }

    Ok((resolved, missing))
}

/// Per-record dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub stored: usize,
    pub absent: usize,
    pub fetch_failures: usize,
    pub decode_failures: usize,
}

impl DispatchOutcome {
    pub fn merge(&mut self, other: DispatchOutcome) {
        self.stored += other.stored;
        self.absent += other.absent;
        self.fetch_failures += other.fetch_failures;
        self.decode_failures += other.decode_failures;
    }
}

/// Fetch and store every resolved format present on `resource`.
///
/// Remote problems (absent predicate, non-success status, connection
/// failure, undecodable structural payload) skip that format only. Store
/// errors are returned.
pub async fn dispatch_metadata(
    fetcher: &FetchClient,
    store: &dyn Store,
    header: &Header,
    resource: &LdResource,
    formats: &[ResolvedFormat],
) -> Result<DispatchOutcome> {
    let mut outcome = DispatchOutcome::default();

    for resolved in formats {
        let prefix = resolved.format.prefix.as_str();
        let Some(url) = resolved.location.resolve(resource) else {
            outcome.absent += 1;
            continue;
        };

        debug!(record = %header.identifier, prefix, url = %url, "fetching metadata payload");
        let response = match fetcher.fetch(&url, None).await {
            Ok(r) => r,
            Err(e) => {
                warn!(record = %header.identifier, prefix, error = %e, "metadata payload unreachable");
                outcome.fetch_failures += 1;
                continue;
            }
        };
        if !response.is_success() {
            debug!(record = %header.identifier, prefix, status = response.status, "no payload");
            outcome.absent += 1;
            continue;
        }

        let payload = if resolved.structural {
            match DublinCore::from_xml(&response.body) {
                Ok(dc) => MetadataPayload::Structured(dc),
                Err(e) => {
                    warn!(record = %header.identifier, prefix, error = %e, "discarding undecodable payload");
                    outcome.decode_failures += 1;
                    continue;
                }
            }
        } else {
            MetadataPayload::Raw(response.body)
        };

        store
            .upsert_metadata_payload(header, &resolved.format, &payload)
            .await?;
        store
            .add_format_association(header, &resolved.format)
            .await?;
        debug!(record = %header.identifier, prefix, "stored metadata payload");
        outcome.stored += 1;
    }

    Ok(outcome)
}
