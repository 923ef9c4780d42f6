//! Depth-first walk of the remote LDP tree.
//!
//! The walk is a single sequential stream of requests: fetch a resource's
//! JSON-LD, classify it, write the set or record, dispatch the record's
//! metadata, then descend into its `ldp:contains` children in the order
//! the server lists them.
//!
//! All mutable crawl state lives in [`CrawlState`], owned by the caller and
//! passed by `&mut`, so a [`Walker`] holds only shared references and can be
//! reused across runs.
//!
//! The walk keeps its own stack instead of recursing. Pushing children in
//! reverse keeps the visit order identical to a recursive pre-order walk.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::classify::{classify, parse_last_modified, Classification};
use crate::config::{Config, PredicatesConfig};
use crate::dispatch::{dispatch_metadata, DispatchOutcome, ResolvedFormat};
use crate::error::HarvestError;
use crate::fetch::{FetchClient, ACCEPT_JSON_LD, ACCEPT_RDF_XML};
use crate::linked_data::{canonical_location, LdResource};
use crate::linker::PendingLink;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub predicates: PredicatesConfig,
    pub traverse_set_children: bool,
    pub max_depth: Option<usize>,
}

impl WalkOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            predicates: config.predicates.clone(),
            traverse_set_children: config.harvest.traverse_set_children,
            max_depth: config.harvest.max_depth,
        }
    }
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            predicates: PredicatesConfig::default(),
            traverse_set_children: true,
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub sets_upserted: usize,
    pub records_upserted: usize,
    /// Non-root resources whose subtree was abandoned.
    pub failed_nodes: usize,
    /// Children skipped because they were already visited.
    pub revisits_skipped: usize,
    /// Resources whose children were not visited because of `max_depth`.
    pub depth_limited: usize,
    pub timestamps_missing: usize,
    pub dispatch: DispatchOutcome,
}

/// Everything a walk accumulates.
#[derive(Debug, Default)]
pub struct CrawlState {
    /// Canonical locations of every resource taken off the stack.
    pub visited: HashSet<String>,
    pub pending_links: Vec<PendingLink>,
    pub stats: WalkStats,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct Walker<'a> {
    fetcher: &'a FetchClient,
    store: &'a dyn Store,
    formats: &'a [ResolvedFormat],
    options: &'a WalkOptions,
}

impl<'a> Walker<'a> {
    pub fn new(
        fetcher: &'a FetchClient,
        store: &'a dyn Store,
        formats: &'a [ResolvedFormat],
        options: &'a WalkOptions,
    ) -> Self {
        Self {
            fetcher,
            store,
            formats,
            options,
        }
    }

    /// Walk the tree below `root`.
    ///
    /// Fails only if the root itself cannot be fetched and decoded, or the
    /// store rejects a write.
    pub async fn walk(&self, root: &str, state: &mut CrawlState) -> Result<(), HarvestError> {
        let contains = self.options.predicates.contains.as_str();
        let mut stack: Vec<(String, usize)> = vec![(root.to_string(), 0)];

        while let Some((url, depth)) = stack.pop() {
            if !state.visited.insert(canonical_location(&url).to_string()) {
                debug!(url = %url, "already visited, skipping");
                state.stats.revisits_skipped += 1;
                continue;
            }

            debug!(url = %url, depth, "fetch");
            let resource = match self.fetch_resource(&url).await {
                Ok(r) => r,
                Err(reason) if depth == 0 => {
                    return Err(HarvestError::RootUnreachable { url, reason });
                }
                Err(reason) => {
                    warn!(url = %url, reason = %reason, "skipping subtree");
                    state.stats.failed_nodes += 1;
                    continue;
                }
            };

            let descend = match classify(&resource, &self.options.predicates) {
                Classification::Set(set) => {
                    debug!(spec = %set.spec, name = %set.name, "upsert set");
                    self.store.upsert_set(&set.spec, &set.name).await?;
                    state.stats.sets_upserted += 1;
                    self.options.traverse_set_children
                }
                Classification::Record(mut record) => {
                    record.timestamp = self.fetch_timestamp(&url).await;
                    if record.timestamp.is_none() {
                        state.stats.timestamps_missing += 1;
                    }

                    debug!(identifier = %record.identifier, "upsert record");
                    let header = self
                        .store
                        .upsert_record(&record.identifier, record.timestamp)
                        .await?;
                    state.stats.records_upserted += 1;

                    let outcome = dispatch_metadata(
                        self.fetcher,
                        self.store,
                        &header,
                        &resource,
                        self.formats,
                    )
                    .await?;
                    state.stats.dispatch.merge(outcome);

                    if let Some(set_spec) = record.pending_set_spec {
                        state.pending_links.push(PendingLink { header, set_spec });
                    }
                    true
                }
            };

            if !descend || !resource.has(contains) {
                continue;
            }
            if self.options.max_depth.is_some_and(|max| depth >= max) {
                debug!(url = %url, depth, "depth limit reached");
                state.stats.depth_limited += 1;
                continue;
            }

            let children: Vec<&str> = resource.ids(contains).collect();
            for child in children.into_iter().rev() {
                stack.push((child.to_string(), depth + 1));
            }
        }

        info!(
            visited = state.visited.len(),
            sets = state.stats.sets_upserted,
            records = state.stats.records_upserted,
            failed = state.stats.failed_nodes,
            "walk finished"
        );
        Ok(())
    }

    /// Fetch and decode the JSON-LD representation. The error is a
    /// human-readable reason for the log and the root failure.
    async fn fetch_resource(&self, url: &str) -> Result<LdResource, String> {
        let response = self
            .fetcher
            .fetch(url, Some(ACCEPT_JSON_LD))
            .await
            .map_err(|e| e.to_string())?;
        if !response.is_success() {
            return Err(format!("HTTP {}", response.status));
        }
        LdResource::from_json(url, &response.body).map_err(|e| e.to_string())
    }

    /// Last-modified instant from the RDF/XML representation, if any.
    async fn fetch_timestamp(&self, url: &str) -> Option<DateTime<Utc>> {
        let response = match self.fetcher.fetch(url, Some(ACCEPT_RDF_XML)).await {
            Ok(r) if r.is_success() => r,
            Ok(r) => {
                debug!(url, status = r.status, "no descriptive representation");
                return None;
            }
            Err(e) => {
                warn!(url, error = %e, "descriptive representation unreachable");
                return None;
            }
        };
        let predicates = &self.options.predicates;
        let ts = parse_last_modified(
            &response.body,
            &predicates.last_modified_ns,
            &predicates.last_modified_name,
        );
        if ts.is_none() {
            debug!(url, "no usable last-modified timestamp");
        }
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{RetryPolicy, Transport};
    use crate::fixture::FixtureTransport;
    use crate::rate_limit::RateLimiter;
    use crate::store::memory::InMemoryStore;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    const CONTAINS: &str = "http://www.w3.org/ns/ldp#contains";
    const IDENTIFIER: &str = "http://purl.org/dc/elements/1.1/identifier";
    const SET_SPEC: &str = "http://www.openarchives.org/OAI/2.0/setSpec";
    const SET_NAME: &str = "http://www.openarchives.org/OAI/2.0/setName";

    fn container(url: &str, children: &[&str]) -> Value {
        let kids: Vec<Value> = children.iter().map(|c| json!({ "@id": c })).collect();
        json!([{ "@id": url, CONTAINS: kids }])
    }

    fn record(url: &str, identifier: &str, children: &[&str]) -> Value {
        let kids: Vec<Value> = children.iter().map(|c| json!({ "@id": c })).collect();
        json!([{ "@id": url, IDENTIFIER: [{ "@value": identifier }], CONTAINS: kids }])
    }

    fn set(url: &str, spec: &str, children: &[&str]) -> Value {
        let kids: Vec<Value> = children.iter().map(|c| json!({ "@id": c })).collect();
        json!([{
            "@id": url,
            SET_SPEC: [{ "@value": spec }],
            SET_NAME: [{ "@value": spec.to_uppercase() }],
            CONTAINS: kids
        }])
    }

    fn fetcher(transport: Arc<FixtureTransport>) -> FetchClient {
        let transport: Arc<dyn Transport> = transport;
        FetchClient::new(
            transport,
            Arc::new(RateLimiter::disabled()),
            RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(1),
                factor: 2.0,
                max_delay: Duration::from_millis(4),
            },
        )
    }

    async fn walk(
        transport: Arc<FixtureTransport>,
        options: WalkOptions,
    ) -> (InMemoryStore, CrawlState, Result<(), HarvestError>) {
        let store = InMemoryStore::new();
        let fetcher = fetcher(transport);
        let mut state = CrawlState::new();
        let result = Walker::new(&fetcher, &store, &[], &options)
            .walk("http://repo/root", &mut state)
            .await;
        (store, state, result)
    }

    fn graph_fetch_order(transport: &FixtureTransport) -> Vec<String> {
        transport
            .requests()
            .into_iter()
            .filter(|(_, accept)| accept.as_deref() == Some(ACCEPT_JSON_LD))
            .map(|(url, _)| url)
            .collect()
    }

    #[tokio::test]
    async fn test_depth_first_in_listed_order() {
        let t = Arc::new(
            FixtureTransport::new()
                .json_ld("http://repo/root", container("http://repo/root", &["http://repo/a", "http://repo/b"]))
                .json_ld("http://repo/a", record("http://repo/a", "a", &["http://repo/a/1"]))
                .json_ld("http://repo/a/1", record("http://repo/a/1", "a1", &[]))
                .json_ld("http://repo/b", record("http://repo/b", "b", &[])),
        );
        let (store, state, result) = walk(t.clone(), WalkOptions::default()).await;
        result.unwrap();
        assert_eq!(
            graph_fetch_order(&t),
            vec!["http://repo/root", "http://repo/a", "http://repo/a/1", "http://repo/b"]
        );
        // the root container itself classifies as a record
        assert_eq!(state.stats.records_upserted, 4);
        assert!(store.get_record("a1").await.unwrap().is_some());
        assert!(store
            .get_record("oai:http://repo/root")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let t = Arc::new(
            FixtureTransport::new()
                .json_ld("http://repo/root", container("http://repo/root", &["http://repo/a"]))
                .json_ld("http://repo/a", record("http://repo/a", "a", &["http://repo/root", "http://repo/a"])),
        );
        let (_store, state, result) = walk(t.clone(), WalkOptions::default()).await;
        result.unwrap();
        assert_eq!(state.visited.len(), 2);
        assert_eq!(state.stats.revisits_skipped, 2);
        assert_eq!(graph_fetch_order(&t), vec!["http://repo/root", "http://repo/a"]);
    }

    #[tokio::test]
    async fn test_trailing_slash_is_the_same_resource() {
        let t = Arc::new(
            FixtureTransport::new()
                .json_ld(
                    "http://repo/root",
                    container("http://repo/root", &["http://repo/a", "http://repo/a/"]),
                )
                .json_ld("http://repo/a", record("http://repo/a", "a", &[])),
        );
        let (_store, state, result) = walk(t.clone(), WalkOptions::default()).await;
        result.unwrap();
        assert_eq!(graph_fetch_order(&t), vec!["http://repo/root", "http://repo/a"]);
        assert_eq!(state.stats.records_upserted, 2);
        assert_eq!(state.stats.revisits_skipped, 1);
    }

    #[tokio::test]
    async fn test_failed_child_does_not_stop_siblings() {
        let t = Arc::new(
            FixtureTransport::new()
                .json_ld(
                    "http://repo/root",
                    container("http://repo/root", &["http://repo/bad", "http://repo/gone", "http://repo/ok"]),
                )
                .unreachable("http://repo/bad", Some(ACCEPT_JSON_LD))
                .json_ld("http://repo/ok", record("http://repo/ok", "ok", &[])),
        );
        let (store, state, result) = walk(t.clone(), WalkOptions::default()).await;
        result.unwrap();
        // bad: connection failure after retries; gone: 404
        assert_eq!(state.stats.failed_nodes, 2);
        assert_eq!(t.hits("http://repo/bad"), 3);
        assert!(store.get_record("ok").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unreachable_root_is_fatal() {
        let t = Arc::new(FixtureTransport::new().unreachable("http://repo/root", Some(ACCEPT_JSON_LD)));
        let (store, _state, result) = walk(t, WalkOptions::default()).await;
        assert!(matches!(result, Err(HarvestError::RootUnreachable { .. })));
        assert_eq!(store.counts().await.unwrap().records, 0);
    }

    #[tokio::test]
    async fn test_root_with_error_status_is_fatal() {
        let t = Arc::new(FixtureTransport::new());
        let (_store, _state, result) = walk(t, WalkOptions::default()).await;
        match result {
            Err(HarvestError::RootUnreachable { reason, .. }) => assert_eq!(reason, "HTTP 404"),
            other => panic!("expected root failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_set_children_traversal_is_configurable() {
        let build = || {
            Arc::new(
                FixtureTransport::new()
                    .json_ld("http://repo/root", container("http://repo/root", &["http://repo/s"]))
                    .json_ld("http://repo/s", set("http://repo/s", "s", &["http://repo/s/r"]))
                    .json_ld("http://repo/s/r", record("http://repo/s/r", "r", &[])),
            )
        };

        let (store, _, result) = walk(build(), WalkOptions::default()).await;
        result.unwrap();
        assert!(store.get_record("r").await.unwrap().is_some());
        assert_eq!(store.lookup_set_by_spec("s").await.unwrap().unwrap().name, "S");

        let options = WalkOptions {
            traverse_set_children: false,
            ..WalkOptions::default()
        };
        let (store, _, result) = walk(build(), options).await;
        result.unwrap();
        assert!(store.get_record("r").await.unwrap().is_none());
        assert!(store.lookup_set_by_spec("s").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_max_depth() {
        let t = Arc::new(
            FixtureTransport::new()
                .json_ld("http://repo/root", container("http://repo/root", &["http://repo/a"]))
                .json_ld("http://repo/a", record("http://repo/a", "a", &["http://repo/a/1"]))
                .json_ld("http://repo/a/1", record("http://repo/a/1", "a1", &[])),
        );
        let options = WalkOptions {
            max_depth: Some(1),
            ..WalkOptions::default()
        };
        let (store, state, result) = walk(t, options).await;
        result.unwrap();
        assert!(store.get_record("a").await.unwrap().is_some());
        assert!(store.get_record("a1").await.unwrap().is_none());
        assert_eq!(state.stats.depth_limited, 1);
    }

    #[tokio::test]
    async fn test_member_of_is_buffered_not_linked() {
        let member_of = "http://purl.org/dc/elements/1.1/memberOf";
        let t = Arc::new(
            FixtureTransport::new()
                .json_ld("http://repo/root", container("http://repo/root", &["http://repo/r"]))
                .json_ld(
                    "http://repo/r",
                    json!([{ "@id": "http://repo/r", IDENTIFIER: [{ "@value": "r" }], member_of: [{ "@value": "s1" }] }]),
                ),
        );
        let (store, state, result) = walk(t, WalkOptions::default()).await;
        result.unwrap();
        assert_eq!(state.pending_links.len(), 1);
        assert_eq!(state.pending_links[0].set_spec, "s1");
        assert_eq!(state.pending_links[0].header.identifier, "r");
        assert!(store.record_set_specs("r").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timestamp_from_descriptive_representation() {
        let rdf = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:fedora="http://fedora.info/definitions/v4/repository#"><rdf:Description><fedora:lastModified>2022-02-02T02:02:02Z</fedora:lastModified></rdf:Description></rdf:RDF>"#;
        let t = Arc::new(
            FixtureTransport::new()
                .json_ld("http://repo/root", container("http://repo/root", &["http://repo/r", "http://repo/q"]))
                .json_ld("http://repo/r", record("http://repo/r", "r", &[]))
                .rdf_xml("http://repo/r", rdf)
                .json_ld("http://repo/q", record("http://repo/q", "q", &[]))
                .rdf_xml("http://repo/q", "<<garbage"),
        );
        let (store, state, result) = walk(t, WalkOptions::default()).await;
        result.unwrap();
        let r = store.get_record("r").await.unwrap().unwrap();
        assert_eq!(
            r.timestamp.map(|t| t.to_rfc3339()),
            Some("2022-02-02T02:02:02+00:00".to_string())
        );
        assert!(store.get_record("q").await.unwrap().unwrap().timestamp.is_none());
        // root and q
        assert_eq!(state.stats.timestamps_missing, 2);
    }
}
