//! Deferred set linking.
//!
//! Records name their set by spec, but the set's own resource may be
//! visited later in the walk than the record, or never. The walker
//! therefore only buffers (record, spec) pairs; [`link_sets`] resolves them
//! once the whole tree has been visited and every reachable set exists.

use anyhow::Result;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::models::{Header, HarvestSet};
use crate::store::Store;

/// A record waiting to be attached to the set with `set_spec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLink {
    pub header: Header,
    pub set_spec: String,
}

/// A pending link whose set never appeared in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedLink {
    pub identifier: String,
    pub set_spec: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub linked: usize,
    pub unresolved: Vec<UnresolvedLink>,
}

/// Attach every pending record to its set, in buffer order.
pub async fn link_sets(store: &dyn Store, pending: Vec<PendingLink>) -> Result<LinkReport> {
    let mut report = LinkReport::default();
    let mut sets: HashMap<String, Option<HarvestSet>> = HashMap::new();

    for link in pending {
        if !sets.contains_key(&link.set_spec) {
            let found = store.lookup_set_by_spec(&link.set_spec).await?;
            sets.insert(link.set_spec.clone(), found);
        }

        match sets.get(&link.set_spec).and_then(Option::as_ref) {
            Some(set) => {
                store.add_set_association(&link.header, set).await?;
                debug!(record = %link.header.identifier, set = %set.spec, "linked record to set");
                report.linked += 1;
            }
            None => {
                warn!(
                    record = %link.header.identifier,
                    set = %link.set_spec,
                    "set not found while linking record"
                );
                report.unresolved.push(UnresolvedLink {
                    identifier: link.header.identifier,
                    set_spec: link.set_spec,
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn test_links_known_and_reports_unknown() {
        let store = InMemoryStore::new();
        store.upsert_set("s1", "Set One").await.unwrap();
        let a = store.upsert_record("a", None).await.unwrap();
        let b = store.upsert_record("b", None).await.unwrap();
        let c = store.upsert_record("c", None).await.unwrap();

        let report = link_sets(
            &store,
            vec![
                PendingLink { header: a, set_spec: "s1".into() },
                PendingLink { header: b, set_spec: "missing-set".into() },
                PendingLink { header: c, set_spec: "s1".into() },
            ],
        )
        .await
        .unwrap();

        assert_eq!(report.linked, 2);
        assert_eq!(
            report.unresolved,
            vec![UnresolvedLink {
                identifier: "b".into(),
                set_spec: "missing-set".into()
            }]
        );
        assert_eq!(store.record_set_specs("a").await.unwrap(), vec!["s1"]);
        assert!(store.record_set_specs("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relinking_is_idempotent() {
        let store = InMemoryStore::new();
        store.upsert_set("s1", "Set One").await.unwrap();
        let a = store.upsert_record("a", None).await.unwrap();
        let link = PendingLink { header: a, set_spec: "s1".into() };
        link_sets(&store, vec![link.clone(), link]).await.unwrap();
        assert_eq!(store.record_set_specs("a").await.unwrap(), vec!["s1"]);
    }
}
