//! Resource classification.
//!
//! Every visited resource is either a set descriptor (it carries both the
//! OAI `setSpec` and `setName` predicates) or a record. Classification is a
//! pure function of one fetched representation; the record timestamp comes
//! from the descriptive RDF/XML representation and is parsed separately by
//! [`parse_last_modified`].

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

use crate::config::PredicatesConfig;
use crate::linked_data::LdResource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDescriptor {
    pub spec: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDescriptor {
    pub identifier: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub pending_set_spec: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Set(SetDescriptor),
    Record(RecordDescriptor),
}

/// Classify a resource. Records come back without a timestamp.
pub fn classify(resource: &LdResource, predicates: &PredicatesConfig) -> Classification {
    let spec = resource.first_literal(&predicates.set_spec);
    let name = resource.first_literal(&predicates.set_name);
    if let (Some(spec), Some(name)) = (spec, name) {
        return Classification::Set(SetDescriptor {
            spec: spec.to_string(),
            name: name.to_string(),
        });
    }

    let identifier = resource
        .first_literal(&predicates.identifier)
        .map(str::to_string)
        .unwrap_or_else(|| synthesize_identifier(&resource.location));

    Classification::Record(RecordDescriptor {
        identifier,
        timestamp: None,
        pending_set_spec: resource
            .first_literal(&predicates.member_of)
            .map(str::to_string),
    })
}

/// Identifier used when a record declares none.
pub fn synthesize_identifier(location: &str) -> String {
    format!("oai:{}", location)
}

/// Extract the first `{ns}name` element's text from an RDF/XML document as
/// a UTC instant. Any parse problem yields `None`.
pub fn parse_last_modified(xml: &str, ns: &str, name: &str) -> Option<DateTime<Utc>> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut capture = false;

    loop {
        let (matched, event) = {
            let (resolved, event) = reader.read_resolved_event().ok()?;
            let in_ns = matches!(
                resolved,
                ResolveResult::Bound(Namespace(uri)) if uri == ns.as_bytes()
            );
            (in_ns, event)
        };

        match event {
            Event::Start(e) => {
                capture = matched && e.local_name().as_ref() == name.as_bytes();
            }
            Event::Text(t) if capture => {
                let text = t.unescape().ok()?;
                return parse_instant(text.trim());
            }
            Event::End(_) if capture => return None,
            Event::Eof => return None,
            _ => {}
        }
    }
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linked_data::LdValue;
    use chrono::TimeZone;

    const FEDORA_NS: &str = "http://fedora.info/definitions/v4/repository#";

    fn predicates() -> PredicatesConfig {
        PredicatesConfig::default()
    }

    #[test]
    fn test_set_when_spec_and_name_present() {
        let p = predicates();
        let r = LdResource::new("http://repo/rest/sets/s1")
            .with(&p.set_spec, LdValue::literal("s1"))
            .with(&p.set_name, LdValue::literal("Set One"));
        assert_eq!(
            classify(&r, &p),
            Classification::Set(SetDescriptor {
                spec: "s1".to_string(),
                name: "Set One".to_string()
            })
        );
    }

    #[test]
    fn test_record_with_synthesized_identifier() {
        let p = predicates();
        let r = LdResource::new("http://repo/rest/obj/7");
        assert_eq!(
            classify(&r, &p),
            Classification::Record(RecordDescriptor {
                identifier: "oai:http://repo/rest/obj/7".to_string(),
                timestamp: None,
                pending_set_spec: None,
            })
        );
    }

    #[test]
    fn test_spec_without_name_is_a_record() {
        let p = predicates();
        let r = LdResource::new("http://repo/rest/x")
            .with(&p.set_spec, LdValue::literal("s1"))
            .with(&p.identifier, LdValue::literal("rec-1"))
            .with(&p.member_of, LdValue::literal("s1"));
        match classify(&r, &p) {
            Classification::Record(rec) => {
                assert_eq!(rec.identifier, "rec-1");
                assert_eq!(rec.pending_set_spec.as_deref(), Some("s1"));
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_last_modified() {
        let xml = format!(
            r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:fedora="{}">
  <rdf:Description rdf:about="http://repo/rest/obj/7">
    <fedora:created rdf:datatype="http://www.w3.org/2001/XMLSchema#dateTime">2019-01-01T00:00:00Z</fedora:created>
    <fedora:lastModified rdf:datatype="http://www.w3.org/2001/XMLSchema#dateTime">2021-03-04T10:11:12.345Z</fedora:lastModified>
  </rdf:Description>
</rdf:RDF>"#,
            FEDORA_NS
        );
        let ts = parse_last_modified(&xml, FEDORA_NS, "lastModified").unwrap();
        assert_eq!(
            ts,
            Utc.with_ymd_and_hms(2021, 3, 4, 10, 11, 12).unwrap()
                + chrono::Duration::milliseconds(345)
        );
    }

    #[test]
    fn test_last_modified_wrong_namespace_is_ignored() {
        let xml = r#"<r xmlns:f="http://other/"><f:lastModified>2021-03-04T10:11:12Z</f:lastModified></r>"#;
        assert_eq!(parse_last_modified(xml, FEDORA_NS, "lastModified"), None);
    }

    #[test]
    fn test_last_modified_missing_or_garbage() {
        assert_eq!(parse_last_modified("not xml at all <<", FEDORA_NS, "lastModified"), None);
        assert_eq!(parse_last_modified("", FEDORA_NS, "lastModified"), None);
        let xml = format!(
            r#"<r xmlns:fedora="{}"><fedora:lastModified>yesterday</fedora:lastModified></r>"#,
            FEDORA_NS
        );
        assert_eq!(parse_last_modified(&xml, FEDORA_NS, "lastModified"), None);
    }

    #[test]
    fn test_naive_timestamp_is_utc() {
        let xml = format!(
            r#"<r xmlns:fedora="{}"><fedora:lastModified>2020-05-06T07:08:09</fedora:lastModified></r>"#,
            FEDORA_NS
        );
        assert_eq!(
            parse_last_modified(&xml, FEDORA_NS, "lastModified"),
            Some(Utc.with_ymd_and_hms(2020, 5, 6, 7, 8, 9).unwrap())
        );
    }
}
