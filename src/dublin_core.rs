//! Structural decoding of `oai_dc` payloads.
//!
//! An `oai_dc` payload is an `<oai_dc:dc>` root holding any number of the
//! fifteen simple Dublin Core elements. Each element may repeat; values are
//! kept in document order. Elements outside the DC element namespace are
//! ignored.

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use serde::{Deserialize, Serialize};

/// Namespace of the fifteen simple Dublin Core elements.
pub const DC_ELEMENTS_NS: &str = "http://purl.org/dc/elements/1.1/";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed XML: {0}")]
    Malformed(String),
    #[error("root element is <{0}>, expected <dc>")]
    NotDublinCore(String),
    #[error("document has no root element")]
    Empty,
}

/// A decoded Dublin Core record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DublinCore {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub title: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub creator: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub description: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publisher: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributor: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date: Vec<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Vec::is_empty")]
    pub kind: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub format: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub language: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relation: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rights: Vec<String>,
}

impl DublinCore {
    /// Decode an `oai_dc` XML document.
    pub fn from_xml(xml: &str) -> Result<Self, DecodeError> {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut record = DublinCore::default();
        let mut depth = 0usize;
        let mut saw_root = false;
        let mut current: Option<&'static str> = None;
        let mut text = String::new();

        loop {
            let (in_dc_ns, event) = {
                let (ns, event) = reader
                    .read_resolved_event()
                    .map_err(|e| DecodeError::Malformed(e.to_string()))?;
                let in_dc_ns = matches!(
                    ns,
                    ResolveResult::Bound(Namespace(uri)) if uri == DC_ELEMENTS_NS.as_bytes()
                );
                (in_dc_ns, event)
            };

            match event {
                Event::Start(e) => {
                    depth += 1;
                    if depth == 1 {
                        check_root(e.local_name().as_ref())?;
                        saw_root = true;
                    } else if depth == 2 && in_dc_ns {
                        current = element_name(e.local_name().as_ref());
                        text.clear();
                    }
                }
                Event::Empty(e) => {
                    if depth == 0 {
                        check_root(e.local_name().as_ref())?;
                        saw_root = true;
                    }
                }
                Event::Text(t) => {
                    if current.is_some() && depth == 2 {
                        let value = t
                            .unescape()
                            .map_err(|e| DecodeError::Malformed(e.to_string()))?;
                        text.push_str(&value);
                    }
                }
                Event::CData(c) => {
                    if current.is_some() && depth == 2 {
                        text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::End(_) => {
                    if depth == 2 {
                        if let Some(name) = current.take() {
                            let value = text.trim();
                            if !value.is_empty() {
                                record.push(name, value.to_string());
                            }
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if depth != 0 {
            return Err(DecodeError::Malformed(
                "unexpected end of document".to_string(),
            ));
        }
        if !saw_root {
            return Err(DecodeError::Empty);
        }
        Ok(record)
    }

    fn push(&mut self, element: &str, value: String) {
        let field = match element {
            "title" => &mut self.title,
            "creator" => &mut self.creator,
            "subject" => &mut self.subject,
            "description" => &mut self.description,
            "publisher" => &mut self.publisher,
            "contributor" => &mut self.contributor,
            "date" => &mut self.date,
            "type" => &mut self.kind,
            "format" => &mut self.format,
            "identifier" => &mut self.identifier,
            "source" => &mut self.source,
            "language" => &mut self.language,
            "relation" => &mut self.relation,
            "coverage" => &mut self.coverage,
            "rights" => &mut self.rights,
            _ => return,
        };
        field.push(value);
    }
}

fn check_root(local: &[u8]) -> Result<(), DecodeError> {
    if local == b"dc" {
        Ok(())
    } else {
        Err(DecodeError::NotDublinCore(
            String::from_utf8_lossy(local).into_owned(),
        ))
    }
}

fn element_name(local: &[u8]) -> Option<&'static str> {
    const ELEMENTS: [&str; 15] = [
        "title",
        "creator",
        "subject",
        "description",
        "publisher",
        "contributor",
        "date",
        "type",
        "format",
        "identifier",
        "source",
        "language",
        "relation",
        "coverage",
        "rights",
    ];
    ELEMENTS.iter().copied().find(|e| e.as_bytes() == local)
}
