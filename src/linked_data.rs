//! JSON-LD resource representation.
//!
//! An LDP server answering `Accept: application/ld+json` returns expanded
//! JSON-LD: an array of node objects, each mapping predicate URIs to arrays
//! of `{"@value": ...}` literals or `{"@id": ...}` references. This module
//! reduces that to the one node describing the requested resource.

use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum LdError {
    #[error("invalid JSON-LD: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("JSON-LD document contains no node object")]
    NoNode,
}

/// One value of a predicate: a literal, a reference, or (rarely) both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdValue {
    pub id: Option<String>,
    pub value: Option<String>,
}

impl LdValue {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            id: None,
            value: Some(value.into()),
        }
    }

    pub fn reference(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            value: None,
        }
    }
}

/// A decoded linked-data resource: its location plus predicate → values.
#[derive(Debug, Clone, Default)]
pub struct LdResource {
    pub location: String,
    properties: HashMap<String, Vec<LdValue>>,
}

impl LdResource {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            properties: HashMap::new(),
        }
    }

    /// Builder used by fixtures and tests.
    pub fn with(mut self, predicate: &str, value: LdValue) -> Self {
        self.properties
            .entry(predicate.to_string())
            .or_default()
            .push(value);
        self
    }

    /// Parse a JSON-LD response body fetched from `location`.
    pub fn from_json(location: &str, body: &str) -> Result<Self, LdError> {
        let doc: Value = serde_json::from_str(body)?;
        Self::from_value(location, &doc)
    }

    pub fn from_value(location: &str, doc: &Value) -> Result<Self, LdError> {
        let node = match doc {
            Value::Array(nodes) => select_node(location, nodes).ok_or(LdError::NoNode)?,
            Value::Object(_) => doc,
            _ => return Err(LdError::NoNode),
        };
        let Value::Object(map) = node else {
            return Err(LdError::NoNode);
        };

        let mut properties = HashMap::new();
        for (predicate, raw) in map {
            if predicate.starts_with('@') {
                continue;
            }
            let values: Vec<LdValue> = match raw {
                Value::Array(items) => items.iter().filter_map(to_ld_value).collect(),
                other => to_ld_value(other).into_iter().collect(),
            };
            if !values.is_empty() {
                properties.insert(predicate.clone(), values);
            }
        }

        Ok(Self {
            location: location.to_string(),
            properties,
        })
    }

    pub fn has(&self, predicate: &str) -> bool {
        self.properties.contains_key(predicate)
    }

    pub fn values(&self, predicate: &str) -> &[LdValue] {
        self.properties
            .get(predicate)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First literal (`@value`) of `predicate`.
    pub fn first_literal(&self, predicate: &str) -> Option<&str> {
        self.values(predicate)
            .iter()
            .find_map(|v| v.value.as_deref())
    }

    /// First reference (`@id`) of `predicate`.
    pub fn first_id(&self, predicate: &str) -> Option<&str> {
        self.values(predicate).iter().find_map(|v| v.id.as_deref())
    }

    /// All references (`@id`) of `predicate`, in document order.
    pub fn ids<'a>(&'a self, predicate: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.values(predicate)
            .iter()
            .filter_map(|v| v.id.as_deref())
    }
}

/// The form of a resource URI used to decide whether two URIs name the same
/// resource: `…/a` and `…/a/` are one container.
pub fn canonical_location(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Prefer the node whose `@id` is the requested location; fall back to the
/// first node object.
fn select_node<'a>(location: &str, nodes: &'a [Value]) -> Option<&'a Value> {
    let wanted = canonical_location(location);
    nodes
        .iter()
        .find(|n| {
            n.get("@id")
                .and_then(Value::as_str)
                .is_some_and(|id| canonical_location(id) == wanted)
        })
        .or_else(|| nodes.iter().find(|n| n.is_object()))
}

fn to_ld_value(raw: &Value) -> Option<LdValue> {
    match raw {
        Value::Object(map) => {
            let id = map.get("@id").and_then(Value::as_str).map(str::to_string);
            let value = map.get("@value").and_then(literal_text);
            if id.is_none() && value.is_none() {
                None
            } else {
                Some(LdValue { id, value })
            }
        }
        other => literal_text(other).map(LdValue::literal),
    }
}

fn literal_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
