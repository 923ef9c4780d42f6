//! In-memory [`Transport`] serving a fixed LDP tree.
//!
//! Used by tests and by library users who want to dry-run a harvest
//! against canned responses. Replies are keyed by URL and `Accept` header;
//! unknown requests answer 404.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::fetch::{FetchResponse, Transport, TransportError, ACCEPT_JSON_LD, ACCEPT_RDF_XML};

#[derive(Debug, Clone)]
enum Reply {
    Response(FetchResponse),
    ConnectionFailure,
}

#[derive(Default)]
pub struct FixtureTransport {
    replies: HashMap<(String, Option<String>), Reply>,
    log: Mutex<Vec<(String, Option<String>)>>,
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(mut self, url: &str, accept: Option<&str>, reply: Reply) -> Self {
        self.replies
            .insert((url.to_string(), accept.map(str::to_string)), reply);
        self
    }

    /// Serve `nodes` as the JSON-LD representation of `url`.
    pub fn json_ld(self, url: &str, nodes: Value) -> Self {
        self.status(url, Some(ACCEPT_JSON_LD), 200, &nodes.to_string())
    }

    /// Serve `body` as the RDF/XML representation of `url`.
    pub fn rdf_xml(self, url: &str, body: &str) -> Self {
        self.status(url, Some(ACCEPT_RDF_XML), 200, body)
    }

    /// Serve `body` to a request without an `Accept` header.
    pub fn payload(self, url: &str, body: &str) -> Self {
        self.status(url, None, 200, body)
    }

    pub fn status(self, url: &str, accept: Option<&str>, status: u16, body: &str) -> Self {
        self.insert(
            url,
            accept,
            Reply::Response(FetchResponse {
                status,
                body: body.to_string(),
            }),
        )
    }

    /// Every request for (`url`, `accept`) fails at the connection level.
    pub fn unreachable(self, url: &str, accept: Option<&str>) -> Self {
        self.insert(url, accept, Reply::ConnectionFailure)
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<(String, Option<String>)> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Number of requests received for `url` with any `Accept` header.
    pub fn hits(&self, url: &str) -> usize {
        self.requests().iter().filter(|(u, _)| u == url).count()
    }
}

#[async_trait]
impl Transport for FixtureTransport {
    async fn get(
        &self,
        url: &str,
        accept: Option<&str>,
    ) -> Result<FetchResponse, TransportError> {
        if let Ok(mut log) = self.log.lock() {
            log.push((url.to_string(), accept.map(str::to_string)));
        }
        match self
            .replies
            .get(&(url.to_string(), accept.map(str::to_string)))
        {
            Some(Reply::Response(r)) => Ok(r.clone()),
            Some(Reply::ConnectionFailure) => {
                Err(TransportError::Connection(format!(
                "connection refused: {}",
                url
            )))
            }
            None => Ok(FetchResponse {
                status: 404,
                body: String::new(),
            }),
        }
    }
}
