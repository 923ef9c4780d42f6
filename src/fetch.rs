//! HTTP fetch client with bounded retry and rate limiting.
//!
//! [`FetchClient`] wraps a [`Transport`] (in production, [`HttpTransport`]
//! over one pooled `reqwest::Client`) and adds two things:
//!
//! - the shared [`RateLimiter`] permit is held for every fetch, so the
//!   configured pause separates the end of one fetch from the next;
//! - connection-level failures (DNS, refused/reset connections, timeouts,
//!   truncated bodies) are retried up to `max_retries` times with
//!   exponential backoff. Requests that cannot be built (a malformed or
//!   relative URL) fail after one attempt.
//!
//! Any HTTP status that was actually received, including 4xx and 5xx, is a
//! normal [`FetchResponse`] and is never retried; the caller decides what a
//! non-success status means.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{Config, HarvestConfig, SourceConfig};
use crate::rate_limit::RateLimiter;

/// Accept header for the graph representation of a resource.
pub const ACCEPT_JSON_LD: &str = "application/ld+json";
/// Accept header for the descriptive representation of a resource.
pub const ACCEPT_RDF_XML: &str = "application/rdf+xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request that produced no HTTP response.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    /// DNS, connect, timeout or body failure. Worth retrying.
    #[error("{0}")]
    Connection(String),
    /// The request itself is invalid. Retrying cannot help.
    #[error("{0}")]
    Request(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("connection to {url} failed after {attempts} attempt(s): {message}")]
    Connection {
        url: String,
        attempts: u32,
        message: String,
    },
    #[error("invalid request for {url}: {message}")]
    Request { url: String, message: String },
}

/// A single GET against the remote source, without retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, accept: Option<&str>)
        -> Result<FetchResponse, TransportError>;
}

/// [`Transport`] over a pooled `reqwest` client with optional basic auth.
pub struct HttpTransport {
    client: reqwest::Client,
    credentials: Option<(String, Option<String>)>,
}

impl HttpTransport {
    pub fn new(source: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(source.timeout_secs))
            .user_agent(source.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            credentials: source.credentials()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        accept: Option<&str>,
    ) -> Result<FetchResponse, TransportError> {
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(reqwest::header::ACCEPT, accept);
        }
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(classify_error)?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Connection(format!("reading body: {}", e)))?;

        Ok(FetchResponse { status, body })
    }
}

fn classify_error(e: reqwest::Error) -> TransportError {
    if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() {
        TransportError::Connection(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

/// Exponential backoff between connection retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(harvest: &HarvestConfig) -> Self {
        Self {
            max_retries: harvest.max_retries,
            base_delay: Duration::from_millis(harvest.backoff_base_ms),
            factor: harvest.backoff_factor,
            max_delay: Duration::from_millis(harvest.backoff_max_ms),
        }
    }

    /// Delay before retry number `retry` (1-indexed): `base * factor^(retry-1)`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(32) as i32;
        let scaled = self.base_delay.as_nanos() as f64 * self.factor.powi(exp);
        if !scaled.is_finite() || scaled >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(scaled as u64)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HarvestConfig::default())
    }
}

pub struct FetchClient {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    requests: AtomicU64,
}

impl FetchClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            limiter,
            policy,
            requests: AtomicU64::new(0),
        }
    }

    /// Build the production client for a run.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.source)?;
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(RateLimiter::new(config.harvest.rate_limit())),
            RetryPolicy::from_config(&config.harvest),
        ))
    }

    /// Number of transport attempts made so far, retries included.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// GET `url`, retrying connection failures only.
    pub async fn fetch(
        &self,
        url: &str,
        accept: Option<&str>,
    ) -> Result<FetchResponse, FetchError> {
        let _permit = self.limiter.wait().await;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.requests.fetch_add(1, Ordering::Relaxed);

            match self.transport.get(url, accept).await {
                Ok(response) => {
                    debug!(url, status = response.status, attempt, "fetched");
                    return Ok(response);
                }
                Err(TransportError::Request(message)) => {
                    return Err(FetchError::Request {
                        url: url.to_string(),
                        message,
                    });
                }
                Err(TransportError::Connection(message)) => {
                    if attempt > self.policy.max_retries {
                        return Err(FetchError::Connection {
                            url: url.to_string(),
                            attempts: attempt,
                            message,
                        });
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        url,
                        attempt,
                        max_attempts = self.policy.max_retries + 1,
                        ?delay,
                        error = %message,
                        "connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
