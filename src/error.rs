//! Errors that end a harvest run.
//!
//! Everything else the remote side can do wrong (unreachable children,
//! missing payloads, undecodable metadata, unknown set specs) is recovered
//! locally and only shows up in the run report.

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("root resource {url} is unreachable: {reason}")]
    RootUnreachable { url: String, reason: String },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
