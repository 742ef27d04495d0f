//! Remote legislative-data API
//!
//! [`ParliamentSource`] is the seam between the sync engine and the network:
//! production uses [`OpenParliamentClient`], tests plug in an in-memory source.

mod client;

pub use client::OpenParliamentClient;

use async_trait::async_trait;
use mpmon_common::models::{Ballot, Bill, Politician, Vote};
use serde::Deserialize;
use thiserror::Error;

/// Upstream failures; all are transient from the engine's point of view
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    /// Listing still had a next page after the page cap
    #[error("Listing {0} truncated after {1} pages")]
    Truncated(String, usize),
}

/// List endpoint envelope: `{ "objects": [...], "pagination": { "next_url": ... } }`
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub objects: Vec<T>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next_url: Option<String>,
}

/// Read access to the legislative-data API
#[async_trait]
pub trait ParliamentSource: Send + Sync {
    /// Newest `limit` vote summaries, newest first
    async fn recent_votes(&self, limit: usize) -> Result<Vec<Vote>, UpstreamError>;

    /// Full vote record by canonical URL
    async fn vote(&self, url: &str) -> Result<Vote, UpstreamError>;

    /// Every ballot cast in a vote, across pages
    async fn ballots(&self, vote_url: &str) -> Result<Vec<Ballot>, UpstreamError>;

    /// Current roster
    async fn politicians(&self) -> Result<Vec<Politician>, UpstreamError>;

    /// One politician by URL (used for members no longer sitting)
    async fn politician(&self, url: &str) -> Result<Politician, UpstreamError>;

    async fn bills(&self) -> Result<Vec<Bill>, UpstreamError>;

    /// Requests issued so far, for run statistics
    fn request_count(&self) -> u64;
}
