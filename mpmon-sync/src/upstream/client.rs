//! openparliament.ca API client
//!
//! Paces every request through a `governor` limiter (one request per
//! configured delay) and counts requests for the run report.

use super::{Page, ParliamentSource, UpstreamError};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use mpmon_common::config::{SyncConfig, UpstreamConfig};
use mpmon_common::models::{Ballot, Bill, Politician, Vote};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Roster page size and the offset at which paging stops
const POLITICIAN_PAGE: usize = 100;
const POLITICIAN_MAX_OFFSET: usize = 1000;
const BILL_PAGE: usize = 100;
const BILL_MAX_OFFSET: usize = 5000;
const BALLOT_PAGE: usize = 400;
/// Ballot pages followed per vote; a full House fits in one
const BALLOT_MAX_PAGES: usize = 10;

pub struct OpenParliamentClient {
    http_client: Client,
    base_url: String,
    /// None when pacing is disabled (delay of zero)
    rate_limiter: Option<DefaultDirectRateLimiter>,
    requests: AtomicU64,
}

impl OpenParliamentClient {
    pub fn new(upstream: &UpstreamConfig, sync: &SyncConfig) -> Result<Self, UpstreamError> {
        let http_client = Client::builder()
            .user_agent(upstream.user_agent.as_str())
            .timeout(upstream.timeout())
            .build()
            .map_err(|e| UpstreamError::NetworkError(e.to_string()))?;

        let rate_limiter = Quota::with_period(sync.request_delay()).map(RateLimiter::direct);

        Ok(Self {
            http_client,
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            rate_limiter,
            requests: AtomicU64::new(0),
        })
    }

    fn absolute(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else {
            format!("{}{}", self.base_url, path_or_url)
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path_or_url: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let url = self.absolute(path_or_url);
        self.requests.fetch_add(1, Ordering::Relaxed);
        debug!(url = %url, "Querying upstream API");

        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout(url.clone())
                } else {
                    UpstreamError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::ApiError(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::ParseError(format!("{}: {}", url, e)))
    }

    /// Offset pagination for list endpoints without a natural end
    async fn paginate<T: DeserializeOwned>(
        &self,
        path: &str,
        page_size: usize,
        max_offset: usize,
    ) -> Result<Vec<T>, UpstreamError> {
        let mut all = Vec::new();
        let mut offset = 0;

        loop {
            let page: Page<T> = self
                .get_json(
                    path,
                    &[("limit", page_size.to_string()), ("offset", offset.to_string())],
                )
                .await?;

            if page.objects.is_empty() {
                break;
            }
            all.extend(page.objects);

            if page.pagination.next_url.is_none() {
                break;
            }
            offset += page_size;
            if offset > max_offset {
                warn!(path = %path, offset, "Pagination safety cap reached");
                break;
            }
        }

        Ok(all)
    }
}

/// Follow `next_url` links from a first page, up to `max_pages` pages in all
///
/// A listing that still has a next page at the cap is an error rather than a
/// silently short result, so the caller never stores a partial vote.
async fn follow_pages<T, F, Fut>(
    listing: &str,
    mut page: Page<T>,
    max_pages: usize,
    mut fetch: F,
) -> Result<Vec<T>, UpstreamError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Page<T>, UpstreamError>>,
{
    let mut items = std::mem::take(&mut page.objects);
    let mut pages = 1;
    while let Some(next) = page.pagination.next_url.take() {
        if pages >= max_pages {
            warn!(listing = %listing, pages, "Page cap reached with pages left");
            return Err(UpstreamError::Truncated(listing.to_string(), pages));
        }
        page = fetch(next).await?;
        items.append(&mut page.objects);
        pages += 1;
    }
    Ok(items)
}

#[async_trait]
impl ParliamentSource for OpenParliamentClient {
    async fn recent_votes(&self, limit: usize) -> Result<Vec<Vote>, UpstreamError> {
        let page: Page<Vote> = self
            .get_json("/votes/", &[("limit", limit.to_string()), ("offset", "0".to_string())])
            .await?;
        Ok(page.objects)
    }

    async fn vote(&self, url: &str) -> Result<Vote, UpstreamError> {
        self.get_json(url, &[]).await
    }

    async fn ballots(&self, vote_url: &str) -> Result<Vec<Ballot>, UpstreamError> {
        let first: Page<Ballot> = self
            .get_json(
                "/votes/ballots/",
                &[("vote", vote_url.to_string()), ("limit", BALLOT_PAGE.to_string())],
            )
            .await?;
        follow_pages(vote_url, first, BALLOT_MAX_PAGES, |next| async move {
            self.get_json(&next, &[]).await
        })
        .await
    }

    async fn politicians(&self) -> Result<Vec<Politician>, UpstreamError> {
        self.paginate("/politicians/", POLITICIAN_PAGE, POLITICIAN_MAX_OFFSET)
            .await
    }

    async fn politician(&self, url: &str) -> Result<Politician, UpstreamError> {
        self.get_json(url, &[]).await
    }

    async fn bills(&self) -> Result<Vec<Bill>, UpstreamError> {
        self.paginate("/bills/", BILL_PAGE, BILL_MAX_OFFSET).await
    }

    fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}
