//! Reference data: roster, recent votes, bills and historical members
//!
//! These artifacts are fetched whole from upstream (no diffing) and feed the
//! member directory and change detection.

use crate::upstream::ParliamentSource;
use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use mpmon_common::models::vote::compare_sessions;
use mpmon_common::models::{Bill, Politician, Vote, VoteDetail};
use mpmon_common::{ArtifactKind, CacheStore};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cached roster, if readable
pub fn load_roster(store: &CacheStore) -> Option<Vec<Politician>> {
    store
        .load::<Vec<Politician>>(ArtifactKind::Politicians)
        .map(|e| e.payload)
}

/// Cached historical members keyed by URL; empty when missing
pub fn load_historical(store: &CacheStore) -> BTreeMap<String, Politician> {
    store
        .load::<BTreeMap<String, Politician>>(ArtifactKind::HistoricalMps)
        .map(|e| e.payload)
        .unwrap_or_default()
}

/// Cached recent vote summaries; empty when missing
pub fn load_recent_votes(store: &CacheStore) -> Vec<Vote> {
    store
        .load::<Vec<Vote>>(ArtifactKind::Votes)
        .map(|e| e.payload)
        .unwrap_or_default()
}

/// Newest session seen in the detail corpus or, failing that, recent votes
pub fn current_session(store: &CacheStore) -> Option<String> {
    let from_corpus = store
        .list_items(ArtifactKind::VoteDetails)
        .into_iter()
        .filter_map(|id| id.split('_').next().map(str::to_string))
        .max_by(|a, b| compare_sessions(a, b));
    from_corpus.or_else(|| {
        load_recent_votes(store)
            .into_iter()
            .map(|v| v.session)
            .filter(|s| !s.is_empty())
            .max_by(|a, b| compare_sessions(a, b))
    })
}

/// Fetch and store the current roster; returns the member count
pub async fn refresh_roster(source: &dyn ParliamentSource, store: &CacheStore) -> Result<usize> {
    let politicians = source.politicians().await.context("fetching roster")?;
    if politicians.is_empty() {
        bail!("upstream returned an empty roster");
    }
    store
        .save(ArtifactKind::Politicians, &politicians)
        .context("saving roster")?;
    info!(politicians = politicians.len(), "Roster cached");
    Ok(politicians.len())
}

#[derive(Debug, Clone, Default)]
pub struct RecentVotesOutcome {
    pub stored: usize,
    /// Summaries not previously in the artifact (merge mode only)
    pub merged: usize,
}

/// Fetch the newest `limit` summaries and store them
///
/// In merge mode new summaries are added to the existing artifact instead of
/// replacing it, keeping it newest first and bounded by `limit`.
pub async fn refresh_recent_votes(
    source: &dyn ParliamentSource,
    store: &CacheStore,
    limit: usize,
    merge: bool,
) -> Result<RecentVotesOutcome> {
    let fetched = source
        .recent_votes(limit)
        .await
        .context("fetching recent votes")?;
    if fetched.is_empty() {
        bail!("upstream returned no votes");
    }

    let (votes, merged) = if merge {
        let mut existing = load_recent_votes(store);
        let known: HashSet<String> = existing.iter().map(|v| v.url.clone()).collect();
        let fresh: Vec<Vote> = fetched
            .into_iter()
            .filter(|v| !known.contains(&v.url))
            .collect();
        let merged = fresh.len();
        existing.extend(fresh);
        existing.sort_by(|a, b| a.cmp_recency(b));
        existing.truncate(limit);
        (existing, merged)
    } else {
        (fetched, 0)
    };

    store
        .save(ArtifactKind::Votes, &votes)
        .context("saving recent votes")?;
    info!(votes = votes.len(), merged, "Recent votes cached");
    Ok(RecentVotesOutcome {
        stored: votes.len(),
        merged,
    })
}

/// Fetch and store the bill list; returns the bill count
pub async fn refresh_bills(source: &dyn ParliamentSource, store: &CacheStore) -> Result<usize> {
    let bills: Vec<Bill> = source.bills().await.context("fetching bills")?;
    if bills.is_empty() {
        bail!("upstream returned no bills");
    }
    store.save(ArtifactKind::Bills, &bills).context("saving bills")?;
    info!(bills = bills.len(), "Bills cached");
    Ok(bills.len())
}

#[derive(Debug, Clone, Default)]
pub struct HistoricalOutcome {
    pub candidates: usize,
    pub fetched: usize,
    pub failed: usize,
    pub total: usize,
    pub cancelled: bool,
}

/// Fetch members seen in past sessions who are not on the current roster
///
/// Candidates are politician URLs from ballots of every session other than
/// the current one. Fetches run on a pool of `concurrency`; results are merged
/// into the existing artifact keyed by URL.
pub async fn refresh_historical_mps(
    source: &dyn ParliamentSource,
    store: &CacheStore,
    roster: &[Politician],
    limit: usize,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<HistoricalOutcome> {
    let current = current_session(store);
    let roster_urls: HashSet<&str> = roster.iter().map(|p| p.url.as_str()).collect();

    let mut candidates: BTreeSet<String> = BTreeSet::new();
    for id in store.list_items(ArtifactKind::VoteDetails) {
        let Some(envelope) = store.load_item::<VoteDetail>(ArtifactKind::VoteDetails, &id) else {
            debug!(vote_id = %id, "Skipping unreadable vote detail");
            continue;
        };
        let detail = envelope.payload;
        if detail.vote.session.is_empty() || Some(&detail.vote.session) == current.as_ref() {
            continue;
        }
        for ballot in detail.ballots {
            if let Some(url) = ballot.politician_url.filter(|u| !u.is_empty()) {
                if !roster_urls.contains(url.as_str()) {
                    candidates.insert(url);
                }
            }
        }
    }

    let mut outcome = HistoricalOutcome {
        candidates: candidates.len(),
        ..HistoricalOutcome::default()
    };
    info!(
        candidates = candidates.len(),
        current_session = current.as_deref().unwrap_or("unknown"),
        "Historical member candidates found"
    );
    if candidates.len() > limit {
        warn!(limit, "Historical member fetch capped");
    }

    let mut merged = load_historical(store);
    let results: Vec<_> = stream::iter(candidates.into_iter().take(limit))
        .filter(|_| futures::future::ready(!cancel.is_cancelled()))
        .map(|url| async move {
            let result = source.politician(&url).await;
            (url, result)
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    for (url, result) in results {
        match result {
            Ok(politician) => {
                merged.insert(url, politician);
                outcome.fetched += 1;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to fetch historical member");
                outcome.failed += 1;
            }
        }
    }
    outcome.cancelled = cancel.is_cancelled();

    if outcome.fetched == 0 && outcome.failed > 0 {
        bail!("all {} historical member fetches failed", outcome.failed);
    }
    if outcome.fetched > 0 {
        store
            .save(ArtifactKind::HistoricalMps, &merged)
            .context("saving historical members")?;
    }
    outcome.total = merged.len();
    info!(
        fetched = outcome.fetched,
        failed = outcome.failed,
        total = outcome.total,
        "Historical members cached"
    );
    Ok(outcome)
}
