//! Vote detail fetching
//!
//! Network work runs on a bounded pool (`buffer_unordered`) one batch at a
//! time; every file write happens back on the calling task. A detail's index
//! entry is added only after its artifact is written, and the index is
//! persisted after every batch, so an interruption never leaves an index entry
//! without a file.

use crate::services::change_detector::NewVote;
use crate::upstream::{ParliamentSource, UpstreamError};
use futures::stream::{self, StreamExt};
use mpmon_common::config::SyncConfig;
use mpmon_common::models::index::VOTE_CACHE_INDEX;
use mpmon_common::models::{IndexEntry, VoteCacheIndex, VoteDetail, VoteId};
use mpmon_common::{time, ArtifactKind, CacheStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of one fetch pass
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Written and indexed, in upstream order
    pub written: Vec<VoteId>,
    /// Upstream failures, left out of the index for the next run
    pub failed: Vec<(VoteId, String)>,
    /// Fetched but could not be written
    pub write_failures: usize,
    pub cancelled: bool,
}

/// Load the vote cache index; missing or malformed yields an empty index
pub fn load_index(store: &CacheStore) -> VoteCacheIndex {
    store.load_document(VOTE_CACHE_INDEX).unwrap_or_default()
}

pub fn persist_index(store: &CacheStore, index: &mut VoteCacheIndex) -> mpmon_common::Result<u64> {
    index.touch(time::timestamp_string(time::now()));
    store.save_document(VOTE_CACHE_INDEX, index)
}

pub struct DetailFetcher<'a> {
    source: &'a dyn ParliamentSource,
    store: &'a CacheStore,
    config: &'a SyncConfig,
}

impl<'a> DetailFetcher<'a> {
    pub fn new(source: &'a dyn ParliamentSource, store: &'a CacheStore, config: &'a SyncConfig) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    pub async fn fetch_all(
        &self,
        new_votes: &[NewVote],
        index: &mut VoteCacheIndex,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        if new_votes.is_empty() {
            return outcome;
        }

        let batches: Vec<&[NewVote]> = new_votes.chunks(self.config.batch_size).collect();
        info!(votes = new_votes.len(), batches = batches.len(), "Fetching vote details");

        for (batch_no, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(batch = batch_no + 1, "Cancelled before batch");
                outcome.cancelled = true;
                break;
            }

            let mut results: Vec<(usize, VoteId, Result<VoteDetail, UpstreamError>)> =
                stream::iter(batch.iter().enumerate())
                    .filter(|_| futures::future::ready(!cancel.is_cancelled()))
                    .map(|(pos, nv)| async move {
                        let result = self.fetch_one(nv).await;
                        (pos, nv.id.clone(), result)
                    })
                    .buffer_unordered(self.config.concurrency)
                    .collect()
                    .await;
            results.sort_by_key(|(pos, _, _)| *pos);

            let mut batch_written = 0;
            for (_, id, result) in results {
                match result {
                    Ok(detail) => {
                        if self.persist(&id, &detail, index) {
                            outcome.written.push(id);
                            batch_written += 1;
                        } else {
                            outcome.write_failures += 1;
                        }
                    }
                    Err(e) => {
                        warn!(vote_id = %id, error = %e, "Vote detail fetch failed, will retry next run");
                        outcome.failed.push((id, e.to_string()));
                    }
                }
            }

            if batch_written > 0 {
                if let Err(e) = persist_index(self.store, index) {
                    error!(error = %e, "Failed to save vote cache index");
                }
            }
            debug!(
                batch = batch_no + 1,
                written = batch_written,
                total_written = outcome.written.len(),
                "Vote detail batch complete"
            );

            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            if batch_no + 1 < batches.len() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.batch_delay()) => {}
                    _ = cancel.cancelled() => {
                        outcome.cancelled = true;
                        break;
                    }
                }
            }
        }

        info!(
            written = outcome.written.len(),
            failed = outcome.failed.len(),
            write_failures = outcome.write_failures,
            "Vote detail sync finished"
        );
        outcome
    }

    async fn fetch_one(&self, nv: &NewVote) -> Result<VoteDetail, UpstreamError> {
        let vote = self.source.vote(&nv.summary.url).await?;
        let ballots = self.source.ballots(&nv.summary.url).await?;
        Ok(VoteDetail::new(vote, ballots, time::timestamp_string(time::now())))
    }

    /// Write the artifact, then index it; false when the write failed
    fn persist(&self, id: &VoteId, detail: &VoteDetail, index: &mut VoteCacheIndex) -> bool {
        match self.store.save_item(ArtifactKind::VoteDetails, id.as_str(), detail) {
            Ok(_) => {
                index.insert(
                    id,
                    IndexEntry {
                        url: detail.vote.url.clone(),
                        date: Some(detail.vote.date.clone()).filter(|d| !d.is_empty()),
                        cached_at: detail.cached_at.clone(),
                    },
                );
                true
            }
            Err(e) => {
                error!(vote_id = %id, error = %e, "Failed to write vote detail");
                false
            }
        }
    }
}
