//! Vote detail sync phase

use super::statistics::PhaseStatus;
use super::{Orchestrator, PhaseOutcome, RunState};
use crate::services::detail_fetcher::{load_index, persist_index};
use crate::services::{detect_new_votes, DetailFetcher};
use anyhow::{Context, Result};
use mpmon_common::models::{IndexEntry, VoteCacheIndex, VoteDetail, VoteId};
use mpmon_common::{ArtifactKind, CacheStore};
use tokio_util::sync::CancellationToken;

impl Orchestrator {
    /// **Phase 3: VOTE DETAILS** - fetch details for votes not yet mirrored
    ///
    /// The index is first reconciled with the files on disk, then the newest
    /// upstream summaries are diffed against it. Details written here are
    /// handed to the views phase through the run state.
    pub(super) async fn phase_vote_details(
        &self,
        state: &mut RunState,
        cancel_token: &CancellationToken,
    ) -> Result<PhaseOutcome> {
        let mut index = load_index(&self.store);
        let (dropped, adopted) = reconcile_index(&self.store, &mut index);
        state.stats.vote_details.reconciled = dropped + adopted;
        if dropped + adopted > 0 {
            tracing::warn!(dropped, adopted, "Vote cache index reconciled with vote detail files");
            persist_index(&self.store, &mut index).context("saving reconciled index")?;
        }

        tracing::info!(
            window = self.config.detection_window,
            indexed = index.len(),
            "Phase 3: checking upstream for new votes"
        );
        let upstream = self
            .source
            .recent_votes(self.config.detection_window)
            .await
            .context("listing upstream votes")?;
        let detection = detect_new_votes(&upstream, &index, state.watermark.as_deref());
        state.stats.vote_details.examined = detection.examined;
        state.stats.vote_details.new_detected = detection.new_votes.len();
        state.stats.vote_details.via_watermark = detection.via_watermark;

        if detection.new_votes.is_empty() {
            return Ok(PhaseOutcome::new(
                PhaseStatus::Completed,
                state.stats.vote_details.display_string(),
            ));
        }

        let fetcher = DetailFetcher::new(self.source.as_ref(), &self.store, &self.config);
        let outcome = fetcher
            .fetch_all(&detection.new_votes, &mut index, cancel_token)
            .await;

        let details = &mut state.stats.vote_details;
        details.written = outcome.written.len();
        details.failed = outcome.failed.len();
        details.write_failures = outcome.write_failures;
        for (id, error) in &outcome.failed {
            state.stats.errors.push(format!("vote {}: {}", id, error));
        }
        state.written.extend(outcome.written);

        let status = if outcome.cancelled {
            PhaseStatus::Cancelled
        } else if state.written.is_empty() {
            PhaseStatus::Failed
        } else if outcome.failed.is_empty() && outcome.write_failures == 0 {
            PhaseStatus::Completed
        } else {
            PhaseStatus::Partial
        };
        Ok(PhaseOutcome::new(status, state.stats.vote_details.display_string()))
    }
}

/// Drop entries without a file and adopt files without an entry
///
/// Returns `(dropped, adopted)`.
fn reconcile_index(store: &CacheStore, index: &mut VoteCacheIndex) -> (usize, usize) {
    let dropped = index
        .reconcile(|id| store.item_exists(ArtifactKind::VoteDetails, id))
        .len();

    let mut adopted = 0;
    for stem in store.list_items(ArtifactKind::VoteDetails) {
        let id = VoteId::from_raw(stem);
        if index.contains(&id) {
            continue;
        }
        let Some(envelope) = store.load_item::<VoteDetail>(ArtifactKind::VoteDetails, id.as_str()) else {
            continue;
        };
        let detail = envelope.payload;
        index.insert(
            &id,
            IndexEntry {
                url: detail.vote.url.clone(),
                date: Some(detail.vote.date.clone()).filter(|d| !d.is_empty()),
                cached_at: detail.cached_at,
            },
        );
        adopted += 1;
    }
    (dropped, adopted)
}
