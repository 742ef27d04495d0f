//! Recent votes phase

use super::statistics::PhaseStatus;
use super::{Orchestrator, PhaseOutcome, RunMode, RunState};
use crate::services::reference_data;
use anyhow::Result;
use mpmon_common::ArtifactKind;

impl Orchestrator {
    /// **Phase 2: RECENT VOTES** - newest summaries into `votes.json`
    ///
    /// Incremental runs always fetch and merge into the existing artifact.
    pub(super) async fn phase_recent_votes(&self, state: &mut RunState) -> Result<PhaseOutcome> {
        let merge = self.options.mode == RunMode::Incremental;
        if !merge && self.store.is_fresh(ArtifactKind::Votes) {
            state.stats.recent_votes.votes = reference_data::load_recent_votes(&self.store).len();
            return Ok(PhaseOutcome::new(PhaseStatus::Skipped, "recent votes still fresh"));
        }

        tracing::info!(merge, "Phase 2: refreshing recent votes");
        let outcome = reference_data::refresh_recent_votes(
            self.source.as_ref(),
            &self.store,
            self.config.recent_votes_limit,
            merge,
        )
        .await?;
        state.stats.recent_votes.votes = outcome.stored;
        state.stats.recent_votes.merged = outcome.merged;
        Ok(PhaseOutcome::new(
            PhaseStatus::Completed,
            state.stats.recent_votes.display_string(),
        ))
    }
}
