//! Party-line analytics phase

use super::statistics::PhaseStatus;
use super::{Orchestrator, PhaseOutcome, RunMode, RunState};
use crate::services::{PartyLineEngine, PlanChoice};
use anyhow::Result;
use tokio_util::sync::CancellationToken;

impl Orchestrator {
    /// **Phase 7: ANALYTICS** - party-line statistics
    ///
    /// Forced runs, `full` and `party-line` recompute from scratch. Otherwise
    /// an interrupted run is resumed or newly mirrored votes are folded in; a
    /// stale report with nothing pending is recomputed except in incremental
    /// mode.
    pub(super) fn phase_analytics(
        &self,
        state: &mut RunState,
        cancel_token: &CancellationToken,
    ) -> Result<PhaseOutcome> {
        let directory = self.take_directory(state)?;
        let engine = PartyLineEngine::new(&self.store, &directory, &self.config, self.options.max_mps);

        let recompute = self.store.is_forced() || self.options.mode == RunMode::PartyLine;
        let refresh_stale = self.options.mode != RunMode::Incremental;
        let choice = engine.select_plan(recompute, refresh_stale);
        let up_to_date = choice == PlanChoice::UpToDate;
        tracing::info!(plan = %choice.label(), "Phase 7: party-line analytics");

        let result = engine.run(choice, cancel_token);
        state.directory = Some(directory);
        let outcome = result?;

        let stats = &mut state.stats.analytics;
        stats.plan = outcome.plan.clone();
        stats.mps_computed = outcome.mps_computed;
        stats.mps_resumed = outcome.mps_resumed;
        stats.mps_without_party = outcome.mps_without_party;
        stats.votes_indexed = outcome.votes_indexed;
        stats.memory_reclaims = outcome.memory_reclaims;

        let status = if outcome.cancelled {
            PhaseStatus::Cancelled
        } else if up_to_date {
            PhaseStatus::Skipped
        } else if outcome.write_failures > 0 {
            PhaseStatus::Partial
        } else {
            PhaseStatus::Completed
        };
        Ok(PhaseOutcome::new(status, stats.display_string()))
    }
}
