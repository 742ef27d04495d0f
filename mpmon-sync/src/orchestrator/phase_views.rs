//! Per-legislator voting record phase

use super::statistics::PhaseStatus;
use super::{Orchestrator, PhaseOutcome, RunMode, RunState};
use crate::services::{Member, Propagator};
use anyhow::Result;
use mpmon_common::ArtifactKind;
use tokio_util::sync::CancellationToken;

impl Orchestrator {
    /// **Phase 5: MP VIEWS** - keep `mp_votes/<slug>.json` in step with the corpus
    ///
    /// Details written this run are folded into existing records first. Then,
    /// outside incremental mode, every current member whose record is missing
    /// or stale gets a full rebuild.
    pub(super) fn phase_views(
        &self,
        state: &mut RunState,
        cancel_token: &CancellationToken,
    ) -> Result<PhaseOutcome> {
        let directory = self.take_directory(state)?;
        let propagator = Propagator::new(&self.store, &directory, &self.config);

        let propagated = propagator.propagate_incremental(&state.written);
        let views = &mut state.stats.views;
        views.records_updated = propagated.records_updated;
        views.entries_added = propagated.entries_added;
        views.unmatched_ballots = propagated.unmatched_ballots;
        views.write_failures = propagated.write_failures;

        let mut cancelled = false;
        if self.options.mode != RunMode::Incremental {
            let limit = self.options.max_mps.unwrap_or(usize::MAX);
            let stale: Vec<&Member> = directory
                .current()
                .take(limit)
                .filter(|m| !self.store.is_item_fresh(ArtifactKind::MpVotes, &m.slug))
                .collect();
            if !stale.is_empty() {
                tracing::info!(mps = stale.len(), "Phase 5: rebuilding missing or stale voting records");
            }
            let rebuilt = propagator.rebuild_views(&stale, cancel_token);
            views.records_rebuilt = rebuilt.records_written;
            views.write_failures += rebuilt.write_failures;
            cancelled = rebuilt.cancelled;
        }

        let failures = views.write_failures;
        let touched = views.records_updated + views.records_rebuilt;
        let detail = views.display_string();
        state.directory = Some(directory);

        let status = if cancelled {
            PhaseStatus::Cancelled
        } else if failures > 0 {
            PhaseStatus::Partial
        } else if touched == 0 {
            PhaseStatus::Skipped
        } else {
            PhaseStatus::Completed
        };
        Ok(PhaseOutcome::new(status, detail))
    }
}
