//! Roster phase

use super::statistics::PhaseStatus;
use super::{Orchestrator, PhaseOutcome, RunMode, RunState};
use crate::services::reference_data;
use anyhow::Result;
use mpmon_common::ArtifactKind;

impl Orchestrator {
    /// **Phase 1: ROSTER** - current members into `politicians.json`
    ///
    /// Incremental runs only fetch when no roster is cached at all.
    pub(super) async fn phase_roster(&self, state: &mut RunState) -> Result<PhaseOutcome> {
        let cached = reference_data::load_roster(&self.store);
        if self.options.mode == RunMode::Incremental && !self.store.is_forced() {
            if let Some(roster) = &cached {
                state.stats.roster.politicians = roster.len();
                return Ok(PhaseOutcome::new(PhaseStatus::Skipped, "roster cached"));
            }
        }
        if self.store.is_fresh(ArtifactKind::Politicians) {
            state.stats.roster.politicians = cached.map(|r| r.len()).unwrap_or(0);
            return Ok(PhaseOutcome::new(PhaseStatus::Skipped, "roster still fresh"));
        }

        tracing::info!("Phase 1: refreshing roster");
        let count = reference_data::refresh_roster(self.source.as_ref(), &self.store).await?;
        state.stats.roster.politicians = count;
        state.directory = None;
        Ok(PhaseOutcome::new(
            PhaseStatus::Completed,
            state.stats.roster.display_string(),
        ))
    }
}
