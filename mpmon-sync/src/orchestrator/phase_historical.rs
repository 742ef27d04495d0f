//! Historical members phase

use super::statistics::PhaseStatus;
use super::{Orchestrator, PhaseOutcome, RunState};
use crate::services::reference_data;
use anyhow::{Context, Result};
use mpmon_common::ArtifactKind;
use tokio_util::sync::CancellationToken;

impl Orchestrator {
    /// **Phase 6: HISTORICAL** - members of past sessions missing from the roster
    pub(super) async fn phase_historical(
        &self,
        state: &mut RunState,
        cancel_token: &CancellationToken,
    ) -> Result<PhaseOutcome> {
        if self.store.is_fresh(ArtifactKind::HistoricalMps) {
            state.stats.historical.total = reference_data::load_historical(&self.store).len();
            return Ok(PhaseOutcome::new(
                PhaseStatus::Skipped,
                "historical members still fresh",
            ));
        }
        let roster = reference_data::load_roster(&self.store)
            .context("no cached roster to exclude current members")?;

        tracing::info!("Phase 6: discovering historical members");
        let outcome = reference_data::refresh_historical_mps(
            self.source.as_ref(),
            &self.store,
            &roster,
            self.config.historical_mp_limit,
            self.config.historical_concurrency,
            cancel_token,
        )
        .await?;

        let stats = &mut state.stats.historical;
        stats.candidates = outcome.candidates;
        stats.fetched = outcome.fetched;
        stats.failed = outcome.failed;
        stats.total = outcome.total;
        let detail = stats.display_string();
        if outcome.fetched > 0 {
            state.directory = None;
        }

        let status = if outcome.cancelled {
            PhaseStatus::Cancelled
        } else if outcome.failed > 0 {
            PhaseStatus::Partial
        } else {
            PhaseStatus::Completed
        };
        Ok(PhaseOutcome::new(status, detail))
    }
}
