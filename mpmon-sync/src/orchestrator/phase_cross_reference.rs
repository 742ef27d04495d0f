//! Cross-reference phase: bills and the bills-with-votes index

use super::statistics::PhaseStatus;
use super::{Orchestrator, PhaseOutcome, RunState};
use crate::services::{rebuild_bills_index, reference_data};
use anyhow::{Context, Result};
use mpmon_common::models::Bill;
use mpmon_common::ArtifactKind;
use std::collections::BTreeSet;

impl Orchestrator {
    /// **Phase 4: CROSS-REFERENCE** - `bills.json`, then the index of bills
    /// that have at least one mirrored vote
    ///
    /// A bill fetch failure still lets the index be rebuilt from the corpus.
    pub(super) async fn phase_cross_reference(&self, state: &mut RunState) -> Result<PhaseOutcome> {
        let mut bills_failed = false;
        let mut refreshed = false;

        if self.store.is_fresh(ArtifactKind::Bills) {
            state.stats.cross_reference.bills = self
                .store
                .load::<Vec<Bill>>(ArtifactKind::Bills)
                .map(|e| e.payload.len())
                .unwrap_or(0);
        } else {
            tracing::info!("Phase 4: refreshing bills");
            match reference_data::refresh_bills(self.source.as_ref(), &self.store).await {
                Ok(count) => {
                    state.stats.cross_reference.bills = count;
                    refreshed = true;
                }
                Err(e) => {
                    tracing::warn!(error = %format!("{:#}", e), "Bill refresh failed");
                    state.stats.error(format!("bills: {:#}", e));
                    bills_failed = true;
                }
            }
        }

        if refreshed || !self.store.is_fresh(ArtifactKind::BillsWithVotes) {
            state.stats.cross_reference.bills_with_votes =
                rebuild_bills_index(&self.store).context("rebuilding bills-with-votes index")?;
        } else {
            state.stats.cross_reference.bills_with_votes = self
                .store
                .load::<BTreeSet<String>>(ArtifactKind::BillsWithVotes)
                .map(|e| e.payload.len())
                .unwrap_or(0);
            if !bills_failed {
                return Ok(PhaseOutcome::new(
                    PhaseStatus::Skipped,
                    "bills and index still fresh",
                ));
            }
        }

        let status = if bills_failed {
            PhaseStatus::Partial
        } else {
            PhaseStatus::Completed
        };
        Ok(PhaseOutcome::new(
            status,
            state.stats.cross_reference.display_string(),
        ))
    }
}
