//! Sync orchestrator
//!
//! Runs the phases a mode selects, always in dependency order:
//!
//! ROSTER → RECENT VOTES → VOTE DETAILS → CROSS-REFERENCE → MP VIEWS → HISTORICAL → ANALYTICS
//!
//! Each phase is a `phase_*` method in its own module. A phase that fails
//! outright blocks the phases that depend on it (no roster, no views or
//! analytics); a partial success lets them run. [`Orchestrator::run_exclusive`]
//! wraps a run in the process lock and maps the result to an exit status.

use crate::services::reference_data;
use crate::services::MemberDirectory;
use crate::upstream::ParliamentSource;
use anyhow::{Context, Result};
use mpmon_common::config::SyncConfig;
use mpmon_common::models::{Politician, VoteId};
use mpmon_common::{CacheStore, LockError, ProcessLock};
use statistics::{PhaseStatus, RunStatistics};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

mod phase_analytics;
mod phase_cross_reference;
mod phase_details;
mod phase_historical;
mod phase_roster;
mod phase_views;
mod phase_votes;
pub mod statistics;
pub mod status;

pub use statistics::SYNC_STATISTICS;

/// How one sync invocation ended, as seen by the shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncExit {
    /// Run finished; item and phase failures are in the statistics
    Success,
    /// Another sync holds the lock; nothing was touched
    LockHeld,
    /// Cache directory unusable
    Fatal,
}

impl SyncExit {
    pub fn code(self) -> u8 {
        match self {
            SyncExit::Success => 0,
            SyncExit::LockHeld => 1,
            SyncExit::Fatal => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RunMode {
    /// Every phase, skipping caches that are still fresh
    Auto,
    /// New votes only, then an analytics pass over them
    Incremental,
    /// Every phase, ignoring freshness
    Full,
    /// Recompute party-line statistics only
    PartyLine,
    Politicians,
    Votes,
    VoteDetails,
    Bills,
    MpVotes,
    HistoricalMps,
    /// Report cache freshness and exit
    Status,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Auto => "auto",
            RunMode::Incremental => "incremental",
            RunMode::Full => "full",
            RunMode::PartyLine => "party-line",
            RunMode::Politicians => "politicians",
            RunMode::Votes => "votes",
            RunMode::VoteDetails => "vote-details",
            RunMode::Bills => "bills",
            RunMode::MpVotes => "mp-votes",
            RunMode::HistoricalMps => "historical-mps",
            RunMode::Status => "status",
        }
    }

    pub fn phases(self) -> &'static [Phase] {
        use Phase::*;
        match self {
            RunMode::Auto | RunMode::Full => {
                &[Roster, RecentVotes, VoteDetails, CrossReference, Views, Historical, Analytics]
            }
            RunMode::Incremental => &[Roster, RecentVotes, VoteDetails, Views, Analytics],
            RunMode::PartyLine => &[Analytics],
            RunMode::Politicians => &[Roster],
            RunMode::Votes => &[RecentVotes],
            RunMode::VoteDetails => &[VoteDetails],
            RunMode::Bills => &[CrossReference],
            RunMode::MpVotes => &[Views],
            RunMode::HistoricalMps => &[Historical],
            RunMode::Status => &[],
        }
    }

    /// Read-only modes run without the process lock
    pub fn needs_lock(self) -> bool {
        self != RunMode::Status
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Roster,
    RecentVotes,
    VoteDetails,
    CrossReference,
    Views,
    Historical,
    Analytics,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Roster => "roster",
            Phase::RecentVotes => "recent_votes",
            Phase::VoteDetails => "vote_details",
            Phase::CrossReference => "cross_reference",
            Phase::Views => "mp_views",
            Phase::Historical => "historical_mps",
            Phase::Analytics => "analytics",
        }
    }

    /// Phases whose outright failure blocks this one
    fn depends_on(self) -> &'static [Phase] {
        match self {
            Phase::Views | Phase::Historical | Phase::Analytics => &[Phase::Roster],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: RunMode,
    pub force: bool,
    pub max_mps: Option<usize>,
}

/// What a phase reports back to the run loop
pub(crate) struct PhaseOutcome {
    status: PhaseStatus,
    detail: String,
}

impl PhaseOutcome {
    fn new(status: PhaseStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

/// State carried from one phase to the next within a run
pub(crate) struct RunState {
    stats: RunStatistics,
    /// Newest recent-vote date before this run touched the artifact
    watermark: Option<String>,
    /// Vote details written this run, in upstream order
    written: Vec<VoteId>,
    directory: Option<MemberDirectory>,
}

pub struct Orchestrator {
    source: Arc<dyn ParliamentSource>,
    store: CacheStore,
    config: SyncConfig,
    options: RunOptions,
}

impl Orchestrator {
    /// `full` mode and `--force` make every freshness check fail
    pub fn new(
        source: Arc<dyn ParliamentSource>,
        store: CacheStore,
        config: SyncConfig,
        options: RunOptions,
    ) -> Self {
        let forced = options.force || options.mode == RunMode::Full;
        Self {
            source,
            store: store.with_force(forced),
            config,
            options,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Take the process lock, run, release
    ///
    /// When another live sync holds the lock this returns before any request
    /// or cache write.
    pub async fn run_exclusive(&self, cancel_token: &CancellationToken) -> SyncExit {
        let lock_path = self.store.root().join(status::LOCK_FILE);
        let lock = match ProcessLock::acquire(&lock_path, self.options.mode.as_str()) {
            Ok(guard) => guard,
            Err(e @ LockError::Held { .. }) => {
                tracing::error!("{}", e);
                return SyncExit::LockHeld;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to acquire sync lock");
                return SyncExit::LockHeld;
            }
        };

        let exit = match self.run(cancel_token).await {
            Ok(stats) => {
                if stats.cancelled {
                    tracing::warn!("Run interrupted; progress saved for the next run");
                }
                SyncExit::Success
            }
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "Sync run aborted");
                SyncExit::Fatal
            }
        };
        drop(lock);
        exit
    }

    /// Execute every phase of the selected mode
    ///
    /// Item and phase failures are recorded in the returned statistics; only
    /// an unusable cache directory is an error.
    pub async fn run(&self, cancel_token: &CancellationToken) -> Result<RunStatistics> {
        self.store
            .ensure_layout()
            .with_context(|| format!("preparing cache directory {}", self.store.root().display()))?;

        let watermark = crate::services::change_detector::watermark(
            &reference_data::load_recent_votes(&self.store),
        );
        let mut state = RunState {
            stats: RunStatistics::new(self.options.mode.as_str(), self.store.is_forced()),
            watermark,
            written: Vec::new(),
            directory: None,
        };

        tracing::info!(
            run_id = %state.stats.run_id,
            mode = %self.options.mode,
            forced = self.store.is_forced(),
            cache_dir = %self.store.root().display(),
            "Sync run starting"
        );

        for &phase in self.options.mode.phases() {
            if cancel_token.is_cancelled() {
                state.stats.cancelled = true;
                state
                    .stats
                    .record_phase(phase.name(), PhaseStatus::Cancelled, "not started", 0);
                continue;
            }
            if let Some(blocker) = phase
                .depends_on()
                .iter()
                .find(|dep| matches!(state.stats.phase_status(dep.name()), Some(s) if !s.is_usable()))
            {
                tracing::warn!(phase = phase.name(), blocked_by = blocker.name(), "Phase blocked");
                state.stats.record_phase(
                    phase.name(),
                    PhaseStatus::Blocked,
                    format!("{} failed", blocker.name()),
                    0,
                );
                continue;
            }

            let started = Instant::now();
            let result = match phase {
                Phase::Roster => self.phase_roster(&mut state).await,
                Phase::RecentVotes => self.phase_recent_votes(&mut state).await,
                Phase::VoteDetails => self.phase_vote_details(&mut state, cancel_token).await,
                Phase::CrossReference => self.phase_cross_reference(&mut state).await,
                Phase::Views => self.phase_views(&mut state, cancel_token),
                Phase::Historical => self.phase_historical(&mut state, cancel_token).await,
                Phase::Analytics => self.phase_analytics(&mut state, cancel_token),
            };
            let elapsed = started.elapsed().as_millis() as u64;

            let outcome = result.unwrap_or_else(|e| {
                tracing::error!(phase = phase.name(), error = %format!("{:#}", e), "Phase failed");
                state.stats.error(format!("{}: {:#}", phase.name(), e));
                PhaseOutcome::new(PhaseStatus::Failed, format!("{:#}", e))
            });
            if outcome.status == PhaseStatus::Cancelled {
                state.stats.cancelled = true;
            }
            tracing::info!(
                phase = phase.name(),
                status = ?outcome.status,
                elapsed_ms = elapsed,
                "{}",
                outcome.detail
            );
            state
                .stats
                .record_phase(phase.name(), outcome.status, outcome.detail, elapsed);
        }

        let mut stats = state.stats;
        stats.finalize(&self.store, self.source.request_count());
        if let Err(e) = stats.save(&self.store) {
            tracing::warn!(error = %e, "Failed to write run statistics");
        }
        for line in stats.summary_lines() {
            tracing::info!("{}", line);
        }
        Ok(stats)
    }

    /// Member directory from the cached roster and historical members
    ///
    /// Built on first use and cached in the run state; phases that rewrite the
    /// roster or historical artifact clear it. Callers put it back when done.
    fn take_directory(&self, state: &mut RunState) -> Result<MemberDirectory> {
        if let Some(directory) = state.directory.take() {
            return Ok(directory);
        }
        let roster = reference_data::load_roster(&self.store)
            .context("no cached roster; run the politicians phase first")?;
        let historical: Vec<Politician> = reference_data::load_historical(&self.store)
            .into_values()
            .collect();
        let directory = MemberDirectory::new(&roster, &historical);
        tracing::debug!(members = directory.len(), "Member directory loaded");
        Ok(directory)
    }
}
