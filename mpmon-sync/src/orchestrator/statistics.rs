//! Run statistics
//!
//! One [`RunStatistics`] per invocation: per-phase stat structs, a status line
//! for every phase that was considered, the upstream request count and the
//! size of every cache artifact at the end of the run. Logged as a summary and
//! written to `sync_statistics.json`.

use chrono::{DateTime, Utc};
use mpmon_common::models::index::VOTE_CACHE_INDEX;
use mpmon_common::models::party_line::PARTY_LINE_REPORT;
use mpmon_common::{time, ArtifactKind, CacheStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use uuid::Uuid;

/// Document name under the cache root
pub const SYNC_STATISTICS: &str = "sync_statistics";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Completed,
    /// Some items failed; dependents still run
    Partial,
    /// Cache still fresh or not selected by the mode
    Skipped,
    /// A dependency failed outright
    Blocked,
    Failed,
    Cancelled,
}

impl PhaseStatus {
    /// Dependents may run on this phase's output
    pub fn is_usable(self) -> bool {
        matches!(self, PhaseStatus::Completed | PhaseStatus::Partial | PhaseStatus::Skipped)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: String,
    pub status: PhaseStatus,
    pub detail: String,
    pub duration_ms: u64,
}

/// **Roster**
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterStats {
    pub politicians: usize,
}

impl RosterStats {
    pub fn display_string(&self) -> String {
        format!("{} politicians cached", self.politicians)
    }
}

/// **Recent votes**
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentVotesStats {
    pub votes: usize,
    /// New summaries folded into the artifact (incremental mode)
    pub merged: usize,
}

impl RecentVotesStats {
    pub fn display_string(&self) -> String {
        format!("{} recent votes, {} merged", self.votes, self.merged)
    }
}

/// **Vote details**
///
/// Display: "N examined, M new, W written, F failed"
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailSyncStats {
    pub examined: usize,
    pub new_detected: usize,
    pub via_watermark: bool,
    pub written: usize,
    pub failed: usize,
    pub write_failures: usize,
    /// Index entries dropped because their file was gone
    pub reconciled: usize,
}

impl DetailSyncStats {
    pub fn display_string(&self) -> String {
        format!(
            "{} examined, {} new, {} written, {} failed",
            self.examined,
            self.new_detected,
            self.written,
            self.failed + self.write_failures
        )
    }
}

/// **Cross-reference**
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrossReferenceStats {
    pub bills: usize,
    pub bills_with_votes: usize,
}

impl CrossReferenceStats {
    pub fn display_string(&self) -> String {
        format!("{} bills, {} with votes", self.bills, self.bills_with_votes)
    }
}

/// **Per-legislator views**
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewStats {
    pub records_updated: usize,
    pub entries_added: usize,
    pub records_rebuilt: usize,
    pub unmatched_ballots: usize,
    pub write_failures: usize,
}

impl ViewStats {
    pub fn display_string(&self) -> String {
        format!(
            "{} updated (+{} votes), {} rebuilt, {} unmatched ballots",
            self.records_updated, self.entries_added, self.records_rebuilt, self.unmatched_ballots
        )
    }
}

/// **Historical members**
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricalStats {
    pub candidates: usize,
    pub fetched: usize,
    pub failed: usize,
    pub total: usize,
}

impl HistoricalStats {
    pub fn display_string(&self) -> String {
        format!(
            "{} candidates, {} fetched, {} failed, {} cached",
            self.candidates, self.fetched, self.failed, self.total
        )
    }
}

/// **Analytics**
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsStats {
    pub plan: String,
    pub mps_computed: usize,
    pub mps_resumed: usize,
    pub mps_without_party: usize,
    pub votes_indexed: usize,
    pub memory_reclaims: usize,
}

impl AnalyticsStats {
    pub fn display_string(&self) -> String {
        format!(
            "{}: {} computed, {} resumed, {} without party, {} reclaims",
            self.plan, self.mps_computed, self.mps_resumed, self.mps_without_party, self.memory_reclaims
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatistics {
    pub run_id: Uuid,
    pub mode: String,
    pub forced: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
    pub phases: Vec<PhaseReport>,
    pub roster: RosterStats,
    pub recent_votes: RecentVotesStats,
    pub vote_details: DetailSyncStats,
    pub cross_reference: CrossReferenceStats,
    pub views: ViewStats,
    pub historical: HistoricalStats,
    pub analytics: AnalyticsStats,
    pub api_calls: u64,
    pub errors: Vec<String>,
    /// Bytes per top-level artifact file
    pub cache_sizes: BTreeMap<String, u64>,
    pub vote_detail_files: usize,
    pub mp_vote_files: usize,
    pub cancelled: bool,
}

impl RunStatistics {
    pub fn new(mode: impl Into<String>, forced: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode: mode.into(),
            forced,
            started_at: time::now(),
            finished_at: None,
            duration_secs: 0.0,
            phases: Vec::new(),
            roster: RosterStats::default(),
            recent_votes: RecentVotesStats::default(),
            vote_details: DetailSyncStats::default(),
            cross_reference: CrossReferenceStats::default(),
            views: ViewStats::default(),
            historical: HistoricalStats::default(),
            analytics: AnalyticsStats::default(),
            api_calls: 0,
            errors: Vec::new(),
            cache_sizes: BTreeMap::new(),
            vote_detail_files: 0,
            mp_vote_files: 0,
            cancelled: false,
        }
    }

    pub fn record_phase(
        &mut self,
        phase: &str,
        status: PhaseStatus,
        detail: impl Into<String>,
        duration_ms: u64,
    ) {
        self.phases.push(PhaseReport {
            phase: phase.to_string(),
            status,
            detail: detail.into(),
            duration_ms,
        });
    }

    pub fn phase_status(&self, phase: &str) -> Option<PhaseStatus> {
        self.phases.iter().rev().find(|p| p.phase == phase).map(|p| p.status)
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Stamp the end time and measure the cache
    pub fn finalize(&mut self, store: &CacheStore, api_calls: u64) {
        let finished = time::now();
        self.finished_at = Some(finished);
        self.duration_secs = (finished - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.api_calls = api_calls;

        self.cache_sizes.clear();
        for kind in ArtifactKind::ALL.iter().filter(|k| !k.is_collection()) {
            if let Ok(meta) = fs::metadata(store.artifact_path(*kind)) {
                self.cache_sizes.insert(kind.name().to_string(), meta.len());
            }
        }
        for name in [VOTE_CACHE_INDEX, PARTY_LINE_REPORT] {
            if let Ok(meta) = fs::metadata(store.document_path(name)) {
                self.cache_sizes.insert(name.to_string(), meta.len());
            }
        }
        self.vote_detail_files = store.list_items(ArtifactKind::VoteDetails).len();
        self.mp_vote_files = store.list_items(ArtifactKind::MpVotes).len();
    }

    pub fn save(&self, store: &CacheStore) -> mpmon_common::Result<u64> {
        store.save_document(SYNC_STATISTICS, self)
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "run {} ({}{}) finished in {:.1}s, {} api calls, {} errors",
            self.run_id,
            self.mode,
            if self.forced { ", forced" } else { "" },
            self.duration_secs,
            self.api_calls,
            self.errors.len()
        )];
        for phase in &self.phases {
            lines.push(format!("  {:<16} {:?}: {}", phase.phase, phase.status, phase.detail));
        }
        lines.push(format!(
            "  cache: {} vote details, {} voting records",
            self.vote_detail_files, self.mp_vote_files
        ));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_display_strings() {
        let details = DetailSyncStats {
            examined: 100,
            new_detected: 3,
            written: 2,
            failed: 1,
            ..Default::default()
        };
        assert_eq!(details.display_string(), "100 examined, 3 new, 2 written, 1 failed");
        assert_eq!(RosterStats { politicians: 338 }.display_string(), "338 politicians cached");
    }

    #[test]
    fn test_latest_phase_status_wins() {
        let mut stats = RunStatistics::new("auto", false);
        stats.record_phase("roster", PhaseStatus::Failed, "x", 1);
        stats.record_phase("roster", PhaseStatus::Completed, "y", 1);
        assert_eq!(stats.phase_status("roster"), Some(PhaseStatus::Completed));
        assert_eq!(stats.phase_status("analytics"), None);
    }

    #[test]
    fn test_finalize_measures_cache() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        store.ensure_layout().unwrap();
        store.save(ArtifactKind::Votes, &vec![1u32, 2, 3]).unwrap();
        store.save_item(ArtifactKind::MpVotes, "jane-doe", &vec![1u32]).unwrap();

        let mut stats = RunStatistics::new("votes", false);
        stats.finalize(&store, 7);

        assert_eq!(stats.api_calls, 7);
        assert!(stats.cache_sizes["votes"] > 0);
        assert_eq!(stats.mp_vote_files, 1);
        assert!(stats.finished_at.is_some());

        stats.save(&store).unwrap();
        assert!(store.document_path(SYNC_STATISTICS).exists());
    }
}
